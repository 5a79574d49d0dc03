use eyre::{Result, WrapErr};
use tracing_subscriber::{EnvFilter, Registry, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize structured logging with JSON output
pub fn init_tracing() -> Result<()> {
    Registry::default()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(true)
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true),
        )
        .try_init()
        .wrap_err("Failed to install JSON tracing subscriber")?;

    tracing::info!("sd-balancer structured logging initialized");
    Ok(())
}

/// Initialize console-friendly logging for development
pub fn init_console_tracing() -> Result<()> {
    Registry::default()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(
            tracing_subscriber::fmt::layer()
                .pretty()
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true),
        )
        .try_init()
        .wrap_err("Failed to install console tracing subscriber")?;

    tracing::info!("sd-balancer console logging initialized");
    Ok(())
}

/// Initialize tracing with custom configuration
pub fn init_tracing_with_config(level: &str, json_format: bool, include_spans: bool) -> Result<()> {
    let env_filter =
        EnvFilter::try_new(level).wrap_err_with(|| format!("Invalid log level: {level}"))?;

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    let installed = if json_format {
        Registry::default()
            .with(env_filter)
            .with(
                fmt_layer
                    .json()
                    .with_current_span(include_spans)
                    .with_span_list(include_spans),
            )
            .try_init()
    } else {
        Registry::default()
            .with(env_filter)
            .with(fmt_layer.pretty().with_ansi(true))
            .try_init()
    };
    installed.wrap_err("Failed to install tracing subscriber")?;

    tracing::info!(
        "sd-balancer logging initialized with level: {}, json: {}, spans: {}",
        level,
        json_format,
        include_spans
    );
    Ok(())
}

/// Span around a resolver call for one target
pub fn create_resolve_span(resolver: &str, target: &str) -> tracing::Span {
    tracing::info_span!(
        "resolve",
        resolver.name = resolver,
        resolve.key = target,
        instances = tracing::field::Empty,
    )
}

/// Span around the discovery step of one outgoing request
pub fn create_discovery_span(method: &str, host: &str) -> tracing::Span {
    tracing::info_span!(
        "service_discovery",
        http.method = method,
        http.host = host,
        instance.address = tracing::field::Empty,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_tracing_with_config_rejects_bad_level() {
        let result = init_tracing_with_config("sd_balancer=loudest", true, true);
        assert!(result.is_err());
    }

    #[test]
    fn test_global_subscriber_installs_once() {
        // Only this test installs a global subscriber in this binary.
        assert!(init_tracing().is_ok());
        assert!(init_console_tracing().is_err());
        assert!(init_tracing().is_err());
        assert!(init_tracing_with_config("info", false, false).is_err());
    }

    #[test]
    fn test_create_resolve_span() {
        let span = create_resolve_span("static", "svc");
        if let Some(metadata) = span.metadata() {
            assert_eq!(metadata.name(), "resolve");
        }
    }

    #[test]
    fn test_create_discovery_span() {
        let span = create_discovery_span("GET", "svc");
        if let Some(metadata) = span.metadata() {
            assert_eq!(metadata.name(), "service_discovery");
        }
    }
}
