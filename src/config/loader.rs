use std::path::Path;

use config::{Config, Environment, File, FileFormat};
use eyre::{Context, Result};

use crate::config::models::DiscoveryConfig;

/// Prefix of environment variables that override file settings,
/// e.g. `SD_BALANCER__REFRESH_INTERVAL=10s`.
pub const ENV_PREFIX: &str = "SD_BALANCER";

/// Load and validate configuration from a file using the config crate.
/// Supports multiple formats: YAML, JSON, TOML, etc.
pub async fn load_config(config_path: &str) -> Result<DiscoveryConfig> {
    let config = load_config_sync(config_path)?;
    config
        .validate()
        .with_context(|| format!("Invalid discovery configuration in {config_path}"))?;
    Ok(config)
}

/// Load configuration synchronously, without validation
pub fn load_config_sync(config_path: &str) -> Result<DiscoveryConfig> {
    let config_path = Path::new(config_path);

    // Determine file format based on extension
    let format = match config_path.extension().and_then(|ext| ext.to_str()) {
        Some("yaml") | Some("yml") => FileFormat::Yaml,
        Some("json") => FileFormat::Json,
        Some("toml") => FileFormat::Toml,
        Some("ini") => FileFormat::Ini,
        _ => FileFormat::Yaml, // Default to YAML
    };

    let settings = Config::builder()
        .add_source(File::new(
            config_path
                .to_str()
                .ok_or_else(|| eyre::eyre!("Invalid UTF-8 path: {}", config_path.display()))?,
            format,
        ))
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("customized_addrs")
                .try_parsing(true),
        )
        .build()
        .with_context(|| format!("Failed to build config from {}", config_path.display()))?;

    let discovery_config: DiscoveryConfig = settings.try_deserialize().with_context(|| {
        format!(
            "Failed to deserialize config from {}",
            config_path.display()
        )
    })?;

    tracing::debug!(
        "Loaded discovery configuration from {}: balancer={:?}, refresh={}, expire={}",
        config_path.display(),
        discovery_config.balancer,
        discovery_config.refresh_interval,
        discovery_config.expire_interval
    );

    Ok(discovery_config)
}
