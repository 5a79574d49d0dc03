//! Lightweight metrics helpers for the balancers and the discovery layer.
//!
//! Thin wrappers around the `metrics` crate macros. No exporter is installed
//! here; the embedding application decides where the numbers go.
//!
//! Provided metrics:
//! * `sd_balancer_picks_total` (counter, labels: balancer, outcome)
//! * `sd_balancer_rebalances_total` (counter, labels: balancer)
//! * `sd_balancer_evictions_total` (counter, labels: source)
//! * `sd_balancer_cached_entries` (gauge, labels: balancer)
//! * `sd_balancer_resolve_failures_total` (counter, labels: resolver, phase)
use metrics::{Unit, counter, describe_counter, describe_gauge, gauge};
use once_cell::sync::Lazy;

pub const SD_BALANCER_PICKS_TOTAL: &str = "sd_balancer_picks_total";
pub const SD_BALANCER_REBALANCES_TOTAL: &str = "sd_balancer_rebalances_total";
pub const SD_BALANCER_EVICTIONS_TOTAL: &str = "sd_balancer_evictions_total";
pub const SD_BALANCER_CACHED_ENTRIES: &str = "sd_balancer_cached_entries";
pub const SD_BALANCER_RESOLVE_FAILURES_TOTAL: &str = "sd_balancer_resolve_failures_total";

static DESCRIPTIONS: Lazy<()> = Lazy::new(|| {
    describe_counter!(
        SD_BALANCER_PICKS_TOTAL,
        Unit::Count,
        "Instance picks, labelled hit or miss."
    );
    describe_counter!(
        SD_BALANCER_REBALANCES_TOTAL,
        Unit::Count,
        "Full rebuilds of a cache key's selection state."
    );
    describe_counter!(
        SD_BALANCER_EVICTIONS_TOTAL,
        Unit::Count,
        "Cache entries dropped after going unused past their expiry."
    );
    describe_gauge!(
        SD_BALANCER_CACHED_ENTRIES,
        "Cache keys currently holding selection state."
    );
    describe_counter!(
        SD_BALANCER_RESOLVE_FAILURES_TOTAL,
        Unit::Count,
        "Resolver calls that returned an error."
    );
});

/// Outcome label of a pick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PickOutcome {
    Hit,
    Miss,
}

impl PickOutcome {
    fn as_str(self) -> &'static str {
        match self {
            PickOutcome::Hit => "hit",
            PickOutcome::Miss => "miss",
        }
    }
}

pub fn record_pick(balancer: &'static str, outcome: PickOutcome) {
    counter!(SD_BALANCER_PICKS_TOTAL, "balancer" => balancer, "outcome" => outcome.as_str())
        .increment(1);
}

pub fn record_rebalance(balancer: &'static str) {
    counter!(SD_BALANCER_REBALANCES_TOTAL, "balancer" => balancer).increment(1);
}

pub fn record_evictions(source: &'static str, count: usize) {
    if count > 0 {
        counter!(SD_BALANCER_EVICTIONS_TOTAL, "source" => source).increment(count as u64);
    }
}

pub fn set_cached_entries(balancer: &'static str, count: usize) {
    gauge!(SD_BALANCER_CACHED_ENTRIES, "balancer" => balancer).set(count as f64);
}

pub fn record_resolve_failure(resolver: &str, phase: &'static str) {
    counter!(
        SD_BALANCER_RESOLVE_FAILURES_TOTAL,
        "resolver" => resolver.to_string(),
        "phase" => phase
    )
    .increment(1);
}

/// Register metric descriptions (idempotent).
pub fn init_metrics() -> eyre::Result<()> {
    tracing::info!("Initializing sd-balancer metrics");
    Lazy::force(&DESCRIPTIONS);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_metrics_is_idempotent() {
        assert!(init_metrics().is_ok());
        assert!(init_metrics().is_ok());
    }

    #[test]
    fn test_recorders_without_exporter() {
        // No recorder installed: every call is a no-op and must not panic.
        record_pick("weight_random", PickOutcome::Hit);
        record_pick("weight_random", PickOutcome::Miss);
        record_rebalance("weight_random");
        record_evictions("reaper", 0);
        record_evictions("reaper", 3);
        set_cached_entries("weight_random", 2);
        record_resolve_failure("static", "refresh");
    }

    #[test]
    fn test_outcome_labels() {
        assert_eq!(PickOutcome::Hit.as_str(), "hit");
        assert_eq!(PickOutcome::Miss.as_str(), "miss");
    }
}
