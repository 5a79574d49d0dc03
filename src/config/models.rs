//! Configuration data structures for the discovery layer.
//!
//! These types map directly to YAML / JSON / TOML files. Intervals are
//! humantime strings ("5s", "1m 30s") so files stay readable; they become
//! [`Options`] through [`DiscoveryConfig::lb_options`].
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{
    config::validation::{DiscoveryConfigValidator, ValidationError, ValidationResult},
    core::options::{DEFAULT_EXPIRE_INTERVAL, DEFAULT_REFRESH_INTERVAL, Options},
};

fn default_refresh_interval() -> String {
    humantime::format_duration(DEFAULT_REFRESH_INTERVAL).to_string()
}

fn default_expire_interval() -> String {
    humantime::format_duration(DEFAULT_EXPIRE_INTERVAL).to_string()
}

/// Balancing strategy selectable from configuration
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum BalancerKind {
    /// Weighted random pick (prefix sums + binary search)
    #[default]
    WeightRandom,
    /// Cycle through positive-weight instances
    RoundRobin,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct DiscoveryConfig {
    #[serde(default)]
    pub balancer: BalancerKind,
    /// How often cached resolutions are refreshed and expired balancer
    /// entries reaped
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval: String,
    /// How long unused balancer state is kept
    #[serde(default = "default_expire_interval")]
    pub expire_interval: String,
    /// Fixed addresses that replace the resolver when non-empty
    #[serde(default)]
    pub customized_addrs: Vec<String>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            balancer: BalancerKind::default(),
            refresh_interval: default_refresh_interval(),
            expire_interval: default_expire_interval(),
            customized_addrs: Vec::new(),
        }
    }
}

impl DiscoveryConfig {
    /// Create a new configuration builder
    pub fn builder() -> DiscoveryConfigBuilder {
        DiscoveryConfigBuilder::default()
    }

    /// Check the whole section, reporting every problem at once.
    pub fn validate(&self) -> ValidationResult<()> {
        DiscoveryConfigValidator::validate(self)
    }

    /// Normalized balancer options.
    pub fn lb_options(&self) -> ValidationResult<Options> {
        let refresh = parse_interval("refresh_interval", &self.refresh_interval)?;
        let expire = parse_interval("expire_interval", &self.expire_interval)?;
        Ok(Options::new(refresh, expire).checked())
    }
}

/// Parse a humantime interval. A leading `-` marks a non-positive interval,
/// which maps to zero and is later replaced by the default.
pub fn parse_interval(field: &str, value: &str) -> ValidationResult<Duration> {
    let trimmed = value.trim();
    if trimmed.is_empty() || trimmed.starts_with('-') {
        return Ok(Duration::ZERO);
    }
    humantime::parse_duration(trimmed).map_err(|e| ValidationError::InvalidField {
        field: field.to_string(),
        message: format!("invalid duration '{value}': {e}"),
    })
}

/// Builder for DiscoveryConfig
#[derive(Default)]
pub struct DiscoveryConfigBuilder {
    config: DiscoveryConfig,
}

impl DiscoveryConfigBuilder {
    pub fn balancer(mut self, kind: BalancerKind) -> Self {
        self.config.balancer = kind;
        self
    }

    pub fn refresh_interval(mut self, interval: Duration) -> Self {
        self.config.refresh_interval = humantime::format_duration(interval).to_string();
        self
    }

    pub fn expire_interval(mut self, interval: Duration) -> Self {
        self.config.expire_interval = humantime::format_duration(interval).to_string();
        self
    }

    pub fn customized_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.customized_addrs.push(addr.into());
        self
    }

    pub fn build(self) -> DiscoveryConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_yields_default_options() {
        let config = DiscoveryConfig::default();
        assert_eq!(config.balancer, BalancerKind::WeightRandom);
        assert_eq!(config.lb_options().unwrap(), Options::default());
    }

    #[test]
    fn test_non_positive_intervals_are_defaulted() {
        let config = DiscoveryConfig {
            refresh_interval: "-1s".to_string(),
            expire_interval: "30s".to_string(),
            ..Default::default()
        };
        let opts = config.lb_options().unwrap();
        assert_eq!(opts.refresh_interval, DEFAULT_REFRESH_INTERVAL);
        assert_eq!(opts.expire_interval, Duration::from_secs(30));

        let config = DiscoveryConfig {
            refresh_interval: "0s".to_string(),
            expire_interval: String::new(),
            ..Default::default()
        };
        assert_eq!(config.lb_options().unwrap(), Options::default());
    }

    #[test]
    fn test_invalid_interval() {
        let config = DiscoveryConfig {
            refresh_interval: "soon".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            config.lb_options(),
            Err(ValidationError::InvalidField { ref field, .. }) if field == "refresh_interval"
        ));
    }

    #[test]
    fn test_builder() {
        let config = DiscoveryConfig::builder()
            .balancer(BalancerKind::RoundRobin)
            .refresh_interval(Duration::from_secs(60))
            .expire_interval(Duration::from_secs(300))
            .customized_addr("127.0.0.1:8080")
            .build();

        assert_eq!(config.balancer, BalancerKind::RoundRobin);
        assert_eq!(config.customized_addrs, vec!["127.0.0.1:8080".to_string()]);
        let opts = config.lb_options().unwrap();
        assert_eq!(opts.refresh_interval, Duration::from_secs(60));
        assert_eq!(opts.expire_interval, Duration::from_secs(300));
    }
}
