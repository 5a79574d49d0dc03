use async_trait::async_trait;
use thiserror::Error;

use crate::core::instance::{DiscoveryResult, TargetInfo};

/// Type-erased error, the same shape `tower` services report.
pub type BoxError = tower::BoxError;

/// Errors produced by the discovery layer itself. Resolver errors are not
/// wrapped in this type; they pass through unchanged.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum DiscoveryError {
    /// The balancer had nothing to offer for the resolved target
    #[error("no instance available for target '{target}' (cache key '{cache_key}')")]
    NoInstance { target: String, cache_key: String },

    /// A customized address could not be parsed
    #[error("invalid address '{0}'")]
    InvalidAddress(String),

    /// A customized address used a scheme other than tcp:// or unix://
    #[error("invalid scheme '{scheme}' in address '{address}'")]
    InvalidScheme { scheme: String, address: String },

    /// A static resolver was built from an empty address list
    #[error("at least one address is required")]
    NoAddresses,

    /// The request carried no host to resolve
    #[error("request has no target host")]
    MissingHost,

    /// The picked address could not be written back into the request
    #[error("cannot route request to '{address}': {reason}")]
    InvalidTarget { address: String, reason: String },
}

/// Resolver defines the port (interface) for turning a logical service name
/// into a set of weighted instances.
#[async_trait]
pub trait Resolver: Send + Sync + 'static {
    /// Derive the resolution key from a request's target information.
    fn target(&self, target: &TargetInfo) -> String;

    /// Resolve a key into a fresh snapshot of instances.
    async fn resolve(&self, key: &str) -> Result<DiscoveryResult, BoxError>;

    /// Name used in logs and to tell resolvers apart.
    fn name(&self) -> String;
}
