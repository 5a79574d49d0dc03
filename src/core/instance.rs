use std::{collections::HashMap, fmt, sync::Arc};

/// Weight assigned to instances that are created from bare addresses.
pub const DEFAULT_WEIGHT: i32 = 10;

/// Network name for TCP endpoints.
pub const NETWORK_TCP: &str = "tcp";
/// Network name for Unix domain socket endpoints.
pub const NETWORK_UNIX: &str = "unix";

#[derive(Debug)]
struct InstanceInner {
    network: String,
    address: String,
    weight: i32,
    tags: HashMap<String, String>,
}

/// A single weighted, addressable backend endpoint.
///
/// Instances are immutable once built. Cloning is cheap (the data is shared),
/// so the same endpoint can sit in a resolver snapshot and in any number of
/// balancer tables at once. A weight of zero or below marks the instance as
/// never selectable; it is kept in the list but filtered out when picking.
#[derive(Clone)]
pub struct Instance {
    inner: Arc<InstanceInner>,
}

impl Instance {
    /// Create a new instance.
    ///
    /// # Arguments
    /// * `network` - Transport name, usually [`NETWORK_TCP`] or [`NETWORK_UNIX`]
    /// * `address` - `host:port` for TCP, a socket path for Unix
    /// * `weight` - Relative selection weight
    /// * `tags` - Free-form metadata attached by the resolver
    pub fn new(
        network: impl Into<String>,
        address: impl Into<String>,
        weight: i32,
        tags: Option<HashMap<String, String>>,
    ) -> Self {
        Self {
            inner: Arc::new(InstanceInner {
                network: network.into(),
                address: address.into(),
                weight,
                tags: tags.unwrap_or_default(),
            }),
        }
    }

    pub fn network(&self) -> &str {
        &self.inner.network
    }

    pub fn address(&self) -> &str {
        &self.inner.address
    }

    pub fn weight(&self) -> i32 {
        self.inner.weight
    }

    /// Look up a single tag value.
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.inner.tags.get(key).map(String::as_str)
    }

    pub fn tags(&self) -> &HashMap<String, String> {
        &self.inner.tags
    }

    /// Whether the instance may be returned by a weighted pick.
    pub fn is_selectable(&self) -> bool {
        self.inner.weight > 0
    }

    /// Reference identity: true when both handles point at the same instance.
    pub fn ptr_eq(&self, other: &Instance) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("network", &self.inner.network)
            .field("address", &self.inner.address)
            .field("weight", &self.inner.weight)
            .field("tags", &self.inner.tags)
            .finish()
    }
}

impl fmt::Display for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.inner.network, self.inner.address)
    }
}

/// Output of a resolver: the cache key the instances are grouped under plus
/// an ordered snapshot of the instances themselves.
#[derive(Debug, Clone, Default)]
pub struct DiscoveryResult {
    pub cache_key: String,
    pub instances: Vec<Instance>,
}

impl DiscoveryResult {
    pub fn new(cache_key: impl Into<String>, instances: Vec<Instance>) -> Self {
        Self {
            cache_key: cache_key.into(),
            instances,
        }
    }
}

/// Request-side information a resolver uses to derive its resolution key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TargetInfo {
    pub host: String,
    pub tags: HashMap<String, String>,
}

impl TargetInfo {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            tags: HashMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instance_accessors() {
        let mut tags = HashMap::new();
        tags.insert("zone".to_string(), "eu-west-1a".to_string());
        let ins = Instance::new(NETWORK_TCP, "127.0.0.1:8888", 20, Some(tags));

        assert_eq!(ins.network(), "tcp");
        assert_eq!(ins.address(), "127.0.0.1:8888");
        assert_eq!(ins.weight(), 20);
        assert_eq!(ins.tag("zone"), Some("eu-west-1a"));
        assert_eq!(ins.tag("missing"), None);
        assert!(ins.is_selectable());
    }

    #[test]
    fn test_non_positive_weight_not_selectable() {
        assert!(!Instance::new(NETWORK_TCP, "127.0.0.1:1", 0, None).is_selectable());
        assert!(!Instance::new(NETWORK_TCP, "127.0.0.1:1", -5, None).is_selectable());
    }

    #[test]
    fn test_clone_shares_identity() {
        let a = Instance::new(NETWORK_TCP, "127.0.0.1:8888", 10, None);
        let b = a.clone();
        let c = Instance::new(NETWORK_TCP, "127.0.0.1:8888", 10, None);

        assert!(a.ptr_eq(&b));
        assert!(!a.ptr_eq(&c));
    }

    #[test]
    fn test_display() {
        let ins = Instance::new(NETWORK_UNIX, "/tmp/sock", 10, None);
        assert_eq!(ins.to_string(), "unix:///tmp/sock");
    }
}
