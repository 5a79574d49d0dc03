use std::{net::SocketAddr, path::Path};

use async_trait::async_trait;

use crate::{
    core::instance::{
        DEFAULT_WEIGHT, DiscoveryResult, Instance, NETWORK_TCP, NETWORK_UNIX, TargetInfo,
    },
    ports::resolver::{BoxError, DiscoveryError, Resolver},
};

/// Cache key shared by every request routed through a [`StaticResolver`].
pub const FIXED_CACHE_KEY: &str = "fixed";

const LOCAL_HOST: &str = "127.0.0.1";

/// Resolver over a fixed list of addresses.
///
/// Accepted forms: `host:port`, `:port` (local host), `tcp://host:port`,
/// `/abs/socket/path` and `unix:///abs/socket/path`. Every instance gets
/// [`DEFAULT_WEIGHT`]. All targets resolve to the same list under
/// [`FIXED_CACHE_KEY`].
#[derive(Debug, Clone)]
pub struct StaticResolver {
    targets: String,
    result: DiscoveryResult,
}

impl StaticResolver {
    pub fn new<I, S>(addrs: I) -> Result<Self, DiscoveryError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut raw = Vec::new();
        let mut instances = Vec::new();
        for addr in addrs {
            let addr = addr.as_ref();
            instances.push(parse_address(addr)?);
            raw.push(addr.to_string());
        }

        if instances.is_empty() {
            return Err(DiscoveryError::NoAddresses);
        }

        let targets = raw.join(",");
        tracing::debug!("Static resolver configured with targets: {}", targets);

        Ok(Self {
            targets,
            result: DiscoveryResult::new(FIXED_CACHE_KEY, instances),
        })
    }

    pub fn instances(&self) -> &[Instance] {
        &self.result.instances
    }
}

/// Turn one configured address into an instance.
pub fn parse_address(raw: &str) -> Result<Instance, DiscoveryError> {
    let (scheme, addr) = match raw.split_once("://") {
        Some((scheme, rest)) => {
            if scheme != NETWORK_TCP && scheme != NETWORK_UNIX {
                return Err(DiscoveryError::InvalidScheme {
                    scheme: scheme.to_string(),
                    address: raw.to_string(),
                });
            }
            (Some(scheme), rest)
        }
        None => (None, raw),
    };

    if scheme != Some(NETWORK_UNIX) && is_tcp_address(addr) {
        // An empty host dials the local system.
        if addr.starts_with(':') {
            let local = format!("{LOCAL_HOST}{addr}");
            return Ok(Instance::new(NETWORK_TCP, local, DEFAULT_WEIGHT, None));
        }
        return Ok(Instance::new(NETWORK_TCP, addr, DEFAULT_WEIGHT, None));
    }
    if scheme != Some(NETWORK_TCP) && Path::new(addr).is_absolute() {
        return Ok(Instance::new(NETWORK_UNIX, addr, DEFAULT_WEIGHT, None));
    }

    Err(DiscoveryError::InvalidAddress(raw.to_string()))
}

fn is_tcp_address(addr: &str) -> bool {
    if addr.parse::<SocketAddr>().is_ok() {
        return true;
    }
    match addr.rsplit_once(':') {
        Some((host, port)) => {
            !host.contains(['/', ' ', '[', ']']) && port.parse::<u16>().is_ok()
        }
        None => false,
    }
}

#[async_trait]
impl Resolver for StaticResolver {
    fn target(&self, _target: &TargetInfo) -> String {
        self.targets.clone()
    }

    async fn resolve(&self, _key: &str) -> Result<DiscoveryResult, BoxError> {
        Ok(self.result.clone())
    }

    fn name(&self) -> String {
        self.targets.clone()
    }
}
