use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use scc::HashMap;

use crate::{
    config::BalancerKind,
    core::{
        instance::{DiscoveryResult, Instance},
        options::Options,
        weighted::WeightedBalancer,
    },
    metrics::{self, PickOutcome},
    ports::load_balancer::Loadbalancer,
};

/// Name reported by [`RoundRobinBalancer`].
pub const ROUND_ROBIN_NAME: &str = "round_robin";

struct RoundRobinEntry {
    instances: Vec<Instance>,
    counter: AtomicUsize,
}

/// Round-robin balancer: cycles through the positive-weight instances of each
/// cache key in resolver order. Weights only decide eligibility.
pub struct RoundRobinBalancer {
    entries: HashMap<String, Arc<RoundRobinEntry>>,
}

impl Default for RoundRobinBalancer {
    fn default() -> Self {
        Self::new()
    }
}

impl RoundRobinBalancer {
    /// Create a new round-robin balancer
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

impl Loadbalancer for RoundRobinBalancer {
    fn pick(&self, result: &DiscoveryResult) -> Option<Instance> {
        let entry = self
            .entries
            .read_sync(result.cache_key.as_str(), |_, e| e.clone());
        let picked = entry.and_then(|entry| {
            if entry.instances.is_empty() {
                return None;
            }
            let count = entry.counter.fetch_add(1, Ordering::Relaxed);
            Some(entry.instances[count % entry.instances.len()].clone())
        });

        let outcome = if picked.is_some() {
            PickOutcome::Hit
        } else {
            PickOutcome::Miss
        };
        metrics::record_pick(ROUND_ROBIN_NAME, outcome);
        picked
    }

    fn rebalance(&self, result: &DiscoveryResult) {
        let instances: Vec<Instance> = result
            .instances
            .iter()
            .filter(|i| i.is_selectable())
            .cloned()
            .collect();
        tracing::debug!(
            cache_key = %result.cache_key,
            selectable = instances.len(),
            "Rebalanced round-robin entry"
        );
        let entry = Arc::new(RoundRobinEntry {
            instances,
            counter: AtomicUsize::new(0),
        });
        let _ = self.entries.upsert_sync(result.cache_key.clone(), entry);
        metrics::record_rebalance(ROUND_ROBIN_NAME);
    }

    fn delete(&self, cache_key: &str) {
        let _ = self.entries.remove_sync(cache_key);
    }

    fn name(&self) -> &'static str {
        ROUND_ROBIN_NAME
    }
}

/// Factory for creating balancers from configuration
pub struct LoadBalancerFactory;

impl LoadBalancerFactory {
    /// Create a balancer of the configured kind
    pub fn create(kind: BalancerKind, options: Options) -> Arc<dyn Loadbalancer> {
        match kind {
            BalancerKind::WeightRandom => Arc::new(WeightedBalancer::new(options)),
            BalancerKind::RoundRobin => Arc::new(RoundRobinBalancer::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::instance::NETWORK_TCP;

    fn result() -> DiscoveryResult {
        DiscoveryResult::new(
            "svc",
            vec![
                Instance::new(NETWORK_TCP, "server1:80", 10, None),
                Instance::new(NETWORK_TCP, "server2:80", 0, None),
                Instance::new(NETWORK_TCP, "server3:80", 5, None),
            ],
        )
    }

    #[test]
    fn test_round_robin_cycles_selectable() {
        let balancer = RoundRobinBalancer::new();
        let result = result();
        balancer.rebalance(&result);

        let picked: Vec<String> = (0..4)
            .map(|_| balancer.pick(&result).unwrap().address().to_string())
            .collect();
        // server2 has weight 0 and is skipped; wraps around after server3
        assert_eq!(picked, vec!["server1:80", "server3:80", "server1:80", "server3:80"]);
    }

    #[test]
    fn test_round_robin_empty_and_unknown() {
        let balancer = RoundRobinBalancer::new();
        assert!(balancer.pick(&result()).is_none());

        let empty = DiscoveryResult::new("empty", Vec::new());
        balancer.rebalance(&empty);
        assert!(balancer.pick(&empty).is_none());
    }

    #[test]
    fn test_round_robin_delete() {
        let balancer = RoundRobinBalancer::new();
        let result = result();
        balancer.rebalance(&result);
        balancer.delete("svc");
        balancer.delete("svc");
        assert!(balancer.pick(&result).is_none());
    }

    #[test]
    fn test_load_balancer_factory() {
        let weighted = LoadBalancerFactory::create(BalancerKind::WeightRandom, Options::default());
        assert_eq!(weighted.name(), "weight_random");

        let rr = LoadBalancerFactory::create(BalancerKind::RoundRobin, Options::default());
        assert_eq!(rr.name(), "round_robin");

        let result = result();
        rr.rebalance(&result);
        assert!(rr.pick(&result).is_some());
    }
}
