use crate::core::instance::{DiscoveryResult, Instance};

/// Loadbalancer defines the port (interface) every balancing strategy implements.
///
/// Implementations keep their own per-cache-key state. Callers must
/// [`rebalance`](Loadbalancer::rebalance) a result before picking from it; a
/// pick against an unknown key yields `None` rather than building state on the
/// read path.
pub trait Loadbalancer: Send + Sync + 'static {
    /// Select one instance for the given resolution, or `None` if nothing is
    /// selectable (unknown key, empty set, no positive weights).
    fn pick(&self, result: &DiscoveryResult) -> Option<Instance>;

    /// Rebuild the selection state for `result.cache_key` from scratch.
    fn rebalance(&self, result: &DiscoveryResult);

    /// Forget the selection state for a cache key. Idempotent.
    fn delete(&self, cache_key: &str);

    /// Stable identifier of the strategy.
    fn name(&self) -> &'static str;
}
