//! Weighted random load balancer.
//!
//! `WeightedBalancer` keeps one [`WeightedCacheEntry`] per cache key in an
//! `scc::HashMap`. Rebalancing builds a complete entry off to the side and
//! swaps the `Arc` into the map, so a concurrent pick sees either the old or
//! the new table and never a half-built one. Picks clone the `Arc` out of the
//! map (a short bucket-level read) and do the random draw without holding any
//! lock.
//!
//! Entries that are not picked for `expire_interval` are evicted by a
//! background reaper that wakes every `refresh_interval`. The reaper is a
//! tokio task tied to the balancer: it stops on [`WeightedBalancer::shutdown`]
//! or when the balancer is dropped.
use std::{
    sync::{Arc, Weak},
    time::{Duration, Instant},
};

use scc::HashMap;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::{
    core::{
        instance::{DiscoveryResult, Instance},
        options::Options,
        weighted_entry::WeightedCacheEntry,
    },
    metrics::{self, PickOutcome},
    ports::load_balancer::Loadbalancer,
};

/// Name reported by [`WeightedBalancer`].
pub const WEIGHT_RANDOM_NAME: &str = "weight_random";

struct Inner {
    entries: HashMap<String, Arc<WeightedCacheEntry>>,
    options: Options,
    epoch: Instant,
}

impl Inner {
    /// Nanoseconds elapsed on this balancer's monotonic clock.
    fn now(&self) -> u64 {
        nanos(self.epoch.elapsed())
    }

    fn deadline(&self, now: u64) -> u64 {
        now.saturating_add(nanos(self.options.expire_interval))
    }

    fn sweep(&self, now: u64) -> usize {
        let mut evicted = 0;
        self.entries.retain_sync(|key, entry| {
            if entry.is_expired(now) {
                tracing::debug!(cache_key = %key, "Evicting expired balancer entry");
                evicted += 1;
                false
            } else {
                true
            }
        });
        metrics::record_evictions("reaper", evicted);
        metrics::set_cached_entries(WEIGHT_RANDOM_NAME, self.entries.len());
        evicted
    }
}

fn nanos(d: Duration) -> u64 {
    u64::try_from(d.as_nanos()).unwrap_or(u64::MAX)
}

/// Weighted random balancer with lazily reaped per-key state.
pub struct WeightedBalancer {
    inner: Arc<Inner>,
    reaper: CancellationToken,
}

impl WeightedBalancer {
    /// Create a balancer. Options are normalized first.
    ///
    /// When called inside a tokio runtime the eviction reaper is started
    /// right away. Outside a runtime no task is spawned and expired entries
    /// are only dropped by explicit [`sweep_expired`](Self::sweep_expired)
    /// calls.
    pub fn new(options: Options) -> Self {
        let options = options.checked();
        let inner = Arc::new(Inner {
            entries: HashMap::new(),
            options,
            epoch: Instant::now(),
        });
        let reaper = CancellationToken::new();

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(run_reaper(
                    Arc::downgrade(&inner),
                    reaper.clone(),
                    options.refresh_interval,
                ));
            }
            Err(_) => {
                tracing::warn!(
                    "No tokio runtime available, weighted balancer reaper not started; expired entries are only evicted by sweep_expired"
                );
            }
        }

        Self { inner, reaper }
    }

    pub fn options(&self) -> &Options {
        &self.inner.options
    }

    /// Number of cache keys currently holding selection state.
    pub fn len(&self) -> usize {
        self.inner.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.entries.is_empty()
    }

    /// Whether selection state exists for the key (possibly with no
    /// selectable instance).
    pub fn contains(&self, cache_key: &str) -> bool {
        self.inner.entries.read_sync(cache_key, |_, _| ()).is_some()
    }

    /// Shared handle to the current entry of a key.
    pub fn entry(&self, cache_key: &str) -> Option<Arc<WeightedCacheEntry>> {
        self.inner
            .entries
            .read_sync(cache_key, |_, entry| entry.clone())
    }

    /// Run one eviction sweep now; returns how many entries were dropped.
    pub fn sweep_expired(&self) -> usize {
        self.inner.sweep(self.inner.now())
    }

    #[cfg(test)]
    fn sweep_after(&self, elapsed: Duration) -> usize {
        self.inner.sweep(self.inner.now().saturating_add(nanos(elapsed)))
    }

    /// Stop the background reaper. Safe to call more than once.
    pub fn shutdown(&self) {
        if !self.reaper.is_cancelled() {
            tracing::debug!("Stopping weighted balancer reaper");
            self.reaper.cancel();
        }
    }
}

impl Default for WeightedBalancer {
    fn default() -> Self {
        Self::new(Options::default())
    }
}

impl Drop for WeightedBalancer {
    fn drop(&mut self) {
        self.reaper.cancel();
    }
}

impl Loadbalancer for WeightedBalancer {
    fn pick(&self, result: &DiscoveryResult) -> Option<Instance> {
        let Some(entry) = self.entry(&result.cache_key) else {
            tracing::trace!(cache_key = %result.cache_key, "Pick on unknown cache key");
            metrics::record_pick(WEIGHT_RANDOM_NAME, PickOutcome::Miss);
            return None;
        };

        match entry.pick(&mut rand::rng()) {
            Some(instance) => {
                entry.touch(self.inner.deadline(self.inner.now()));
                metrics::record_pick(WEIGHT_RANDOM_NAME, PickOutcome::Hit);
                Some(instance)
            }
            None => {
                metrics::record_pick(WEIGHT_RANDOM_NAME, PickOutcome::Miss);
                None
            }
        }
    }

    fn rebalance(&self, result: &DiscoveryResult) {
        let entry = WeightedCacheEntry::build(result, self.inner.deadline(self.inner.now()));
        tracing::debug!(
            cache_key = %result.cache_key,
            instances = result.instances.len(),
            selectable = entry.ranges().len(),
            weight_sum = entry.weight_sum(),
            "Rebalanced weighted entry"
        );

        let _ = self
            .inner
            .entries
            .upsert_sync(result.cache_key.clone(), Arc::new(entry));

        metrics::record_rebalance(WEIGHT_RANDOM_NAME);
        metrics::set_cached_entries(WEIGHT_RANDOM_NAME, self.inner.entries.len());
    }

    fn delete(&self, cache_key: &str) {
        if self.inner.entries.remove_sync(cache_key).is_some() {
            tracing::debug!(cache_key = %cache_key, "Deleted weighted entry");
            metrics::set_cached_entries(WEIGHT_RANDOM_NAME, self.inner.entries.len());
        }
    }

    fn name(&self) -> &'static str {
        WEIGHT_RANDOM_NAME
    }
}

async fn run_reaper(inner: Weak<Inner>, token: CancellationToken, period: Duration) {
    tracing::info!(
        "Weighted balancer reaper started with interval: {:?}",
        period
    );

    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = ticker.tick() => {
                let Some(inner) = inner.upgrade() else { break };
                let evicted = inner.sweep(inner.now());
                if evicted > 0 {
                    tracing::debug!("Reaper evicted {} expired entries", evicted);
                }
            }
        }
    }

    tracing::info!("Weighted balancer reaper stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::instance::NETWORK_TCP;

    fn ins(addr: &str, weight: i32) -> Instance {
        Instance::new(NETWORK_TCP, addr, weight, None)
    }

    fn opts(refresh_ms: u64, expire_ms: u64) -> Options {
        Options::new(
            Duration::from_millis(refresh_ms),
            Duration::from_millis(expire_ms),
        )
    }

    #[test]
    fn test_pick_without_rebalance() {
        let balancer = WeightedBalancer::default();
        assert!(balancer.pick(&DiscoveryResult::default()).is_none());

        let never_seen = DiscoveryResult::new("non_existent", vec![ins("127.0.0.1:8884", 10)]);
        assert!(balancer.pick(&never_seen).is_none());
        assert!(!balancer.contains("non_existent"));
    }

    #[test]
    fn test_empty_result_is_known_but_unpickable() {
        let balancer = WeightedBalancer::default();
        let empty = DiscoveryResult::new("a", Vec::new());
        balancer.rebalance(&empty);

        assert!(balancer.contains("a"));
        assert!(balancer.pick(&empty).is_none());
        assert!(balancer.pick(&empty).is_none());
    }

    #[test]
    fn test_single_instance() {
        let balancer = WeightedBalancer::default();
        let result = DiscoveryResult::new("b", vec![ins("127.0.0.1:8888", 20)]);
        balancer.rebalance(&result);

        for _ in 0..100 {
            assert_eq!(balancer.pick(&result).unwrap().weight(), 20);
        }
    }

    #[test]
    fn test_negative_weight_excluded() {
        let balancer = WeightedBalancer::default();
        let result = DiscoveryResult::new(
            "d",
            vec![ins("127.0.0.1:8881", 10), ins("127.0.0.1:8882", -10)],
        );
        balancer.rebalance(&result);

        for _ in 0..1000 {
            assert_eq!(balancer.pick(&result).unwrap().weight(), 10);
        }
    }

    #[test]
    fn test_delete_and_name() {
        let balancer = WeightedBalancer::default();
        assert_eq!(balancer.name(), "weight_random");

        let result = DiscoveryResult::new("test_delete", vec![ins("127.0.0.1:8881", 10)]);
        balancer.rebalance(&result);
        assert_eq!(balancer.pick(&result).unwrap().address(), "127.0.0.1:8881");

        balancer.delete("test_delete");
        assert!(balancer.pick(&result).is_none());

        // idempotent
        balancer.delete("test_delete");
        balancer.delete("never_existed");
        assert!(balancer.is_empty());
        assert_eq!(balancer.name(), "weight_random");
    }

    #[test]
    fn test_rebalance_replaces_entry() {
        let balancer = WeightedBalancer::default();
        let before = DiscoveryResult::new("svc", vec![ins("127.0.0.1:1", 10)]);
        balancer.rebalance(&before);
        let old = balancer.entry("svc").unwrap();

        let after = DiscoveryResult::new("svc", vec![ins("127.0.0.1:2", 10)]);
        balancer.rebalance(&after);

        // The old table is untouched and still usable by whoever holds it.
        assert_eq!(old.ranges()[0].instance.address(), "127.0.0.1:1");
        for _ in 0..50 {
            assert_eq!(balancer.pick(&before).unwrap().address(), "127.0.0.1:2");
        }
        assert_eq!(balancer.len(), 1);
    }

    #[test]
    fn test_rebalance_leaves_other_keys() {
        let balancer = WeightedBalancer::default();
        let a = DiscoveryResult::new("a", vec![ins("127.0.0.1:1", 10)]);
        let b = DiscoveryResult::new("b", vec![ins("127.0.0.1:2", 10)]);
        balancer.rebalance(&a);
        let deadline = balancer.entry("a").unwrap().expire_at();

        balancer.rebalance(&b);
        assert_eq!(balancer.entry("a").unwrap().expire_at(), deadline);
        assert_eq!(balancer.len(), 2);
    }

    #[test]
    fn test_options_are_normalized() {
        let balancer = WeightedBalancer::new(Options::new(Duration::ZERO, Duration::ZERO));
        assert_eq!(*balancer.options(), Options::default());
    }

    #[test]
    fn test_sweep_evicts_unpicked_entries() {
        let balancer = WeightedBalancer::new(opts(10, 1_000));
        let hot = DiscoveryResult::new("hot", vec![ins("127.0.0.1:1", 10)]);
        let cold = DiscoveryResult::new("cold", vec![ins("127.0.0.1:2", 10)]);
        balancer.rebalance(&hot);
        balancer.rebalance(&cold);

        assert_eq!(balancer.sweep_expired(), 0);
        assert_eq!(balancer.sweep_after(Duration::from_secs(2)), 2);
        assert!(balancer.is_empty());
    }

    #[test]
    fn test_pick_keeps_entry_alive() {
        let balancer = WeightedBalancer::new(opts(10, 1_000));
        let hot = DiscoveryResult::new("hot", vec![ins("127.0.0.1:1", 10)]);
        balancer.rebalance(&hot);
        let first_deadline = balancer.entry("hot").unwrap().expire_at();

        std::thread::sleep(Duration::from_millis(5));
        assert!(balancer.pick(&hot).is_some());
        assert!(balancer.entry("hot").unwrap().expire_at() > first_deadline);
    }

    #[tokio::test]
    async fn test_reaper_evicts_in_background() {
        let balancer = WeightedBalancer::new(opts(10, 30));
        let result = DiscoveryResult::new("svc", vec![ins("127.0.0.1:1", 10)]);
        balancer.rebalance(&result);
        assert!(balancer.contains("svc"));

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(!balancer.contains("svc"));
        assert!(balancer.pick(&result).is_none());
    }

    #[tokio::test]
    async fn test_shutdown_stops_reaper() {
        let balancer = WeightedBalancer::new(opts(10, 30));
        balancer.shutdown();
        balancer.shutdown();

        let result = DiscoveryResult::new("svc", vec![ins("127.0.0.1:1", 10)]);
        balancer.rebalance(&result);
        tokio::time::sleep(Duration::from_millis(150)).await;

        // Nothing reaps any more; a manual sweep still works.
        assert!(balancer.contains("svc"));
        assert_eq!(balancer.sweep_expired(), 1);
    }
}
