//! Precomputed weighted-pick table for one cache key.
//!
//! A [`WeightedCacheEntry`] is built once per rebalance in O(n) and answers
//! picks in O(log n) by binary searching a prefix-sum table. The table never
//! changes after construction; only the expiry deadline moves, and that is an
//! atomic so the entry can be shared behind an `Arc` without locking.
use std::sync::atomic::{AtomicU64, Ordering};

use rand::Rng;

use crate::core::instance::{DiscoveryResult, Instance};

/// `[start, end)` slice of the cumulative weight line owned by one instance.
#[derive(Debug, Clone)]
pub struct WeightRange {
    pub start: i64,
    pub end: i64,
    pub instance: Instance,
}

/// Selection state for a single cache key.
#[derive(Debug)]
pub struct WeightedCacheEntry {
    instances: Vec<Instance>,
    weight_sum: i64,
    ranges: Vec<WeightRange>,
    /// Deadline in nanoseconds on the owning balancer's clock.
    expire_at: AtomicU64,
}

impl WeightedCacheEntry {
    /// Build the prefix-sum table from a resolution.
    ///
    /// Instances with a weight of zero or below are skipped, the rest keep
    /// their original relative order.
    pub fn build(result: &DiscoveryResult, expire_at: u64) -> Self {
        let mut ranges = Vec::with_capacity(result.instances.len());
        let mut weight_sum: i64 = 0;

        for instance in result.instances.iter().filter(|i| i.is_selectable()) {
            let start = weight_sum;
            weight_sum += i64::from(instance.weight());
            ranges.push(WeightRange {
                start,
                end: weight_sum,
                instance: instance.clone(),
            });
        }

        Self {
            instances: result.instances.clone(),
            weight_sum,
            ranges,
            expire_at: AtomicU64::new(expire_at),
        }
    }

    /// Draw one instance with probability proportional to its weight.
    pub fn pick<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<Instance> {
        if self.ranges.is_empty() {
            return None;
        }
        let point = rng.random_range(0..self.weight_sum);
        // ranges[0].start == 0 <= point, so the partition point is at least 1
        let idx = self.ranges.partition_point(|r| r.start <= point) - 1;
        Some(self.ranges[idx].instance.clone())
    }

    /// Push the expiry deadline forward.
    pub fn touch(&self, expire_at: u64) {
        self.expire_at.store(expire_at, Ordering::Release);
    }

    pub fn expire_at(&self) -> u64 {
        self.expire_at.load(Ordering::Acquire)
    }

    pub fn is_expired(&self, now: u64) -> bool {
        now > self.expire_at()
    }

    /// Every instance from the last rebalance, selectable or not.
    pub fn instances(&self) -> &[Instance] {
        &self.instances
    }

    pub fn ranges(&self) -> &[WeightRange] {
        &self.ranges
    }

    pub fn weight_sum(&self) -> i64 {
        self.weight_sum
    }

    /// True when no instance can be picked.
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;
    use crate::core::instance::NETWORK_TCP;

    fn result_of(weights: &[i32]) -> DiscoveryResult {
        let instances = weights
            .iter()
            .enumerate()
            .map(|(i, w)| Instance::new(NETWORK_TCP, format!("10.0.0.{i}:80"), *w, None))
            .collect();
        DiscoveryResult::new("svc", instances)
    }

    #[test]
    fn test_build_prefix_sums() {
        let entry = WeightedCacheEntry::build(&result_of(&[10, 0, 20, -5, 30]), 0);

        assert_eq!(entry.instances().len(), 5);
        assert_eq!(entry.weight_sum(), 60);

        let bounds: Vec<(i64, i64)> = entry.ranges().iter().map(|r| (r.start, r.end)).collect();
        assert_eq!(bounds, vec![(0, 10), (10, 30), (30, 60)]);

        let addrs: Vec<&str> = entry.ranges().iter().map(|r| r.instance.address()).collect();
        assert_eq!(addrs, vec!["10.0.0.0:80", "10.0.0.2:80", "10.0.0.4:80"]);
    }

    #[test]
    fn test_ranges_are_contiguous() {
        let entry = WeightedCacheEntry::build(&result_of(&[3, 1, 4, 1, 5, 9, 2, 6]), 0);
        for pair in entry.ranges().windows(2) {
            assert_eq!(pair[0].end, pair[1].start);
        }
        for r in entry.ranges() {
            assert_eq!(r.end - r.start, i64::from(r.instance.weight()));
        }
    }

    #[test]
    fn test_empty_and_non_positive() {
        let mut rng = StdRng::seed_from_u64(7);

        let empty = WeightedCacheEntry::build(&result_of(&[]), 0);
        assert!(empty.is_empty());
        assert_eq!(empty.weight_sum(), 0);
        assert!(empty.pick(&mut rng).is_none());

        let non_positive = WeightedCacheEntry::build(&result_of(&[0, -1, -10]), 0);
        assert!(non_positive.is_empty());
        assert_eq!(non_positive.instances().len(), 3);
        assert!(non_positive.pick(&mut rng).is_none());
    }

    #[test]
    fn test_pick_only_positive() {
        let mut rng = StdRng::seed_from_u64(42);
        let entry = WeightedCacheEntry::build(&result_of(&[0, -5, 10]), 0);
        for _ in 0..1000 {
            let ins = entry.pick(&mut rng).unwrap();
            assert_eq!(ins.address(), "10.0.0.2:80");
        }
    }

    #[test]
    fn test_expiry() {
        let entry = WeightedCacheEntry::build(&result_of(&[1]), 100);
        assert!(!entry.is_expired(100));
        assert!(entry.is_expired(101));

        entry.touch(500);
        assert_eq!(entry.expire_at(), 500);
        assert!(!entry.is_expired(101));
    }
}
