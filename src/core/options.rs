use std::time::Duration;

/// Default period between balancer cache refreshes and eviction sweeps.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(5);
/// Default time an unused balancer entry stays cached.
pub const DEFAULT_EXPIRE_INTERVAL: Duration = Duration::from_secs(15);

/// Timing knobs shared by the balancers and the balancer cache.
///
/// Zero intervals are not errors: [`Options::check`] swaps them for the
/// defaults above. `Duration` cannot hold a negative value, so zero is the only
/// non-positive interval that can reach this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Options {
    /// How often cached resolutions are refreshed and expired entries reaped.
    pub refresh_interval: Duration,
    /// How long an entry survives without being picked.
    pub expire_interval: Duration,
}

impl Options {
    pub fn new(refresh_interval: Duration, expire_interval: Duration) -> Self {
        Self {
            refresh_interval,
            expire_interval,
        }
    }

    /// Replace non-positive intervals with their defaults.
    pub fn check(&mut self) {
        if self.refresh_interval.is_zero() {
            self.refresh_interval = DEFAULT_REFRESH_INTERVAL;
        }
        if self.expire_interval.is_zero() {
            self.expire_interval = DEFAULT_EXPIRE_INTERVAL;
        }
    }

    /// Consuming variant of [`Options::check`].
    pub fn checked(mut self) -> Self {
        self.check();
        self
    }
}

impl Default for Options {
    fn default() -> Self {
        Self {
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            expire_interval: DEFAULT_EXPIRE_INTERVAL,
        }
    }
}
