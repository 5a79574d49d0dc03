//! Per-target resolution cache in front of a [`Loadbalancer`].
//!
//! The first request for a target resolves it, rebalances, and caches the
//! [`DiscoveryResult`]. Concurrent first requests share one resolver call.
//! Later requests only pick. A background task keeps cached results fresh:
//! * every `refresh_interval` each cached target is re-resolved and the
//!   balancer rebalanced (a failing resolver keeps the previous result);
//! * every `expire_interval` targets that saw no request during the whole
//!   interval are dropped and their cache key deleted from the balancer.
use std::{
    sync::{
        Arc, Weak,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use arc_swap::ArcSwap;
use scc::HashMap;
use tokio::{sync::OnceCell, time::MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::{
    core::{
        instance::{DiscoveryResult, Instance, TargetInfo},
        options::Options,
    },
    metrics,
    ports::{
        load_balancer::Loadbalancer,
        resolver::{BoxError, DiscoveryError, Resolver},
    },
    tracing_setup,
};

/// Cached resolution for one target.
struct TargetEntry {
    target: String,
    result: OnceCell<ArcSwap<DiscoveryResult>>,
    idle: AtomicBool,
}

impl TargetEntry {
    fn new(target: &str) -> Self {
        Self {
            target: target.to_string(),
            result: OnceCell::new(),
            idle: AtomicBool::new(false),
        }
    }
}

struct CacheInner {
    resolver: Arc<dyn Resolver>,
    balancer: Arc<dyn Loadbalancer>,
    options: Options,
    targets: HashMap<String, Arc<TargetEntry>>,
}

impl CacheInner {
    fn target_entry(&self, target: &str) -> Arc<TargetEntry> {
        loop {
            if let Some(entry) = self.targets.read_sync(target, |_, e| e.clone()) {
                return entry;
            }
            let entry = Arc::new(TargetEntry::new(target));
            if self
                .targets
                .insert_sync(target.to_string(), entry.clone())
                .is_ok()
            {
                return entry;
            }
        }
    }

    fn snapshot(&self) -> Vec<Arc<TargetEntry>> {
        let mut entries = Vec::with_capacity(self.targets.len());
        self.targets.retain_sync(|_, entry| {
            entries.push(entry.clone());
            true
        });
        entries
    }

    async fn refresh(&self) {
        for entry in self.snapshot() {
            let Some(current) = entry.result.get() else {
                continue;
            };
            match self.resolver.resolve(&entry.target).await {
                Ok(fresh) => {
                    self.balancer.rebalance(&fresh);
                    let fresh_key = fresh.cache_key.clone();
                    let previous = current.swap(Arc::new(fresh));
                    if previous.cache_key != fresh_key {
                        self.balancer.delete(&previous.cache_key);
                    }
                }
                Err(e) => {
                    metrics::record_resolve_failure(&self.resolver.name(), "refresh");
                    tracing::warn!(
                        "Refreshing target '{}' with resolver '{}' failed, keeping previous result: {}",
                        entry.target,
                        self.resolver.name(),
                        e
                    );
                }
            }
        }
    }

    fn expire(&self) -> usize {
        let mut expired = 0;
        self.targets.retain_sync(|target, entry| {
            if !entry.idle.swap(true, Ordering::AcqRel) {
                return true;
            }
            if let Some(current) = entry.result.get() {
                self.balancer.delete(&current.load().cache_key);
            }
            tracing::debug!(resolve.key = %target, "Dropping idle target");
            expired += 1;
            false
        });
        metrics::record_evictions("target_cache", expired);
        expired
    }
}

/// Resolution cache shared by every request that goes through one discovery
/// middleware instance.
pub struct BalancerCache {
    inner: Arc<CacheInner>,
    tasks: CancellationToken,
}

impl BalancerCache {
    /// Create a cache. When a tokio runtime is available the refresh and
    /// expiry task is started immediately.
    pub fn new(
        resolver: Arc<dyn Resolver>,
        balancer: Arc<dyn Loadbalancer>,
        options: Options,
    ) -> Self {
        let options = options.checked();
        let inner = Arc::new(CacheInner {
            resolver,
            balancer,
            options,
            targets: HashMap::new(),
        });
        let tasks = CancellationToken::new();

        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(run_maintenance(
                Arc::downgrade(&inner),
                tasks.clone(),
                options,
            ));
        } else {
            tracing::warn!(
                "No tokio runtime available, balancer cache maintenance not started; targets are never refreshed or expired"
            );
        }

        Self { inner, tasks }
    }

    /// Resolve (on first use) and pick an instance for a request target.
    ///
    /// Resolver errors are returned unchanged. An empty pick is reported as
    /// [`DiscoveryError::NoInstance`].
    pub async fn get_instance(&self, target_info: &TargetInfo) -> Result<Instance, BoxError> {
        let inner = &self.inner;
        let target = inner.resolver.target(target_info);
        let entry = inner.target_entry(&target);
        entry.idle.store(false, Ordering::Release);

        let current = entry
            .result
            .get_or_try_init(|| {
                let span = tracing_setup::create_resolve_span(&inner.resolver.name(), &target);
                async {
                    let result = inner.resolver.resolve(&target).await.inspect_err(|_| {
                        metrics::record_resolve_failure(&inner.resolver.name(), "initial");
                    })?;
                    tracing::Span::current().record("instances", result.instances.len());
                    inner.balancer.rebalance(&result);
                    Ok::<_, BoxError>(ArcSwap::from_pointee(result))
                }
                .instrument(span)
            })
            .await?;

        let result = current.load();
        if let Some(instance) = inner.balancer.pick(&result) {
            return Ok(instance);
        }

        // The balancer may have reaped this key while the target stayed cached.
        inner.balancer.rebalance(&result);
        inner.balancer.pick(&result).ok_or_else(|| {
            DiscoveryError::NoInstance {
                target: target.clone(),
                cache_key: result.cache_key.clone(),
            }
            .into()
        })
    }

    /// Re-resolve every cached target now.
    pub async fn refresh_all(&self) {
        self.inner.refresh().await;
    }

    /// Run one expiry pass now; returns the number of targets dropped.
    pub fn expire_idle(&self) -> usize {
        self.inner.expire()
    }

    /// Number of targets currently cached.
    pub fn len(&self) -> usize {
        self.inner.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.targets.is_empty()
    }

    pub fn resolver(&self) -> &Arc<dyn Resolver> {
        &self.inner.resolver
    }

    pub fn balancer(&self) -> &Arc<dyn Loadbalancer> {
        &self.inner.balancer
    }

    pub fn options(&self) -> &Options {
        &self.inner.options
    }

    /// Stop the background maintenance task. Safe to call more than once.
    pub fn shutdown(&self) {
        self.tasks.cancel();
    }
}

impl Drop for BalancerCache {
    fn drop(&mut self) {
        self.tasks.cancel();
    }
}

async fn run_maintenance(inner: Weak<CacheInner>, token: CancellationToken, options: Options) {
    tracing::info!(
        "Balancer cache maintenance started. Refresh interval: {:?}, expire interval: {:?}",
        options.refresh_interval,
        options.expire_interval
    );

    let mut refresh = interval_after(options.refresh_interval);
    let mut expire = interval_after(options.expire_interval);

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = refresh.tick() => {
                let Some(inner) = inner.upgrade() else { break };
                inner.refresh().await;
            }
            _ = expire.tick() => {
                let Some(inner) = inner.upgrade() else { break };
                let expired = inner.expire();
                if expired > 0 {
                    tracing::debug!("Dropped {} idle targets", expired);
                }
            }
        }
    }

    tracing::info!("Balancer cache maintenance stopped");
}

/// Interval whose first tick fires one period from now.
fn interval_after(period: Duration) -> tokio::time::Interval {
    let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}
