use std::{fmt, future::Future, sync::Arc};

use async_trait::async_trait;
use futures_util::{FutureExt, future::BoxFuture};

use crate::{
    core::instance::{DiscoveryResult, TargetInfo},
    ports::resolver::{BoxError, Resolver},
};

type ResolveFn = dyn Fn(String) -> BoxFuture<'static, Result<DiscoveryResult, BoxError>> + Send + Sync;
type TargetFn = dyn Fn(&TargetInfo) -> String + Send + Sync;
type NameFn = dyn Fn() -> String + Send + Sync;

/// Resolver assembled from closures.
///
/// Handy for tests and for wiring an existing lookup function into the
/// discovery layer without a dedicated type. Without a target function the
/// request host is used as the resolution key; without a name function the
/// name is empty.
#[derive(Clone)]
pub struct SynthesizedResolver {
    resolve_fn: Arc<ResolveFn>,
    target_fn: Option<Arc<TargetFn>>,
    name_fn: Option<Arc<NameFn>>,
}

impl SynthesizedResolver {
    pub fn new<F, Fut>(resolve: F) -> Self
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<DiscoveryResult, BoxError>> + Send + 'static,
    {
        Self {
            resolve_fn: Arc::new(move |key| resolve(key).boxed()),
            target_fn: None,
            name_fn: None,
        }
    }

    pub fn with_target<F>(mut self, target: F) -> Self
    where
        F: Fn(&TargetInfo) -> String + Send + Sync + 'static,
    {
        self.target_fn = Some(Arc::new(target));
        self
    }

    pub fn with_name<F>(mut self, name: F) -> Self
    where
        F: Fn() -> String + Send + Sync + 'static,
    {
        self.name_fn = Some(Arc::new(name));
        self
    }
}

impl fmt::Debug for SynthesizedResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SynthesizedResolver")
            .field("name", &self.name())
            .field("has_target_fn", &self.target_fn.is_some())
            .finish()
    }
}

#[async_trait]
impl Resolver for SynthesizedResolver {
    fn target(&self, target: &TargetInfo) -> String {
        match &self.target_fn {
            Some(f) => f(target),
            None => target.host.clone(),
        }
    }

    async fn resolve(&self, key: &str) -> Result<DiscoveryResult, BoxError> {
        (self.resolve_fn)(key.to_string()).await
    }

    fn name(&self) -> String {
        self.name_fn.as_ref().map(|f| f()).unwrap_or_default()
    }
}
