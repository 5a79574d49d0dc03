//! Service discovery middleware for outgoing HTTP requests.
//!
//! [`DiscoveryLayer`] wraps any `tower::Service<http::Request<B>>`. Requests
//! flagged with [`RequestOptions`] `sd = true` get their logical host resolved
//! through a [`Resolver`], an instance picked by a [`Loadbalancer`], and the
//! URI authority plus `Host` header rewritten to that instance before the inner
//! service runs. Unflagged requests pass through untouched.
//!
//! Resolver errors surface as the service error unchanged, so callers can
//! downcast or match on them exactly as the resolver produced them.
use std::{
    str::FromStr,
    sync::Arc,
    task::{Context, Poll},
};

use futures_util::future::BoxFuture;
use http::{
    HeaderValue, Request, Uri, header,
    uri::{Authority, PathAndQuery, Scheme},
};
use tower::{Layer, Service};
use tracing::Instrument;

use crate::{
    adapters::static_resolver::StaticResolver,
    config::models::DiscoveryConfig,
    core::{
        instance::{Instance, NETWORK_TCP, TargetInfo},
        lbcache::BalancerCache,
        load_balancer::LoadBalancerFactory,
        options::Options,
        weighted::WeightedBalancer,
    },
    ports::{
        load_balancer::Loadbalancer,
        resolver::{BoxError, DiscoveryError, Resolver},
    },
    tracing_setup,
};

/// Per-request switches, stored in the request extensions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RequestOptions {
    sd: bool,
}

impl RequestOptions {
    pub fn with_sd(sd: bool) -> Self {
        Self { sd }
    }

    /// Whether the request should go through service discovery.
    pub fn is_sd(&self) -> bool {
        self.sd
    }
}

/// The instance a request was routed to, added to the request extensions.
///
/// Connectors that handle non-TCP networks (Unix sockets) read the target
/// from here, since their address cannot be written into a URI authority.
#[derive(Debug, Clone)]
pub struct PickedInstance(pub Instance);

/// Convenience accessors for [`RequestOptions`] on `http::Request`.
pub trait RequestDiscoveryExt {
    fn set_service_discovery(&mut self, enabled: bool);
    fn is_service_discovery(&self) -> bool;
}

impl<B> RequestDiscoveryExt for Request<B> {
    fn set_service_discovery(&mut self, enabled: bool) {
        self.extensions_mut()
            .insert(RequestOptions::with_sd(enabled));
    }

    fn is_service_discovery(&self) -> bool {
        self.extensions()
            .get::<RequestOptions>()
            .is_some_and(RequestOptions::is_sd)
    }
}

/// Everything the discovery layer is assembled from.
#[derive(Clone)]
pub struct ServiceDiscoveryOptions {
    pub resolver: Arc<dyn Resolver>,
    /// `None` selects a [`WeightedBalancer`] built from `lb_options`.
    pub balancer: Option<Arc<dyn Loadbalancer>>,
    pub lb_options: Options,
}

/// Builder for [`DiscoveryLayer`].
pub struct DiscoveryLayerBuilder {
    options: ServiceDiscoveryOptions,
}

impl DiscoveryLayerBuilder {
    /// Route to a fixed set of addresses, replacing the configured resolver.
    pub fn with_customized_addrs<I, S>(mut self, addrs: I) -> Result<Self, DiscoveryError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.options.resolver = Arc::new(StaticResolver::new(addrs)?);
        Ok(self)
    }

    /// Use a specific balancer and its options.
    pub fn with_load_balance_options(
        mut self,
        balancer: Arc<dyn Loadbalancer>,
        options: Options,
    ) -> Self {
        self.options.balancer = Some(balancer);
        self.options.lb_options = options;
        self
    }

    /// Only change the timing options, keeping the default balancer.
    pub fn with_lb_options(mut self, options: Options) -> Self {
        self.options.lb_options = options;
        self
    }

    pub fn options(&self) -> &ServiceDiscoveryOptions {
        &self.options
    }

    pub fn build(self) -> DiscoveryLayer {
        let ServiceDiscoveryOptions {
            resolver,
            balancer,
            lb_options,
        } = self.options;
        let lb_options = lb_options.checked();
        let balancer =
            balancer.unwrap_or_else(|| Arc::new(WeightedBalancer::new(lb_options)));

        tracing::info!(
            "Service discovery configured with resolver '{}' and balancer '{}'",
            resolver.name(),
            balancer.name()
        );

        DiscoveryLayer {
            cache: Arc::new(BalancerCache::new(resolver, balancer, lb_options)),
        }
    }
}

/// `tower::Layer` adding service discovery to a client stack.
#[derive(Clone)]
pub struct DiscoveryLayer {
    cache: Arc<BalancerCache>,
}

impl DiscoveryLayer {
    /// Discovery with the default weighted balancer and options.
    pub fn new(resolver: Arc<dyn Resolver>) -> Self {
        Self::builder(resolver).build()
    }

    pub fn builder(resolver: Arc<dyn Resolver>) -> DiscoveryLayerBuilder {
        DiscoveryLayerBuilder {
            options: ServiceDiscoveryOptions {
                resolver,
                balancer: None,
                lb_options: Options::default(),
            },
        }
    }

    /// Build from a validated configuration section.
    ///
    /// A non-empty `customized_addrs` list replaces `resolver`.
    pub fn from_config(config: &DiscoveryConfig, resolver: Arc<dyn Resolver>) -> eyre::Result<Self> {
        config.validate()?;
        let lb_options = config.lb_options()?;
        let balancer = LoadBalancerFactory::create(config.balancer, lb_options);

        let mut builder =
            Self::builder(resolver).with_load_balance_options(balancer, lb_options);
        if !config.customized_addrs.is_empty() {
            builder = builder.with_customized_addrs(&config.customized_addrs)?;
        }
        Ok(builder.build())
    }

    /// The shared resolution cache behind this layer.
    pub fn cache(&self) -> &Arc<BalancerCache> {
        &self.cache
    }
}

impl<S> Layer<S> for DiscoveryLayer {
    type Service = Discovery<S>;

    fn layer(&self, inner: S) -> Self::Service {
        Discovery {
            inner,
            cache: self.cache.clone(),
        }
    }
}

/// Service produced by [`DiscoveryLayer`].
#[derive(Clone)]
pub struct Discovery<S> {
    inner: S,
    cache: Arc<BalancerCache>,
}

impl<S, B> Service<Request<B>> for Discovery<S>
where
    S: Service<Request<B>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Error: Into<BoxError>,
    B: Send + 'static,
{
    type Response = S::Response;
    type Error = BoxError;
    type Future = BoxFuture<'static, Result<S::Response, BoxError>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx).map_err(Into::into)
    }

    fn call(&mut self, mut req: Request<B>) -> Self::Future {
        if !req.is_service_discovery() {
            let fut = self.inner.call(req);
            return Box::pin(async move { fut.await.map_err(Into::<BoxError>::into) });
        }

        // Keep the service that was driven to readiness for this request.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let cache = self.cache.clone();

        Box::pin(async move {
            let host = request_host(&req).ok_or(DiscoveryError::MissingHost)?;
            let span = tracing_setup::create_discovery_span(req.method().as_str(), &host);

            let instance = cache
                .get_instance(&TargetInfo::new(host))
                .instrument(span.clone())
                .await?;
            span.record("instance.address", instance.address());

            route_to(&mut req, &instance)?;
            inner.call(req).await.map_err(Into::<BoxError>::into)
        })
    }
}

/// Logical target of a request: the URI host and port, else the `Host`
/// header. Userinfo never becomes part of the target.
fn request_host<B>(req: &Request<B>) -> Option<String> {
    if let Some(host) = req.uri().host() {
        return Some(match req.uri().port_u16() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        });
    }
    req.headers()
        .get(header::HOST)
        .and_then(|value| value.to_str().ok())
        .filter(|host| !host.is_empty())
        .map(str::to_string)
}

/// Point the request at the picked instance.
fn route_to<B>(req: &mut Request<B>, instance: &Instance) -> Result<(), DiscoveryError> {
    req.extensions_mut()
        .insert(PickedInstance(instance.clone()));

    if instance.network() != NETWORK_TCP {
        tracing::debug!(
            "Picked {} instance {}, leaving URI untouched",
            instance.network(),
            instance.address()
        );
        return Ok(());
    }

    let invalid = |reason: String| DiscoveryError::InvalidTarget {
        address: instance.address().to_string(),
        reason,
    };

    let authority = Authority::from_str(instance.address()).map_err(|e| invalid(e.to_string()))?;
    let mut parts = req.uri().clone().into_parts();
    if parts.scheme.is_none() {
        parts.scheme = Some(Scheme::HTTP);
    }
    if parts.path_and_query.is_none() {
        parts.path_and_query = Some(PathAndQuery::from_static("/"));
    }
    parts.authority = Some(authority);
    *req.uri_mut() = Uri::from_parts(parts).map_err(|e| invalid(e.to_string()))?;

    let host = HeaderValue::from_str(instance.address()).map_err(|e| invalid(e.to_string()))?;
    req.headers_mut().insert(header::HOST, host);
    Ok(())
}
