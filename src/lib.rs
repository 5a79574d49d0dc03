//! sd-balancer - Weighted random load balancing and service discovery for HTTP clients.
//!
//! The crate turns a logical target (`http://user-service/...`) into a concrete
//! backend instance on every request. A [`Resolver`] maps the target to a list
//! of weighted [`Instance`]s, a [`Loadbalancer`] picks one, and the
//! [`DiscoveryLayer`] tower middleware rewrites the outgoing request to point at
//! it.
//!
//! # Features
//! - Weighted random selection with O(log n) picks over prefix sums
//! - Lock-free reads: a rebalance swaps the whole per-key table atomically
//! - Idle balancer state expires in the background (`expire_interval`)
//! - Resolutions are cached per target and refreshed periodically (`refresh_interval`)
//! - Fixed address lists (`tcp://`, `unix://`) via [`StaticResolver`]
//! - Closure-based resolvers via [`SynthesizedResolver`]
//! - Round-robin balancer selectable from configuration
//! - Metrics via the `metrics` facade & structured tracing via `tracing`
//!
//! # Quick Example
//! ```no_run
//! use std::sync::Arc;
//!
//! use http::Request;
//! use sd_balancer::{DiscoveryLayer, RequestDiscoveryExt, StaticResolver};
//! use tower::{ServiceBuilder, service_fn};
//!
//! # #[tokio::main] async fn main() -> eyre::Result<()> {
//! let resolver = Arc::new(StaticResolver::new(["127.0.0.1:8080", "127.0.0.1:8081"])?);
//! let client = ServiceBuilder::new()
//!     .layer(DiscoveryLayer::new(resolver))
//!     .service(service_fn(|req: Request<()>| async move {
//!         Ok::<_, std::convert::Infallible>(req.uri().to_string())
//!     }));
//!
//! let mut req = Request::get("http://user-service/profile").body(())?;
//! req.set_service_discovery(true);
//! # let _ = (client, req);
//! # Ok(()) }
//! ```
//!
//! # Architecture
//! The crate separates **ports** (traits) from **adapters** (implementations) while keeping
//! balancing logic inside `core`. End users should prefer the re-exports documented below
//! instead of reaching into internal modules directly.
//!
//! # Error Handling
//! Resolver and middleware errors travel as `tower::BoxError` so a resolver's own error is
//! returned to the caller unchanged. Crate-level failures use [`DiscoveryError`]; setup code
//! (configuration, tracing, metrics) returns `eyre::Result<T>`.
//!
//! # Concurrency & Data Structures
//! Per-key balancer state lives in `scc::HashMap` so picks for different targets never
//! contend on a global lock.
pub mod config;
pub mod metrics;
pub mod ports;
pub mod tracing_setup;

pub mod adapters;
pub mod core;

pub use crate::{
    adapters::{
        Discovery, DiscoveryLayer, PickedInstance, RequestDiscoveryExt, RequestOptions,
        StaticResolver, SynthesizedResolver,
    },
    config::{BalancerKind, DiscoveryConfig},
    core::{
        BalancerCache, DiscoveryResult, Instance, LoadBalancerFactory, Options,
        RoundRobinBalancer, TargetInfo, WeightedBalancer,
    },
    ports::{BoxError, DiscoveryError, Loadbalancer, Resolver},
};
