pub mod load_balancer;
pub mod resolver;

pub use load_balancer::Loadbalancer;
pub use resolver::{BoxError, DiscoveryError, Resolver};
