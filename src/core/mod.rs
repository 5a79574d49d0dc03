pub mod instance;
pub mod lbcache;
pub mod load_balancer;
pub mod options;
pub mod weighted;
pub mod weighted_entry;

pub use instance::{DiscoveryResult, Instance, TargetInfo};
pub use lbcache::BalancerCache;
pub use load_balancer::{LoadBalancerFactory, RoundRobinBalancer};
pub use options::Options;
pub use weighted::WeightedBalancer;
