pub mod discovery;
pub mod static_resolver;
pub mod synthesized_resolver;

/// Re-export commonly used types from adapters
pub use discovery::{
    Discovery, DiscoveryLayer, DiscoveryLayerBuilder, PickedInstance, RequestDiscoveryExt,
    RequestOptions, ServiceDiscoveryOptions,
};
pub use static_resolver::StaticResolver;
pub use synthesized_resolver::SynthesizedResolver;
