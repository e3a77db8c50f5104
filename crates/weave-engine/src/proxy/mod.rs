//! Proxy and adapter types
//!
//! A dynamic class that extends host types is realized as a synthesized
//! proxy class whose methods forward to the paired dynamic instance.
//! Adapters bridge listener interfaces to dynamic callables.

pub mod descriptor;
pub mod loader;
pub mod peer;
pub mod synthesizer;

pub use descriptor::{ImageError, TypeDescriptor};
pub use loader::DynamicClassLoader;
pub use peer::PeerLink;
pub use synthesizer::{ProxyRequest, ProxySynthesizer};
