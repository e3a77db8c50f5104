//! Dynamic object model: classes and instances

pub mod class;
pub mod instance;

pub use class::{
    CanonicalBinding, DynamicClass, HostBinding, LazyBinding, Namespace, ProxyBinding,
};
pub use instance::{ConstructionGuard, DynamicInstance};
