//! Weave SDK - the host platform model
//!
//! This crate describes the statically typed host that the Weave runtime
//! bridges into: host values, declared types, classes with constructors,
//! methods and fields, objects, and the class path. It does not depend on
//! the engine, so host libraries can be written against it alone.
//!
//! # Example
//!
//! ```ignore
//! use weave_sdk::{HostClassBuilder, HostConstructor, HostField, HostType, HostValue};
//!
//! let counter = HostClassBuilder::new("demo.Counter")
//!     .field(HostField::new("count", HostType::Int))
//!     .constructor(HostConstructor::new(vec![HostType::Int]).with_init(|obj, args| {
//!         obj.set_field("count", args[0].clone())
//!     }))
//!     .build()?;
//! let obj = counter.new_instance(0, &[HostValue::Int(3)])?;
//! ```
//!
//! # Reclamation
//!
//! Classes and objects notify every [`ReclaimQueue`] watching them when
//! their last handle is dropped. Weak caches in the engine use this as the
//! host's "no longer reachable" signal.

#![warn(missing_docs)]

pub mod class;
pub mod classpath;
pub mod error;
pub mod object;
pub mod reclaim;
pub mod value;

pub use class::{
    ClassKind, ConstructorInit, HostClass, HostClassBuilder, HostConstructor, HostField,
    HostMethod, MethodBody, ROOT_CLASS_NAME,
};
pub use classpath::HostClassPath;
pub use error::{HostError, HostResult};
pub use object::{HostObject, ProxyPeer, WeakHostObject};
pub use reclaim::{ReclaimHooks, ReclaimQueue};
pub use value::{HostCallable, HostType, HostValue};
