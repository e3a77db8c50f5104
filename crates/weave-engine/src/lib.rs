//! Weave Runtime Engine
//!
//! The object/runtime core of the Weave dynamic language, hosted on the
//! platform described by `weave-sdk`:
//! - **Object model**: dynamic classes and instances (`object` module)
//! - **Reflection**: host constructors, methods, fields and bean events as
//!   dynamic descriptors, with first-match overload selection (`reflect`)
//! - **Proxies**: synthesized host types that let dynamic classes extend
//!   host classes and implement host interfaces (`proxy`)
//! - **Tables**: canonical wrappers and adapters with weak, soft or pinned
//!   retention (`tables`)
//! - **State**: per-thread and interpreter-wide state (`state`)
//!
//! # Example
//!
//! ```rust,ignore
//! use weave_engine::{Runtime, Value};
//!
//! let rt = Runtime::new();
//! rt.classpath().register(widget_class)?;
//! let widget = rt.host_class("ui.Widget")?;
//! let obj = rt.call(&Value::Class(widget), &[Value::Int(3)], &[])?;
//! let label = rt.get_attr(&obj, "label")?;
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

// ============================================================================
// Core Modules
// ============================================================================

pub mod args;
pub mod builtins;
pub mod config;
pub mod convert;
pub mod defaults;
pub mod error;
pub mod object;
pub mod proxy;
pub mod reflect;
pub mod runtime;
pub mod state;
pub mod tables;
pub mod value;

// ============================================================================
// Re-exports
// ============================================================================

pub use args::ArgParser;
pub use config::RuntimeOptions;
pub use error::{ErrorKind, RuntimeError, RuntimeResult};
pub use object::{DynamicClass, DynamicInstance, HostBinding, Namespace};
pub use proxy::{DynamicClassLoader, ProxyRequest, ProxySynthesizer, TypeDescriptor};
pub use reflect::{
    BeanEventProperty, CallData, ReflectedArgs, ReflectedConstructor, ReflectedField, ReflectedMethod,
};
pub use runtime::{Runtime, RuntimeStats, WeakRuntime};
pub use state::{InterpreterState, SystemState, ThreadState, ThreadStateRegistry};
pub use tables::{InternalTables, Retention, Stability, TableItem, TableKind, TableStats};
pub use value::{Function, Value};

pub use weave_sdk;
