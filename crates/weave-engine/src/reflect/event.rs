//! Bean event properties
//!
//! A host class exposing `addFooListener(FooListener)` gets one property per
//! method of `FooListener`. Assigning a callable to such a property routes
//! the listener method to it through a synthesized adapter object that is
//! registered once per (object, listener interface).

use std::sync::{Arc, Weak};

use weave_sdk::{HostClass, HostError, HostObject, HostType};

use crate::convert::{from_host, to_host_checked};
use crate::error::{RuntimeError, RuntimeResult};
use crate::runtime::Runtime;
use crate::value::Value;

/// One listener method exposed as a settable property
pub struct BeanEventProperty {
    name: String,
    listener: Weak<HostClass>,
    listener_name: String,
    add_method: String,
}

impl BeanEventProperty {
    /// Property `name` of `listener`, registered through `add_method`
    pub fn new(name: impl Into<String>, listener: &Arc<HostClass>, add_method: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            listener: Arc::downgrade(listener),
            listener_name: listener.name().to_string(),
            add_method: add_method.into(),
        }
    }

    /// Listener method name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Listener interface name
    pub fn listener_name(&self) -> &str {
        &self.listener_name
    }

    /// Registration method name
    pub fn add_method(&self) -> &str {
        &self.add_method
    }

    fn source(&self, this: &Value) -> RuntimeResult<HostObject> {
        this.host_object().ok_or_else(|| {
            RuntimeError::type_error(format!(
                "event {} needs a host object, not {}",
                self.name,
                this.type_name()
            ))
        })
    }

    /// Currently assigned handler, `None` if unset
    pub fn get(self: &Arc<Self>, rt: &Runtime, this: Option<&Value>) -> RuntimeResult<Value> {
        let Some(v) = this else {
            return Ok(Value::Event(Arc::clone(self)));
        };
        let obj = self.source(v)?;
        match rt.tables().get_adapter(&obj, &self.listener_name) {
            Some(adapter) => Ok(from_host(adapter.get_field(&self.name)?)),
            None => Ok(Value::None),
        }
    }

    /// Assign a handler, creating and registering the adapter on first use
    pub fn set(&self, rt: &Runtime, this: Option<&Value>, handler: &Value) -> RuntimeResult<()> {
        let Some(v) = this else {
            return Err(RuntimeError::type_error(format!(
                "cannot set event {} without an instance",
                self.name
            )));
        };
        let obj = self.source(v)?;
        let listener = self
            .listener
            .upgrade()
            .ok_or_else(|| HostError::Unloaded(self.listener_name.clone()))?;
        let converted = to_host_checked(rt, handler, &HostType::Callable)?;
        let adapter = rt.adapter_for(&obj, &listener, &self.add_method)?;
        adapter.set_field(&self.name, converted)?;
        Ok(())
    }
}

impl std::fmt::Debug for BeanEventProperty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "BeanEventProperty({}.{})", self.listener_name, self.name)
    }
}
