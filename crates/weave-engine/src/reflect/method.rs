//! Reflected methods

use std::sync::{Arc, Weak};

use weave_sdk::{HostClass, HostError, HostMethod, HostObject};

use crate::convert::from_host;
use crate::error::{RuntimeError, RuntimeResult};
use crate::reflect::signature::{ArgFailure, ReflectedArgs};
use crate::runtime::Runtime;
use crate::value::Value;

/// All overloads of one method name on a host class
pub struct ReflectedMethod {
    name: String,
    declaring: Weak<HostClass>,
    declaring_name: String,
    signatures: Vec<ReflectedArgs>,
}

impl ReflectedMethod {
    /// Reflect the given overloads, keeping their order
    pub fn new(name: impl Into<String>, class: &Arc<HostClass>, overloads: &[HostMethod]) -> Self {
        Self {
            name: name.into(),
            declaring: Arc::downgrade(class),
            declaring_name: class.name().to_string(),
            signatures: overloads.iter().map(ReflectedArgs::method).collect(),
        }
    }

    /// Method name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Registered overloads
    pub fn signatures(&self) -> &[ReflectedArgs] {
        &self.signatures
    }

    /// Call the first applicable overload.
    ///
    /// Instance overloads take `receiver` when bound, otherwise the first
    /// positional argument. Keyword arguments are not supported.
    pub fn invoke(
        &self,
        rt: &Runtime,
        receiver: Option<&Value>,
        args: &[Value],
        kw_names: &[&str],
    ) -> RuntimeResult<Value> {
        if !kw_names.is_empty() {
            return Err(RuntimeError::invalid_argument(format!(
                "{}() takes no keyword arguments",
                self.name
            )));
        }
        let declaring = self
            .declaring
            .upgrade()
            .ok_or_else(|| HostError::Unloaded(self.declaring_name.clone()))?;

        let mut data = rt.call_data();
        let mut last: Option<ArgFailure> = None;
        for sig in &self.signatures {
            let (target, rest) = if sig.is_static() {
                (None, args)
            } else {
                let (recv, rest) = match receiver {
                    Some(r) => (Some(r), args),
                    None => match args.split_first() {
                        Some((first, rest)) => (Some(first), rest),
                        None => (None, args),
                    },
                };
                let target = recv
                    .and_then(Value::host_object)
                    .filter(|obj| obj.is_instance_of(&declaring));
                if target.is_none() {
                    last = Some(ArgFailure::Position(0));
                    continue;
                }
                (target, rest)
            };
            if !sig.matches(rt, rest, &[], &mut data) {
                last = data.failure().cloned();
                continue;
            }
            let Some(method) = sig.host_method() else {
                continue;
            };
            let result = Self::dispatch(method, target.as_ref(), data.args())?;
            return Ok(from_host(result));
        }
        Err(match last {
            Some(failure) => {
                let callable = format!("{}.{}", self.declaring_name, self.name);
                RuntimeError::no_matching_signature(callable, failure.index(), failure.to_string())
            }
            None => RuntimeError::no_matching_signature(&self.name, None, "no overloads"),
        })
    }

    /// Plain host objects get virtual dispatch. Proxy objects run the
    /// reflected implementation itself, so a dynamic override can reach the
    /// host behavior it replaces.
    fn dispatch(
        method: &HostMethod,
        target: Option<&HostObject>,
        args: &[weave_sdk::HostValue],
    ) -> RuntimeResult<weave_sdk::HostValue> {
        let Some(obj) = target else {
            return Ok(method.invoke(None, args)?);
        };
        if obj.peer().is_some() {
            return Ok(method.invoke(Some(obj), args)?);
        }
        let resolved = obj
            .class()
            .method_by_signature(method.name(), method.params())
            .filter(|m| !m.is_abstract())
            .unwrap_or_else(|| method.clone());
        Ok(resolved.invoke(Some(obj), args)?)
    }
}

impl std::fmt::Debug for ReflectedMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReflectedMethod")
            .field("name", &self.name)
            .field("declaring", &self.declaring_name)
            .field("signatures", &self.signatures)
            .finish()
    }
}
