//! Reflected constructors

use std::sync::{Arc, Weak};

use weave_sdk::{ClassKind, HostClass, HostError};

use crate::error::{RuntimeError, RuntimeResult};
use crate::object::DynamicInstance;
use crate::proxy::PeerLink;
use crate::reflect::signature::{ArgFailure, CallData, ReflectedArgs};
use crate::runtime::Runtime;
use crate::value::Value;

/// The public constructors of one host class, in registration order
pub struct ReflectedConstructor {
    name: String,
    declaring: Weak<HostClass>,
    declaring_id: u64,
    signatures: Vec<ReflectedArgs>,
}

impl ReflectedConstructor {
    /// Reflect the public constructors of `class`
    pub fn from_class(class: &Arc<HostClass>) -> Self {
        let signatures = class
            .constructors()
            .iter()
            .enumerate()
            .filter(|(_, c)| c.is_public())
            .map(|(i, c)| ReflectedArgs::constructor(i, c))
            .collect();
        Self {
            name: class.name().to_string(),
            declaring: Arc::downgrade(class),
            declaring_id: class.id(),
            signatures,
        }
    }

    /// Name of the declaring class
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Identity of the declaring class
    pub fn declaring_id(&self) -> u64 {
        self.declaring_id
    }

    /// Registered signatures
    pub fn signatures(&self) -> &[ReflectedArgs] {
        &self.signatures
    }

    fn declaring(&self) -> RuntimeResult<Arc<HostClass>> {
        self.declaring
            .upgrade()
            .ok_or_else(|| HostError::Unloaded(self.name.clone()).into())
    }

    /// First signature accepting `args`, in registration order
    fn select(&self, rt: &Runtime, args: &[Value], data: &mut CallData) -> RuntimeResult<&ReflectedArgs> {
        let mut last: Option<ArgFailure> = None;
        for sig in &self.signatures {
            if sig.matches(rt, args, &[], data) {
                return Ok(sig);
            }
            last = data.failure().cloned();
        }
        Err(match last {
            Some(failure) => RuntimeError::no_matching_signature(&self.name, failure.index(), failure.to_string()),
            None => RuntimeError::no_matching_signature(&self.name, None, "no public constructors"),
        })
    }

    fn split_keywords<'v>(&self, args: &'v [Value], kw_names: &[&str]) -> RuntimeResult<(&'v [Value], &'v [Value])> {
        if kw_names.len() > args.len() {
            return Err(RuntimeError::invalid_argument(format!(
                "{}(): {} keyword names for {} arguments",
                self.name,
                kw_names.len(),
                args.len()
            )));
        }
        Ok(args.split_at(args.len() - kw_names.len()))
    }

    /// Create a plain host object, then apply keywords as attribute sets
    pub fn construct_plain(&self, rt: &Runtime, args: &[Value], kw_names: &[&str]) -> RuntimeResult<Value> {
        let class = self.declaring()?;
        match class.kind() {
            ClassKind::Interface => {
                return Err(RuntimeError::illegal_state(format!(
                    "cannot instantiate interface {}",
                    class.name()
                )));
            }
            ClassKind::Abstract => {
                return Err(RuntimeError::illegal_state(format!(
                    "cannot instantiate abstract class {}",
                    class.name()
                )));
            }
            ClassKind::Concrete => {}
        }
        let (positional, keywords) = self.split_keywords(args, kw_names)?;
        let mut data = rt.call_data();
        let sig = self.select(rt, positional, &mut data)?;
        let obj = class.new_instance(sig.index(), data.args())?;
        let value = Value::Host(obj);
        for (name, v) in kw_names.iter().zip(keywords) {
            rt.set_attr(&value, name, v.clone())?;
        }
        Ok(value)
    }

    /// Construct the host side of a proxy-backed dynamic instance.
    ///
    /// `this` must be an unbound dynamic instance. When this constructor set
    /// is not declared by the instance's host superclass, the call is
    /// delegated once to that superclass's own constructors.
    pub fn invoke_constructor(
        &self,
        rt: &Runtime,
        this: &Value,
        args: &[Value],
        kw_names: &[&str],
    ) -> RuntimeResult<Value> {
        self.invoke_constructor_inner(rt, this, args, kw_names, false)
    }

    fn invoke_constructor_inner(
        &self,
        rt: &Runtime,
        this: &Value,
        args: &[Value],
        kw_names: &[&str],
        delegated: bool,
    ) -> RuntimeResult<Value> {
        let Value::Instance(inst) = this else {
            return Err(RuntimeError::type_error(format!(
                "{}.__init__ requires a dynamic instance, not {}",
                self.name,
                this.type_name()
            )));
        };
        // The delegating call already holds the reservation
        let _reservation = if delegated {
            None
        } else {
            Some(inst.begin_construction()?)
        };
        let host_super = rt.host_superclass(inst.class()).ok_or_else(|| {
            RuntimeError::type_error(format!(
                "'{}' does not extend a host class",
                inst.class().name()
            ))
        })?;

        if !delegated && host_super.id() != self.declaring_id {
            let wrapper = rt.canonical_wrapper(&host_super)?;
            return match wrapper.get_local("__init__") {
                Some(Value::Constructor(ctor)) => {
                    tracing::trace!(from = %self.name, to = %ctor.name, "delegating constructor");
                    ctor.invoke_constructor_inner(rt, this, args, kw_names, true)
                }
                _ => Err(RuntimeError::type_error(format!(
                    "{} has no accessible constructors",
                    host_super.name()
                ))),
            };
        }

        let (positional, keywords) = self.split_keywords(args, kw_names)?;
        let mut data = rt.call_data();
        let sig = self.select(rt, positional, &mut data)?;
        let obj = self.construct_proxy(rt, inst, sig, &data)?;
        inst.bind_host(obj)?;
        tracing::debug!(
            class = %inst.class().name(),
            signature = %sig.describe(),
            "constructed proxy instance"
        );

        for (name, v) in kw_names.iter().zip(keywords) {
            rt.set_attr(this, name, v.clone())?;
        }
        Ok(Value::None)
    }

    fn construct_proxy(
        &self,
        rt: &Runtime,
        inst: &Arc<DynamicInstance>,
        sig: &ReflectedArgs,
        data: &CallData,
    ) -> RuntimeResult<weave_sdk::HostObject> {
        let proxy = rt.proxy_for(inst.class())?;
        let link = Arc::new(PeerLink::new(inst, rt));
        let state = rt.thread_state();
        let _initializing = state.push_initializing(Arc::clone(&link));
        let obj = proxy.new_instance(sig.index(), data.args())?;
        if obj.peer().is_none() {
            obj.bind_peer(link)?;
        }
        Ok(obj)
    }
}

impl std::fmt::Debug for ReflectedConstructor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReflectedConstructor")
            .field("name", &self.name)
            .field("signatures", &self.signatures)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use weave_sdk::{HostClassBuilder, HostConstructor, HostField, HostType, HostValue};

    fn point() -> Arc<HostClass> {
        HostClassBuilder::new("demo.Point")
            .field(HostField::new("x", HostType::Int))
            .field(HostField::new("y", HostType::Int))
            .constructor(HostConstructor::new(vec![]))
            .constructor(HostConstructor::new(vec![HostType::Int, HostType::Int]).with_init(|obj, args| {
                obj.set_field("x", args[0].clone())?;
                obj.set_field("y", args[1].clone())
            }))
            .constructor(HostConstructor::new(vec![HostType::Str]).private())
            .build()
            .unwrap()
    }

    #[test]
    fn test_only_public_constructors_reflected() {
        let ctor = ReflectedConstructor::from_class(&point());
        assert_eq!(ctor.signatures().len(), 2);
        assert_eq!(ctor.signatures()[1].index(), 1);
    }

    #[test]
    fn test_construct_plain_with_keywords() {
        let rt = Runtime::new();
        let class = point();
        let ctor = ReflectedConstructor::from_class(&class);
        let args = [Value::Int(1), Value::Int(2), Value::Int(7)];
        // (1, 2) selects the two-int constructor; the keyword then overwrites y
        let obj = ctor.construct_plain(&rt, &args, &["y"]).unwrap().host_object().unwrap();
        assert_eq!(obj.get_field("x").unwrap(), HostValue::Int(1));
        assert_eq!(obj.get_field("y").unwrap(), HostValue::Int(7));
    }

    #[test]
    fn test_no_match_reports_last_failure() {
        let rt = Runtime::new();
        let ctor = ReflectedConstructor::from_class(&point());
        let err = ctor
            .construct_plain(&rt, &[Value::Int(1), Value::str("two")], &[])
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NoMatchingSignature);
        match err {
            RuntimeError::NoMatchingSignature { index, .. } => assert_eq!(index, Some(1)),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_abstract_class_rejected() {
        let rt = Runtime::new();
        let class = HostClassBuilder::new("demo.Shape")
            .kind(ClassKind::Abstract)
            .constructor(HostConstructor::new(vec![]))
            .build()
            .unwrap();
        let err = ReflectedConstructor::from_class(&class)
            .construct_plain(&rt, &[], &[])
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IllegalState);
    }

    #[test]
    fn test_requires_dynamic_instance() {
        let rt = Runtime::new();
        let ctor = ReflectedConstructor::from_class(&point());
        let err = ctor.invoke_constructor(&rt, &Value::Int(3), &[], &[]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Type);
    }
}
