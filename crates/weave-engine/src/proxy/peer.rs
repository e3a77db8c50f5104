//! Proxy peer link
//!
//! The host object of a proxy-backed instance reaches its dynamic instance
//! through a `PeerLink`. The link is non-owning in both directions that
//! matter: the dynamic instance owns the host object, never the reverse.

use std::any::Any;
use std::sync::{Arc, Weak};

use weave_sdk::{HostClass, HostError, HostResult, HostType, HostValue, ProxyPeer};

use crate::convert::{from_host, to_host};
use crate::error::RuntimeError;
use crate::object::DynamicInstance;
use crate::runtime::{Runtime, WeakRuntime};
use crate::value::Value;

/// Back-reference from a proxy object to its dynamic instance
pub struct PeerLink {
    instance: Weak<DynamicInstance>,
    instance_id: u64,
    runtime: WeakRuntime,
}

impl PeerLink {
    /// Link to `instance`
    pub fn new(instance: &Arc<DynamicInstance>, rt: &Runtime) -> Self {
        Self {
            instance: Arc::downgrade(instance),
            instance_id: instance.id(),
            runtime: rt.downgrade(),
        }
    }

    /// The dynamic instance, if still alive
    pub fn instance(&self) -> Option<Arc<DynamicInstance>> {
        self.instance.upgrade()
    }

    /// Identity of the linked instance
    pub fn instance_id(&self) -> u64 {
        self.instance_id
    }

    /// Whether `class` is the proxy synthesized for the linked instance's class
    pub(crate) fn expects(&self, class: &HostClass) -> bool {
        self.instance()
            .and_then(|inst| {
                inst.class()
                    .proxy_binding()
                    .and_then(|b| b.proxy())
                    .map(|p| p.id() == class.id())
            })
            .unwrap_or(false)
    }

    fn resolve(&self, rt: &Runtime, inst: &Arc<DynamicInstance>, name: &str) -> Option<Value> {
        if let Some(v) = inst.get_local(name) {
            return Some(v);
        }
        let v = inst.class().lookup_dynamic(name)?;
        Some(rt.bind(v, Value::Instance(Arc::clone(inst))))
    }
}

impl ProxyPeer for PeerLink {
    fn dispatch(&self, name: &str, args: &[HostValue]) -> HostResult<Option<HostValue>> {
        let (Some(inst), Some(rt)) = (self.instance(), self.runtime.upgrade()) else {
            return Ok(None);
        };
        let Some(target) = self.resolve(&rt, &inst, name) else {
            return Ok(None);
        };
        let args: Vec<Value> = args.iter().cloned().map(from_host).collect();
        tracing::trace!(instance = self.instance_id, method = name, "forwarding to dynamic method");
        match rt.call(&target, &args, &[]) {
            Ok(result) => to_host(&rt, &result, &HostType::Any)
                .map(|(v, _)| Some(v))
                .ok_or_else(|| HostError::TypeMismatch {
                    expected: "object".to_string(),
                    got: result.type_name(),
                }),
            Err(err) => {
                rt.thread_state().set_exception(&err);
                Err(match err {
                    RuntimeError::ForeignInterop(host) => host,
                    other => HostError::Thrown(other.to_string()),
                })
            }
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl std::fmt::Debug for PeerLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerLink")
            .field("instance", &self.instance_id)
            .field("alive", &(self.instance.strong_count() > 0))
            .finish()
    }
}
