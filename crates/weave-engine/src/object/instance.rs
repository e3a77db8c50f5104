//! Dynamic instances

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use once_cell::sync::OnceCell;
use parking_lot::RwLock;
use weave_sdk::HostObject;

use crate::error::{RuntimeError, RuntimeResult};
use crate::object::class::{DynamicClass, Namespace};
use crate::value::Value;

/// Global counter for instance identities
static NEXT_INSTANCE_ID: AtomicU64 = AtomicU64::new(1);

/// Instance of a dynamic class.
///
/// Owns its host object (for proxy-backed classes); the host object only
/// links back through a non-owning peer.
pub struct DynamicInstance {
    id: u64,
    class: Arc<DynamicClass>,
    dict: RwLock<Namespace>,
    host: OnceCell<HostObject>,
    constructing: AtomicBool,
}

/// Exclusive right to construct the host side of an instance; released on drop
#[derive(Debug)]
pub struct ConstructionGuard<'a> {
    instance: &'a DynamicInstance,
}

impl Drop for ConstructionGuard<'_> {
    fn drop(&mut self) {
        self.instance.constructing.store(false, Ordering::Release);
    }
}

impl DynamicInstance {
    /// Allocate an uninitialized instance
    pub fn new(class: Arc<DynamicClass>) -> Arc<Self> {
        Arc::new(Self {
            id: NEXT_INSTANCE_ID.fetch_add(1, Ordering::Relaxed),
            class,
            dict: RwLock::new(Namespace::default()),
            host: OnceCell::new(),
            constructing: AtomicBool::new(false),
        })
    }

    /// Unique instance identity
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Class of the instance
    pub fn class(&self) -> &Arc<DynamicClass> {
        &self.class
    }

    /// Bound host object, if construction completed
    pub fn host(&self) -> Option<&HostObject> {
        self.host.get()
    }

    /// Reserve the instance for host construction. Fails while another
    /// construction is in progress or once a host object is bound.
    pub fn begin_construction(&self) -> RuntimeResult<ConstructionGuard<'_>> {
        let reserved = self
            .constructing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if !reserved {
            return Err(RuntimeError::illegal_state(format!(
                "instance of '{}' is already being initialized",
                self.class.name()
            )));
        }
        let guard = ConstructionGuard { instance: self };
        if self.host.get().is_some() {
            return Err(RuntimeError::illegal_state(format!(
                "instance of '{}' is already initialized",
                self.class.name()
            )));
        }
        Ok(guard)
    }

    /// Attach the host object. A second binding is rejected and the first kept.
    pub fn bind_host(&self, obj: HostObject) -> RuntimeResult<()> {
        self.host.set(obj).map_err(|_| {
            RuntimeError::illegal_state(format!(
                "instance of '{}' is already bound to a host object",
                self.class.name()
            ))
        })
    }

    /// Read from the instance dict
    pub fn get_local(&self, name: &str) -> Option<Value> {
        self.dict.read().get(name).cloned()
    }

    /// Write to the instance dict
    pub fn set_local(&self, name: impl Into<String>, value: Value) {
        self.dict.write().insert(name.into(), value);
    }

    /// Instance dict, then dynamic class namespaces
    pub fn lookup_dynamic(&self, name: &str) -> Option<Value> {
        self.get_local(name)
            .or_else(|| self.class.lookup_dynamic(name))
    }
}

impl fmt::Debug for DynamicInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynamicInstance")
            .field("id", &self.id)
            .field("class", &self.class.name())
            .field("bound", &self.host.get().is_some())
            .finish()
    }
}
