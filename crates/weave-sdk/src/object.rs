//! Host objects
//!
//! Objects are shared handles. Field slots follow the class's flattened
//! layout; a proxy object additionally carries a non-owning link back to
//! the dynamic instance it stands in for.

use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use once_cell::sync::OnceCell;
use parking_lot::RwLock;

use crate::class::HostClass;
use crate::error::{HostError, HostResult};
use crate::reclaim::ReclaimHooks;
use crate::value::HostValue;

/// Global counter for object identities
static NEXT_OBJECT_ID: AtomicU64 = AtomicU64::new(1);

/// Link from a proxy object to its paired dynamic instance.
///
/// Implementations must not keep the dynamic instance alive.
pub trait ProxyPeer: Send + Sync {
    /// Route a host-side call to the dynamic implementation.
    ///
    /// Returns `Ok(None)` when the dynamic side does not define `name`.
    fn dispatch(&self, name: &str, args: &[HostValue]) -> HostResult<Option<HostValue>>;

    /// Access the concrete type for downcasting
    fn as_any(&self) -> &dyn Any;
}

struct ObjectData {
    id: u64,
    class: Arc<HostClass>,
    slots: RwLock<Vec<HostValue>>,
    peer: OnceCell<Arc<dyn ProxyPeer>>,
    reclaim: ReclaimHooks,
}

impl Drop for ObjectData {
    fn drop(&mut self) {
        let id = self.id;
        self.reclaim.fire(id);
    }
}

/// Shared handle to a host object
#[derive(Clone)]
pub struct HostObject(Arc<ObjectData>);

impl HostObject {
    pub(crate) fn allocate(class: Arc<HostClass>) -> Self {
        let slots = class
            .instance_fields()
            .iter()
            .map(|f| f.ty().default_value())
            .collect();
        HostObject(Arc::new(ObjectData {
            id: NEXT_OBJECT_ID.fetch_add(1, Ordering::Relaxed),
            class,
            slots: RwLock::new(slots),
            peer: OnceCell::new(),
            reclaim: ReclaimHooks::new(),
        }))
    }

    /// Unique object identity
    pub fn id(&self) -> u64 {
        self.0.id
    }

    /// Runtime class
    pub fn class(&self) -> &Arc<HostClass> {
        &self.0.class
    }

    /// Whether this is an instance of `class`
    pub fn is_instance_of(&self, class: &HostClass) -> bool {
        class.is_assignable_from(&self.0.class)
    }

    /// Reclamation hooks fired when the last handle is dropped
    pub fn reclaim_hooks(&self) -> &ReclaimHooks {
        &self.0.reclaim
    }

    fn slot(&self, name: &str) -> HostResult<usize> {
        self.0.class.slot_of(name).ok_or_else(|| {
            HostError::NoSuchMember(format!("{}.{}", self.0.class.name(), name))
        })
    }

    /// Read an instance field
    pub fn get_field(&self, name: &str) -> HostResult<HostValue> {
        let slot = self.slot(name)?;
        Ok(self.0.slots.read()[slot].clone())
    }

    /// Write an instance field, honoring `final`
    pub fn set_field(&self, name: &str, value: HostValue) -> HostResult<()> {
        let slot = self.slot(name)?;
        let field = &self.0.class.instance_fields()[slot];
        if field.is_final() {
            return Err(HostError::IllegalAccess(format!(
                "final field {}.{}",
                self.0.class.name(),
                name
            )));
        }
        self.store(slot, value)
    }

    /// Write an instance field from a constructor, `final` included
    pub fn init_field(&self, name: &str, value: HostValue) -> HostResult<()> {
        let slot = self.slot(name)?;
        self.store(slot, value)
    }

    fn store(&self, slot: usize, value: HostValue) -> HostResult<()> {
        let ty = self.0.class.instance_fields()[slot].ty();
        if !ty.accepts(&value) {
            return Err(HostError::TypeMismatch {
                expected: ty.name(),
                got: value.type_name(),
            });
        }
        self.0.slots.write()[slot] = value;
        Ok(())
    }

    /// Pair this object with its dynamic instance. Allowed once.
    pub fn bind_peer(&self, peer: Arc<dyn ProxyPeer>) -> HostResult<()> {
        self.0
            .peer
            .set(peer)
            .map_err(|_| HostError::PeerAlreadyBound(format!("{}@{:x}", self.0.class.name(), self.0.id)))
    }

    /// The paired dynamic instance link, if bound
    pub fn peer(&self) -> Option<&Arc<dyn ProxyPeer>> {
        self.0.peer.get()
    }

    /// Virtual call by name, selecting the first overload accepting `args`
    pub fn invoke(&self, name: &str, args: &[HostValue]) -> HostResult<HostValue> {
        let method = self.0.class.find_method(name, args).ok_or_else(|| {
            HostError::NoSuchMember(format!("{}.{}/{}", self.0.class.name(), name, args.len()))
        })?;
        method.invoke(Some(self), args)
    }

    /// Non-owning handle
    pub fn downgrade(&self) -> WeakHostObject {
        WeakHostObject {
            id: self.0.id,
            inner: Arc::downgrade(&self.0),
        }
    }

    /// Identity comparison
    pub fn ptr_eq(&self, other: &HostObject) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl PartialEq for HostObject {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for HostObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}@{:x}>", self.0.class.name(), self.0.id)
    }
}

/// Non-owning handle to a host object
#[derive(Clone)]
pub struct WeakHostObject {
    id: u64,
    inner: Weak<ObjectData>,
}

impl WeakHostObject {
    /// Identity of the referenced object, valid even after it is gone
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Recover a strong handle if the object is still alive
    pub fn upgrade(&self) -> Option<HostObject> {
        self.inner.upgrade().map(HostObject)
    }
}

impl fmt::Debug for WeakHostObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<weak object {:x}>", self.id)
    }
}
