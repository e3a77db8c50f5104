//! Dynamic classes
//!
//! One type covers three roles: plain dynamic classes, canonical wrappers
//! of host classes (whose namespace holds reflected members), and dynamic
//! classes that extend host types through a synthesized proxy.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use once_cell::sync::OnceCell;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use weave_sdk::HostClass;

use crate::value::Value;

/// Global counter for dynamic class identities
static NEXT_DYNAMIC_CLASS_ID: AtomicU64 = AtomicU64::new(1);

/// Attribute namespace
pub type Namespace = FxHashMap<String, Value>;

/// How a dynamic class relates to the host type system
pub enum HostBinding {
    /// Pure dynamic class
    None,
    /// Canonical wrapper of a host class
    Canonical(CanonicalBinding),
    /// Dynamic subclass of host types, realized through a proxy class
    Proxy(ProxyBinding),
    /// Placeholder for a host class known only by name
    Lazy(LazyBinding),
}

/// Non-owning link from a canonical wrapper to its host class.
///
/// The wrapper is stored as a table value keyed by the class, so it must
/// not keep the class alive.
pub struct CanonicalBinding {
    class: Weak<HostClass>,
    class_id: u64,
    class_name: String,
}

impl CanonicalBinding {
    /// Link to `class`
    pub fn new(class: &Arc<HostClass>) -> Self {
        Self {
            class: Arc::downgrade(class),
            class_id: class.id(),
            class_name: class.name().to_string(),
        }
    }

    /// The host class, if still loaded
    pub fn host_class(&self) -> Option<Arc<HostClass>> {
        self.class.upgrade()
    }

    /// Identity of the host class
    pub fn class_id(&self) -> u64 {
        self.class_id
    }

    /// Name of the host class
    pub fn class_name(&self) -> &str {
        &self.class_name
    }
}

/// Host contract of a proxy-backed dynamic class
pub struct ProxyBinding {
    superclass: Option<Arc<HostClass>>,
    interfaces: Vec<Arc<HostClass>>,
    base_proxy: Option<Arc<DynamicClass>>,
    proxy: OnceCell<Arc<HostClass>>,
}

impl ProxyBinding {
    /// Describe the host contract.
    ///
    /// `superclass` is the nearest real host ancestor; `base_proxy` is set
    /// when a dynamic base is itself proxy-backed and its proxy must be
    /// extended instead.
    pub fn new(
        superclass: Option<Arc<HostClass>>,
        interfaces: Vec<Arc<HostClass>>,
        base_proxy: Option<Arc<DynamicClass>>,
    ) -> Self {
        Self {
            superclass,
            interfaces,
            base_proxy,
            proxy: OnceCell::new(),
        }
    }

    /// Nearest real host superclass (`None` means the root class)
    pub fn superclass(&self) -> Option<&Arc<HostClass>> {
        self.superclass.as_ref()
    }

    /// Interfaces the proxy implements directly
    pub fn interfaces(&self) -> &[Arc<HostClass>] {
        &self.interfaces
    }

    /// Proxy-backed dynamic base whose proxy is extended
    pub fn base_proxy(&self) -> Option<&Arc<DynamicClass>> {
        self.base_proxy.as_ref()
    }

    /// The synthesized proxy class, if already built
    pub fn proxy(&self) -> Option<&Arc<HostClass>> {
        self.proxy.get()
    }

    pub(crate) fn proxy_cell(&self) -> &OnceCell<Arc<HostClass>> {
        &self.proxy
    }
}

/// Name-only placeholder, bound once the host class resolves
pub struct LazyBinding {
    name: String,
    resolved: OnceCell<Arc<DynamicClass>>,
}

impl LazyBinding {
    /// Placeholder for `name`
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            resolved: OnceCell::new(),
        }
    }

    /// Host class name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The canonical wrapper, once resolved
    pub fn resolved(&self) -> Option<&Arc<DynamicClass>> {
        self.resolved.get()
    }

    pub(crate) fn resolve_to(&self, wrapper: Arc<DynamicClass>) -> &Arc<DynamicClass> {
        self.resolved.get_or_init(|| wrapper)
    }
}

/// A dynamic-language class
pub struct DynamicClass {
    id: u64,
    name: String,
    module: Option<String>,
    bases: Vec<Arc<DynamicClass>>,
    dict: RwLock<Namespace>,
    binding: HostBinding,
}

impl DynamicClass {
    /// Create a class
    pub fn new(
        name: impl Into<String>,
        module: Option<String>,
        bases: Vec<Arc<DynamicClass>>,
        dict: Namespace,
        binding: HostBinding,
    ) -> Arc<Self> {
        Arc::new(Self {
            id: NEXT_DYNAMIC_CLASS_ID.fetch_add(1, Ordering::Relaxed),
            name: name.into(),
            module,
            bases,
            dict: RwLock::new(dict),
            binding,
        })
    }

    /// Unique class identity
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Class name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Defining module name
    pub fn module(&self) -> Option<&str> {
        self.module.as_deref()
    }

    /// Declared bases
    pub fn bases(&self) -> &[Arc<DynamicClass>] {
        &self.bases
    }

    /// Relation to the host type system
    pub fn binding(&self) -> &HostBinding {
        &self.binding
    }

    /// Whether this is a canonical wrapper
    pub fn is_canonical(&self) -> bool {
        matches!(self.binding, HostBinding::Canonical(_))
    }

    /// Whether instances need a proxy host object
    pub fn is_proxy_backed(&self) -> bool {
        matches!(self.binding, HostBinding::Proxy(_))
    }

    /// Host class behind a canonical wrapper (through a resolved lazy entry too)
    pub fn host_class(&self) -> Option<Arc<HostClass>> {
        match &self.binding {
            HostBinding::Canonical(c) => c.host_class(),
            HostBinding::Lazy(l) => l.resolved().and_then(|w| w.host_class()),
            _ => None,
        }
    }

    /// Proxy contract, if proxy-backed
    pub fn proxy_binding(&self) -> Option<&ProxyBinding> {
        match &self.binding {
            HostBinding::Proxy(p) => Some(p),
            _ => None,
        }
    }

    /// Read an attribute from this class's own namespace
    pub fn get_local(&self, name: &str) -> Option<Value> {
        self.dict.read().get(name).cloned()
    }

    /// Write an attribute into this class's own namespace
    pub fn set_local(&self, name: impl Into<String>, value: Value) {
        self.dict.write().insert(name.into(), value);
    }

    /// Remove an attribute from this class's own namespace
    pub fn remove_local(&self, name: &str) -> Option<Value> {
        self.dict.write().remove(name)
    }

    /// Names in this class's own namespace
    pub fn local_names(&self) -> Vec<String> {
        self.dict.read().keys().cloned().collect()
    }

    /// Look up an attribute: own namespace, then bases depth-first.
    ///
    /// Canonical wrappers among the bases contribute their reflected
    /// members underneath the declared ones.
    pub fn lookup(&self, name: &str) -> Option<Value> {
        if let Some(v) = self.get_local(name) {
            return Some(v);
        }
        if let HostBinding::Lazy(lazy) = &self.binding {
            if let Some(resolved) = lazy.resolved() {
                return resolved.lookup(name);
            }
        }
        self.bases.iter().find_map(|b| b.lookup(name))
    }

    /// Look up an attribute in dynamic namespaces only, skipping every
    /// canonical wrapper. Proxy stubs use this so a host call never loops
    /// back into the host member it overrides.
    pub fn lookup_dynamic(&self, name: &str) -> Option<Value> {
        if self.is_canonical() {
            return None;
        }
        if let Some(v) = self.get_local(name) {
            return Some(v);
        }
        self.bases.iter().find_map(|b| b.lookup_dynamic(name))
    }

    /// Whether `self` is `other` or inherits from it
    pub fn is_subclass(&self, other: &DynamicClass) -> bool {
        self.id == other.id || self.bases.iter().any(|b| b.is_subclass(other))
    }
}

impl fmt::Debug for DynamicClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &self.binding {
            HostBinding::None => "dynamic",
            HostBinding::Canonical(_) => "canonical",
            HostBinding::Proxy(_) => "proxy",
            HostBinding::Lazy(_) => "lazy",
        };
        f.debug_struct("DynamicClass")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("kind", &kind)
            .finish()
    }
}
