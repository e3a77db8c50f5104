//! Dynamic class loader
//!
//! Turns verified type images into host classes. Names resolve against
//! the host class path, then types this loader defined, then parent
//! loaders. Type identity is per loader: the same image defined through
//! two loaders yields two unrelated classes.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use weave_sdk::{
    HostClass, HostClassBuilder, HostClassPath, HostConstructor, HostError, HostField, HostMethod,
    HostObject, HostResult, HostType, HostValue,
};

use crate::proxy::descriptor::{
    image_digest, DescriptorKind, Fallback, MethodStub, StubBody, TypeDescriptor, TypeRef,
};
use crate::state::ThreadStateRegistry;

/// Global counter for loader identities
static NEXT_LOADER_ID: AtomicU64 = AtomicU64::new(1);

/// Loader for synthesized proxy and adapter types
pub struct DynamicClassLoader {
    id: u64,
    classpath: Arc<HostClassPath>,
    threads: Weak<ThreadStateRegistry>,
    parents: Mutex<Vec<Arc<DynamicClassLoader>>>,
    types: RwLock<FxHashMap<String, Arc<HostClass>>>,
    discarded: AtomicBool,
}

impl DynamicClassLoader {
    /// Create a loader over `classpath`
    pub fn new(classpath: Arc<HostClassPath>, threads: &Arc<ThreadStateRegistry>) -> Arc<Self> {
        Arc::new(Self {
            id: NEXT_LOADER_ID.fetch_add(1, Ordering::Relaxed),
            classpath,
            threads: Arc::downgrade(threads),
            parents: Mutex::new(Vec::new()),
            types: RwLock::new(FxHashMap::default()),
            discarded: AtomicBool::new(false),
        })
    }

    /// Unique loader identity
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Whether `discard` was called
    pub fn is_discarded(&self) -> bool {
        self.discarded.load(Ordering::Acquire)
    }

    /// Make types of `parent` resolvable from this loader
    pub fn add_parent(&self, parent: Arc<DynamicClassLoader>) {
        let mut parents = self.parents.lock();
        if parent.id != self.id && !parents.iter().any(|p| p.id == parent.id) {
            parents.push(parent);
        }
    }

    /// Number of types defined by this loader
    pub fn defined_count(&self) -> usize {
        self.types.read().len()
    }

    /// Resolve a class name: host class path, own types, then parents
    pub fn resolve(&self, name: &str) -> Option<Arc<HostClass>> {
        if let Some(c) = self.classpath.resolve(name) {
            return Some(c);
        }
        if let Some(c) = self.types.read().get(name) {
            return Some(Arc::clone(c));
        }
        let parents = self.parents.lock().clone();
        parents.iter().find_map(|p| p.resolve(name))
    }

    /// Verify `image` and define the type it describes under `name`
    pub fn define(&self, name: &str, image: &[u8]) -> HostResult<Arc<HostClass>> {
        self.define_with_referents(name, image, &[])
    }

    /// Like [`define`](Self::define), resolving names against `referents`
    /// first. Callers pass the host classes the image refers to, so types
    /// that are not on the class path still link.
    pub fn define_with_referents(
        &self,
        name: &str,
        image: &[u8],
        referents: &[Arc<HostClass>],
    ) -> HostResult<Arc<HostClass>> {
        if self.is_discarded() {
            return Err(HostError::Linkage(format!("loader {} was discarded", self.id)));
        }
        let desc = TypeDescriptor::decode(image).map_err(|e| HostError::MalformedImage(e.to_string()))?;
        if desc.name != name {
            return Err(HostError::MalformedImage(format!(
                "image defines {}, expected {}",
                desc.name, name
            )));
        }
        if self.types.read().contains_key(name) {
            return Err(HostError::Linkage(format!("duplicate type {} in loader {}", name, self.id)));
        }

        let linker = Linker {
            loader: self,
            referents,
        };
        let class = linker.materialize(&desc)?;
        let mut types = self.types.write();
        if types.contains_key(name) {
            return Err(HostError::Linkage(format!("duplicate type {} in loader {}", name, self.id)));
        }
        types.insert(name.to_string(), Arc::clone(&class));
        drop(types);

        tracing::debug!(
            loader = self.id,
            name,
            digest = image_digest(image).as_deref().unwrap_or(""),
            "defined type"
        );
        Ok(class)
    }

    /// Release every type this loader defined
    pub fn discard(&self) {
        if self.discarded.swap(true, Ordering::AcqRel) {
            return;
        }
        let released = {
            let mut types = self.types.write();
            let n = types.len();
            types.clear();
            n
        };
        self.parents.lock().clear();
        tracing::debug!(loader = self.id, released, "discarded loader");
    }
}

/// Name resolution for one `define` call
struct Linker<'a> {
    loader: &'a DynamicClassLoader,
    referents: &'a [Arc<HostClass>],
}

impl Linker<'_> {
    fn resolve(&self, name: &str) -> Option<Arc<HostClass>> {
        self.referents
            .iter()
            .find(|c| c.name() == name)
            .cloned()
            .or_else(|| self.loader.resolve(name))
    }

    fn resolve_type(&self, ty: &TypeRef) -> HostResult<HostType> {
        ty.resolve(&|name| self.resolve(name))
            .ok_or_else(|| HostError::Linkage(format!("unresolved type {:?}", ty)))
    }

    fn resolve_types(&self, tys: &[TypeRef]) -> HostResult<Vec<HostType>> {
        tys.iter().map(|t| self.resolve_type(t)).collect()
    }

    fn resolve_class(&self, name: &str) -> HostResult<Arc<HostClass>> {
        self.resolve(name)
            .ok_or_else(|| HostError::Linkage(format!("unresolved class {}", name)))
    }

    fn materialize(&self, desc: &TypeDescriptor) -> HostResult<Arc<HostClass>> {
        let superclass = match &desc.superclass {
            Some(name) => self.resolve_class(name)?,
            None => HostClass::object(),
        };
        let mut builder = HostClassBuilder::new(&desc.name)
            .extends(Arc::clone(&superclass))
            .loader(self.loader.id);
        for iface in &desc.interfaces {
            builder = builder.implements(self.resolve_class(iface)?);
        }
        for field in &desc.fields {
            builder = builder.field(HostField::new(&field.name, self.resolve_type(&field.ty)?));
        }
        for stub in &desc.constructors {
            let params = self.resolve_types(&stub.params)?;
            let sup_ctor = superclass
                .constructors()
                .get(stub.super_index)
                .cloned()
                .ok_or_else(|| {
                    HostError::MalformedImage(format!(
                        "{} has no constructor #{}",
                        superclass.name(),
                        stub.super_index
                    ))
                })?;
            let threads = (desc.kind == DescriptorKind::Proxy).then(|| self.loader.threads.clone());
            builder = builder.constructor(HostConstructor::new(params).with_init(move |obj, args| {
                // Bound before the superclass runs so its constructor can
                // reach dynamic overrides
                if let Some(threads) = &threads {
                    bind_initializing_peer(threads, obj)?;
                }
                sup_ctor.run(obj, args)
            }));
        }
        for stub in &desc.methods {
            builder = builder.method(self.method_stub(stub, &superclass)?);
        }
        builder.build()
    }

    fn method_stub(&self, stub: &MethodStub, superclass: &Arc<HostClass>) -> HostResult<HostMethod> {
        let params = self.resolve_types(&stub.params)?;
        let returns = self.resolve_type(&stub.returns)?;
        let name = stub.name.clone();
        let method = HostMethod::new(&stub.name, params.clone(), returns.clone());
        Ok(match &stub.body {
            StubBody::ForwardToPeer { fallback } => {
                let fallback = *fallback;
                let sup = Arc::clone(superclass);
                method.with_body(move |this, args| {
                    let obj = this.ok_or_else(|| HostError::IllegalAccess(format!("{} needs a receiver", name)))?;
                    if let Some(peer) = obj.peer() {
                        if let Some(v) = peer.dispatch(&name, args)? {
                            return returns.coerce(v);
                        }
                    }
                    match fallback {
                        Fallback::Super => match sup.method_by_signature(&name, &params) {
                            Some(m) if !m.is_abstract() => m.invoke(Some(obj), args),
                            _ => Err(HostError::AbstractMethod(name.clone())),
                        },
                        Fallback::Abstract => Err(HostError::AbstractMethod(name.clone())),
                    }
                })
            }
            StubBody::InvokeField { field } => {
                let field = field.clone();
                method.with_body(move |this, args| {
                    let obj = this.ok_or_else(|| HostError::IllegalAccess(format!("{} needs a receiver", name)))?;
                    invoke_field(obj, &field, &returns, args)
                })
            }
        })
    }
}

/// Pair a freshly constructed proxy object with the instance whose
/// construction is in progress on this thread, if it is the expected one
fn bind_initializing_peer(threads: &Weak<ThreadStateRegistry>, obj: &HostObject) -> HostResult<()> {
    if obj.peer().is_some() {
        return Ok(());
    }
    let Some(threads) = threads.upgrade() else {
        return Ok(());
    };
    match threads.current().initializing() {
        Some(link) if link.expects(obj.class()) => obj.bind_peer(link),
        _ => Ok(()),
    }
}

fn invoke_field(obj: &HostObject, field: &str, returns: &HostType, args: &[HostValue]) -> HostResult<HostValue> {
    match obj.get_field(field)? {
        HostValue::Null => Ok(returns.default_value()),
        HostValue::Callable(handler) => returns.coerce(handler.call(args)?),
        other => Err(HostError::TypeMismatch {
            expected: "callable".to_string(),
            got: other.type_name(),
        }),
    }
}

impl std::fmt::Debug for DynamicClassLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DynamicClassLoader")
            .field("id", &self.id)
            .field("types", &self.defined_count())
            .field("discarded", &self.is_discarded())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::descriptor::{ConstructorStub, FieldStub};
    use crate::state::SystemState;

    fn loader() -> Arc<DynamicClassLoader> {
        // Adapter stubs never consult thread state, so the registry may go away
        let threads = Arc::new(ThreadStateRegistry::new(Arc::new(SystemState::new()), 100));
        DynamicClassLoader::new(Arc::new(HostClassPath::new()), &threads)
    }

    fn adapter_image(name: &str) -> Vec<u8> {
        TypeDescriptor {
            name: name.to_string(),
            kind: DescriptorKind::Adapter,
            superclass: None,
            interfaces: vec![],
            constructors: vec![ConstructorStub {
                params: vec![],
                super_index: 0,
            }],
            methods: vec![MethodStub {
                name: "fire".to_string(),
                params: vec![TypeRef::Int],
                returns: TypeRef::Int,
                body: StubBody::InvokeField {
                    field: "fire".to_string(),
                },
            }],
            fields: vec![FieldStub {
                name: "fire".to_string(),
                ty: TypeRef::Callable,
            }],
            origin: "demo.Fire".to_string(),
            module: None,
        }
        .encode()
        .unwrap()
    }

    #[test]
    fn test_define_and_unset_field_defaults() {
        let l = loader();
        let class = l.define("weave.proxies.A", &adapter_image("weave.proxies.A")).unwrap();
        assert_eq!(class.loader_id(), Some(l.id()));
        let obj = class.instantiate(&[]).unwrap();
        assert_eq!(obj.invoke("fire", &[HostValue::Int(1)]).unwrap(), HostValue::Int(0));
        assert!(Arc::ptr_eq(&l.resolve("weave.proxies.A").unwrap(), &class));
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let l = loader();
        l.define("weave.proxies.B", &adapter_image("weave.proxies.B")).unwrap();
        let err = l.define("weave.proxies.B", &adapter_image("weave.proxies.B")).unwrap_err();
        assert!(matches!(err, HostError::Linkage(_)));
    }

    #[test]
    fn test_loader_identity_is_type_identity() {
        let (a, b) = (loader(), loader());
        let image = adapter_image("weave.proxies.C");
        let ca = a.define("weave.proxies.C", &image).unwrap();
        let cb = b.define("weave.proxies.C", &image).unwrap();
        assert_ne!(ca.id(), cb.id());
        assert!(!ca.is_assignable_from(&cb));
    }

    #[test]
    fn test_parents_and_discard() {
        let (parent, child) = (loader(), loader());
        parent.define("weave.proxies.D", &adapter_image("weave.proxies.D")).unwrap();
        child.add_parent(Arc::clone(&parent));
        assert!(child.resolve("weave.proxies.D").is_some());

        parent.discard();
        assert!(child.resolve("weave.proxies.D").is_none());
        assert!(parent.define("weave.proxies.E", &adapter_image("weave.proxies.E")).is_err());
    }

    #[test]
    fn test_corrupt_image_rejected() {
        let l = loader();
        let mut image = adapter_image("weave.proxies.F");
        image[20] ^= 0xff;
        let err = l.define("weave.proxies.F", &image).unwrap_err();
        assert!(matches!(err, HostError::MalformedImage(_)));
    }
}
