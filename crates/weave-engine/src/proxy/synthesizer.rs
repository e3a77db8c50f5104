//! Proxy and adapter synthesis
//!
//! Builds a `TypeDescriptor` for a dynamic class's host contract (or for a
//! listener interface), encodes it into an image and defines it through a
//! `DynamicClassLoader`. Every call produces a new type; callers cache.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use weave_sdk::{HostClass, HostError, HostMethod, HostType};

use crate::defaults::{PROXY_PACKAGE, TYPE_IMAGE_EXTENSION};
use crate::error::{RuntimeError, RuntimeResult};
use crate::proxy::descriptor::{
    ConstructorStub, DescriptorKind, Fallback, FieldStub, MethodStub, StubBody, TypeDescriptor, TypeRef,
};
use crate::proxy::loader::DynamicClassLoader;

/// Global counter for synthesized type names
static NEXT_PROXY_ID: AtomicU64 = AtomicU64::new(1);

/// Host contract of a proxy to synthesize
#[derive(Debug, Clone)]
pub struct ProxyRequest<'a> {
    /// Superclass to extend (`None` means the root class)
    pub superclass: Option<&'a Arc<HostClass>>,
    /// Interfaces to implement
    pub interfaces: &'a [Arc<HostClass>],
    /// Dynamic class name
    pub class_name: &'a str,
    /// Dynamic class module
    pub module: Option<&'a str>,
    /// Names defined by the dynamic class and its dynamic bases
    pub members: &'a [String],
}

/// Synthesizer for proxy and adapter types
#[derive(Debug, Default)]
pub struct ProxySynthesizer {
    debug_dir: Option<PathBuf>,
}

impl ProxySynthesizer {
    /// Create a synthesizer, dumping images to `debug_dir` when set
    pub fn new(debug_dir: Option<PathBuf>) -> Self {
        Self { debug_dir }
    }

    /// Directory images are dumped to
    pub fn debug_dir(&self) -> Option<&PathBuf> {
        self.debug_dir.as_ref()
    }

    fn unique_name(simple: &str) -> String {
        let n = NEXT_PROXY_ID.fetch_add(1, Ordering::Relaxed);
        format!("{}.{}${}", PROXY_PACKAGE, simple, n)
    }

    /// Synthesize a proxy class for a dynamic class's host contract
    pub fn synthesize_proxy(
        &self,
        loader: &DynamicClassLoader,
        request: &ProxyRequest<'_>,
    ) -> RuntimeResult<Arc<HostClass>> {
        let superclass = match request.superclass {
            Some(sup) if sup.is_interface() => {
                return Err(RuntimeError::type_error(format!(
                    "cannot extend interface {} as a superclass",
                    sup.name()
                )));
            }
            Some(sup) => Arc::clone(sup),
            None => HostClass::object(),
        };
        if let Some(bad) = request.interfaces.iter().find(|i| !i.is_interface()) {
            return Err(RuntimeError::type_error(format!(
                "{} is not an interface",
                bad.name()
            )));
        }

        let name = Self::unique_name(request.class_name);
        let mut referents: Vec<Arc<HostClass>> = vec![Arc::clone(&superclass)];
        referents.extend(request.interfaces.iter().cloned());

        let constructors = superclass
            .constructors()
            .iter()
            .enumerate()
            .map(|(i, c)| ConstructorStub {
                params: type_refs(c.params(), &mut referents),
                super_index: i,
            })
            .collect::<Vec<_>>();

        let mut candidates: Vec<HostMethod> = Vec::new();
        let inherited = superclass
            .visible_methods()
            .into_iter()
            .chain(request.interfaces.iter().flat_map(|i| i.visible_methods()));
        for m in inherited {
            if m.is_static() || !m.is_public() || candidates.iter().any(|c| c.same_signature(&m)) {
                continue;
            }
            candidates.push(m);
        }
        let methods = candidates
            .iter()
            .filter(|m| m.is_abstract() || request.members.iter().any(|n| n == m.name()))
            .map(|m| MethodStub {
                name: m.name().to_string(),
                params: type_refs(m.params(), &mut referents),
                returns: type_ref(m.returns(), &mut referents),
                body: StubBody::ForwardToPeer {
                    fallback: if m.is_abstract() {
                        Fallback::Abstract
                    } else {
                        Fallback::Super
                    },
                },
            })
            .collect::<Vec<_>>();

        let desc = TypeDescriptor {
            name: name.clone(),
            kind: DescriptorKind::Proxy,
            superclass: Some(superclass.name().to_string()),
            interfaces: request.interfaces.iter().map(|i| i.name().to_string()).collect(),
            constructors,
            methods,
            fields: Vec::new(),
            origin: request.class_name.to_string(),
            module: request.module.map(str::to_string),
        };
        let class = self.define(loader, &desc, &referents)?;
        tracing::debug!(
            proxy = %name,
            class = request.class_name,
            superclass = superclass.name(),
            stubs = desc.methods.len(),
            "synthesized proxy"
        );
        Ok(class)
    }

    /// Synthesize an adapter forwarding each method of `listener` to a
    /// same-named callable field
    pub fn synthesize_adapter(
        &self,
        loader: &DynamicClassLoader,
        listener: &Arc<HostClass>,
    ) -> RuntimeResult<Arc<HostClass>> {
        if !listener.is_interface() {
            return Err(RuntimeError::type_error(format!(
                "{} is not a listener interface",
                listener.name()
            )));
        }
        let name = format!(
            "{}.{}$Adapter${}",
            PROXY_PACKAGE,
            listener.simple_name(),
            NEXT_PROXY_ID.fetch_add(1, Ordering::Relaxed)
        );
        let mut referents = vec![Arc::clone(listener)];
        let mut fields: Vec<FieldStub> = Vec::new();
        let mut methods: Vec<MethodStub> = Vec::new();
        for m in listener.visible_methods().iter().filter(|m| !m.is_static()) {
            if !fields.iter().any(|f| f.name == m.name()) {
                fields.push(FieldStub {
                    name: m.name().to_string(),
                    ty: TypeRef::Callable,
                });
            }
            methods.push(MethodStub {
                name: m.name().to_string(),
                params: type_refs(m.params(), &mut referents),
                returns: type_ref(m.returns(), &mut referents),
                body: StubBody::InvokeField {
                    field: m.name().to_string(),
                },
            });
        }

        let desc = TypeDescriptor {
            name: name.clone(),
            kind: DescriptorKind::Adapter,
            superclass: None,
            interfaces: vec![listener.name().to_string()],
            constructors: vec![ConstructorStub {
                params: Vec::new(),
                super_index: 0,
            }],
            methods,
            fields,
            origin: listener.name().to_string(),
            module: None,
        };
        let class = self.define(loader, &desc, &referents)?;
        tracing::debug!(adapter = %name, listener = listener.name(), "synthesized adapter");
        Ok(class)
    }

    fn define(
        &self,
        loader: &DynamicClassLoader,
        desc: &TypeDescriptor,
        referents: &[Arc<HostClass>],
    ) -> RuntimeResult<Arc<HostClass>> {
        let image = desc
            .encode()
            .map_err(|e| HostError::MalformedImage(e.to_string()))?;
        self.dump(&desc.name, &image);
        Ok(loader.define_with_referents(&desc.name, &image, referents)?)
    }

    fn dump(&self, name: &str, image: &[u8]) {
        let Some(dir) = &self.debug_dir else {
            return;
        };
        let path = dir.join(format!("{}.{}", name, TYPE_IMAGE_EXTENSION));
        let written = std::fs::create_dir_all(dir).and_then(|_| std::fs::write(&path, image));
        match written {
            Ok(()) => tracing::trace!(path = %path.display(), "dumped type image"),
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "failed to dump type image"),
        }
    }
}

fn type_ref(ty: &HostType, referents: &mut Vec<Arc<HostClass>>) -> TypeRef {
    if let HostType::Object(class) = ty {
        if !referents.iter().any(|r| r.id() == class.id()) {
            referents.push(Arc::clone(class));
        }
    }
    TypeRef::of(ty)
}

fn type_refs(tys: &[HostType], referents: &mut Vec<Arc<HostClass>>) -> Vec<TypeRef> {
    tys.iter().map(|t| type_ref(t, referents)).collect()
}
