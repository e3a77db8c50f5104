//! Host classes
//!
//! A `HostClass` is the host platform's unit of type identity: constructors,
//! methods and fields with declared types, a single superclass chain and a
//! set of implemented interfaces. Classes are immutable once built, except
//! for static field storage.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::error::{HostError, HostResult};
use crate::object::HostObject;
use crate::reclaim::ReclaimHooks;
use crate::value::{HostType, HostValue};

/// Global counter for class identities
static NEXT_CLASS_ID: AtomicU64 = AtomicU64::new(1);

/// Name of the root class every concrete class descends from
pub const ROOT_CLASS_NAME: &str = "weave.lang.Object";

static ROOT_CLASS: Lazy<Arc<HostClass>> = Lazy::new(|| Arc::new(build_root()));

/// Initializer run against a freshly allocated object
pub type ConstructorInit = Arc<dyn Fn(&HostObject, &[HostValue]) -> HostResult<()> + Send + Sync>;

/// Method implementation. The receiver is `None` for static methods.
pub type MethodBody =
    Arc<dyn Fn(Option<&HostObject>, &[HostValue]) -> HostResult<HostValue> + Send + Sync>;

/// Kind of host class
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassKind {
    /// Instantiable class
    Concrete,
    /// Class that cannot be instantiated directly
    Abstract,
    /// Pure contract; no constructors, no instance fields
    Interface,
}

fn check_args(what: &str, params: &[HostType], args: &[HostValue]) -> HostResult<()> {
    if params.len() != args.len() {
        return Err(HostError::NoSuchMember(format!(
            "{}: expected {} arguments, got {}",
            what,
            params.len(),
            args.len()
        )));
    }
    for (param, arg) in params.iter().zip(args) {
        if !param.accepts(arg) {
            return Err(HostError::TypeMismatch {
                expected: param.name(),
                got: arg.type_name(),
            });
        }
    }
    Ok(())
}

fn accepts_all(params: &[HostType], args: &[HostValue]) -> bool {
    params.len() == args.len() && params.iter().zip(args).all(|(p, a)| p.accepts(a))
}

// ============================================================================
// Members
// ============================================================================

/// Constructor declaration
#[derive(Clone)]
pub struct HostConstructor {
    params: Vec<HostType>,
    is_public: bool,
    init: Option<ConstructorInit>,
}

impl HostConstructor {
    /// Public constructor with no initializer body
    pub fn new(params: Vec<HostType>) -> Self {
        Self {
            params,
            is_public: true,
            init: None,
        }
    }

    /// Attach an initializer
    pub fn with_init<F>(mut self, init: F) -> Self
    where
        F: Fn(&HostObject, &[HostValue]) -> HostResult<()> + Send + Sync + 'static,
    {
        self.init = Some(Arc::new(init));
        self
    }

    /// Attach a shared initializer
    pub fn with_shared_init(mut self, init: ConstructorInit) -> Self {
        self.init = Some(init);
        self
    }

    /// Mark as not publicly accessible
    pub fn private(mut self) -> Self {
        self.is_public = false;
        self
    }

    /// Declared parameter types
    pub fn params(&self) -> &[HostType] {
        &self.params
    }

    /// Whether the constructor is public
    pub fn is_public(&self) -> bool {
        self.is_public
    }

    /// Whether the arguments fit the declared parameters
    pub fn accepts(&self, args: &[HostValue]) -> bool {
        accepts_all(&self.params, args)
    }

    /// Check the arguments, then run the initializer against `obj`
    pub fn run(&self, obj: &HostObject, args: &[HostValue]) -> HostResult<()> {
        check_args("<init>", &self.params, args)?;
        match &self.init {
            Some(init) => init(obj, args),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for HostConstructor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostConstructor")
            .field("params", &self.params)
            .field("is_public", &self.is_public)
            .finish()
    }
}

/// Method declaration
#[derive(Clone)]
pub struct HostMethod {
    name: String,
    params: Vec<HostType>,
    returns: HostType,
    is_static: bool,
    is_public: bool,
    body: Option<MethodBody>,
}

impl HostMethod {
    /// Abstract public instance method
    pub fn new(name: impl Into<String>, params: Vec<HostType>, returns: HostType) -> Self {
        Self {
            name: name.into(),
            params,
            returns,
            is_static: false,
            is_public: true,
            body: None,
        }
    }

    /// Attach an implementation
    pub fn with_body<F>(mut self, body: F) -> Self
    where
        F: Fn(Option<&HostObject>, &[HostValue]) -> HostResult<HostValue> + Send + Sync + 'static,
    {
        self.body = Some(Arc::new(body));
        self
    }

    /// Attach a shared implementation
    pub fn with_shared_body(mut self, body: MethodBody) -> Self {
        self.body = Some(body);
        self
    }

    /// Mark as static
    pub fn as_static(mut self) -> Self {
        self.is_static = true;
        self
    }

    /// Mark as not publicly accessible
    pub fn private(mut self) -> Self {
        self.is_public = false;
        self
    }

    /// Method name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared parameter types
    pub fn params(&self) -> &[HostType] {
        &self.params
    }

    /// Declared return type
    pub fn returns(&self) -> &HostType {
        &self.returns
    }

    /// Whether the method is static
    pub fn is_static(&self) -> bool {
        self.is_static
    }

    /// Whether the method is public
    pub fn is_public(&self) -> bool {
        self.is_public
    }

    /// Whether the method has no implementation
    pub fn is_abstract(&self) -> bool {
        self.body.is_none()
    }

    /// Same name and parameter types
    pub fn same_signature(&self, other: &HostMethod) -> bool {
        self.name == other.name && self.params == other.params
    }

    /// Whether the arguments fit the declared parameters
    pub fn accepts(&self, args: &[HostValue]) -> bool {
        accepts_all(&self.params, args)
    }

    /// Invoke this exact implementation (no virtual lookup)
    pub fn invoke(&self, receiver: Option<&HostObject>, args: &[HostValue]) -> HostResult<HostValue> {
        check_args(&self.name, &self.params, args)?;
        let receiver = if self.is_static {
            None
        } else {
            Some(receiver.ok_or_else(|| {
                HostError::IllegalAccess(format!("instance method {} needs a receiver", self.name))
            })?)
        };
        match &self.body {
            Some(body) => body(receiver, args),
            None => Err(HostError::AbstractMethod(self.name.clone())),
        }
    }
}

impl fmt::Debug for HostMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostMethod")
            .field("name", &self.name)
            .field("params", &self.params)
            .field("returns", &self.returns)
            .field("is_static", &self.is_static)
            .field("is_abstract", &self.is_abstract())
            .finish()
    }
}

/// Field declaration
#[derive(Debug, Clone)]
pub struct HostField {
    name: String,
    ty: HostType,
    is_static: bool,
    is_final: bool,
    is_public: bool,
    initial: Option<HostValue>,
}

impl HostField {
    /// Public mutable instance field
    pub fn new(name: impl Into<String>, ty: HostType) -> Self {
        Self {
            name: name.into(),
            ty,
            is_static: false,
            is_final: false,
            is_public: true,
            initial: None,
        }
    }

    /// Mark as static
    pub fn as_static(mut self) -> Self {
        self.is_static = true;
        self
    }

    /// Mark as final
    pub fn as_final(mut self) -> Self {
        self.is_final = true;
        self
    }

    /// Mark as not publicly accessible
    pub fn private(mut self) -> Self {
        self.is_public = false;
        self
    }

    /// Initial value (static fields only)
    pub fn with_initial(mut self, value: HostValue) -> Self {
        self.initial = Some(value);
        self
    }

    /// Field name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared type
    pub fn ty(&self) -> &HostType {
        &self.ty
    }

    /// Whether the field is static
    pub fn is_static(&self) -> bool {
        self.is_static
    }

    /// Whether the field is final
    pub fn is_final(&self) -> bool {
        self.is_final
    }

    /// Whether the field is public
    pub fn is_public(&self) -> bool {
        self.is_public
    }

    fn initial_value(&self) -> HostValue {
        self.initial
            .clone()
            .unwrap_or_else(|| self.ty.default_value())
    }
}

// ============================================================================
// HostClass
// ============================================================================

/// A loaded host class
pub struct HostClass {
    id: u64,
    name: String,
    kind: ClassKind,
    superclass: Option<Arc<HostClass>>,
    interfaces: Vec<Arc<HostClass>>,
    constructors: Vec<HostConstructor>,
    methods: Vec<HostMethod>,
    fields: Vec<HostField>,
    /// Flattened instance fields, superclass slots first
    layout: Vec<HostField>,
    slot_index: FxHashMap<String, usize>,
    statics: RwLock<Vec<HostValue>>,
    static_index: FxHashMap<String, usize>,
    loader_id: Option<u64>,
    reclaim: ReclaimHooks,
}

impl HostClass {
    /// The root class
    pub fn object() -> Arc<HostClass> {
        Arc::clone(&ROOT_CLASS)
    }

    /// Unique class identity
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Fully qualified name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name without the package prefix
    pub fn simple_name(&self) -> &str {
        self.name.rsplit('.').next().unwrap_or(&self.name)
    }

    /// Class kind
    pub fn kind(&self) -> ClassKind {
        self.kind
    }

    /// Whether this is an interface
    pub fn is_interface(&self) -> bool {
        self.kind == ClassKind::Interface
    }

    /// Whether this is an abstract class
    pub fn is_abstract(&self) -> bool {
        self.kind == ClassKind::Abstract
    }

    /// Whether this is the root class
    pub fn is_root(&self) -> bool {
        self.id == ROOT_CLASS.id
    }

    /// Direct superclass (`None` for the root and for interfaces)
    pub fn superclass(&self) -> Option<&Arc<HostClass>> {
        self.superclass.as_ref()
    }

    /// Directly implemented (or, for interfaces, extended) interfaces
    pub fn interfaces(&self) -> &[Arc<HostClass>] {
        &self.interfaces
    }

    /// Declared constructors in registration order
    pub fn constructors(&self) -> &[HostConstructor] {
        &self.constructors
    }

    /// Methods declared by this class itself
    pub fn declared_methods(&self) -> &[HostMethod] {
        &self.methods
    }

    /// Fields declared by this class itself
    pub fn declared_fields(&self) -> &[HostField] {
        &self.fields
    }

    /// Flattened instance-field layout
    pub fn instance_fields(&self) -> &[HostField] {
        &self.layout
    }

    /// Id of the loader that defined this class (`None` for classpath classes)
    pub fn loader_id(&self) -> Option<u64> {
        self.loader_id
    }

    /// Reclamation hooks fired when the class is dropped
    pub fn reclaim_hooks(&self) -> &ReclaimHooks {
        &self.reclaim
    }

    /// Slot index of an instance field
    pub fn slot_of(&self, name: &str) -> Option<usize> {
        self.slot_index.get(name).copied()
    }

    /// Find a field declared here or inherited, static or instance
    pub fn field(&self, name: &str) -> Option<&HostField> {
        let mut class = Some(self);
        while let Some(c) = class {
            if let Some(f) = c.fields.iter().find(|f| f.name == name) {
                return Some(f);
            }
            class = c.superclass.as_deref();
        }
        self.interfaces.iter().find_map(|i| i.field(name))
    }

    /// Every interface reachable from this class, without duplicates
    pub fn all_interfaces(&self) -> Vec<Arc<HostClass>> {
        let mut out: Vec<Arc<HostClass>> = Vec::new();
        self.collect_interfaces(&mut out);
        out
    }

    fn collect_interfaces(&self, out: &mut Vec<Arc<HostClass>>) {
        for iface in &self.interfaces {
            if !out.iter().any(|i| i.id == iface.id) {
                out.push(Arc::clone(iface));
                iface.collect_interfaces(out);
            }
        }
        if let Some(sup) = &self.superclass {
            sup.collect_interfaces(out);
        }
    }

    /// Whether `self` is `other` or descends from it
    pub fn is_subclass_of(&self, other: &HostClass) -> bool {
        if self.id == other.id {
            return true;
        }
        if let Some(sup) = &self.superclass {
            if sup.is_subclass_of(other) {
                return true;
            }
        }
        self.interfaces.iter().any(|i| i.is_subclass_of(other))
    }

    /// Whether a value of class `other` can be stored where `self` is declared
    pub fn is_assignable_from(&self, other: &HostClass) -> bool {
        self.is_root() || other.is_subclass_of(self)
    }

    /// Methods visible on this class, most-derived first, one per signature
    pub fn visible_methods(&self) -> Vec<HostMethod> {
        let mut out: Vec<HostMethod> = Vec::new();
        let push = |m: &HostMethod, out: &mut Vec<HostMethod>| {
            if !out.iter().any(|o| o.same_signature(m)) {
                out.push(m.clone());
            }
        };
        let mut class = Some(self);
        while let Some(c) = class {
            for m in &c.methods {
                push(m, &mut out);
            }
            class = c.superclass.as_deref();
        }
        for iface in self.all_interfaces() {
            for m in &iface.methods {
                push(m, &mut out);
            }
        }
        out
    }

    /// Virtual lookup: the most-derived method named `name` accepting `args`
    pub fn find_method(&self, name: &str, args: &[HostValue]) -> Option<HostMethod> {
        let mut class = Some(self);
        while let Some(c) = class {
            if let Some(m) = c.methods.iter().find(|m| m.name == name && m.accepts(args)) {
                return Some(m.clone());
            }
            class = c.superclass.as_deref();
        }
        self.all_interfaces().iter().find_map(|i| {
            i.methods
                .iter()
                .find(|m| m.name == name && m.accepts(args))
                .cloned()
        })
    }

    /// The most-derived method with exactly this name and parameter list
    pub fn method_by_signature(&self, name: &str, params: &[HostType]) -> Option<HostMethod> {
        let matches = |m: &&HostMethod| m.name == name && m.params == params;
        let mut class = Some(self);
        while let Some(c) = class {
            if let Some(m) = c.methods.iter().find(matches) {
                return Some(m.clone());
            }
            class = c.superclass.as_deref();
        }
        self.all_interfaces()
            .iter()
            .find_map(|i| i.methods.iter().find(matches).cloned())
    }

    /// Call a static method
    pub fn invoke_static(&self, name: &str, args: &[HostValue]) -> HostResult<HostValue> {
        let method = self
            .find_method(name, args)
            .filter(|m| m.is_static)
            .ok_or_else(|| HostError::NoSuchMember(format!("{}.{}", self.name, name)))?;
        method.invoke(None, args)
    }

    /// Allocate and initialize through the constructor at `index`
    pub fn new_instance(self: &Arc<Self>, index: usize, args: &[HostValue]) -> HostResult<HostObject> {
        if self.kind != ClassKind::Concrete {
            return Err(HostError::Instantiation(self.name.clone()));
        }
        let ctor = self.constructors.get(index).ok_or_else(|| {
            HostError::NoSuchMember(format!("{}.<init>#{}", self.name, index))
        })?;
        check_args(&self.name, &ctor.params, args)?;
        let obj = HostObject::allocate(Arc::clone(self));
        ctor.run(&obj, args)?;
        Ok(obj)
    }

    /// Allocate through the first public constructor accepting `args`
    pub fn instantiate(self: &Arc<Self>, args: &[HostValue]) -> HostResult<HostObject> {
        let index = self
            .constructors
            .iter()
            .position(|c| c.is_public && c.accepts(args))
            .ok_or_else(|| HostError::NoSuchMember(format!("{}.<init>", self.name)))?;
        self.new_instance(index, args)
    }

    /// Read a static field
    pub fn get_static(&self, name: &str) -> HostResult<HostValue> {
        match self.static_index.get(name) {
            Some(&slot) => Ok(self.statics.read()[slot].clone()),
            None => match &self.superclass {
                Some(sup) => sup.get_static(name),
                None => self
                    .interfaces
                    .iter()
                    .find_map(|i| i.get_static(name).ok())
                    .ok_or_else(|| HostError::NoSuchMember(format!("{}.{}", self.name, name))),
            },
        }
    }

    /// Write a static field
    pub fn set_static(&self, name: &str, value: HostValue) -> HostResult<()> {
        let Some(&slot) = self.static_index.get(name) else {
            return match &self.superclass {
                Some(sup) => sup.set_static(name, value),
                None => Err(HostError::NoSuchMember(format!("{}.{}", self.name, name))),
            };
        };
        let field = self
            .fields
            .iter()
            .find(|f| f.is_static && f.name == name)
            .ok_or_else(|| HostError::NoSuchMember(format!("{}.{}", self.name, name)))?;
        if field.is_final {
            return Err(HostError::IllegalAccess(format!("final field {}.{}", self.name, name)));
        }
        if !field.ty.accepts(&value) {
            return Err(HostError::TypeMismatch {
                expected: field.ty.name(),
                got: value.type_name(),
            });
        }
        self.statics.write()[slot] = value;
        Ok(())
    }
}

impl Drop for HostClass {
    fn drop(&mut self) {
        let id = self.id;
        self.reclaim.fire(id);
    }
}

impl fmt::Debug for HostClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostClass")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("kind", &self.kind)
            .finish()
    }
}

fn build_root() -> HostClass {
    let to_string = HostMethod::new("toString", vec![], HostType::Str).with_body(|this, _| {
        Ok(match this {
            Some(obj) => HostValue::from(format!("{}@{:x}", obj.class().name(), obj.id())),
            None => HostValue::Null,
        })
    });
    let hash_code = HostMethod::new("hashCode", vec![], HostType::Int).with_body(|this, _| {
        Ok(HostValue::Int(this.map(|o| o.id() as i32).unwrap_or(0)))
    });
    HostClass {
        id: NEXT_CLASS_ID.fetch_add(1, Ordering::Relaxed),
        name: ROOT_CLASS_NAME.to_string(),
        kind: ClassKind::Concrete,
        superclass: None,
        interfaces: Vec::new(),
        constructors: vec![HostConstructor::new(vec![])],
        methods: vec![to_string, hash_code],
        fields: Vec::new(),
        layout: Vec::new(),
        slot_index: FxHashMap::default(),
        statics: RwLock::new(Vec::new()),
        static_index: FxHashMap::default(),
        loader_id: None,
        reclaim: ReclaimHooks::new(),
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Builder for host classes
pub struct HostClassBuilder {
    name: String,
    kind: ClassKind,
    superclass: Option<Arc<HostClass>>,
    interfaces: Vec<Arc<HostClass>>,
    constructors: Vec<HostConstructor>,
    methods: Vec<HostMethod>,
    fields: Vec<HostField>,
    loader_id: Option<u64>,
}

impl HostClassBuilder {
    /// Start a concrete class
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ClassKind::Concrete,
            superclass: None,
            interfaces: Vec::new(),
            constructors: Vec::new(),
            methods: Vec::new(),
            fields: Vec::new(),
            loader_id: None,
        }
    }

    /// Start an interface
    pub fn interface(name: impl Into<String>) -> Self {
        Self::new(name).kind(ClassKind::Interface)
    }

    /// Set the class kind
    pub fn kind(mut self, kind: ClassKind) -> Self {
        self.kind = kind;
        self
    }

    /// Set the superclass (defaults to the root class)
    pub fn extends(mut self, superclass: Arc<HostClass>) -> Self {
        self.superclass = Some(superclass);
        self
    }

    /// Add an implemented interface
    pub fn implements(mut self, iface: Arc<HostClass>) -> Self {
        self.interfaces.push(iface);
        self
    }

    /// Add a constructor
    pub fn constructor(mut self, ctor: HostConstructor) -> Self {
        self.constructors.push(ctor);
        self
    }

    /// Add a method
    pub fn method(mut self, method: HostMethod) -> Self {
        self.methods.push(method);
        self
    }

    /// Add a field
    pub fn field(mut self, field: HostField) -> Self {
        self.fields.push(field);
        self
    }

    /// Record the defining loader
    pub fn loader(mut self, loader_id: u64) -> Self {
        self.loader_id = Some(loader_id);
        self
    }

    /// Validate and link the class
    pub fn build(self) -> HostResult<Arc<HostClass>> {
        let superclass = match (self.kind, self.superclass) {
            (ClassKind::Interface, Some(_)) => {
                return Err(HostError::Linkage(format!(
                    "interface {} cannot extend a class",
                    self.name
                )));
            }
            (ClassKind::Interface, None) => None,
            (_, Some(sup)) if sup.is_interface() => {
                return Err(HostError::Linkage(format!(
                    "{} cannot extend interface {}",
                    self.name,
                    sup.name()
                )));
            }
            (_, Some(sup)) => Some(sup),
            (_, None) => Some(HostClass::object()),
        };
        if let Some(bad) = self.interfaces.iter().find(|i| !i.is_interface()) {
            return Err(HostError::Linkage(format!(
                "{} is not an interface",
                bad.name()
            )));
        }
        if self.kind == ClassKind::Interface {
            if !self.constructors.is_empty() {
                return Err(HostError::Linkage(format!(
                    "interface {} cannot declare constructors",
                    self.name
                )));
            }
            if self.fields.iter().any(|f| !f.is_static) {
                return Err(HostError::Linkage(format!(
                    "interface {} cannot declare instance fields",
                    self.name
                )));
            }
        }

        let mut layout: Vec<HostField> = superclass
            .as_ref()
            .map(|s| s.layout.clone())
            .unwrap_or_default();
        layout.extend(self.fields.iter().filter(|f| !f.is_static).cloned());
        let mut slot_index = FxHashMap::default();
        for (slot, field) in layout.iter().enumerate() {
            slot_index.insert(field.name.clone(), slot);
        }

        let mut statics = Vec::new();
        let mut static_index = FxHashMap::default();
        for field in self.fields.iter().filter(|f| f.is_static) {
            static_index.insert(field.name.clone(), statics.len());
            statics.push(field.initial_value());
        }

        Ok(Arc::new(HostClass {
            id: NEXT_CLASS_ID.fetch_add(1, Ordering::Relaxed),
            name: self.name,
            kind: self.kind,
            superclass,
            interfaces: self.interfaces,
            constructors: self.constructors,
            methods: self.methods,
            fields: self.fields,
            layout,
            slot_index,
            statics: RwLock::new(statics),
            static_index,
            loader_id: self.loader_id,
            reclaim: ReclaimHooks::new(),
        }))
    }
}
