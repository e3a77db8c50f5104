//! Runtime context
//!
//! `Runtime` is the explicit process-level context every component receives:
//! options, the interpreter singleton, thread states, canonical tables, the
//! host class path and the current dynamic class loader. It also carries the
//! minimal attribute protocol that reflected members and proxies rely on.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use once_cell::sync::OnceCell;
use parking_lot::{Mutex, ReentrantMutex, RwLock};
use weave_sdk::{HostClass, HostClassPath, HostError, HostObject, HostType, HostValue};

use crate::config::RuntimeOptions;
use crate::convert::{from_host, to_host};
use crate::error::{RuntimeError, RuntimeResult};
use crate::object::{
    DynamicClass, DynamicInstance, HostBinding, LazyBinding, Namespace, ProxyBinding,
};
use crate::proxy::{DynamicClassLoader, ProxyRequest, ProxySynthesizer};
use crate::reflect::{reflect_class, CallData};
use crate::state::{InterpreterState, ThreadState, ThreadStateRegistry};
use crate::tables::{select_tables, InternalTables, TableStats};
use crate::value::{BoundMethod, Value};

/// Runtime counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuntimeStats {
    /// Canonical wrappers built by reflection
    pub canonical_built: u64,
    /// Proxy classes synthesized
    pub proxies_synthesized: u64,
    /// Adapter classes synthesized
    pub adapters_synthesized: u64,
    /// Thread states created
    pub threads_created: u64,
    /// Thread states removed by sweeps
    pub threads_swept: u64,
    /// Loader generations discarded
    pub generation: u64,
    /// Table counters
    pub tables: TableStats,
}

#[derive(Default)]
struct Counters {
    canonical_built: AtomicU64,
    proxies: AtomicU64,
    adapters: AtomicU64,
    generation: AtomicU64,
}

struct Shared {
    options: RuntimeOptions,
    interp: Arc<InterpreterState>,
    threads: Arc<ThreadStateRegistry>,
    tables: Arc<dyn InternalTables>,
    classpath: Arc<HostClassPath>,
    synthesizer: ProxySynthesizer,
    loader: RwLock<Arc<DynamicClassLoader>>,
    /// Canonical wrappers being built, one cell per host class id
    pending_canonical: DashMap<u64, Arc<OnceCell<Arc<DynamicClass>>>>,
    lazy_lock: Mutex<()>,
    /// Serializes adapter creation; reentrant because registration calls
    /// into host code
    adapter_lock: ReentrantMutex<()>,
    counters: Counters,
}

/// Shared handle to the runtime context
#[derive(Clone)]
pub struct Runtime(Arc<Shared>);

/// Non-owning runtime handle held by host-side callbacks
#[derive(Clone)]
pub struct WeakRuntime(Weak<Shared>);

impl WeakRuntime {
    /// The runtime, if still alive
    pub fn upgrade(&self) -> Option<Runtime> {
        self.0.upgrade().map(Runtime)
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl Runtime {
    /// Runtime with default options and a fresh class path
    pub fn new() -> Self {
        Self::with_options(RuntimeOptions::default())
    }

    /// Runtime configured from the `WEAVE_*` environment variables
    pub fn from_env() -> Self {
        Self::with_options(RuntimeOptions::from_env())
    }

    /// Runtime with `options` and a fresh class path
    pub fn with_options(options: RuntimeOptions) -> Self {
        Self::with_classpath(options, Arc::new(HostClassPath::new()))
    }

    /// Runtime resolving host classes through `classpath`
    pub fn with_classpath(options: RuntimeOptions, classpath: Arc<HostClassPath>) -> Self {
        let interp = InterpreterState::get();
        let threads = Arc::new(ThreadStateRegistry::new(
            Arc::clone(interp.system()),
            options.thread_sweep_interval,
        ));
        let tables = select_tables(&options.tables);
        let loader = DynamicClassLoader::new(Arc::clone(&classpath), &threads);
        let synthesizer = ProxySynthesizer::new(options.proxy_debug_dir.clone());
        tracing::debug!(
            tables = tables.backing(),
            loader = loader.id(),
            dump = ?options.proxy_debug_dir,
            "created runtime"
        );
        Runtime(Arc::new(Shared {
            options,
            interp,
            threads,
            tables,
            classpath,
            synthesizer,
            loader: RwLock::new(loader),
            pending_canonical: DashMap::new(),
            lazy_lock: Mutex::new(()),
            adapter_lock: ReentrantMutex::new(()),
            counters: Counters::default(),
        }))
    }

    /// Non-owning handle
    pub fn downgrade(&self) -> WeakRuntime {
        WeakRuntime(Arc::downgrade(&self.0))
    }

    /// Creation options
    pub fn options(&self) -> &RuntimeOptions {
        &self.0.options
    }

    /// Interpreter singleton
    pub fn interpreter(&self) -> &Arc<InterpreterState> {
        &self.0.interp
    }

    /// Host class path
    pub fn classpath(&self) -> &Arc<HostClassPath> {
        &self.0.classpath
    }

    /// Canonical tables
    pub fn tables(&self) -> &Arc<dyn InternalTables> {
        &self.0.tables
    }

    /// Thread state registry
    pub fn threads(&self) -> &Arc<ThreadStateRegistry> {
        &self.0.threads
    }

    /// State of the calling thread
    pub fn thread_state(&self) -> Arc<ThreadState> {
        self.0.threads.current()
    }

    /// Fresh call-data buffer for one reflected invocation
    pub fn call_data(&self) -> CallData {
        CallData::with_capacity(self.0.options.call_data_capacity)
    }

    /// Loader used for synthesis: the calling thread's system override, or
    /// the runtime's current generation
    pub fn class_loader(&self) -> Arc<DynamicClassLoader> {
        self.thread_state()
            .system()
            .class_loader()
            .unwrap_or_else(|| Arc::clone(&self.0.loader.read()))
    }

    // ========================================================================
    // Canonical wrappers
    // ========================================================================

    /// The one canonical wrapper of `class`, built on first request.
    ///
    /// Concurrent first requests for the same class build it once; every
    /// caller observes the same wrapper.
    pub fn canonical_wrapper(&self, class: &Arc<HostClass>) -> RuntimeResult<Arc<DynamicClass>> {
        if let Some(wrapper) = self.0.tables.get_canonical(class) {
            return Ok(wrapper);
        }
        let id = class.id();
        let cell = Arc::clone(
            self.0
                .pending_canonical
                .entry(id)
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .value(),
        );
        let result = cell
            .get_or_try_init(|| {
                if let Some(wrapper) = self.0.tables.get_canonical(class) {
                    return Ok(wrapper);
                }
                let built = reflect_class(self, class)?;
                let canonical = self.0.tables.put_canonical_if_absent(class, Arc::clone(&built));
                if Arc::ptr_eq(&canonical, &built) {
                    self.0.counters.canonical_built.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!(class = class.name(), "built canonical wrapper");
                }
                Ok(canonical)
            })
            .cloned();
        self.0
            .pending_canonical
            .remove_if(&id, |_, pending| Arc::ptr_eq(pending, &cell));
        result
    }

    /// Canonical wrapper of the host class registered under `name`
    pub fn host_class(&self, name: &str) -> RuntimeResult<Arc<DynamicClass>> {
        let class = self
            .class_loader()
            .resolve(name)
            .ok_or_else(|| RuntimeError::type_error(format!("no host class named {}", name)))?;
        self.canonical_wrapper(&class)
    }

    /// Placeholder wrapper for a host class known only by name
    pub fn lazy_canonical(&self, name: &str) -> Arc<DynamicClass> {
        let _guard = self.0.lazy_lock.lock();
        if let Some(existing) = self.0.tables.get_lazy(name) {
            return existing;
        }
        let (module, simple) = match name.rsplit_once('.') {
            Some((pkg, simple)) => (Some(pkg.to_string()), simple),
            None => (None, name),
        };
        let placeholder = DynamicClass::new(
            simple,
            module,
            Vec::new(),
            Namespace::default(),
            HostBinding::Lazy(LazyBinding::new(name)),
        );
        self.0.tables.put_lazy(name, Arc::clone(&placeholder));
        tracing::trace!(name, "registered lazy canonical entry");
        placeholder
    }

    /// Resolve a lazy entry: bind its placeholder to the real canonical
    /// wrapper and drop the entry
    pub fn resolve_lazy(&self, name: &str) -> RuntimeResult<Arc<DynamicClass>> {
        let wrapper = self.host_class(name)?;
        let _guard = self.0.lazy_lock.lock();
        if let Some(placeholder) = self.0.tables.remove_lazy(name) {
            if let HostBinding::Lazy(lazy) = placeholder.binding() {
                lazy.resolve_to(Arc::clone(&wrapper));
            }
        }
        Ok(wrapper)
    }

    // ========================================================================
    // Proxies
    // ========================================================================

    /// Nearest real host superclass of a proxy-backed class
    pub fn host_superclass(&self, class: &DynamicClass) -> Option<Arc<HostClass>> {
        class
            .proxy_binding()
            .map(|b| b.superclass().cloned().unwrap_or_else(HostClass::object))
    }

    /// Proxy class of a proxy-backed dynamic class, synthesized on first use
    pub fn proxy_for(&self, class: &Arc<DynamicClass>) -> RuntimeResult<Arc<HostClass>> {
        let binding = class.proxy_binding().ok_or_else(|| {
            RuntimeError::type_error(format!("'{}' does not extend a host type", class.name()))
        })?;
        binding
            .proxy_cell()
            .get_or_try_init(|| self.synthesize_proxy(class, binding))
            .cloned()
    }

    fn synthesize_proxy(&self, class: &Arc<DynamicClass>, binding: &ProxyBinding) -> RuntimeResult<Arc<HostClass>> {
        let superclass = match binding.base_proxy() {
            Some(base) => Some(self.proxy_for(base)?),
            None => binding.superclass().cloned(),
        };
        let mut members = Vec::new();
        collect_members(class, &mut members);
        let loader = self.class_loader();
        let proxy = self.0.synthesizer.synthesize_proxy(
            &loader,
            &ProxyRequest {
                superclass: superclass.as_ref(),
                interfaces: binding.interfaces(),
                class_name: class.name(),
                module: class.module(),
                members: &members,
            },
        )?;
        self.0.counters.proxies.fetch_add(1, Ordering::Relaxed);
        Ok(proxy)
    }

    /// Create a dynamic class.
    ///
    /// Canonical wrappers among `bases` make the class proxy-backed: at most
    /// one may wrap a concrete host class, any number may wrap interfaces.
    /// The module comes from `__module__` in `dict`, else from the calling
    /// frame's globals.
    pub fn make_class(&self, name: &str, bases: Vec<Value>, mut dict: Namespace) -> RuntimeResult<Arc<DynamicClass>> {
        let module = match dict.remove("__module__") {
            Some(Value::Str(m)) => Some(m.to_string()),
            Some(other) => {
                return Err(RuntimeError::type_error(format!(
                    "__module__ must be str, not {}",
                    other.type_name()
                )));
            }
            None => self.thread_state().current_frame().and_then(|f| f.module_name()),
        };

        let mut superclass: Option<Arc<HostClass>> = None;
        let mut interfaces: Vec<Arc<HostClass>> = Vec::new();
        let mut base_proxy: Option<Arc<DynamicClass>> = None;
        let mut resolved = Vec::with_capacity(bases.len());
        for base in bases {
            let Value::Class(base) = base else {
                return Err(RuntimeError::type_error(format!(
                    "bases must be classes, not {}",
                    base.type_name()
                )));
            };
            match base.binding() {
                HostBinding::None => {}
                HostBinding::Canonical(_) | HostBinding::Lazy(_) => {
                    let host = base.host_class().ok_or_else(|| match base.binding() {
                        HostBinding::Lazy(lazy) => RuntimeError::type_error(format!(
                            "host class {} is not resolved yet",
                            lazy.name()
                        )),
                        _ => HostError::Unloaded(base.name().to_string()).into(),
                    })?;
                    if host.is_interface() {
                        if !interfaces.iter().any(|i| i.id() == host.id()) {
                            interfaces.push(host);
                        }
                    } else {
                        set_superclass(name, &mut superclass, host)?;
                    }
                }
                HostBinding::Proxy(proxy) => {
                    if base_proxy.is_some() {
                        return Err(RuntimeError::type_error(format!(
                            "{}: multiple proxy-backed bases",
                            name
                        )));
                    }
                    if let Some(sup) = proxy.superclass() {
                        set_superclass(name, &mut superclass, Arc::clone(sup))?;
                    }
                    base_proxy = Some(Arc::clone(&base));
                }
            }
            resolved.push(base);
        }

        let binding = if superclass.is_some() || !interfaces.is_empty() || base_proxy.is_some() {
            HostBinding::Proxy(ProxyBinding::new(superclass, interfaces, base_proxy))
        } else {
            HostBinding::None
        };
        let class = DynamicClass::new(name, module, resolved, dict, binding);
        tracing::trace!(class = name, proxy_backed = class.is_proxy_backed(), "created dynamic class");
        Ok(class)
    }

    /// Create and initialize an instance of `class`
    pub fn instantiate(&self, class: &Arc<DynamicClass>, args: &[Value], kw_names: &[&str]) -> RuntimeResult<Value> {
        match class.binding() {
            HostBinding::Canonical(_) => {
                return match class.get_local("__init__") {
                    Some(Value::Constructor(ctor)) => ctor.construct_plain(self, args, kw_names),
                    _ => Err(RuntimeError::illegal_state(format!(
                        "cannot instantiate interface {}",
                        class.name()
                    ))),
                };
            }
            HostBinding::Lazy(lazy) => {
                return match lazy.resolved() {
                    Some(wrapper) => self.instantiate(wrapper, args, kw_names),
                    None => Err(RuntimeError::type_error(format!(
                        "host class {} is not resolved yet",
                        lazy.name()
                    ))),
                };
            }
            HostBinding::None | HostBinding::Proxy(_) => {}
        }

        let inst = DynamicInstance::new(Arc::clone(class));
        let value = Value::Instance(Arc::clone(&inst));
        match class.lookup("__init__") {
            Some(init) => {
                let bound = self.bind(init, value.clone());
                self.call(&bound, args, kw_names)?;
            }
            None if !args.is_empty() => {
                return Err(RuntimeError::type_error(format!("{}() takes no arguments", class.name())));
            }
            None => {}
        }
        if class.is_proxy_backed() && inst.host().is_none() {
            self.default_construct(&value)?;
        }
        Ok(value)
    }

    fn default_construct(&self, value: &Value) -> RuntimeResult<()> {
        let Value::Instance(inst) = value else {
            return Ok(());
        };
        let host_super = self.host_superclass(inst.class()).unwrap_or_else(HostClass::object);
        let wrapper = self.canonical_wrapper(&host_super)?;
        match wrapper.get_local("__init__") {
            Some(Value::Constructor(ctor)) => {
                tracing::trace!(class = inst.class().name(), "default-constructing host side");
                ctor.invoke_constructor(self, value, &[], &[]).map(drop)
            }
            _ => Err(RuntimeError::type_error(format!(
                "{} has no accessible constructors",
                host_super.name()
            ))),
        }
    }

    // ========================================================================
    // Attribute protocol
    // ========================================================================

    /// Bind a callable to `receiver`; other values are returned as is
    pub fn bind(&self, value: Value, receiver: Value) -> Value {
        match value {
            Value::Function(_) | Value::Method(_) | Value::Constructor(_) => {
                Value::Bound(Arc::new(BoundMethod { receiver, func: value }))
            }
            other => other,
        }
    }

    /// Read attribute `name` of `target`
    pub fn get_attr(&self, target: &Value, name: &str) -> RuntimeResult<Value> {
        match target {
            Value::Instance(inst) => {
                if name == "__class__" {
                    return Ok(Value::Class(Arc::clone(inst.class())));
                }
                if let Some(v) = inst.get_local(name) {
                    return Ok(v);
                }
                match inst.class().lookup(name) {
                    Some(member) => self.member_get(member, target),
                    None => Err(RuntimeError::no_attribute(inst.class().name(), name)),
                }
            }
            Value::Host(obj) => {
                let wrapper = self.canonical_wrapper(obj.class())?;
                match wrapper.lookup(name) {
                    Some(member) => self.member_get(member, target),
                    None => Err(RuntimeError::no_attribute(obj.class().simple_name(), name)),
                }
            }
            Value::Class(class) => self.class_attr(class, name),
            other => Err(RuntimeError::no_attribute(&other.type_name(), name)),
        }
    }

    fn member_get(&self, member: Value, target: &Value) -> RuntimeResult<Value> {
        match member {
            Value::Field(field) => field.get(Some(target)),
            Value::Event(event) => event.get(self, Some(target)),
            other => Ok(self.bind(other, target.clone())),
        }
    }

    fn class_attr(&self, class: &Arc<DynamicClass>, name: &str) -> RuntimeResult<Value> {
        match name {
            "__name__" => return Ok(Value::str(class.name())),
            "__module__" => return Ok(class.module().map(Value::str).unwrap_or_default()),
            "__bases__" => {
                return Ok(Value::tuple(
                    class.bases().iter().cloned().map(Value::Class).collect(),
                ))
            }
            _ => {}
        }
        match class.lookup(name) {
            Some(Value::Field(field)) => field.get(None),
            Some(Value::Event(event)) => event.get(self, None),
            Some(v) => Ok(v),
            None => Err(RuntimeError::Attribute(format!(
                "type object '{}' has no attribute '{}'",
                class.name(),
                name
            ))),
        }
    }

    /// Write attribute `name` of `target`
    pub fn set_attr(&self, target: &Value, name: &str, value: Value) -> RuntimeResult<()> {
        match target {
            Value::Instance(inst) => match inst.class().lookup(name) {
                Some(Value::Field(field)) => field.set(self, Some(target), &value),
                Some(Value::Event(event)) => event.set(self, Some(target), &value),
                _ => {
                    inst.set_local(name, value);
                    Ok(())
                }
            },
            Value::Host(obj) => {
                let wrapper = self.canonical_wrapper(obj.class())?;
                match wrapper.lookup(name) {
                    Some(Value::Field(field)) => field.set(self, Some(target), &value),
                    Some(Value::Event(event)) => event.set(self, Some(target), &value),
                    _ => Err(RuntimeError::Attribute(format!(
                        "'{}' object attribute '{}' cannot be set",
                        obj.class().simple_name(),
                        name
                    ))),
                }
            }
            Value::Class(class) => {
                let read_only = match class.binding() {
                    HostBinding::Canonical(_) => matches!(name, "__dict__" | "__bases__" | "__name__"),
                    _ => name == "__dict__",
                };
                if read_only {
                    return Err(RuntimeError::illegal_state(format!(
                        "attribute '{}' of '{}' is read-only",
                        name,
                        class.name()
                    )));
                }
                if let Some(Value::Field(field)) = class.lookup(name) {
                    if field.field().is_static() {
                        return field.set(self, None, &value);
                    }
                }
                class.set_local(name, value);
                Ok(())
            }
            other => Err(RuntimeError::Attribute(format!(
                "'{}' object has no writable attribute '{}'",
                other.type_name(),
                name
            ))),
        }
    }

    /// Whether `value` is an instance of `class`, on the dynamic or host side
    pub fn is_instance(&self, value: &Value, class: &DynamicClass) -> bool {
        if let Value::Instance(inst) = value {
            if inst.class().is_subclass(class) {
                return true;
            }
        }
        match (class.host_class(), value.host_object()) {
            (Some(host), Some(obj)) => obj.is_instance_of(&host),
            _ => false,
        }
    }

    // ========================================================================
    // Calls
    // ========================================================================

    /// Call `callee` with positional values followed by keyword values;
    /// `kw_names` names the trailing values
    pub fn call(&self, callee: &Value, args: &[Value], kw_names: &[&str]) -> RuntimeResult<Value> {
        match callee {
            Value::Function(func) => func.call(self, args, kw_names),
            Value::Bound(bound) => match &bound.func {
                Value::Method(method) => method.invoke(self, Some(&bound.receiver), args, kw_names),
                Value::Constructor(ctor) => ctor.invoke_constructor(self, &bound.receiver, args, kw_names),
                func => {
                    let mut full = Vec::with_capacity(args.len() + 1);
                    full.push(bound.receiver.clone());
                    full.extend_from_slice(args);
                    self.call(func, &full, kw_names)
                }
            },
            Value::Method(method) => method.invoke(self, None, args, kw_names),
            Value::Constructor(ctor) => match args.split_first() {
                Some((this @ Value::Instance(inst), rest))
                    if kw_names.len() <= rest.len() && self.host_superclass(inst.class()).is_some() =>
                {
                    ctor.invoke_constructor(self, this, rest, kw_names)
                }
                _ => ctor.construct_plain(self, args, kw_names),
            },
            Value::Class(class) => self.instantiate(class, args, kw_names),
            Value::HostCallable(callable) => {
                if !kw_names.is_empty() {
                    return Err(RuntimeError::invalid_argument("host callables take no keyword arguments"));
                }
                let converted = args
                    .iter()
                    .enumerate()
                    .map(|(i, v)| {
                        to_host(self, v, &HostType::Any).map(|(h, _)| h).ok_or_else(|| {
                            RuntimeError::type_error(format!("argument {} does not convert: {}", i + 1, v.type_name()))
                        })
                    })
                    .collect::<RuntimeResult<Vec<HostValue>>>()?;
                Ok(from_host(callable.call(&converted)?))
            }
            other => Err(RuntimeError::type_error(format!(
                "'{}' object is not callable",
                other.type_name()
            ))),
        }
    }

    // ========================================================================
    // Adapters
    // ========================================================================

    /// Adapter registered on `obj` for `listener`, created and registered
    /// through `add_method` on first use
    pub fn adapter_for(
        &self,
        obj: &HostObject,
        listener: &Arc<HostClass>,
        add_method: &str,
    ) -> RuntimeResult<HostObject> {
        let _guard = self.0.adapter_lock.lock();
        if let Some(adapter) = self.0.tables.get_adapter(obj, listener.name()) {
            return Ok(adapter);
        }
        let class = match self.0.tables.get_adapter_class(listener) {
            Some(class) => class,
            None => {
                let class = self.0.synthesizer.synthesize_adapter(&self.class_loader(), listener)?;
                self.0.counters.adapters.fetch_add(1, Ordering::Relaxed);
                self.0.tables.put_adapter_class(listener, Arc::clone(&class));
                class
            }
        };
        let adapter = class.instantiate(&[])?;
        let register = obj
            .class()
            .method_by_signature(add_method, &[HostType::Object(Arc::clone(listener))])
            .ok_or_else(|| RuntimeError::no_attribute(obj.class().simple_name(), add_method))?;
        register.invoke(Some(obj), &[HostValue::Object(adapter.clone())])?;
        self.0.tables.put_adapter(obj, listener.name(), adapter.clone());
        tracing::debug!(
            object = obj.id(),
            listener = listener.name(),
            adapter = adapter.class().name(),
            "registered event adapter"
        );
        Ok(adapter)
    }

    // ========================================================================
    // Maintenance
    // ========================================================================

    /// Discard the current loader with every type it defined, install a
    /// fresh one and force-clean the tables
    pub fn flush_generation(&self) {
        let fresh = DynamicClassLoader::new(Arc::clone(&self.0.classpath), &self.0.threads);
        let old = std::mem::replace(&mut *self.0.loader.write(), fresh);
        old.discard();
        self.0.tables.force_cleanup();
        let generation = self.0.counters.generation.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::debug!(generation, discarded = old.id(), "flushed loader generation");
    }

    /// Current counters
    pub fn stats(&self) -> RuntimeStats {
        let c = &self.0.counters;
        RuntimeStats {
            canonical_built: c.canonical_built.load(Ordering::Relaxed),
            proxies_synthesized: c.proxies.load(Ordering::Relaxed),
            adapters_synthesized: c.adapters.load(Ordering::Relaxed),
            threads_created: self.0.threads.created(),
            threads_swept: self.0.threads.swept(),
            generation: c.generation.load(Ordering::Relaxed),
            tables: self.0.tables.stats(),
        }
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("tables", &self.0.tables.backing())
            .field("loader", &self.0.loader.read().id())
            .finish()
    }
}

fn set_superclass(name: &str, slot: &mut Option<Arc<HostClass>>, host: Arc<HostClass>) -> RuntimeResult<()> {
    match slot {
        Some(existing) if existing.id() != host.id() => Err(RuntimeError::type_error(format!(
            "{}: multiple concrete host bases ({} and {})",
            name,
            existing.name(),
            host.name()
        ))),
        Some(_) => Ok(()),
        None => {
            *slot = Some(host);
            Ok(())
        }
    }
}

/// Names defined by `class` and its dynamic bases
fn collect_members(class: &DynamicClass, out: &mut Vec<String>) {
    if class.is_canonical() {
        return;
    }
    for name in class.local_names() {
        if !out.contains(&name) {
            out.push(name);
        }
    }
    for base in class.bases() {
        collect_members(base, out);
    }
}
