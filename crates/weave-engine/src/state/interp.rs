//! Interpreter-wide state
//!
//! `InterpreterState` is a process singleton created on first access.
//! `SystemState` is the `sys`-level context a thread runs against; threads
//! share the interpreter's default one unless given their own.

use std::sync::Arc;

use once_cell::sync::OnceCell;
use parking_lot::RwLock;

use crate::builtins;
use crate::object::Namespace;
use crate::proxy::DynamicClassLoader;
use crate::value::Value;

static INTERPRETER: OnceCell<Arc<InterpreterState>> = OnceCell::new();

/// Top-level system context
#[derive(Default)]
pub struct SystemState {
    sys: RwLock<Namespace>,
    class_loader: RwLock<Option<Arc<DynamicClassLoader>>>,
}

impl SystemState {
    /// Empty system state
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a `sys` attribute
    pub fn get(&self, name: &str) -> Option<Value> {
        self.sys.read().get(name).cloned()
    }

    /// Write a `sys` attribute
    pub fn set(&self, name: impl Into<String>, value: Value) {
        self.sys.write().insert(name.into(), value);
    }

    /// Loader override used for proxy synthesis on threads bound to this state
    pub fn class_loader(&self) -> Option<Arc<DynamicClassLoader>> {
        self.class_loader.read().clone()
    }

    /// Install or clear the loader override
    pub fn set_class_loader(&self, loader: Option<Arc<DynamicClassLoader>>) {
        *self.class_loader.write() = loader;
    }
}

impl std::fmt::Debug for SystemState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SystemState")
            .field("sys", &self.sys.read().len())
            .field("class_loader", &self.class_loader.read().as_ref().map(|l| l.id()))
            .finish()
    }
}

/// Process-wide interpreter state
pub struct InterpreterState {
    builtins: RwLock<Namespace>,
    system: Arc<SystemState>,
}

impl InterpreterState {
    /// The singleton, created exactly once even under concurrent first access
    pub fn get() -> Arc<InterpreterState> {
        Arc::clone(INTERPRETER.get_or_init(|| {
            let mut ns = Namespace::default();
            builtins::install(&mut ns);
            tracing::debug!(builtins = ns.len(), "created interpreter state");
            Arc::new(InterpreterState {
                builtins: RwLock::new(ns),
                system: Arc::new(SystemState::new()),
            })
        }))
    }

    /// Look up a builtin
    pub fn builtin(&self, name: &str) -> Option<Value> {
        self.builtins.read().get(name).cloned()
    }

    /// Add or replace a builtin
    pub fn set_builtin(&self, name: impl Into<String>, value: Value) {
        self.builtins.write().insert(name.into(), value);
    }

    /// Names of all builtins
    pub fn builtin_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.builtins.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Default system state
    pub fn system(&self) -> &Arc<SystemState> {
        &self.system
    }
}
