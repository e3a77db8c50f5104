//! Per-thread execution state

use std::sync::Arc;
use std::thread::ThreadId;

use parking_lot::{Mutex, RwLock};

use crate::error::{ErrorKind, RuntimeError};
use crate::object::Namespace;
use crate::proxy::PeerLink;
use crate::state::interp::SystemState;
use crate::value::Value;

/// One execution frame
#[derive(Debug)]
pub struct Frame {
    name: String,
    globals: Arc<RwLock<Namespace>>,
}

impl Frame {
    /// Frame for code named `name` running against `globals`
    pub fn new(name: impl Into<String>, globals: Arc<RwLock<Namespace>>) -> Self {
        Self {
            name: name.into(),
            globals,
        }
    }

    /// Code name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Global namespace
    pub fn globals(&self) -> &Arc<RwLock<Namespace>> {
        &self.globals
    }

    /// `__name__` of the global namespace, used as the module of classes
    /// created while this frame runs
    pub fn module_name(&self) -> Option<String> {
        self.globals
            .read()
            .get("__name__")
            .and_then(|v| v.as_str().map(str::to_string))
    }
}

/// Last error recorded on a thread
#[derive(Debug, Clone, PartialEq)]
pub struct ExceptionInfo {
    /// Error category
    pub kind: ErrorKind,
    /// Rendered message
    pub message: String,
    /// Frame names, innermost last
    pub traceback: Vec<String>,
}

/// Execution state of one native thread
pub struct ThreadState {
    thread: ThreadId,
    name: Option<String>,
    frames: Mutex<Vec<Arc<Frame>>>,
    exception: Mutex<Option<ExceptionInfo>>,
    tracefunc: Mutex<Option<Value>>,
    profilefunc: Mutex<Option<Value>>,
    system: RwLock<Arc<SystemState>>,
    initializing: Mutex<Vec<Arc<PeerLink>>>,
}

impl ThreadState {
    pub(crate) fn new(thread: ThreadId, name: Option<String>, system: Arc<SystemState>) -> Self {
        Self {
            thread,
            name,
            frames: Mutex::new(Vec::new()),
            exception: Mutex::new(None),
            tracefunc: Mutex::new(None),
            profilefunc: Mutex::new(None),
            system: RwLock::new(system),
            initializing: Mutex::new(Vec::new()),
        }
    }

    /// Owning thread
    pub fn thread_id(&self) -> ThreadId {
        self.thread
    }

    /// Owning thread's name, if it had one
    pub fn thread_name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    // ========================================================================
    // Frames
    // ========================================================================

    /// Enter a frame
    pub fn push_frame(&self, frame: Frame) -> Arc<Frame> {
        let frame = Arc::new(frame);
        self.frames.lock().push(Arc::clone(&frame));
        frame
    }

    /// Leave the innermost frame
    pub fn pop_frame(&self) -> Option<Arc<Frame>> {
        self.frames.lock().pop()
    }

    /// Innermost frame
    pub fn current_frame(&self) -> Option<Arc<Frame>> {
        self.frames.lock().last().cloned()
    }

    /// Number of active frames
    pub fn depth(&self) -> usize {
        self.frames.lock().len()
    }

    // ========================================================================
    // Exceptions and hooks
    // ========================================================================

    /// Record `err` as this thread's current exception
    pub fn set_exception(&self, err: &RuntimeError) {
        let traceback = self.frames.lock().iter().map(|f| f.name.clone()).collect();
        *self.exception.lock() = Some(ExceptionInfo {
            kind: err.kind(),
            message: err.to_string(),
            traceback,
        });
    }

    /// Current exception, if any
    pub fn exception(&self) -> Option<ExceptionInfo> {
        self.exception.lock().clone()
    }

    /// Take and clear the current exception
    pub fn take_exception(&self) -> Option<ExceptionInfo> {
        self.exception.lock().take()
    }

    /// Installed trace function
    pub fn tracefunc(&self) -> Option<Value> {
        self.tracefunc.lock().clone()
    }

    /// Install or clear the trace function
    pub fn set_tracefunc(&self, func: Option<Value>) {
        *self.tracefunc.lock() = func;
    }

    /// Installed profile function
    pub fn profilefunc(&self) -> Option<Value> {
        self.profilefunc.lock().clone()
    }

    /// Install or clear the profile function
    pub fn set_profilefunc(&self, func: Option<Value>) {
        *self.profilefunc.lock() = func;
    }

    // ========================================================================
    // System state
    // ========================================================================

    /// System state this thread runs against
    pub fn system(&self) -> Arc<SystemState> {
        Arc::clone(&self.system.read())
    }

    /// Switch to another system state
    pub fn set_system(&self, system: Arc<SystemState>) {
        *self.system.write() = system;
    }

    pub(crate) fn has_system(&self, system: &Arc<SystemState>) -> bool {
        Arc::ptr_eq(&self.system.read(), system)
    }

    // ========================================================================
    // Proxy construction
    // ========================================================================

    /// Mark `link`'s instance as under construction on this thread until
    /// the returned guard drops
    pub fn push_initializing(self: &Arc<Self>, link: Arc<PeerLink>) -> InitializingGuard {
        let mut stack = self.initializing.lock();
        let depth = stack.len();
        stack.push(link);
        InitializingGuard {
            state: Arc::clone(self),
            depth,
        }
    }

    /// Innermost instance under construction
    pub fn initializing(&self) -> Option<Arc<PeerLink>> {
        self.initializing.lock().last().cloned()
    }
}

impl std::fmt::Debug for ThreadState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadState")
            .field("thread", &self.thread)
            .field("name", &self.name)
            .field("depth", &self.depth())
            .finish()
    }
}

/// Clears an under-construction marker when dropped, on every exit path
#[must_use = "the marker is cleared as soon as the guard drops"]
pub struct InitializingGuard {
    state: Arc<ThreadState>,
    depth: usize,
}

impl Drop for InitializingGuard {
    fn drop(&mut self) {
        self.state.initializing.lock().truncate(self.depth);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::{DynamicClass, DynamicInstance, HostBinding};
    use crate::runtime::Runtime;

    fn state() -> Arc<ThreadState> {
        Arc::new(ThreadState::new(
            std::thread::current().id(),
            None,
            Arc::new(SystemState::new()),
        ))
    }

    #[test]
    fn test_frames_and_module_name() {
        let ts = state();
        assert!(ts.current_frame().is_none());
        let mut globals = Namespace::default();
        globals.insert("__name__".into(), Value::str("app.models"));
        ts.push_frame(Frame::new("<module>", Arc::new(RwLock::new(globals))));
        ts.push_frame(Frame::new("build", Arc::new(RwLock::new(Namespace::default()))));
        assert_eq!(ts.depth(), 2);
        assert_eq!(ts.current_frame().unwrap().module_name(), None);
        ts.pop_frame();
        assert_eq!(ts.current_frame().unwrap().module_name().as_deref(), Some("app.models"));
    }

    #[test]
    fn test_exception_records_traceback() {
        let ts = state();
        ts.push_frame(Frame::new("outer", Arc::new(RwLock::new(Namespace::default()))));
        ts.set_exception(&RuntimeError::illegal_state("bad"));
        let info = ts.take_exception().unwrap();
        assert_eq!(info.kind, ErrorKind::IllegalState);
        assert_eq!(info.traceback, vec!["outer".to_string()]);
        assert!(ts.exception().is_none());
    }

    #[test]
    fn test_initializing_guard_restores_depth() {
        let rt = Runtime::new();
        let ts = state();
        let class = DynamicClass::new("C", None, vec![], Namespace::default(), HostBinding::None);
        let (a, b) = (DynamicInstance::new(Arc::clone(&class)), DynamicInstance::new(class));

        let outer = ts.push_initializing(Arc::new(PeerLink::new(&a, &rt)));
        {
            let _inner = ts.push_initializing(Arc::new(PeerLink::new(&b, &rt)));
            assert_eq!(ts.initializing().unwrap().instance_id(), b.id());
        }
        assert_eq!(ts.initializing().unwrap().instance_id(), a.id());
        drop(outer);
        assert!(ts.initializing().is_none());
    }
}
