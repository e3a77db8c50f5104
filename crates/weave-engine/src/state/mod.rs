//! Thread and interpreter state

pub mod interp;
pub mod registry;
pub mod thread;

pub use interp::{InterpreterState, SystemState};
pub use registry::ThreadStateRegistry;
pub use thread::{ExceptionInfo, Frame, InitializingGuard, ThreadState};
