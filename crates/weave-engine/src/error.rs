//! Runtime errors
//!
//! Every failure signaled by the engine is a `RuntimeError`. The variant is
//! the machine-checkable category (see [`ErrorKind`]); `Display` is the
//! human-readable message.

use weave_sdk::HostError;

/// Result type for runtime operations
pub type RuntimeResult<T> = Result<T, RuntimeError>;

/// Error category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Bad arity, unknown keyword, missing or unconvertible argument
    InvalidArgument,
    /// No registered signature accepted the arguments
    NoMatchingSignature,
    /// Operation not allowed in the current state
    IllegalState,
    /// Failure surfaced by the host platform
    ForeignInterop,
    /// Value of the wrong kind for the operation
    Type,
    /// Missing attribute
    Attribute,
}

/// Errors raised by the runtime core
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RuntimeError {
    /// Invalid argument
    #[error("{0}")]
    InvalidArgument(String),

    /// No overload accepted the arguments
    #[error("{callable}: no matching signature ({detail})")]
    NoMatchingSignature {
        /// Constructor or method name
        callable: String,
        /// Zero-based index of the argument that failed last, if any
        index: Option<usize>,
        /// Description of the last failure
        detail: String,
    },

    /// Illegal state
    #[error("{0}")]
    IllegalState(String),

    /// Host failure, wrapped
    #[error("host error: {0}")]
    ForeignInterop(#[from] HostError),

    /// Type error
    #[error("{0}")]
    Type(String),

    /// Attribute error
    #[error("{0}")]
    Attribute(String),
}

impl RuntimeError {
    /// Category of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            RuntimeError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            RuntimeError::NoMatchingSignature { .. } => ErrorKind::NoMatchingSignature,
            RuntimeError::IllegalState(_) => ErrorKind::IllegalState,
            RuntimeError::ForeignInterop(_) => ErrorKind::ForeignInterop,
            RuntimeError::Type(_) => ErrorKind::Type,
            RuntimeError::Attribute(_) => ErrorKind::Attribute,
        }
    }

    /// Invalid-argument error
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        RuntimeError::InvalidArgument(msg.into())
    }

    /// Illegal-state error
    pub fn illegal_state(msg: impl Into<String>) -> Self {
        RuntimeError::IllegalState(msg.into())
    }

    /// Type error
    pub fn type_error(msg: impl Into<String>) -> Self {
        RuntimeError::Type(msg.into())
    }

    /// Attribute error for `name` missing on an object described by `owner`
    pub fn no_attribute(owner: &str, name: &str) -> Self {
        RuntimeError::Attribute(format!("'{}' object has no attribute '{}'", owner, name))
    }

    /// No-matching-signature error
    pub fn no_matching_signature(
        callable: impl Into<String>,
        index: Option<usize>,
        detail: impl Into<String>,
    ) -> Self {
        RuntimeError::NoMatchingSignature {
            callable: callable.into(),
            index,
            detail: detail.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_error_is_foreign_interop() {
        let err: RuntimeError = HostError::Thrown("boom".into()).into();
        assert_eq!(err.kind(), ErrorKind::ForeignInterop);
        assert_eq!(err.to_string(), "host error: Host exception: boom");
    }

    #[test]
    fn test_no_matching_signature_message() {
        let err = RuntimeError::no_matching_signature("Point", Some(1), "2nd argument: expected int, got str");
        assert_eq!(err.kind(), ErrorKind::NoMatchingSignature);
        assert!(err.to_string().starts_with("Point: no matching signature"));
    }
}
