//! Error types raised by the host platform

/// Result type for host operations
pub type HostResult<T> = Result<T, HostError>;

/// Failures surfaced by host classes, objects and the host loader
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum HostError {
    /// A value did not fit the declared host type
    #[error("Type mismatch: expected {expected}, got {got}")]
    TypeMismatch {
        /// Expected type name
        expected: String,
        /// Actual type name
        got: String,
    },

    /// Attempt to instantiate an interface or abstract class
    #[error("Cannot instantiate {0}")]
    Instantiation(String),

    /// An abstract method without an implementation was invoked
    #[error("Abstract method called: {0}")]
    AbstractMethod(String),

    /// Constructor, method or field lookup failed
    #[error("No such member: {0}")]
    NoSuchMember(String),

    /// Write to a final field or similar access violation
    #[error("Illegal access: {0}")]
    IllegalAccess(String),

    /// Exception thrown by host code
    #[error("Host exception: {0}")]
    Thrown(String),

    /// The class backing an operation is no longer loaded
    #[error("Class unloaded: {0}")]
    Unloaded(String),

    /// A proxy object was already paired with a dynamic instance
    #[error("Proxy peer already bound for {0}")]
    PeerAlreadyBound(String),

    /// A synthesized type image failed verification
    #[error("Malformed type image: {0}")]
    MalformedImage(String),

    /// Type definition could not be linked (duplicate name, unresolved reference)
    #[error("Linkage error: {0}")]
    Linkage(String),
}

impl From<String> for HostError {
    fn from(s: String) -> Self {
        HostError::Thrown(s)
    }
}

impl From<&str> for HostError {
    fn from(s: &str) -> Self {
        HostError::Thrown(s.to_string())
    }
}
