//! Error types for the call interface

/// Result type for call-interface operations
pub type AbiResult<T> = Result<T, ForeignError>;

/// Failures reported by the call interface itself.
///
/// A Java-style exception raised by foreign code is *not* a `ForeignError`:
/// it is reported through the pending-exception state
/// ([`ForeignContext::exception_occurred`](crate::ForeignContext::exception_occurred)).
#[derive(Debug, Clone, thiserror::Error)]
pub enum ForeignError {
    /// Class lookup by name failed
    #[error("No such class: {0}")]
    NoSuchClass(String),

    /// Method, constructor or field lookup failed
    #[error("No such member: {class}.{name}{signature}")]
    NoSuchMember {
        /// Class searched
        class: String,
        /// Member name
        name: String,
        /// Descriptor searched for
        signature: String,
    },

    /// Value had the wrong kind for the operation
    #[error("Type mismatch: expected {expected}, got {got}")]
    TypeMismatch {
        /// Expected type name
        expected: String,
        /// Actual type name
        got: String,
    },

    /// Reference does not name a live object
    #[error("Invalid reference: #{0}")]
    InvalidReference(u64),

    /// Calling thread has not been attached to the runtime
    #[error("Thread {0} is not attached to the foreign runtime")]
    ThreadNotAttached(String),

    /// Invalid argument
    #[error("Argument error: {0}")]
    ArgumentError(String),

    /// Any other interface failure
    #[error("{0}")]
    AbiError(String),
}

impl From<String> for ForeignError {
    fn from(s: String) -> Self {
        ForeignError::AbiError(s)
    }
}

impl From<&str> for ForeignError {
    fn from(s: &str) -> Self {
        ForeignError::AbiError(s.to_string())
    }
}
