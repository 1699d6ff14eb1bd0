//! Error types for the bridge
//!
//! Three channels carry failures:
//!
//! - `BridgeError` values returned from bridge calls
//! - foreign exceptions, thrown into the foreign runtime from native entries
//! - the per-thread pending-error stack, for failures raised while servicing
//!   a foreign callback that cannot throw (finalizers). Every checked call
//!   drains it, see [`check_pending`].

use std::cell::RefCell;
use std::fmt;
use std::sync::Arc;

use tether_sdk::ForeignError;

use crate::global::GlobalRef;

/// Result type for bridge operations
pub type BridgeResult<T> = Result<T, BridgeError>;

/// Errors surfaced by the bridge.
///
/// Cheap to clone; payloads that are not `Clone` live behind `Arc`.
#[derive(Debug, Clone, thiserror::Error)]
pub enum BridgeError {
    /// A foreign call raised an exception
    #[error("{class}: {message}")]
    Foreign {
        /// Class of the throwable
        class: String,
        /// Its message (empty if none)
        message: String,
        /// The throwable itself, pinned for rethrowing
        throwable: Option<Arc<GlobalRef>>,
    },

    /// The call interface failed
    #[error(transparent)]
    Abi(#[from] ForeignError),

    /// A native error with only a description
    #[error("{0}")]
    Message(String),

    /// A native error value
    #[error(transparent)]
    Native(Arc<dyn std::error::Error + Send + Sync>),

    /// Reflective resolution found no applicable member
    #[error("No member {member} on {target} accepting ({arguments})")]
    NoSuchMember {
        /// Class or instance searched
        target: String,
        /// Member name
        member: String,
        /// Description of the supplied arguments
        arguments: String,
    },

    /// A value had the wrong shape for the requested native type
    #[error("Cannot convert {found} to {expected}")]
    Conversion {
        /// Requested type
        expected: String,
        /// What was found
        found: String,
    },

    /// Null where a value was required
    #[error("Unexpected null converting to {0}")]
    UnexpectedNull(String),

    /// A continuation was resolved more than once
    #[error("Continuation already resolved")]
    ContinuationResolved,

    /// The operation was cancelled
    #[error("Cancelled")]
    Cancelled,

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),
}

impl BridgeError {
    /// A native error carrying only `message`
    pub fn msg(message: impl Into<String>) -> Self {
        BridgeError::Message(message.into())
    }

    /// Wrap any native error
    pub fn native(error: impl std::error::Error + Send + Sync + 'static) -> Self {
        BridgeError::Native(Arc::new(error))
    }

    /// Conversion mismatch
    pub fn conversion(expected: impl Into<String>, found: impl Into<String>) -> Self {
        BridgeError::Conversion {
            expected: expected.into(),
            found: found.into(),
        }
    }

    /// Whether this error came from a foreign exception
    pub fn is_foreign(&self) -> bool {
        matches!(self, BridgeError::Foreign { .. })
    }
}

// ============================================================================
// Pending-error stack
// ============================================================================

thread_local! {
    static PENDING: RefCell<Vec<BridgeError>> = const { RefCell::new(Vec::new()) };
}

/// Queue an error raised where it could not be thrown
pub fn push_pending(error: BridgeError) {
    tracing::debug!(error = %error, "queued pending bridge error");
    PENDING.with(|pending| pending.borrow_mut().push(error));
}

/// Take the oldest queued error on this thread. Any later ones are dropped
/// with a warning.
pub fn take_pending() -> Option<BridgeError> {
    let drained: Vec<BridgeError> = PENDING.with(|pending| pending.borrow_mut().drain(..).collect());
    let mut drained = drained.into_iter();
    let first = drained.next();
    for lost in drained {
        tracing::warn!(error = %lost, "pending bridge error lost");
    }
    first
}

/// Re-raise a queued error, if any
pub fn check_pending() -> BridgeResult<()> {
    match take_pending() {
        Some(error) => Err(error),
        None => Ok(()),
    }
}

/// Report a binding error (stale glue, missing class, unconvertible value)
/// and abort
#[track_caller]
pub fn binding_error(message: impl fmt::Display) -> ! {
    tracing::error!(%message, "binding error");
    panic!("binding error: {}", message)
}
