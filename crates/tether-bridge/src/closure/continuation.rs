//! One-shot continuation adapter
//!
//! Backs a `bridge/Continuation` handed to a foreign suspending call. The
//! native caller awaits the receiver; the foreign side resolves it once
//! through `resume` or `resumeWithError`, from any thread.

use std::sync::Arc;

use parking_lot::Mutex;
use tether_sdk::names;
use tether_sdk::{ForeignContext, ObjRef};
use tokio::sync::oneshot;

use crate::error::{BridgeError, BridgeResult};
use crate::global::Pinned;
use crate::peer::{wrap_peer, PeerObject};

/// Outcome delivered to the awaiting native task
pub type ContinuationOutcome = BridgeResult<Pinned>;

/// Success/failure pair resolved at most once
pub struct ContinuationAdapter {
    sender: Mutex<Option<oneshot::Sender<ContinuationOutcome>>>,
}

impl ContinuationAdapter {
    /// A new adapter and the receiver it resolves
    pub fn new() -> (Self, oneshot::Receiver<ContinuationOutcome>) {
        let (sender, receiver) = oneshot::channel();
        (
            Self {
                sender: Mutex::new(Some(sender)),
            },
            receiver,
        )
    }

    /// Resolve with a value
    pub fn resume(&self, value: Pinned) -> BridgeResult<()> {
        self.resolve(Ok(value))
    }

    /// Resolve with an error
    pub fn resume_with_error(&self, error: BridgeError) -> BridgeResult<()> {
        self.resolve(Err(error))
    }

    /// Whether a resolution was already delivered
    pub fn is_resolved(&self) -> bool {
        self.sender.lock().is_none()
    }

    fn resolve(&self, outcome: ContinuationOutcome) -> BridgeResult<()> {
        let Some(sender) = self.sender.lock().take() else {
            tracing::warn!("continuation resolved more than once; ignoring");
            return Err(BridgeError::ContinuationResolved);
        };
        if sender.send(outcome).is_err() {
            tracing::debug!("continuation resolved after its caller went away");
        }
        Ok(())
    }

    /// Wrap in a `bridge/Continuation` proxy
    pub(crate) fn into_foreign(self, ctx: &dyn ForeignContext) -> BridgeResult<ObjRef> {
        wrap_peer(
            ctx,
            names::NATIVE_CONTINUATION,
            "(J)V",
            &[],
            Arc::new(PeerObject::Continuation(self)),
        )
    }
}
