//! Attach scopes
//!
//! Every bridge entry runs inside [`scoped`], which registers the current OS
//! thread with the foreign runtime on first use. Threads are never detached:
//! detaching would invalidate local references still held by callers up the
//! stack. Repeated and nested scopes only consult a thread-local set.

use std::cell::RefCell;

use rustc_hash::FxHashSet;
use tether_sdk::ForeignContext;

use crate::error::BridgeResult;

thread_local! {
    /// Runtime ids this thread has attached to
    static ATTACHED: RefCell<FxHashSet<u64>> = RefCell::new(FxHashSet::default());
}

/// Attach the current thread to `ctx`'s runtime if it is not already
pub fn ensure_attached(ctx: &dyn ForeignContext) -> BridgeResult<()> {
    let id = ctx.runtime_id();
    if ATTACHED.with(|attached| attached.borrow().contains(&id)) {
        return Ok(());
    }
    ctx.attach_current_thread()?;
    ATTACHED.with(|attached| attached.borrow_mut().insert(id));
    tracing::debug!(
        runtime = id,
        thread = ?std::thread::current().id(),
        "attached thread to foreign runtime"
    );
    Ok(())
}

/// Run `f` with the current thread attached to `ctx`'s runtime
pub fn scoped<R>(
    ctx: &dyn ForeignContext,
    f: impl FnOnce(&dyn ForeignContext) -> BridgeResult<R>,
) -> BridgeResult<R> {
    ensure_attached(ctx)?;
    f(ctx)
}

/// Whether this thread went through [`ensure_attached`] for `ctx`'s runtime
pub fn is_attached(ctx: &dyn ForeignContext) -> bool {
    let id = ctx.runtime_id();
    ATTACHED.with(|attached| attached.borrow().contains(&id))
}
