//! Peer handles
//!
//! A native object handed to the foreign runtime is retained once and its
//! address stored in the proxy's `peer:J` field. The proxy's finalizer
//! (`Peer.release`) balances that retain. Handles are opaque to the foreign
//! side; `0` means no object.
//!
//! # Safety
//!
//! [`from_handle`], [`retain`] and [`release`] trust that the handle was
//! produced by [`to_handle`] for the same `T` and that the object is still
//! retained. Inside this crate, the only producer of handles stored in
//! foreign objects is [`wrap_peer`], always with `T = PeerObject`.

use std::sync::Arc;

use tether_sdk::names;
use tether_sdk::{ForeignContext, ForeignValue, ObjRef};

use crate::call::CallExt;
use crate::closure::{AsyncClosureBox, ClosureBox, ContinuationAdapter};
use crate::convert::object::BridgedInstance;
use crate::error::{BridgeError, BridgeResult};
use crate::stream::StreamDataSource;

/// Opaque 64-bit handle to a retained native object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PeerHandle(i64);

impl PeerHandle {
    /// No object
    pub const NULL: PeerHandle = PeerHandle(0);

    /// From the raw field value
    pub const fn from_raw(raw: i64) -> Self {
        Self(raw)
    }

    /// Raw field value
    pub const fn raw(self) -> i64 {
        self.0
    }

    /// Whether this is [`PeerHandle::NULL`]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }
}

/// Handle for `object`. With `retain`, the strong count is incremented and
/// must be balanced by [`release`].
pub fn to_handle<T>(object: Option<&Arc<T>>, retain: bool) -> PeerHandle {
    match object {
        None => PeerHandle::NULL,
        Some(object) => {
            let ptr = if retain {
                Arc::into_raw(Arc::clone(object))
            } else {
                Arc::as_ptr(object)
            };
            PeerHandle(ptr as usize as i64)
        }
    }
}

/// Borrow the object behind a handle as a new `Arc`
///
/// # Safety
///
/// `handle` must come from [`to_handle`] for an `Arc<T>` that is still
/// retained.
pub unsafe fn from_handle<T>(handle: PeerHandle) -> Option<Arc<T>> {
    if handle.is_null() {
        return None;
    }
    let ptr = handle.0 as usize as *const T;
    // SAFETY: the caller guarantees the pointer came from Arc::into_raw /
    // Arc::as_ptr and the allocation is alive.
    unsafe {
        Arc::increment_strong_count(ptr);
        Some(Arc::from_raw(ptr))
    }
}

/// Add one retain
///
/// # Safety
///
/// Same as [`from_handle`].
pub unsafe fn retain<T>(handle: PeerHandle) {
    if !handle.is_null() {
        // SAFETY: see from_handle
        unsafe { Arc::increment_strong_count(handle.0 as usize as *const T) };
    }
}

/// Drop one retain
///
/// # Safety
///
/// Same as [`from_handle`], and the retain being dropped must exist.
pub unsafe fn release<T>(handle: PeerHandle) {
    if !handle.is_null() {
        // SAFETY: see from_handle
        unsafe { Arc::decrement_strong_count(handle.0 as usize as *const T) };
    }
}

// ============================================================================
// Peer objects
// ============================================================================

/// Native state behind a foreign proxy
pub enum PeerObject {
    /// `bridge/ClosureN`
    Closure(ClosureBox),
    /// `bridge/AsyncClosureN`
    AsyncClosure(AsyncClosureBox),
    /// `bridge/Continuation`
    Continuation(ContinuationAdapter),
    /// `bridge/Stream`, `bridge/ThrowingStream`
    Stream(StreamDataSource),
    /// `bridge/NativeError`
    Error(BridgeError),
    /// `bridge/NativeObject` and registered subclasses
    Object(BridgedInstance),
}

impl PeerObject {
    /// Short kind name for diagnostics
    pub fn kind(&self) -> &'static str {
        match self {
            PeerObject::Closure(_) => "closure",
            PeerObject::AsyncClosure(_) => "async closure",
            PeerObject::Continuation(_) => "continuation",
            PeerObject::Stream(_) => "stream",
            PeerObject::Error(_) => "error",
            PeerObject::Object(_) => "object",
        }
    }

    /// Text for the proxy's `toString()`
    pub fn describe(&self) -> String {
        match self {
            PeerObject::Closure(closure) => closure.describe(),
            PeerObject::AsyncClosure(closure) => closure.describe(),
            PeerObject::Continuation(_) => "native continuation".to_string(),
            PeerObject::Stream(source) => source.describe(),
            PeerObject::Error(error) => error.to_string(),
            PeerObject::Object(instance) => instance.describe(),
        }
    }
}

/// Construct a proxy of `class` around `peer`.
///
/// The constructor receives `leading` followed by the retained handle. If
/// construction fails the retain is dropped again.
pub fn wrap_peer(
    ctx: &dyn ForeignContext,
    class: &str,
    sig: &str,
    leading: &[ForeignValue],
    peer: Arc<PeerObject>,
) -> BridgeResult<ObjRef> {
    let handle = to_handle(Some(&peer), true);
    let mut args = Vec::with_capacity(leading.len() + 1);
    args.extend_from_slice(leading);
    args.push(ForeignValue::Long(handle.raw()));
    match ctx.construct(class, sig, &args) {
        Ok(obj) => {
            tracing::debug!(class, kind = peer.kind(), handle = handle.raw(), "peer proxy created");
            Ok(obj)
        }
        Err(e) => {
            // SAFETY: retained just above and never stored
            unsafe { release::<PeerObject>(handle) };
            Err(e)
        }
    }
}

/// Peer handle stored in `obj`, read directly from the field so it can be
/// used while an exception is pending
pub(crate) fn peer_handle(ctx: &dyn ForeignContext, obj: ObjRef) -> BridgeResult<Option<PeerHandle>> {
    if !ctx.instance_of(obj, names::PEER_BRIDGED)? {
        return Ok(None);
    }
    let class = ctx.class_of(obj)?;
    let field = match ctx.field_id(class, names::PEER_FIELD, "J") {
        Ok(field) => field,
        Err(_) => return Ok(None),
    };
    match ctx.get_field(obj, field)? {
        ForeignValue::Long(raw) if raw != 0 => Ok(Some(PeerHandle::from_raw(raw))),
        _ => Ok(None),
    }
}

/// Native peer of `obj`, if it is a bridge proxy
pub fn peer_of(ctx: &dyn ForeignContext, obj: ObjRef) -> BridgeResult<Option<Arc<PeerObject>>> {
    let Some(handle) = peer_handle(ctx, obj)? else {
        return Ok(None);
    };
    // SAFETY: peer fields are only written by wrap_peer
    Ok(unsafe { from_handle::<PeerObject>(handle) })
}

/// Balance the retain held by `obj` and clear its handle. Streams are
/// cancelled first.
pub(crate) fn release_peer(ctx: &dyn ForeignContext, obj: ObjRef) -> BridgeResult<()> {
    let Some(handle) = peer_handle(ctx, obj)? else {
        return Ok(());
    };
    ctx.set_field_value(obj, names::PEER_FIELD, "J", ForeignValue::Long(PeerHandle::NULL.raw()))?;
    // SAFETY: peer fields are only written by wrap_peer
    if let Some(peer) = unsafe { from_handle::<PeerObject>(handle) } {
        if let PeerObject::Stream(source) = &*peer {
            source.cancel();
        }
        tracing::debug!(kind = peer.kind(), handle = handle.raw(), "peer released");
    }
    // SAFETY: balances the retain taken in wrap_peer
    unsafe { release::<PeerObject>(handle) };
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_handle() {
        assert!(to_handle::<u32>(None, true).is_null());
        assert!(unsafe { from_handle::<u32>(PeerHandle::NULL) }.is_none());
    }

    #[test]
    fn test_retain_release_balance() {
        let object = Arc::new(42u32);
        let handle = to_handle(Some(&object), true);
        assert_eq!(Arc::strong_count(&object), 2);

        for _ in 0..3 {
            unsafe { retain::<u32>(handle) };
        }
        assert_eq!(Arc::strong_count(&object), 5);
        for _ in 0..3 {
            unsafe { release::<u32>(handle) };
        }
        assert_eq!(Arc::strong_count(&object), 2);

        let borrowed = unsafe { from_handle::<u32>(handle) }.unwrap();
        assert_eq!(*borrowed, 42);
        drop(borrowed);

        unsafe { release::<u32>(handle) };
        assert_eq!(Arc::strong_count(&object), 1);
    }

    #[test]
    fn test_unretained_handle_identity() {
        let object = Arc::new(String::from("peer"));
        let a = to_handle(Some(&object), false);
        let b = to_handle(Some(&object), false);
        assert_eq!(a, b);
        assert_eq!(Arc::strong_count(&object), 1);
    }
}
