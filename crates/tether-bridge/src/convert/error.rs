//! Errors and throwables
//!
//! Outbound, a `BridgeError` that came from a foreign exception rethrows the
//! original throwable; any other error is wrapped in a `bridge/NativeError`
//! proxy so it comes back unchanged. Inbound, a `NativeError` peer wins, then
//! an installed converter, then a generic [`BridgeError::Foreign`].

use std::sync::{Arc, OnceLock};

use tether_sdk::names;
use tether_sdk::{ForeignContext, ForeignValue, ObjRef};

use super::{expect_object, Bridgeable};
use crate::call::CallExt;
use crate::error::{BridgeError, BridgeResult};
use crate::global::GlobalRef;
use crate::options::ConversionOptions;
use crate::peer::{from_handle, peer_handle, wrap_peer, PeerObject};

/// Custom throwable converter; `None` defers to the generic conversion
pub type ThrowableConverter =
    dyn Fn(&dyn ForeignContext, ObjRef) -> Option<BridgeError> + Send + Sync;

static CONVERTER: OnceLock<Box<ThrowableConverter>> = OnceLock::new();

/// Install the process-wide throwable converter. Returns `false` if one is
/// already installed.
pub fn install_throwable_converter<F>(converter: F) -> bool
where
    F: Fn(&dyn ForeignContext, ObjRef) -> Option<BridgeError> + Send + Sync + 'static,
{
    CONVERTER.set(Box::new(converter)).is_ok()
}

/// Native error for a foreign throwable.
///
/// Safe to call with a pending exception: the throwable is inspected through
/// raw field reads and unchecked calls, and anything they leave pending is
/// cleared.
pub fn error_from_throwable(ctx: &dyn ForeignContext, throwable: ObjRef) -> BridgeError {
    if let Ok(Some(handle)) = peer_handle(ctx, throwable) {
        // SAFETY: peer fields are only written by wrap_peer
        if let Some(peer) = unsafe { from_handle::<PeerObject>(handle) } {
            if let PeerObject::Error(error) = &*peer {
                return error.clone();
            }
        }
    }
    if let Some(converter) = CONVERTER.get() {
        if let Some(error) = converter(ctx, throwable) {
            return error;
        }
    }
    let class = ctx
        .class_of(throwable)
        .and_then(|c| ctx.class_name(c))
        .unwrap_or_else(|_| names::THROWABLE.to_string());
    let message = throwable_message(ctx, throwable).unwrap_or_default();
    let pinned = GlobalRef::new(ctx, throwable).ok().map(Arc::new);
    BridgeError::Foreign {
        class,
        message,
        throwable: pinned,
    }
}

fn throwable_message(ctx: &dyn ForeignContext, throwable: ObjRef) -> Option<String> {
    let class = ctx.class_of(throwable).ok()?;
    let method = ctx.method_id(class, "getMessage", "()Llang/String;").ok()?;
    let result = ctx.call_method(throwable, method, &[]);
    if ctx.exception_occurred().is_some() {
        ctx.exception_clear();
        return None;
    }
    let message = result.ok()?.as_object()?;
    ctx.read_string(message).ok()
}

/// Throwable for `error`, rethrowing the original when there is one
pub fn throwable_for(ctx: &dyn ForeignContext, error: &BridgeError) -> BridgeResult<ObjRef> {
    if let BridgeError::Foreign {
        throwable: Some(original),
        ..
    } = error
    {
        if original.belongs_to(ctx) {
            return Ok(original.obj());
        }
    }
    let message = ctx.new_str(&error.to_string())?;
    wrap_peer(
        ctx,
        names::NATIVE_ERROR,
        "(Llang/String;J)V",
        &[message],
        Arc::new(PeerObject::Error(error.clone())),
    )
}

/// Raise `error` as the pending exception on this thread
pub fn throw_error(ctx: &dyn ForeignContext, error: &BridgeError) {
    match throwable_for(ctx, error) {
        Ok(throwable) => ctx.throw(throwable),
        Err(e) => tracing::error!(error = %error, cause = %e, "cannot raise native error"),
    }
}

impl Bridgeable for BridgeError {
    fn from_foreign(
        ctx: &dyn ForeignContext,
        value: ForeignValue,
        _options: ConversionOptions,
    ) -> BridgeResult<Self> {
        let obj = expect_object(value, "Error")?;
        if !ctx.instance_of(obj, names::THROWABLE)? {
            return Err(super::mismatch(ctx, "Error", obj));
        }
        Ok(error_from_throwable(ctx, obj))
    }

    fn to_foreign(
        self,
        ctx: &dyn ForeignContext,
        _options: ConversionOptions,
    ) -> BridgeResult<ForeignValue> {
        Ok(ForeignValue::Object(throwable_for(ctx, &self)?))
    }
}
