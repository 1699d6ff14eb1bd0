//! Native entry points
//!
//! The support classes declare their native methods by entry name. A host
//! links them against [`entry_points`] when it loads those classes. Every
//! entry attaches the calling thread, and a failing entry raises the error
//! as the pending foreign exception and returns `Null`.

use tether_sdk::names;
use tether_sdk::{ForeignContext, ForeignValue, NativeEntryRegistry, ObjRef};

use crate::attach;
use crate::call::CallExt;
use crate::closure::{arg, invoke_async_closure};
use crate::convert::error::{error_from_throwable, throw_error};
use crate::convert::expect_object;
use crate::error::{push_pending, BridgeError, BridgeResult};
use crate::global::Pinned;
use crate::peer::{peer_of, release_peer, PeerObject};
use crate::stream::{cancel_stream, collect_stream};

type Entry = fn(&dyn ForeignContext, &[ForeignValue]) -> BridgeResult<ForeignValue>;

/// Run `entry`, turning an error into a pending foreign exception
fn guarded(name: &str, entry: Entry, ctx: &dyn ForeignContext, args: &[ForeignValue]) -> ForeignValue {
    match attach::scoped(ctx, |ctx| entry(ctx, args)) {
        Ok(value) => value,
        Err(error) => {
            tracing::debug!(entry = name, error = %error, "native entry failed");
            throw_error(ctx, &error);
            ForeignValue::Null
        }
    }
}

fn register(registry: &mut NativeEntryRegistry, name: String, entry: Entry) {
    let label = name.clone();
    registry.register(&name, move |ctx, args| guarded(&label, entry, ctx, args));
}

/// All native entry points of the support classes
pub fn entry_points() -> NativeEntryRegistry {
    let mut registry = NativeEntryRegistry::new();

    let closures: [Entry; names::MAX_ARITY + 1] = [
        |ctx, args| invoke_closure(ctx, 0, args),
        |ctx, args| invoke_closure(ctx, 1, args),
        |ctx, args| invoke_closure(ctx, 2, args),
        |ctx, args| invoke_closure(ctx, 3, args),
        |ctx, args| invoke_closure(ctx, 4, args),
        |ctx, args| invoke_closure(ctx, 5, args),
    ];
    let async_closures: [Entry; names::MAX_ARITY + 1] = [
        |ctx, args| invoke_async_closure(ctx, 0, args),
        |ctx, args| invoke_async_closure(ctx, 1, args),
        |ctx, args| invoke_async_closure(ctx, 2, args),
        |ctx, args| invoke_async_closure(ctx, 3, args),
        |ctx, args| invoke_async_closure(ctx, 4, args),
        |ctx, args| invoke_async_closure(ctx, 5, args),
    ];
    for (arity, (sync, suspend)) in closures.into_iter().zip(async_closures).enumerate() {
        register(&mut registry, names::closure_invoke_entry(arity), sync);
        register(&mut registry, names::async_closure_invoke_entry(arity), suspend);
    }

    // Finalizers must not raise; failures wait for the next checked call
    registry.register(names::ENTRY_PEER_RELEASE, |ctx, args| {
        let released = attach::scoped(ctx, |ctx| {
            let this = expect_object(arg(args, 0)?, names::PEER_BRIDGED)?;
            release_peer(ctx, this)
        });
        if let Err(e) = released {
            tracing::warn!(error = %e, "peer release failed");
            push_pending(e);
        }
        ForeignValue::Null
    });

    register(&mut registry, names::ENTRY_PEER_DESCRIBE.to_string(), describe_peer);
    register(&mut registry, names::ENTRY_CONTINUATION_RESUME.to_string(), resume);
    register(
        &mut registry,
        names::ENTRY_CONTINUATION_RESUME_WITH_ERROR.to_string(),
        resume_with_error,
    );
    register(&mut registry, names::ENTRY_STREAM_COLLECT.to_string(), collect_stream);
    register(&mut registry, names::ENTRY_STREAM_CANCEL.to_string(), cancel_stream);

    tracing::debug!(count = registry.len(), "native entry points registered");
    registry
}

// ============================================================================
// Entries
// ============================================================================

/// `Closure{N}.invoke`: `args` is `[this, a1..aN]`
fn invoke_closure(ctx: &dyn ForeignContext, arity: usize, args: &[ForeignValue]) -> BridgeResult<ForeignValue> {
    let class = names::closure_class(arity);
    let this = expect_object(arg(args, 0)?, &class)?;
    let peer = peer_of(ctx, this)?.ok_or_else(|| BridgeError::UnexpectedNull(class.clone()))?;
    match &*peer {
        PeerObject::Closure(closure) => closure.invoke(ctx, &args[1..]),
        other => Err(BridgeError::conversion(class, other.kind())),
    }
}

fn describe_peer(ctx: &dyn ForeignContext, args: &[ForeignValue]) -> BridgeResult<ForeignValue> {
    let this = expect_object(arg(args, 0)?, names::PEER_BRIDGED)?;
    let text = match peer_of(ctx, this)? {
        Some(peer) => peer.describe(),
        None => format!("{} (released)", ctx.class_name_of(this)?),
    };
    ctx.new_str(&text)
}

fn continuation_peer(
    ctx: &dyn ForeignContext,
    this: ObjRef,
) -> BridgeResult<std::sync::Arc<PeerObject>> {
    let peer = peer_of(ctx, this)?
        .ok_or_else(|| BridgeError::UnexpectedNull(names::NATIVE_CONTINUATION.to_string()))?;
    if !matches!(&*peer, PeerObject::Continuation(_)) {
        return Err(BridgeError::conversion(names::NATIVE_CONTINUATION, peer.kind()));
    }
    Ok(peer)
}

/// `Continuation.resume`: `args` is `[this, value]`
fn resume(ctx: &dyn ForeignContext, args: &[ForeignValue]) -> BridgeResult<ForeignValue> {
    let this = expect_object(arg(args, 0)?, names::NATIVE_CONTINUATION)?;
    let peer = continuation_peer(ctx, this)?;
    if let PeerObject::Continuation(adapter) = &*peer {
        let value = Pinned::new(ctx, arg(args, 1)?)?;
        ignore_resolved(adapter.resume(value))?;
    }
    Ok(ForeignValue::Null)
}

/// `Continuation.resumeWithError`: `args` is `[this, throwable]`
fn resume_with_error(ctx: &dyn ForeignContext, args: &[ForeignValue]) -> BridgeResult<ForeignValue> {
    let this = expect_object(arg(args, 0)?, names::NATIVE_CONTINUATION)?;
    let peer = continuation_peer(ctx, this)?;
    if let PeerObject::Continuation(adapter) = &*peer {
        let throwable = expect_object(arg(args, 1)?, names::THROWABLE)?;
        ignore_resolved(adapter.resume_with_error(error_from_throwable(ctx, throwable)))?;
    }
    Ok(ForeignValue::Null)
}

/// A late second resolution is dropped; the adapter already logged it
fn ignore_resolved(outcome: BridgeResult<()>) -> BridgeResult<()> {
    match outcome {
        Err(BridgeError::ContinuationResolved) => Ok(()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_entries_registered() {
        let registry = entry_points();
        for arity in 0..=names::MAX_ARITY {
            assert!(registry.contains(&names::closure_invoke_entry(arity)));
            assert!(registry.contains(&names::async_closure_invoke_entry(arity)));
        }
        for name in [
            names::ENTRY_PEER_RELEASE,
            names::ENTRY_PEER_DESCRIBE,
            names::ENTRY_CONTINUATION_RESUME,
            names::ENTRY_CONTINUATION_RESUME_WITH_ERROR,
            names::ENTRY_STREAM_COLLECT,
            names::ENTRY_STREAM_CANCEL,
        ] {
            assert!(registry.contains(name), "{} missing", name);
        }
        assert_eq!(registry.len(), 2 * (names::MAX_ARITY + 1) + 6);
    }

    #[test]
    fn test_failed_release_surfaces_on_next_check() {
        let host = tether_host::Host::new(entry_points());
        let ctx: &dyn ForeignContext = &host;
        let release = entry_points().get(names::ENTRY_PEER_RELEASE).unwrap();

        assert_eq!(release(ctx, &[ForeignValue::Null]), ForeignValue::Null);
        assert!(ctx.exception_occurred().is_none());

        let err = ctx.check().unwrap_err();
        assert!(matches!(err, BridgeError::UnexpectedNull(_)));
        assert!(ctx.check().is_ok());
    }

    #[test]
    fn test_second_resolution_ignored() {
        assert!(ignore_resolved(Err(BridgeError::ContinuationResolved)).is_ok());
        assert!(ignore_resolved(Err(BridgeError::Cancelled)).is_err());
    }
}
