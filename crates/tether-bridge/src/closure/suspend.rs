//! Suspending closures
//!
//! A native async closure called from the foreign side receives a foreign
//! continuation as its last argument; the native future runs on the bridge
//! runtime and resolves that continuation when it finishes. A foreign
//! suspending function called natively receives a `bridge/Continuation`
//! proxy and the native caller awaits its outcome.

use std::any::type_name;
use std::future::Future;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use tether_sdk::names;
use tether_sdk::{ForeignContext, ForeignValue};

use super::{arg, async_closure_proxy, AsyncClosureBox, AsyncInvoke, ContinuationAdapter, ResultProducer};
use crate::attach;
use crate::call::CallExt;
use crate::convert::{expect_object, mismatch, to_object, Bridgeable};
use crate::error::{push_pending, BridgeError, BridgeResult};
use crate::global::GlobalRef;
use crate::options::ConversionOptions;
use crate::peer::{peer_of, PeerObject};
use crate::runtime;

type AsyncCallFn<Args, R> = Arc<dyn Fn(Args) -> BoxFuture<'static, BridgeResult<R>> + Send + Sync>;

/// A suspending callable crossing the boundary.
///
/// Built natively with `new` from an async closure, or received from a
/// foreign `lang/SuspendFunction{N}`.
pub struct AsyncBridgedFn<Args, R> {
    call: AsyncCallFn<Args, R>,
    origin: Option<Arc<GlobalRef>>,
}

impl<Args, R> Clone for AsyncBridgedFn<Args, R> {
    fn clone(&self) -> Self {
        Self {
            call: self.call.clone(),
            origin: self.origin.clone(),
        }
    }
}

impl<Args, R> std::fmt::Debug for AsyncBridgedFn<Args, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncBridgedFn")
            .field("signature", &type_name::<fn(Args) -> R>())
            .field("foreign", &self.origin.is_some())
            .finish()
    }
}

impl<Args, R> AsyncBridgedFn<Args, R> {
    /// Whether this wraps a foreign callable
    pub fn is_foreign(&self) -> bool {
        self.origin.is_some()
    }
}

/// Call a foreign suspending function and await its continuation
async fn call_foreign<R: Bridgeable>(
    runtime: Arc<dyn ForeignContext>,
    target: Arc<GlobalRef>,
    sig: Arc<str>,
    args: impl FnOnce(&dyn ForeignContext) -> BridgeResult<Vec<ForeignValue>>,
    options: ConversionOptions,
) -> BridgeResult<R> {
    let (adapter, outcome) = ContinuationAdapter::new();
    attach::scoped(&*runtime, |ctx| {
        let mut args = args(ctx)?;
        args.push(ForeignValue::Object(adapter.into_foreign(ctx)?));
        ctx.call(target.obj(), "invoke", &sig, &args)?;
        Ok(())
    })?;
    let value = outcome.await.map_err(|_| BridgeError::Cancelled)??;
    attach::scoped(&*runtime, |ctx| R::from_foreign(ctx, value.value(), options))
}

macro_rules! async_bridged_fn {
    ($arity:literal; $($ty:ident => $val:ident @ $idx:tt),*) => {
        impl<$($ty,)* R> AsyncBridgedFn<($($ty,)*), R>
        where
            $($ty: Bridgeable + Send + 'static,)*
            R: Bridgeable + Send + 'static,
        {
            /// Wrap a native async closure
            pub fn new<F, Fut>(f: F) -> Self
            where
                F: Fn($($ty),*) -> Fut + Send + Sync + 'static,
                Fut: Future<Output = BridgeResult<R>> + Send + 'static,
            {
                Self {
                    call: Arc::new(move |($($val,)*): ($($ty,)*)| f($($val),*).boxed()),
                    origin: None,
                }
            }

            /// Start the call
            pub fn call(&self, $($val: $ty),*) -> BoxFuture<'static, BridgeResult<R>> {
                (self.call)(($($val,)*))
            }
        }

        impl<$($ty,)* R> Bridgeable for AsyncBridgedFn<($($ty,)*), R>
        where
            $($ty: Bridgeable + Send + 'static,)*
            R: Bridgeable + Send + 'static,
        {
            fn from_foreign(
                ctx: &dyn ForeignContext,
                value: ForeignValue,
                options: ConversionOptions,
            ) -> BridgeResult<Self> {
                let class = names::suspend_function_class($arity);
                let obj = expect_object(value, &class)?;

                if let Some(peer) = peer_of(ctx, obj)? {
                    return match &*peer {
                        PeerObject::AsyncClosure(closure) => closure
                            .native::<Self>()
                            .ok_or_else(|| BridgeError::conversion(class, closure.describe())),
                        other => Err(BridgeError::conversion(class, other.kind())),
                    };
                }

                if !ctx.instance_of(obj, &class)? {
                    return Err(mismatch(ctx, &class, obj));
                }
                let target = Arc::new(GlobalRef::new(ctx, obj)?);
                let origin = target.clone();
                let runtime = ctx.runtime();
                let sig: Arc<str> = names::suspend_invoke_signature($arity).into();
                Ok(Self {
                    call: Arc::new(move |($($val,)*): ($($ty,)*)| {
                        call_foreign::<R>(
                            runtime.clone(),
                            target.clone(),
                            sig.clone(),
                            move |ctx: &dyn ForeignContext| {
                                Ok(vec![$(to_object($val, ctx, options)?),*])
                            },
                            options,
                        )
                        .boxed()
                    }),
                    origin: Some(origin),
                })
            }

            fn to_foreign(
                self,
                ctx: &dyn ForeignContext,
                options: ConversionOptions,
            ) -> BridgeResult<ForeignValue> {
                if let Some(origin) = self.origin.as_ref().filter(|o| o.belongs_to(ctx)) {
                    return Ok(ForeignValue::Object(origin.obj()));
                }
                let call = self.call.clone();
                let invoke: AsyncInvoke = Arc::new(move |ctx: &dyn ForeignContext, args: &[ForeignValue]| {
                    if args.len() != $arity {
                        return Err(BridgeError::msg(format!(
                            "closure of arity {} called with {} arguments",
                            $arity,
                            args.len()
                        )));
                    }
                    $(let $val = <$ty as Bridgeable>::from_foreign(ctx, arg(args, $idx)?, options)?;)*
                    let pending = call(($($val,)*));
                    Ok(async move {
                        let value = pending.await?;
                        let produce: ResultProducer =
                            Box::new(move |ctx: &dyn ForeignContext| to_object(value, ctx, options));
                        Ok(produce)
                    }
                    .boxed())
                });
                let closure = AsyncClosureBox::new(
                    $arity,
                    vec![$(type_name::<$ty>()),*],
                    type_name::<R>(),
                    options,
                    invoke,
                    Arc::new(self),
                );
                Ok(ForeignValue::Object(async_closure_proxy(ctx, closure)?))
            }
        }
    };
}

async_bridged_fn!(0;);
async_bridged_fn!(1; A => a @ 0);
async_bridged_fn!(2; A => a @ 0, B => b @ 1);
async_bridged_fn!(3; A => a @ 0, B => b @ 1, C => c @ 2);
async_bridged_fn!(4; A => a @ 0, B => b @ 1, C => c @ 2, D => d @ 3);
async_bridged_fn!(5; A => a @ 0, B => b @ 1, C => c @ 2, D => d @ 3, E => e @ 4);

// ============================================================================
// Foreign entry
// ============================================================================

/// `AsyncClosure{N}.invoke`: `args` is `[this, a1..aN, continuation]`.
///
/// Argument conversion happens on the calling thread and its failure is
/// thrown synchronously. The native future then runs on the bridge runtime
/// and resolves the continuation from a worker thread.
pub(crate) fn invoke_async_closure(
    ctx: &dyn ForeignContext,
    arity: usize,
    args: &[ForeignValue],
) -> BridgeResult<ForeignValue> {
    let this = expect_object(arg(args, 0)?, &names::async_closure_class(arity))?;
    let peer = peer_of(ctx, this)?
        .ok_or_else(|| BridgeError::UnexpectedNull(names::async_closure_class(arity)))?;
    let PeerObject::AsyncClosure(closure) = &*peer else {
        return Err(BridgeError::conversion(names::async_closure_class(arity), peer.kind()));
    };
    let continuation = expect_object(arg(args, arity + 1)?, names::CONTINUATION)?;
    let continuation = GlobalRef::new(ctx, continuation)?;
    let pending = closure.start(ctx, &args[1..=arity])?;
    let options = closure.options();
    let runtime = ctx.runtime();

    runtime::spawn(async move {
        let outcome = pending.await;
        let resolved = attach::scoped(&*runtime, |ctx| {
            match outcome.and_then(|produce| produce(ctx)) {
                Ok(value) => {
                    ctx.call(continuation.obj(), "resume", "(Llang/Object;)V", &[value])?;
                }
                Err(error) => {
                    let throwable = error.to_foreign(ctx, options)?;
                    ctx.call(
                        continuation.obj(),
                        "resumeWithError",
                        "(Llang/Throwable;)V",
                        &[throwable],
                    )?;
                }
            }
            Ok(())
        });
        if let Err(e) = resolved {
            tracing::error!(error = %e, "cannot resolve foreign continuation");
            push_pending(e);
        }
    });
    Ok(ForeignValue::Null)
}
