//! Closure and continuation bridge
//!
//! Native closures cross as `bridge/Closure{N}` / `bridge/AsyncClosure{N}`
//! proxies holding a retained peer to a [`ClosureBox`] / [`AsyncClosureBox`].
//! Foreign callables (`lang/Function{N}`, `lang/SuspendFunction{N}`) arrive
//! as [`BridgedFn`] / [`AsyncBridgedFn`] wrapping a global reference.
//! Either way, converting back returns the original object.

mod continuation;
mod function;
mod suspend;

use std::any::Any;
use std::sync::Arc;

use futures::future::BoxFuture;
use tether_sdk::names;
use tether_sdk::{ForeignContext, ForeignValue, ObjRef};

use crate::error::{BridgeError, BridgeResult};
use crate::options::ConversionOptions;
use crate::peer::{wrap_peer, PeerObject};

pub use continuation::ContinuationAdapter;
pub use function::BridgedFn;
pub use suspend::AsyncBridgedFn;

pub(crate) use suspend::invoke_async_closure;

/// Erased synchronous body: converted arguments in, converted result out
pub type ErasedInvoke =
    Arc<dyn Fn(&dyn ForeignContext, &[ForeignValue]) -> BridgeResult<ForeignValue> + Send + Sync>;

/// Converts a finished native result to a foreign value
pub type ResultProducer =
    Box<dyn FnOnce(&dyn ForeignContext) -> BridgeResult<ForeignValue> + Send>;

/// Erased suspending body: arguments converted synchronously, result later
pub type AsyncInvoke = Arc<
    dyn Fn(&dyn ForeignContext, &[ForeignValue]) -> BridgeResult<BoxFuture<'static, BridgeResult<ResultProducer>>>
        + Send
        + Sync,
>;

/// Argument `index` of an erased call
pub(crate) fn arg(args: &[ForeignValue], index: usize) -> BridgeResult<ForeignValue> {
    args.get(index)
        .copied()
        .ok_or_else(|| BridgeError::msg(format!("missing closure argument {}", index)))
}

fn check_arity(arity: usize, args: &[ForeignValue]) -> BridgeResult<()> {
    if args.len() == arity {
        Ok(())
    } else {
        Err(BridgeError::msg(format!(
            "closure of arity {} called with {} arguments",
            arity,
            args.len()
        )))
    }
}

// ============================================================================
// Closure boxes
// ============================================================================

/// A native closure exposed to the foreign runtime
pub struct ClosureBox {
    arity: usize,
    param_types: Vec<&'static str>,
    return_type: &'static str,
    options: ConversionOptions,
    invoke: ErasedInvoke,
    native: Option<Arc<dyn Any + Send + Sync>>,
}

impl ClosureBox {
    pub(crate) fn new(
        arity: usize,
        param_types: Vec<&'static str>,
        return_type: &'static str,
        options: ConversionOptions,
        invoke: ErasedInvoke,
        native: Option<Arc<dyn Any + Send + Sync>>,
    ) -> Self {
        Self {
            arity,
            param_types,
            return_type,
            options,
            invoke,
            native,
        }
    }

    /// Closure over raw foreign values, for internal callbacks
    pub(crate) fn raw<F>(arity: usize, f: F) -> Self
    where
        F: Fn(&dyn ForeignContext, &[ForeignValue]) -> BridgeResult<ForeignValue>
            + Send
            + Sync
            + 'static,
    {
        Self::new(
            arity,
            vec!["lang/Object"; arity],
            "lang/Object",
            ConversionOptions::NONE,
            Arc::new(f),
            None,
        )
    }

    /// Number of parameters
    pub fn arity(&self) -> usize {
        self.arity
    }

    /// Native parameter type names
    pub fn param_types(&self) -> &[&'static str] {
        &self.param_types
    }

    /// Native return type name
    pub fn return_type(&self) -> &'static str {
        self.return_type
    }

    /// Options captured at creation
    pub fn options(&self) -> ConversionOptions {
        self.options
    }

    /// Invoke with foreign arguments (receiver excluded)
    pub fn invoke(&self, ctx: &dyn ForeignContext, args: &[ForeignValue]) -> BridgeResult<ForeignValue> {
        check_arity(self.arity, args)?;
        (self.invoke)(ctx, args)
    }

    pub(crate) fn erased(&self) -> ErasedInvoke {
        self.invoke.clone()
    }

    /// The typed closure this box was made from
    pub fn native<T: Clone + 'static>(&self) -> Option<T> {
        self.native.as_ref()?.downcast_ref::<T>().cloned()
    }

    /// Signature text for `toString()`
    pub fn describe(&self) -> String {
        format!("({}) -> {}", self.param_types.join(", "), self.return_type)
    }
}

/// Expose `closure` as a `bridge/Closure{N}` proxy
pub(crate) fn closure_proxy(ctx: &dyn ForeignContext, closure: ClosureBox) -> BridgeResult<ObjRef> {
    let class = names::closure_class(closure.arity);
    wrap_peer(ctx, &class, "(J)V", &[], Arc::new(PeerObject::Closure(closure)))
}

/// A native suspending closure exposed to the foreign runtime
pub struct AsyncClosureBox {
    arity: usize,
    param_types: Vec<&'static str>,
    return_type: &'static str,
    options: ConversionOptions,
    invoke: AsyncInvoke,
    native: Arc<dyn Any + Send + Sync>,
}

impl AsyncClosureBox {
    pub(crate) fn new(
        arity: usize,
        param_types: Vec<&'static str>,
        return_type: &'static str,
        options: ConversionOptions,
        invoke: AsyncInvoke,
        native: Arc<dyn Any + Send + Sync>,
    ) -> Self {
        Self {
            arity,
            param_types,
            return_type,
            options,
            invoke,
            native,
        }
    }

    /// Number of parameters (continuation excluded)
    pub fn arity(&self) -> usize {
        self.arity
    }

    /// Options captured at creation
    pub fn options(&self) -> ConversionOptions {
        self.options
    }

    /// Convert the arguments and start the native future
    pub fn start(
        &self,
        ctx: &dyn ForeignContext,
        args: &[ForeignValue],
    ) -> BridgeResult<BoxFuture<'static, BridgeResult<ResultProducer>>> {
        check_arity(self.arity, args)?;
        (self.invoke)(ctx, args)
    }

    /// The typed closure this box was made from
    pub fn native<T: Clone + 'static>(&self) -> Option<T> {
        self.native.downcast_ref::<T>().cloned()
    }

    /// Signature text for `toString()`
    pub fn describe(&self) -> String {
        format!("suspend ({}) -> {}", self.param_types.join(", "), self.return_type)
    }
}

/// Expose `closure` as a `bridge/AsyncClosure{N}` proxy
pub(crate) fn async_closure_proxy(
    ctx: &dyn ForeignContext,
    closure: AsyncClosureBox,
) -> BridgeResult<ObjRef> {
    let class = names::async_closure_class(closure.arity);
    wrap_peer(ctx, &class, "(J)V", &[], Arc::new(PeerObject::AsyncClosure(closure)))
}
