//! Synchronous closures

use std::any::type_name;
use std::sync::Arc;

use tether_sdk::names;
use tether_sdk::{ForeignContext, ForeignValue};

use super::{arg, closure_proxy, ClosureBox, ErasedInvoke};
use crate::attach;
use crate::call::CallExt;
use crate::convert::{expect_object, mismatch, to_object, Bridgeable};
use crate::error::{BridgeError, BridgeResult};
use crate::global::GlobalRef;
use crate::options::ConversionOptions;
use crate::peer::{peer_of, PeerObject};

type CallFn<Args, R> = Arc<dyn Fn(Args) -> BridgeResult<R> + Send + Sync>;

/// A callable crossing the boundary.
///
/// `Args` is a tuple of argument types. Built natively with `new`, or
/// received from a foreign `lang/Function{N}`, in which case `call` attaches
/// the calling thread and invokes the foreign object. Callable from any
/// thread.
pub struct BridgedFn<Args, R> {
    call: CallFn<Args, R>,
    origin: Option<Arc<GlobalRef>>,
}

impl<Args, R> Clone for BridgedFn<Args, R> {
    fn clone(&self) -> Self {
        Self {
            call: self.call.clone(),
            origin: self.origin.clone(),
        }
    }
}

impl<Args, R> std::fmt::Debug for BridgedFn<Args, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgedFn")
            .field("signature", &type_name::<fn(Args) -> R>())
            .field("foreign", &self.origin.is_some())
            .finish()
    }
}

impl<Args, R> BridgedFn<Args, R> {
    /// Whether this wraps a foreign callable
    pub fn is_foreign(&self) -> bool {
        self.origin.is_some()
    }
}

macro_rules! bridged_fn {
    ($arity:literal; $($ty:ident => $val:ident @ $idx:tt),*) => {
        impl<$($ty,)* R> BridgedFn<($($ty,)*), R>
        where
            $($ty: Bridgeable + Send + 'static,)*
            R: Bridgeable + Send + 'static,
        {
            /// Wrap a native closure
            pub fn new<F>(f: F) -> Self
            where
                F: Fn($($ty),*) -> BridgeResult<R> + Send + Sync + 'static,
            {
                Self {
                    call: Arc::new(move |($($val,)*): ($($ty,)*)| f($($val),*)),
                    origin: None,
                }
            }

            /// Invoke the callable
            pub fn call(&self, $($val: $ty),*) -> BridgeResult<R> {
                (self.call)(($($val,)*))
            }
        }

        impl<$($ty,)* R> Bridgeable for BridgedFn<($($ty,)*), R>
        where
            $($ty: Bridgeable + Send + 'static,)*
            R: Bridgeable + Send + 'static,
        {
            fn from_foreign(
                ctx: &dyn ForeignContext,
                value: ForeignValue,
                options: ConversionOptions,
            ) -> BridgeResult<Self> {
                let class = names::function_class($arity);
                let obj = expect_object(value, &class)?;

                if let Some(peer) = peer_of(ctx, obj)? {
                    let PeerObject::Closure(closure) = &*peer else {
                        return Err(BridgeError::conversion(class, peer.kind()));
                    };
                    if let Some(native) = closure.native::<Self>() {
                        return Ok(native);
                    }
                    if closure.arity() != $arity {
                        return Err(BridgeError::conversion(class, closure.describe()));
                    }
                    // Same arity, different native types: go through the erased body
                    let invoke: ErasedInvoke = closure.erased();
                    #[allow(unused_variables)]
                    let box_options = closure.options();
                    let runtime = ctx.runtime();
                    return Ok(Self {
                        call: Arc::new(move |($($val,)*): ($($ty,)*)| {
                            attach::scoped(&*runtime, |ctx| {
                                let args: Vec<ForeignValue> = vec![$(to_object($val, ctx, box_options)?),*];
                                let result = invoke(ctx, &args)?;
                                R::from_foreign(ctx, result, options)
                            })
                        }),
                        origin: None,
                    });
                }

                if !ctx.instance_of(obj, &class)? {
                    return Err(mismatch(ctx, &class, obj));
                }
                let target = Arc::new(GlobalRef::new(ctx, obj)?);
                let origin = target.clone();
                let runtime = ctx.runtime();
                let sig = names::invoke_signature($arity);
                Ok(Self {
                    call: Arc::new(move |($($val,)*): ($($ty,)*)| {
                        attach::scoped(&*runtime, |ctx| {
                            let args: Vec<ForeignValue> = vec![$(to_object($val, ctx, options)?),*];
                            let result = ctx.call(target.obj(), "invoke", &sig, &args)?;
                            R::from_foreign(ctx, result, options)
                        })
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
                let invoke: ErasedInvoke = Arc::new(move |ctx: &dyn ForeignContext, args: &[ForeignValue]| {
                    if args.len() != $arity {
                        return Err(BridgeError::msg(format!(
                            "closure of arity {} called with {} arguments",
                            $arity,
                            args.len()
                        )));
                    }
                    $(let $val = <$ty as Bridgeable>::from_foreign(ctx, arg(args, $idx)?, options)?;)*
                    let result = call(($($val,)*))?;
                    to_object(result, ctx, options)
                });
                let closure = ClosureBox::new(
                    $arity,
                    vec![$(type_name::<$ty>()),*],
                    type_name::<R>(),
                    options,
                    invoke,
                    Some(Arc::new(self)),
                );
                Ok(ForeignValue::Object(closure_proxy(ctx, closure)?))
            }
        }
    };
}

bridged_fn!(0;);
bridged_fn!(1; A => a @ 0);
bridged_fn!(2; A => a @ 0, B => b @ 1);
bridged_fn!(3; A => a @ 0, B => b @ 1, C => c @ 2);
bridged_fn!(4; A => a @ 0, B => b @ 1, C => c @ 2, D => d @ 3);
bridged_fn!(5; A => a @ 0, B => b @ 1, C => c @ 2, D => d @ 3, E => e @ 4);
