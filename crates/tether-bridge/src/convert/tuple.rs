//! Tuples and results

use tether_sdk::names;
use tether_sdk::{ForeignContext, ForeignValue, ObjRef};

use super::{expect_object, mismatch, to_object, Bridgeable};
use crate::call::CallExt;
use crate::error::{BridgeError, BridgeResult};
use crate::options::ConversionOptions;

const OBJECT_SIG: &str = "Llang/Object;";
const THROWABLE_SIG: &str = "Llang/Throwable;";
const FIELDS: [&str; 5] = ["first", "second", "third", "fourth", "fifth"];

/// Foreign class for a tuple of `arity` elements
pub(crate) fn tuple_class(arity: usize) -> Option<&'static str> {
    match arity {
        2 => Some(names::PAIR),
        3 => Some(names::TRIPLE),
        4 => Some(names::TUPLE4),
        5 => Some(names::TUPLE5),
        _ => None,
    }
}

/// Arity of a tuple class
pub(crate) fn tuple_arity(class: &str) -> Option<usize> {
    match class {
        names::PAIR => Some(2),
        names::TRIPLE => Some(3),
        names::TUPLE4 => Some(4),
        names::TUPLE5 => Some(5),
        _ => None,
    }
}

/// Build a tuple object from boxed elements
pub(crate) fn build_tuple(ctx: &dyn ForeignContext, items: Vec<ForeignValue>) -> BridgeResult<ObjRef> {
    let class = tuple_class(items.len()).ok_or_else(|| {
        BridgeError::conversion("tuple of 2 to 5 elements", format!("{} elements", items.len()))
    })?;
    let sig = format!("({})V", OBJECT_SIG.repeat(items.len()));
    ctx.construct(class, &sig, &items)
}

/// Elements of a tuple object, checking its arity
pub(crate) fn tuple_elements(
    ctx: &dyn ForeignContext,
    obj: ObjRef,
    arity: usize,
) -> BridgeResult<Vec<ForeignValue>> {
    let class = ctx.class_name_of(obj)?;
    if tuple_arity(&class) != Some(arity) {
        return Err(BridgeError::conversion(format!("tuple of {}", arity), class));
    }
    FIELDS[..arity]
        .iter()
        .map(|field| ctx.field(obj, field, OBJECT_SIG))
        .collect()
}

macro_rules! tuple {
    ($arity:literal; $($ty:ident => $val:ident),+) => {
        impl<$($ty: Bridgeable),+> Bridgeable for ($($ty,)+) {
            fn from_foreign(
                ctx: &dyn ForeignContext,
                value: ForeignValue,
                options: ConversionOptions,
            ) -> BridgeResult<Self> {
                let obj = expect_object(value, concat!("tuple of ", $arity))?;
                let mut fields = tuple_elements(ctx, obj, $arity)?.into_iter();
                let options = options.nested();
                $(
                    let $val = $ty::from_foreign(ctx, fields.next().unwrap_or_default(), options)?;
                )+
                Ok(($($val,)+))
            }

            fn to_foreign(
                self,
                ctx: &dyn ForeignContext,
                options: ConversionOptions,
            ) -> BridgeResult<ForeignValue> {
                let ($($val,)+) = self;
                let options = options.nested();
                let items = vec![$(to_object($val, ctx, options)?),+];
                Ok(ForeignValue::Object(build_tuple(ctx, items)?))
            }
        }
    };
}

tuple!(2; A => a, B => b);
tuple!(3; A => a, B => b, C => c);
tuple!(4; A => a, B => b, C => c, D => d);
tuple!(5; A => a, B => b, C => c, D => d, E => e);

// ============================================================================
// Result
// ============================================================================

/// Error slot name of either result class
fn error_slot(ctx: &dyn ForeignContext, obj: ObjRef) -> BridgeResult<&'static str> {
    if ctx.instance_of(obj, names::RESULT)? {
        Ok("exception")
    } else if ctx.instance_of(obj, names::WRAPPED_RESULT)? {
        Ok("error")
    } else {
        Err(mismatch(ctx, "Result", obj))
    }
}

/// Read a result object: the error slot wins if set
pub(crate) fn result_parts(
    ctx: &dyn ForeignContext,
    obj: ObjRef,
) -> BridgeResult<Result<ForeignValue, ObjRef>> {
    let slot = error_slot(ctx, obj)?;
    match ctx.field(obj, slot, THROWABLE_SIG)? {
        ForeignValue::Object(throwable) => Ok(Err(throwable)),
        _ => Ok(Ok(ctx.field(obj, "value", OBJECT_SIG)?)),
    }
}

/// Build `lang/Result` under native containers, else `bridge/Result`
pub(crate) fn build_result(
    ctx: &dyn ForeignContext,
    outcome: Result<ForeignValue, ForeignValue>,
    options: ConversionOptions,
) -> BridgeResult<ForeignValue> {
    let class = if options.contains(ConversionOptions::NATIVE_CONTAINER) {
        names::RESULT
    } else {
        names::WRAPPED_RESULT
    };
    let args = match outcome {
        Ok(value) => [value, ForeignValue::Null],
        Err(throwable) => [ForeignValue::Null, throwable],
    };
    let sig = format!("({}{})V", OBJECT_SIG, THROWABLE_SIG);
    Ok(ForeignValue::Object(ctx.construct(class, &sig, &args)?))
}

impl<T: Bridgeable> Bridgeable for Result<T, BridgeError> {
    fn from_foreign(
        ctx: &dyn ForeignContext,
        value: ForeignValue,
        options: ConversionOptions,
    ) -> BridgeResult<Self> {
        let obj = expect_object(value, "Result")?;
        match result_parts(ctx, obj)? {
            Ok(value) => Ok(Ok(T::from_foreign(ctx, value, options.nested())?)),
            Err(throwable) => Ok(Err(super::error::error_from_throwable(ctx, throwable))),
        }
    }

    fn to_foreign(
        self,
        ctx: &dyn ForeignContext,
        options: ConversionOptions,
    ) -> BridgeResult<ForeignValue> {
        let outcome = match self {
            Ok(value) => Ok(to_object(value, ctx, options.nested())?),
            Err(error) => Err(error.to_foreign(ctx, options)?),
        };
        build_result(ctx, outcome, options)
    }
}
