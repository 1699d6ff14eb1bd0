//! Value conversion protocol
//!
//! [`Bridgeable`] is implemented by every native type that can cross the
//! boundary. Conversions are driven by the static native type on one side
//! and the dynamic foreign class on the other:
//!
//! | native | foreign (native containers) | foreign (wrapped) |
//! |---|---|---|
//! | `bool`, `i32`, ... | primitive slot, boxed when nested | same |
//! | `String` | `lang/String` | same |
//! | `Vec<T>` | `util/List` | `bridge/Array` |
//! | `HashMap<K, V>` | `util/Map` | `bridge/Dictionary` |
//! | `HashSet<T>` | `util/Set` | `bridge/Set` |
//! | [`Data`] | `lang/ByteArray` | `bridge/Data` |
//! | `SystemTime` | `util/Date` | `bridge/Date` |
//! | `Uuid` / `Url` / [`Locale`] | `util/UUID` / `util/URI` / `util/Locale` | `bridge/...` |
//! | `(A, B)`, `(A, B, C)` | `lang/Pair`, `lang/Triple` | same |
//! | `Result<T, BridgeError>` | `lang/Result` | `bridge/Result` |
//! | `BridgeError` | throwable | same |
//!
//! Inputs accept both the plain and the wrapped form.

pub mod any;
pub mod collection;
pub mod error;
pub mod foundation;
pub mod object;
pub mod primitive;
pub mod tuple;

use tether_sdk::names;
use tether_sdk::{ForeignContext, ForeignValue, ObjRef};

use crate::call::CallExt;
use crate::error::{BridgeError, BridgeResult};
use crate::options::ConversionOptions;

pub use any::{register_bridge_impl, AnyClosure, AnyValue, BridgedTypeTag};
pub use error::install_throwable_converter;
pub use foundation::{Data, Locale};
pub use object::{register_bridged_class, BridgedInstance, BridgedObject};

/// A native type with a foreign representation
pub trait Bridgeable: Sized {
    /// Convert a foreign slot value to this type
    fn from_foreign(
        ctx: &dyn ForeignContext,
        value: ForeignValue,
        options: ConversionOptions,
    ) -> BridgeResult<Self>;

    /// Convert this value to a foreign slot value
    fn to_foreign(self, ctx: &dyn ForeignContext, options: ConversionOptions)
        -> BridgeResult<ForeignValue>;

    /// Whether this type already uses `Null` for one of its values
    #[doc(hidden)]
    const NULLABLE: bool = false;
}

/// Convert `value` for a generic (`lang/Object`) slot, boxing primitives
pub fn to_object<T: Bridgeable>(
    value: T,
    ctx: &dyn ForeignContext,
    options: ConversionOptions,
) -> BridgeResult<ForeignValue> {
    let value = value.to_foreign(ctx, options)?;
    ctx.boxed(value)
}

/// Require an object, reporting null and primitives against `expected`
pub(crate) fn expect_object(value: ForeignValue, expected: &str) -> BridgeResult<ObjRef> {
    match value {
        ForeignValue::Object(obj) => Ok(obj),
        ForeignValue::Null => Err(BridgeError::UnexpectedNull(expected.to_string())),
        other => Err(BridgeError::conversion(expected, other.type_name())),
    }
}

/// A mismatch against the dynamic class of `obj`
pub(crate) fn mismatch(ctx: &dyn ForeignContext, expected: &str, obj: ObjRef) -> BridgeError {
    let found = ctx
        .class_name_of(obj)
        .unwrap_or_else(|_| "<unknown>".to_string());
    BridgeError::conversion(expected, found)
}

/// Put `plain` inside `wrapper` unless the options ask for plain forms
pub(crate) fn wrap_storage(
    ctx: &dyn ForeignContext,
    plain: ObjRef,
    plain_class: &str,
    wrapper: &str,
    options: ConversionOptions,
) -> BridgeResult<ForeignValue> {
    if options.plain_container() {
        return Ok(ForeignValue::Object(plain));
    }
    let sig = format!("(L{};)V", plain_class);
    let wrapped = ctx.construct(wrapper, &sig, &[ForeignValue::Object(plain)])?;
    Ok(ForeignValue::Object(wrapped))
}

/// The plain object inside `obj` if it is a `wrapper`, else `obj` itself
/// if it is a `plain_class`
pub(crate) fn unwrap_storage(
    ctx: &dyn ForeignContext,
    obj: ObjRef,
    plain_class: &str,
    wrapper: &str,
    expected: &str,
) -> BridgeResult<ObjRef> {
    if ctx.instance_of(obj, wrapper)? {
        let sig = format!("L{};", plain_class);
        let storage = ctx.field(obj, names::STORAGE_FIELD, &sig)?;
        return expect_object(storage, expected);
    }
    if ctx.instance_of(obj, plain_class)? {
        return Ok(obj);
    }
    Err(mismatch(ctx, expected, obj))
}

/// Elements of a plain list or set via `size()` and an indexed getter
pub(crate) fn read_indexed(
    ctx: &dyn ForeignContext,
    obj: ObjRef,
    getter: &str,
) -> BridgeResult<Vec<ForeignValue>> {
    let size = ctx.call(obj, "size", "()I", &[])?.as_int().unwrap_or(0);
    let sig = "(I)Llang/Object;";
    (0..size)
        .map(|i| ctx.call(obj, getter, sig, &[ForeignValue::Int(i)]))
        .collect()
}
