//! Primitives, strings and unit

use tether_sdk::{ForeignContext, ForeignValue};

use super::{expect_object, mismatch, Bridgeable};
use crate::call::CallExt;
use crate::error::{BridgeError, BridgeResult};
use crate::options::ConversionOptions;

/// Primitive slot; boxed objects are unboxed on input
macro_rules! primitive {
    ($ty:ty, $variant:ident, $name:literal) => {
        impl Bridgeable for $ty {
            fn from_foreign(
                ctx: &dyn ForeignContext,
                value: ForeignValue,
                _options: ConversionOptions,
            ) -> BridgeResult<Self> {
                match value {
                    ForeignValue::$variant(v) => Ok(v),
                    ForeignValue::Object(obj) => match ctx.unboxed(obj)? {
                        Some(ForeignValue::$variant(v)) => Ok(v),
                        _ => Err(mismatch(ctx, $name, obj)),
                    },
                    ForeignValue::Null => Err(BridgeError::UnexpectedNull($name.to_string())),
                    other => Err(BridgeError::conversion($name, other.type_name())),
                }
            }

            fn to_foreign(
                self,
                _ctx: &dyn ForeignContext,
                _options: ConversionOptions,
            ) -> BridgeResult<ForeignValue> {
                Ok(ForeignValue::$variant(self))
            }
        }
    };
}

primitive!(bool, Bool, "boolean");
primitive!(i8, Byte, "byte");
primitive!(i16, Short, "short");
primitive!(i32, Int, "int");
primitive!(i64, Long, "long");
primitive!(f32, Float, "float");
primitive!(f64, Double, "double");

/// One UTF-16 code unit; characters outside the BMP do not fit
impl Bridgeable for char {
    fn from_foreign(
        ctx: &dyn ForeignContext,
        value: ForeignValue,
        _options: ConversionOptions,
    ) -> BridgeResult<Self> {
        let unit = match value {
            ForeignValue::Char(unit) => unit,
            ForeignValue::Object(obj) => match ctx.unboxed(obj)? {
                Some(ForeignValue::Char(unit)) => unit,
                _ => return Err(mismatch(ctx, "char", obj)),
            },
            ForeignValue::Null => return Err(BridgeError::UnexpectedNull("char".to_string())),
            other => return Err(BridgeError::conversion("char", other.type_name())),
        };
        char::from_u32(unit as u32)
            .ok_or_else(|| BridgeError::conversion("char", format!("surrogate {:#06x}", unit)))
    }

    fn to_foreign(
        self,
        _ctx: &dyn ForeignContext,
        _options: ConversionOptions,
    ) -> BridgeResult<ForeignValue> {
        let mut units = [0u16; 2];
        match self.encode_utf16(&mut units) {
            [unit] => Ok(ForeignValue::Char(*unit)),
            _ => Err(BridgeError::conversion("char", format!("non-BMP character {:?}", self))),
        }
    }
}

impl Bridgeable for String {
    fn from_foreign(
        ctx: &dyn ForeignContext,
        value: ForeignValue,
        _options: ConversionOptions,
    ) -> BridgeResult<Self> {
        let obj = expect_object(value, "String")?;
        if !ctx.instance_of(obj, tether_sdk::names::STRING)? {
            return Err(mismatch(ctx, "String", obj));
        }
        ctx.string_of(obj)
    }

    fn to_foreign(
        self,
        ctx: &dyn ForeignContext,
        _options: ConversionOptions,
    ) -> BridgeResult<ForeignValue> {
        ctx.new_str(&self)
    }
}

/// `void` returns
impl Bridgeable for () {
    fn from_foreign(
        _ctx: &dyn ForeignContext,
        _value: ForeignValue,
        _options: ConversionOptions,
    ) -> BridgeResult<Self> {
        Ok(())
    }

    fn to_foreign(
        self,
        _ctx: &dyn ForeignContext,
        _options: ConversionOptions,
    ) -> BridgeResult<ForeignValue> {
        Ok(ForeignValue::Null)
    }
}
