//! Value types: bytes, dates, UUIDs, URLs, locales
//!
//! Each has a plain foreign class and a `bridge/` wrapper holding it in a
//! `storage` field. Which one is produced follows the container flags.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tether_sdk::names;
use tether_sdk::{ForeignContext, ForeignValue};
use url::Url;
use uuid::Uuid;

use super::{expect_object, unwrap_storage, wrap_storage, Bridgeable};
use crate::call::CallExt;
use crate::error::{BridgeError, BridgeResult};
use crate::options::ConversionOptions;

/// Raw bytes
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Data(pub Vec<u8>);

impl From<Vec<u8>> for Data {
    fn from(bytes: Vec<u8>) -> Self {
        Data(bytes)
    }
}

impl Bridgeable for Data {
    fn from_foreign(
        ctx: &dyn ForeignContext,
        value: ForeignValue,
        _options: ConversionOptions,
    ) -> BridgeResult<Self> {
        let obj = expect_object(value, "Data")?;
        let plain = unwrap_storage(ctx, obj, names::BYTE_ARRAY, names::WRAPPED_DATA, "Data")?;
        Ok(Data(ctx.read_byte_array(plain)?))
    }

    fn to_foreign(
        self,
        ctx: &dyn ForeignContext,
        options: ConversionOptions,
    ) -> BridgeResult<ForeignValue> {
        let plain = ctx.new_byte_array(&self.0)?;
        wrap_storage(ctx, plain, names::BYTE_ARRAY, names::WRAPPED_DATA, options)
    }
}

/// Millisecond precision; times before the epoch are negative
impl Bridgeable for SystemTime {
    fn from_foreign(
        ctx: &dyn ForeignContext,
        value: ForeignValue,
        _options: ConversionOptions,
    ) -> BridgeResult<Self> {
        let obj = expect_object(value, "Date")?;
        let plain = unwrap_storage(ctx, obj, names::DATE, names::WRAPPED_DATE, "Date")?;
        let millis = ctx.field(plain, "millis", "J")?.as_long().unwrap_or(0);
        let offset = Duration::from_millis(millis.unsigned_abs());
        let time = if millis >= 0 {
            UNIX_EPOCH.checked_add(offset)
        } else {
            UNIX_EPOCH.checked_sub(offset)
        };
        time.ok_or_else(|| BridgeError::conversion("SystemTime", format!("{} ms", millis)))
    }

    fn to_foreign(
        self,
        ctx: &dyn ForeignContext,
        options: ConversionOptions,
    ) -> BridgeResult<ForeignValue> {
        let millis = match self.duration_since(UNIX_EPOCH) {
            Ok(after) => after.as_millis() as i64,
            Err(before) => -(before.duration().as_millis() as i64),
        };
        let plain = ctx.construct(names::DATE, "(J)V", &[ForeignValue::Long(millis)])?;
        wrap_storage(ctx, plain, names::DATE, names::WRAPPED_DATE, options)
    }
}

impl Bridgeable for Uuid {
    fn from_foreign(
        ctx: &dyn ForeignContext,
        value: ForeignValue,
        _options: ConversionOptions,
    ) -> BridgeResult<Self> {
        let obj = expect_object(value, "UUID")?;
        let plain = unwrap_storage(ctx, obj, names::UUID, names::WRAPPED_UUID, "UUID")?;
        let most = ctx.field(plain, "mostSigBits", "J")?.as_long().unwrap_or(0) as u64;
        let least = ctx.field(plain, "leastSigBits", "J")?.as_long().unwrap_or(0) as u64;
        Ok(Uuid::from_u128(((most as u128) << 64) | least as u128))
    }

    fn to_foreign(
        self,
        ctx: &dyn ForeignContext,
        options: ConversionOptions,
    ) -> BridgeResult<ForeignValue> {
        let bits = self.as_u128();
        let most = (bits >> 64) as u64 as i64;
        let least = bits as u64 as i64;
        let plain = ctx.construct(
            names::UUID,
            "(JJ)V",
            &[ForeignValue::Long(most), ForeignValue::Long(least)],
        )?;
        wrap_storage(ctx, plain, names::UUID, names::WRAPPED_UUID, options)
    }
}

impl Bridgeable for Url {
    fn from_foreign(
        ctx: &dyn ForeignContext,
        value: ForeignValue,
        _options: ConversionOptions,
    ) -> BridgeResult<Self> {
        let obj = expect_object(value, "URL")?;
        let plain = unwrap_storage(ctx, obj, names::URI, names::WRAPPED_URL, "URL")?;
        let spec = expect_object(ctx.field(plain, "spec", "Llang/String;")?, "URL")?;
        let spec = ctx.string_of(spec)?;
        Url::parse(&spec).map_err(|e| BridgeError::conversion("URL", format!("{:?}: {}", spec, e)))
    }

    fn to_foreign(
        self,
        ctx: &dyn ForeignContext,
        options: ConversionOptions,
    ) -> BridgeResult<ForeignValue> {
        let spec = ctx.new_str(self.as_str())?;
        let plain = ctx.construct(names::URI, "(Llang/String;)V", &[spec])?;
        wrap_storage(ctx, plain, names::URI, names::WRAPPED_URL, options)
    }
}

/// A locale identifier such as `en_US`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Locale(pub String);

impl Locale {
    /// Locale for `identifier`
    pub fn new(identifier: impl Into<String>) -> Self {
        Locale(identifier.into())
    }

    /// The identifier
    pub fn identifier(&self) -> &str {
        &self.0
    }
}

impl Bridgeable for Locale {
    fn from_foreign(
        ctx: &dyn ForeignContext,
        value: ForeignValue,
        _options: ConversionOptions,
    ) -> BridgeResult<Self> {
        let obj = expect_object(value, "Locale")?;
        let plain = unwrap_storage(ctx, obj, names::LOCALE, names::WRAPPED_LOCALE, "Locale")?;
        let identifier =
            expect_object(ctx.field(plain, "identifier", "Llang/String;")?, "Locale")?;
        Ok(Locale(ctx.string_of(identifier)?))
    }

    fn to_foreign(
        self,
        ctx: &dyn ForeignContext,
        options: ConversionOptions,
    ) -> BridgeResult<ForeignValue> {
        let identifier = ctx.new_str(&self.0)?;
        let plain = ctx.construct(names::LOCALE, "(Llang/String;)V", &[identifier])?;
        wrap_storage(ctx, plain, names::LOCALE, names::WRAPPED_LOCALE, options)
    }
}
