//! Type-erased conversion
//!
//! [`AnyValue`] is the native side of a slot whose static type is unknown.
//! Converting a foreign object to `AnyValue` goes through a fixed order:
//!
//! 1. custom projection (`bridge/NativeProjecting`)
//! 2. native peer (closures, streams, errors, bridged objects)
//! 3. [`BridgedTypeTag`] and the matching built-in converter
//! 4. for [`BridgedTypeTag::Other`]: a registered bridge implementation,
//!    then the caller's fallback, else a binding error

use std::fmt;
use std::sync::{Arc, LazyLock};
use std::time::SystemTime;

use dashmap::DashMap;
use tether_sdk::names;
use tether_sdk::{ForeignContext, ForeignValue, ObjRef};
use url::Url;
use uuid::Uuid;

use super::collection::{build_map, build_set, list_elements, map_entries, set_elements};
use super::error::error_from_throwable;
use super::foundation::{Data, Locale};
use super::object::BridgedInstance;
use super::tuple::{build_result, build_tuple, result_parts, tuple_arity, tuple_elements};
use super::{to_object, Bridgeable};
use crate::call::CallExt;
use crate::closure::BridgedFn;
use crate::error::{binding_error, BridgeError, BridgeResult};
use crate::options::ConversionOptions;
use crate::peer::{peer_of, wrap_peer, PeerObject};
use crate::reflect::DynamicObject;
use crate::stream::BridgedStream;

// ============================================================================
// Tags
// ============================================================================

/// Conversion path for an erased foreign value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BridgedTypeTag {
    /// `lang/Boolean`
    Boolean,
    /// `lang/Byte`
    Byte,
    /// `lang/Character`
    Char,
    /// `lang/Double`
    Double,
    /// `lang/Float`
    Float,
    /// `lang/Integer`
    Int,
    /// `lang/Long`
    Long,
    /// `lang/Short`
    Short,
    /// `lang/String`
    String,
    /// `lang/ByteArray`
    ByteArray,
    /// `util/Date`
    Date,
    /// Any `lang/Flow`
    Stream,
    /// Any `util/List`
    List,
    /// `util/Locale`
    Locale,
    /// Any `util/Map`
    Map,
    /// `lang/Result`
    Result,
    /// Any `util/Set`
    Set,
    /// Any `lang/Throwable`
    Throwable,
    /// `util/UUID`
    Uuid,
    /// `util/URI`
    Uri,
    /// `lang/Pair`, `lang/Triple`, `bridge/Tuple4`, `bridge/Tuple5`
    Tuple,
    /// `bridge/Array`
    WrappedArray,
    /// `bridge/Stream`
    WrappedStream,
    /// `bridge/ThrowingStream`
    WrappedThrowingStream,
    /// `bridge/Data`
    WrappedData,
    /// `bridge/Date`
    WrappedDate,
    /// `bridge/Dictionary`
    WrappedDictionary,
    /// `bridge/Locale`
    WrappedLocale,
    /// `bridge/Optional`
    WrappedOptional,
    /// `bridge/Result`
    WrappedResult,
    /// `bridge/Set`
    WrappedSet,
    /// `bridge/UUID`
    WrappedUuid,
    /// `bridge/URL`
    WrappedUrl,
    /// Custom bridged type or unknown
    Other,
}

impl BridgedTypeTag {
    /// Tag for an exact class name
    pub fn of_class_name(class: &str) -> Self {
        use BridgedTypeTag as Tag;
        match class {
            names::BOOLEAN => Tag::Boolean,
            names::BYTE => Tag::Byte,
            names::CHARACTER => Tag::Char,
            names::DOUBLE => Tag::Double,
            names::FLOAT => Tag::Float,
            names::INTEGER => Tag::Int,
            names::LONG => Tag::Long,
            names::SHORT => Tag::Short,
            names::STRING => Tag::String,
            names::BYTE_ARRAY => Tag::ByteArray,
            names::DATE => Tag::Date,
            names::LIST => Tag::List,
            names::LOCALE => Tag::Locale,
            names::MAP => Tag::Map,
            names::RESULT => Tag::Result,
            names::SET => Tag::Set,
            names::UUID => Tag::Uuid,
            names::URI => Tag::Uri,
            names::PAIR | names::TRIPLE | names::TUPLE4 | names::TUPLE5 => Tag::Tuple,
            names::WRAPPED_ARRAY => Tag::WrappedArray,
            names::NATIVE_STREAM => Tag::WrappedStream,
            names::NATIVE_THROWING_STREAM => Tag::WrappedThrowingStream,
            names::WRAPPED_DATA => Tag::WrappedData,
            names::WRAPPED_DATE => Tag::WrappedDate,
            names::WRAPPED_DICTIONARY => Tag::WrappedDictionary,
            names::WRAPPED_LOCALE => Tag::WrappedLocale,
            names::WRAPPED_OPTIONAL => Tag::WrappedOptional,
            names::WRAPPED_RESULT => Tag::WrappedResult,
            names::WRAPPED_SET => Tag::WrappedSet,
            names::WRAPPED_UUID => Tag::WrappedUuid,
            names::WRAPPED_URL => Tag::WrappedUrl,
            _ => Tag::Other,
        }
    }

    /// Tag for `obj`, by exact class then by capability
    pub fn of(ctx: &dyn ForeignContext, obj: ObjRef) -> BridgeResult<Self> {
        let tag = Self::of_class_name(&ctx.class_name_of(obj)?);
        if tag != BridgedTypeTag::Other {
            return Ok(tag);
        }
        let capabilities = [
            (names::THROWABLE, BridgedTypeTag::Throwable),
            (names::FLOW, BridgedTypeTag::Stream),
            (names::LIST, BridgedTypeTag::List),
            (names::MAP, BridgedTypeTag::Map),
            (names::SET, BridgedTypeTag::Set),
        ];
        for (class, tag) in capabilities {
            if ctx.instance_of(obj, class)? {
                return Ok(tag);
            }
        }
        Ok(BridgedTypeTag::Other)
    }
}

// ============================================================================
// Bridge implementations
// ============================================================================

/// Converter for objects implementing a capability
pub type BridgeImpl =
    Arc<dyn Fn(&dyn ForeignContext, ObjRef, ConversionOptions) -> BridgeResult<AnyValue> + Send + Sync>;

static BRIDGE_IMPLS: LazyLock<DashMap<String, BridgeImpl>> = LazyLock::new(DashMap::new);

/// Register the bridge implementation for foreign objects implementing
/// `capability` (a class or interface name). Stored as
/// `<capability>_BridgeImpl`.
pub fn register_bridge_impl<F>(capability: &str, convert: F)
where
    F: Fn(&dyn ForeignContext, ObjRef, ConversionOptions) -> BridgeResult<AnyValue>
        + Send
        + Sync
        + 'static,
{
    let key = format!("{}{}", capability, names::BRIDGE_IMPL_SUFFIX);
    tracing::debug!(%key, "registered bridge implementation");
    BRIDGE_IMPLS.insert(key, Arc::new(convert));
}

fn bridge_impl_for(ctx: &dyn ForeignContext, obj: ObjRef) -> BridgeResult<Option<BridgeImpl>> {
    let class = ctx.class_name_of(obj)?;
    let exact = format!("{}{}", class, names::BRIDGE_IMPL_SUFFIX);
    if let Some(found) = BRIDGE_IMPLS.get(&exact) {
        return Ok(Some(found.value().clone()));
    }
    let entries: Vec<(String, BridgeImpl)> = BRIDGE_IMPLS
        .iter()
        .map(|e| (e.key().clone(), e.value().clone()))
        .collect();
    for (key, convert) in entries {
        let Some(capability) = key.strip_suffix(names::BRIDGE_IMPL_SUFFIX) else {
            continue;
        };
        if ctx.instance_of(obj, capability)? {
            return Ok(Some(convert));
        }
    }
    Ok(None)
}

// ============================================================================
// AnyValue
// ============================================================================

/// Caller-supplied conversion for [`BridgedTypeTag::Other`]
pub type Fallback<'a> =
    &'a dyn Fn(&dyn ForeignContext, ObjRef, ConversionOptions) -> BridgeResult<AnyValue>;

/// A value whose static type is erased
pub enum AnyValue {
    /// Null
    Null,
    /// `boolean`
    Bool(bool),
    /// `byte`
    Byte(i8),
    /// `char`
    Char(char),
    /// `short`
    Short(i16),
    /// `int`
    Int(i32),
    /// `long`
    Long(i64),
    /// `float`
    Float(f32),
    /// `double`
    Double(f64),
    /// String
    String(String),
    /// Bytes
    Data(Data),
    /// Date
    Date(SystemTime),
    /// UUID
    Uuid(Uuid),
    /// URL
    Url(Url),
    /// Locale
    Locale(Locale),
    /// Ordered elements
    Array(Vec<AnyValue>),
    /// Unordered unique elements
    Set(Vec<AnyValue>),
    /// Entries in map order
    Map(Vec<(AnyValue, AnyValue)>),
    /// 2 to 5 elements
    Tuple(Vec<AnyValue>),
    /// Success or failure
    Result(Result<Box<AnyValue>, BridgeError>),
    /// An error value
    Error(BridgeError),
    /// A stream of erased values
    Stream(BridgedStream<AnyValue>),
    /// A native closure
    Closure(AnyClosure),
    /// A bridged native object
    Object(BridgedInstance),
    /// Any other foreign object, reached reflectively
    Dynamic(DynamicObject),
}

impl AnyValue {
    /// Whether this is [`AnyValue::Null`]
    pub fn is_null(&self) -> bool {
        matches!(self, AnyValue::Null)
    }

    /// Integer value, widening smaller integers
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            AnyValue::Byte(v) => Some(*v as i64),
            AnyValue::Short(v) => Some(*v as i64),
            AnyValue::Int(v) => Some(*v as i64),
            AnyValue::Long(v) => Some(*v),
            _ => None,
        }
    }

    /// `int` value
    pub fn as_i32(&self) -> Option<i32> {
        match self {
            AnyValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Floating value, widening `float`
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AnyValue::Float(v) => Some(*v as f64),
            AnyValue::Double(v) => Some(*v),
            _ => None,
        }
    }

    /// `boolean` value
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AnyValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// String contents
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AnyValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Variant name for diagnostics
    pub fn kind(&self) -> &'static str {
        match self {
            AnyValue::Null => "null",
            AnyValue::Bool(_) => "boolean",
            AnyValue::Byte(_) => "byte",
            AnyValue::Char(_) => "char",
            AnyValue::Short(_) => "short",
            AnyValue::Int(_) => "int",
            AnyValue::Long(_) => "long",
            AnyValue::Float(_) => "float",
            AnyValue::Double(_) => "double",
            AnyValue::String(_) => "string",
            AnyValue::Data(_) => "data",
            AnyValue::Date(_) => "date",
            AnyValue::Uuid(_) => "uuid",
            AnyValue::Url(_) => "url",
            AnyValue::Locale(_) => "locale",
            AnyValue::Array(_) => "array",
            AnyValue::Set(_) => "set",
            AnyValue::Map(_) => "map",
            AnyValue::Tuple(_) => "tuple",
            AnyValue::Result(_) => "result",
            AnyValue::Error(_) => "error",
            AnyValue::Stream(_) => "stream",
            AnyValue::Closure(_) => "closure",
            AnyValue::Object(_) => "object",
            AnyValue::Dynamic(_) => "dynamic",
        }
    }

    /// Convert with an explicit fallback for unrecognized objects. Without
    /// one, an unrecognized object is a binding error.
    pub fn from_foreign_with(
        ctx: &dyn ForeignContext,
        value: ForeignValue,
        options: ConversionOptions,
        fallback: Option<Fallback<'_>>,
    ) -> BridgeResult<Self> {
        let obj = match value {
            ForeignValue::Null => return Ok(AnyValue::Null),
            ForeignValue::Bool(v) => return Ok(AnyValue::Bool(v)),
            ForeignValue::Byte(v) => return Ok(AnyValue::Byte(v)),
            ForeignValue::Char(v) => return char::from_foreign(ctx, ForeignValue::Char(v), options).map(AnyValue::Char),
            ForeignValue::Short(v) => return Ok(AnyValue::Short(v)),
            ForeignValue::Int(v) => return Ok(AnyValue::Int(v)),
            ForeignValue::Long(v) => return Ok(AnyValue::Long(v)),
            ForeignValue::Float(v) => return Ok(AnyValue::Float(v)),
            ForeignValue::Double(v) => return Ok(AnyValue::Double(v)),
            ForeignValue::Object(obj) => obj,
        };

        if let Some(projected) = project(ctx, obj, options)? {
            return Ok(projected);
        }
        if let Some(peer) = peer_of(ctx, obj)? {
            return from_peer(ctx, peer, options);
        }

        let tag = BridgedTypeTag::of(ctx, obj)?;
        let value = ForeignValue::Object(obj);
        let nested = options.nested();
        use BridgedTypeTag as Tag;
        Ok(match tag {
            Tag::Boolean => AnyValue::Bool(bool::from_foreign(ctx, value, options)?),
            Tag::Byte => AnyValue::Byte(i8::from_foreign(ctx, value, options)?),
            Tag::Char => AnyValue::Char(char::from_foreign(ctx, value, options)?),
            Tag::Double => AnyValue::Double(f64::from_foreign(ctx, value, options)?),
            Tag::Float => AnyValue::Float(f32::from_foreign(ctx, value, options)?),
            Tag::Int => AnyValue::Int(i32::from_foreign(ctx, value, options)?),
            Tag::Long => AnyValue::Long(i64::from_foreign(ctx, value, options)?),
            Tag::Short => AnyValue::Short(i16::from_foreign(ctx, value, options)?),
            Tag::String => AnyValue::String(String::from_foreign(ctx, value, options)?),
            Tag::ByteArray | Tag::WrappedData => AnyValue::Data(Data::from_foreign(ctx, value, options)?),
            Tag::Date | Tag::WrappedDate => {
                AnyValue::Date(SystemTime::from_foreign(ctx, value, options)?)
            }
            Tag::Uuid | Tag::WrappedUuid => AnyValue::Uuid(Uuid::from_foreign(ctx, value, options)?),
            Tag::Uri | Tag::WrappedUrl => AnyValue::Url(Url::from_foreign(ctx, value, options)?),
            Tag::Locale | Tag::WrappedLocale => {
                AnyValue::Locale(Locale::from_foreign(ctx, value, options)?)
            }
            Tag::List | Tag::WrappedArray => AnyValue::Array(
                list_elements(ctx, obj)?
                    .into_iter()
                    .map(|item| AnyValue::from_foreign(ctx, item, nested))
                    .collect::<BridgeResult<_>>()?,
            ),
            Tag::Set | Tag::WrappedSet => AnyValue::Set(
                set_elements(ctx, obj)?
                    .into_iter()
                    .map(|item| AnyValue::from_foreign(ctx, item, nested))
                    .collect::<BridgeResult<_>>()?,
            ),
            Tag::Map | Tag::WrappedDictionary => AnyValue::Map(
                map_entries(ctx, obj)?
                    .into_iter()
                    .map(|(k, v)| {
                        Ok((
                            AnyValue::from_foreign(ctx, k, nested)?,
                            AnyValue::from_foreign(ctx, v, nested)?,
                        ))
                    })
                    .collect::<BridgeResult<_>>()?,
            ),
            Tag::Tuple => {
                let arity = tuple_arity(&ctx.class_name_of(obj)?).unwrap_or(0);
                AnyValue::Tuple(
                    tuple_elements(ctx, obj, arity)?
                        .into_iter()
                        .map(|item| AnyValue::from_foreign(ctx, item, nested))
                        .collect::<BridgeResult<_>>()?,
                )
            }
            Tag::WrappedOptional => {
                let inner = ctx.field(obj, names::VALUE_FIELD, "Llang/Object;")?;
                return AnyValue::from_foreign_with(ctx, inner, options, fallback);
            }
            Tag::Result | Tag::WrappedResult => AnyValue::Result(match result_parts(ctx, obj)? {
                Ok(value) => Ok(Box::new(AnyValue::from_foreign(ctx, value, nested)?)),
                Err(throwable) => Err(error_from_throwable(ctx, throwable)),
            }),
            Tag::Throwable => AnyValue::Error(error_from_throwable(ctx, obj)),
            Tag::Stream | Tag::WrappedStream | Tag::WrappedThrowingStream => {
                AnyValue::Stream(BridgedStream::<AnyValue>::from_foreign(ctx, value, options)?)
            }
            Tag::Other => {
                if let Some(convert) = bridge_impl_for(ctx, obj)? {
                    return convert(ctx, obj, options);
                }
                match fallback {
                    Some(fallback) => return fallback(ctx, obj, options),
                    None => binding_error(format!(
                        "no conversion for foreign class {}",
                        ctx.class_name_of(obj).unwrap_or_default()
                    )),
                }
            }
        })
    }
}

/// Step 1: `projection(options)` returns a closure producing the value
fn project(
    ctx: &dyn ForeignContext,
    obj: ObjRef,
    options: ConversionOptions,
) -> BridgeResult<Option<AnyValue>> {
    if !ctx.instance_of(obj, names::NATIVE_PROJECTING)? {
        return Ok(None);
    }
    let factory = ctx.call(
        obj,
        "projection",
        "(I)Llang/Function0;",
        &[ForeignValue::Int(options.bits() as i32)],
    )?;
    let factory = BridgedFn::<(), AnyValue>::from_foreign(ctx, factory, options)?;
    factory.call().map(Some)
}

fn from_peer(
    ctx: &dyn ForeignContext,
    peer: Arc<PeerObject>,
    options: ConversionOptions,
) -> BridgeResult<AnyValue> {
    match &*peer {
        PeerObject::Object(instance) => Ok(AnyValue::Object(instance.clone())),
        PeerObject::Error(error) => Ok(AnyValue::Error(error.clone())),
        PeerObject::Stream(source) => Ok(AnyValue::Stream(
            source.take::<AnyValue>(ctx, options)?.unwrap_or_else(BridgedStream::empty),
        )),
        PeerObject::Closure(_) | PeerObject::AsyncClosure(_) => {
            Ok(AnyValue::Closure(AnyClosure { peer }))
        }
        PeerObject::Continuation(_) => Err(BridgeError::conversion("value", "continuation")),
    }
}

fn dynamic_fallback(
    ctx: &dyn ForeignContext,
    obj: ObjRef,
    _options: ConversionOptions,
) -> BridgeResult<AnyValue> {
    Ok(AnyValue::Dynamic(DynamicObject::for_instance(ctx, obj)?))
}

/// Unrecognized objects become [`AnyValue::Dynamic`]
impl Bridgeable for AnyValue {
    fn from_foreign(
        ctx: &dyn ForeignContext,
        value: ForeignValue,
        options: ConversionOptions,
    ) -> BridgeResult<Self> {
        AnyValue::from_foreign_with(ctx, value, options, Some(&dynamic_fallback))
    }

    fn to_foreign(
        self,
        ctx: &dyn ForeignContext,
        options: ConversionOptions,
    ) -> BridgeResult<ForeignValue> {
        let nested = options.nested();
        match self {
            AnyValue::Null => Ok(ForeignValue::Null),
            AnyValue::Bool(v) => Ok(ForeignValue::Bool(v)),
            AnyValue::Byte(v) => Ok(ForeignValue::Byte(v)),
            AnyValue::Char(v) => v.to_foreign(ctx, options),
            AnyValue::Short(v) => Ok(ForeignValue::Short(v)),
            AnyValue::Int(v) => Ok(ForeignValue::Int(v)),
            AnyValue::Long(v) => Ok(ForeignValue::Long(v)),
            AnyValue::Float(v) => Ok(ForeignValue::Float(v)),
            AnyValue::Double(v) => Ok(ForeignValue::Double(v)),
            AnyValue::String(v) => v.to_foreign(ctx, options),
            AnyValue::Data(v) => v.to_foreign(ctx, options),
            AnyValue::Date(v) => v.to_foreign(ctx, options),
            AnyValue::Uuid(v) => v.to_foreign(ctx, options),
            AnyValue::Url(v) => v.to_foreign(ctx, options),
            AnyValue::Locale(v) => v.to_foreign(ctx, options),
            AnyValue::Array(items) => items.to_foreign(ctx, options),
            AnyValue::Set(items) => {
                let items = items
                    .into_iter()
                    .map(|item| to_object(item, ctx, nested))
                    .collect::<BridgeResult<Vec<_>>>()?;
                build_set(ctx, items, options)
            }
            AnyValue::Map(entries) => {
                let entries = entries
                    .into_iter()
                    .map(|(k, v)| Ok((to_object(k, ctx, nested)?, to_object(v, ctx, nested)?)))
                    .collect::<BridgeResult<Vec<_>>>()?;
                build_map(ctx, entries, options)
            }
            AnyValue::Tuple(items) => {
                let items = items
                    .into_iter()
                    .map(|item| to_object(item, ctx, nested))
                    .collect::<BridgeResult<Vec<_>>>()?;
                Ok(ForeignValue::Object(build_tuple(ctx, items)?))
            }
            AnyValue::Result(outcome) => {
                let outcome = match outcome {
                    Ok(value) => Ok(to_object(*value, ctx, nested)?),
                    Err(error) => Err(error.to_foreign(ctx, options)?),
                };
                build_result(ctx, outcome, options)
            }
            AnyValue::Error(error) => error.to_foreign(ctx, options),
            AnyValue::Stream(stream) => stream.to_foreign(ctx, options),
            AnyValue::Closure(closure) => closure.to_foreign(ctx),
            AnyValue::Object(instance) => instance.to_foreign(ctx),
            AnyValue::Dynamic(object) => object.to_foreign(ctx),
        }
    }
}

impl PartialEq for AnyValue {
    fn eq(&self, other: &Self) -> bool {
        use AnyValue as V;
        match (self, other) {
            (V::Null, V::Null) => true,
            (V::Bool(a), V::Bool(b)) => a == b,
            (V::Byte(a), V::Byte(b)) => a == b,
            (V::Char(a), V::Char(b)) => a == b,
            (V::Short(a), V::Short(b)) => a == b,
            (V::Int(a), V::Int(b)) => a == b,
            (V::Long(a), V::Long(b)) => a == b,
            (V::Float(a), V::Float(b)) => a == b,
            (V::Double(a), V::Double(b)) => a == b,
            (V::String(a), V::String(b)) => a == b,
            (V::Data(a), V::Data(b)) => a == b,
            (V::Date(a), V::Date(b)) => a == b,
            (V::Uuid(a), V::Uuid(b)) => a == b,
            (V::Url(a), V::Url(b)) => a == b,
            (V::Locale(a), V::Locale(b)) => a == b,
            (V::Array(a), V::Array(b)) | (V::Set(a), V::Set(b)) | (V::Tuple(a), V::Tuple(b)) => a == b,
            (V::Map(a), V::Map(b)) => a == b,
            (V::Result(Ok(a)), V::Result(Ok(b))) => a == b,
            (V::Result(Err(a)), V::Result(Err(b))) | (V::Error(a), V::Error(b)) => {
                a.to_string() == b.to_string()
            }
            (V::Closure(a), V::Closure(b)) => Arc::ptr_eq(&a.peer, &b.peer),
            (V::Object(a), V::Object(b)) => a.same_object(b),
            (V::Dynamic(a), V::Dynamic(b)) => a.same_target(b),
            _ => false,
        }
    }
}

impl fmt::Debug for AnyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnyValue::Null => write!(f, "Null"),
            AnyValue::Bool(v) => write!(f, "Bool({})", v),
            AnyValue::Byte(v) => write!(f, "Byte({})", v),
            AnyValue::Char(v) => write!(f, "Char({:?})", v),
            AnyValue::Short(v) => write!(f, "Short({})", v),
            AnyValue::Int(v) => write!(f, "Int({})", v),
            AnyValue::Long(v) => write!(f, "Long({})", v),
            AnyValue::Float(v) => write!(f, "Float({})", v),
            AnyValue::Double(v) => write!(f, "Double({})", v),
            AnyValue::String(v) => write!(f, "String({:?})", v),
            AnyValue::Data(v) => write!(f, "Data({} bytes)", v.0.len()),
            AnyValue::Date(v) => write!(f, "Date({:?})", v),
            AnyValue::Uuid(v) => write!(f, "Uuid({})", v),
            AnyValue::Url(v) => write!(f, "Url({})", v),
            AnyValue::Locale(v) => write!(f, "Locale({})", v.identifier()),
            AnyValue::Array(v) => f.debug_tuple("Array").field(v).finish(),
            AnyValue::Set(v) => f.debug_tuple("Set").field(v).finish(),
            AnyValue::Map(v) => f.debug_tuple("Map").field(v).finish(),
            AnyValue::Tuple(v) => f.debug_tuple("Tuple").field(v).finish(),
            AnyValue::Result(v) => f.debug_tuple("Result").field(v).finish(),
            AnyValue::Error(e) => write!(f, "Error({})", e),
            AnyValue::Stream(_) => write!(f, "Stream"),
            AnyValue::Closure(c) => write!(f, "Closure({})", c.arity()),
            AnyValue::Object(o) => f.debug_tuple("Object").field(o).finish(),
            AnyValue::Dynamic(d) => f.debug_tuple("Dynamic").field(d).finish(),
        }
    }
}

macro_rules! any_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for AnyValue {
                fn from(value: $ty) -> Self {
                    AnyValue::$variant(value)
                }
            }
        )*
    };
}

any_from! {
    bool => Bool,
    i8 => Byte,
    char => Char,
    i16 => Short,
    i32 => Int,
    i64 => Long,
    f32 => Float,
    f64 => Double,
    String => String,
    Data => Data,
    SystemTime => Date,
    Uuid => Uuid,
    Url => Url,
    Locale => Locale,
    BridgeError => Error,
}

impl From<&str> for AnyValue {
    fn from(value: &str) -> Self {
        AnyValue::String(value.to_string())
    }
}

impl<T: Into<AnyValue>> From<Vec<T>> for AnyValue {
    fn from(items: Vec<T>) -> Self {
        AnyValue::Array(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<AnyValue>> From<Option<T>> for AnyValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(AnyValue::Null, Into::into)
    }
}

// ============================================================================
// Erased closures
// ============================================================================

/// A native closure reached through an erased slot
#[derive(Clone)]
pub struct AnyClosure {
    peer: Arc<PeerObject>,
}

impl AnyClosure {
    /// Number of parameters
    pub fn arity(&self) -> usize {
        match &*self.peer {
            PeerObject::Closure(closure) => closure.arity(),
            PeerObject::AsyncClosure(closure) => closure.arity(),
            _ => 0,
        }
    }

    /// Whether this is a suspending closure
    pub fn is_async(&self) -> bool {
        matches!(&*self.peer, PeerObject::AsyncClosure(_))
    }

    /// The typed closure, e.g. `BridgedFn<(i32,), String>`
    pub fn native<T: Clone + 'static>(&self) -> Option<T> {
        match &*self.peer {
            PeerObject::Closure(closure) => closure.native::<T>(),
            PeerObject::AsyncClosure(closure) => closure.native::<T>(),
            _ => None,
        }
    }

    /// Call a synchronous closure with erased arguments
    pub fn call(&self, ctx: &dyn ForeignContext, args: Vec<AnyValue>) -> BridgeResult<AnyValue> {
        let PeerObject::Closure(closure) = &*self.peer else {
            return Err(BridgeError::conversion("synchronous closure", "async closure"));
        };
        let options = closure.options();
        let args = args
            .into_iter()
            .map(|arg| to_object(arg, ctx, options))
            .collect::<BridgeResult<Vec<_>>>()?;
        let result = closure.invoke(ctx, &args)?;
        AnyValue::from_foreign(ctx, result, options)
    }

    fn to_foreign(&self, ctx: &dyn ForeignContext) -> BridgeResult<ForeignValue> {
        let class = if self.is_async() {
            names::async_closure_class(self.arity())
        } else {
            names::closure_class(self.arity())
        };
        let proxy = wrap_peer(ctx, &class, "(J)V", &[], self.peer.clone())?;
        Ok(ForeignValue::Object(proxy))
    }
}
