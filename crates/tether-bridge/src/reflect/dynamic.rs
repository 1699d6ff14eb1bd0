//! Dynamic objects
//!
//! A [`DynamicObject`] reaches a foreign instance or class by member name,
//! choosing among overloads with [`super::resolver`]. Arguments are
//! [`AnyValue`]s; results come back as [`AnyValue`] or any [`Bridgeable`]
//! type.

use std::fmt;
use std::sync::{Arc, LazyLock};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tether_sdk::names;
use tether_sdk::{ClassRef, ForeignContext, ForeignValue, MemberDesc, MemberKind, ObjRef, TypeDesc};

use super::resolver::{describe_arguments, resolve, ArgKind, Argument, Slot, TypeOracle};
use crate::attach;
use crate::call::CallExt;
use crate::config::config;
use crate::convert::collection::build_list;
use crate::convert::{AnyValue, Bridgeable};
use crate::error::{BridgeError, BridgeResult};
use crate::global::GlobalRef;
use crate::options::ConversionOptions;

// ============================================================================
// Member cache
// ============================================================================

type MemberCache = FxHashMap<(u64, ClassRef), Arc<Vec<MemberDesc>>>;

static MEMBERS: LazyLock<Mutex<MemberCache>> = LazyLock::new(|| Mutex::new(FxHashMap::default()));

/// Visible members of `class`, cached per runtime unless disabled
fn members_of(ctx: &dyn ForeignContext, class: ClassRef) -> BridgeResult<Arc<Vec<MemberDesc>>> {
    if !config().reflection.cache_members {
        return Ok(Arc::new(ctx.members(class)?));
    }
    let key = (ctx.runtime_id(), class);
    if let Some(members) = MEMBERS.lock().get(&key) {
        return Ok(members.clone());
    }
    let members = Arc::new(ctx.members(class)?);
    MEMBERS.lock().insert(key, members.clone());
    Ok(members)
}

/// Class hierarchy answered by the foreign runtime
struct ContextOracle<'a>(&'a dyn ForeignContext);

impl TypeOracle for ContextOracle<'_> {
    fn is_assignable(&self, sub: &str, sup: &str) -> bool {
        match (self.0.class(sub), self.0.class(sup)) {
            (Ok(sub), Ok(sup)) => self.0.is_assignable_from(sub, sup),
            _ => false,
        }
    }
}

// ============================================================================
// Argument preparation
// ============================================================================

/// Arguments converted to foreign slots, with their shapes
struct Prepared {
    values: Vec<ForeignValue>,
    shapes: Vec<Argument>,
}

fn prepare(
    ctx: &dyn ForeignContext,
    args: Vec<(Option<String>, AnyValue)>,
    options: ConversionOptions,
) -> BridgeResult<Prepared> {
    let mut values = Vec::with_capacity(args.len());
    let mut shapes = Vec::with_capacity(args.len());
    for (name, value) in args {
        let value = value.to_foreign(ctx, options)?;
        shapes.push(Argument {
            name,
            kind: shape(ctx, value)?,
        });
        values.push(value);
    }
    Ok(Prepared { values, shapes })
}

fn shape(ctx: &dyn ForeignContext, value: ForeignValue) -> BridgeResult<ArgKind> {
    Ok(match value {
        ForeignValue::Null => ArgKind::Null,
        ForeignValue::Bool(_) => ArgKind::Primitive(TypeDesc::Bool),
        ForeignValue::Byte(_) => ArgKind::Primitive(TypeDesc::Byte),
        ForeignValue::Char(_) => ArgKind::Primitive(TypeDesc::Char),
        ForeignValue::Short(_) => ArgKind::Primitive(TypeDesc::Short),
        ForeignValue::Int(_) => ArgKind::Primitive(TypeDesc::Int),
        ForeignValue::Long(_) => ArgKind::Primitive(TypeDesc::Long),
        ForeignValue::Float(_) => ArgKind::Primitive(TypeDesc::Float),
        ForeignValue::Double(_) => ArgKind::Primitive(TypeDesc::Double),
        ForeignValue::Object(obj) => {
            let class = ctx.class_name_of(obj)?;
            let char_string = class == names::STRING && ctx.string_of(obj)?.chars().count() == 1;
            ArgKind::Object { class, char_string }
        }
    })
}

/// Adapt `value` to the declared parameter type
fn coerce(ctx: &dyn ForeignContext, value: ForeignValue, ty: &TypeDesc) -> BridgeResult<ForeignValue> {
    match value {
        ForeignValue::Null => Ok(ForeignValue::Null),
        ForeignValue::Object(obj) if *ty == TypeDesc::Char => {
            if let Some(unboxed) = ctx.unboxed(obj)? {
                return widen(unboxed, ty);
            }
            let text = ctx.string_of(obj)?;
            let mut units = text.encode_utf16();
            match (units.next(), units.next()) {
                (Some(unit), None) => Ok(ForeignValue::Char(unit)),
                _ => Err(BridgeError::conversion("char", format!("\"{}\"", text))),
            }
        }
        ForeignValue::Object(obj) if ty.is_primitive() => {
            let unboxed = ctx
                .unboxed(obj)?
                .ok_or_else(|| BridgeError::conversion(ty.display_name(), "object"))?;
            widen(unboxed, ty)
        }
        ForeignValue::Object(_) => Ok(value),
        primitive if ty.is_primitive() => widen(primitive, ty),
        primitive => ctx.boxed(primitive),
    }
}

/// Primitive widening to `ty`
fn widen(value: ForeignValue, ty: &TypeDesc) -> BridgeResult<ForeignValue> {
    let integral = match value {
        ForeignValue::Byte(v) => Some(v as i64),
        ForeignValue::Short(v) => Some(v as i64),
        ForeignValue::Char(v) => Some(v as i64),
        ForeignValue::Int(v) => Some(v as i64),
        ForeignValue::Long(v) => Some(v),
        _ => None,
    };
    let floating = match value {
        ForeignValue::Float(v) => Some(v as f64),
        ForeignValue::Double(v) => Some(v),
        _ => integral.map(|v| v as f64),
    };
    let widened = match ty {
        TypeDesc::Bool => value.as_bool().map(ForeignValue::Bool),
        TypeDesc::Byte => matches!(value, ForeignValue::Byte(_)).then_some(value),
        TypeDesc::Char => matches!(value, ForeignValue::Char(_)).then_some(value),
        TypeDesc::Short => integral.map(|v| ForeignValue::Short(v as i16)),
        TypeDesc::Int => integral.map(|v| ForeignValue::Int(v as i32)),
        TypeDesc::Long => integral.map(ForeignValue::Long),
        TypeDesc::Float => floating.map(|v| ForeignValue::Float(v as f32)),
        TypeDesc::Double => floating.map(ForeignValue::Double),
        _ => None,
    };
    widened.ok_or_else(|| BridgeError::conversion(ty.display_name(), value.type_name()))
}

fn accessor(prefix: &str, property: &str) -> String {
    let mut chars = property.chars();
    match chars.next() {
        Some(first) => format!("{}{}{}", prefix, first.to_uppercase(), chars.as_str()),
        None => prefix.to_string(),
    }
}

fn positional(args: Vec<AnyValue>) -> Vec<(Option<String>, AnyValue)> {
    args.into_iter().map(|value| (None, value)).collect()
}

fn keyword(args: Vec<(&str, AnyValue)>) -> Vec<(Option<String>, AnyValue)> {
    args.into_iter()
        .map(|(name, value)| (Some(name.to_string()), value))
        .collect()
}

// ============================================================================
// DynamicObject
// ============================================================================

#[derive(Clone)]
enum Target {
    Instance(Arc<GlobalRef>),
    Class,
}

/// Which members a lookup considers
#[derive(Clone, Copy)]
enum Select {
    Constructor,
    Function,
}

/// A foreign instance or class reached by member name
#[derive(Clone)]
pub struct DynamicObject {
    ctx: Arc<dyn ForeignContext>,
    target: Target,
    class: ClassRef,
    class_name: String,
}

impl DynamicObject {
    /// Wrap a foreign instance
    pub fn for_instance(ctx: &dyn ForeignContext, obj: ObjRef) -> BridgeResult<Self> {
        let class = ctx.class_of(obj)?;
        Ok(Self {
            ctx: ctx.runtime(),
            target: Target::Instance(Arc::new(GlobalRef::new(ctx, obj)?)),
            class,
            class_name: ctx.class_name(class)?,
        })
    }

    /// Wrap a foreign class, for static members and construction
    pub fn for_class(ctx: &dyn ForeignContext, class_name: &str) -> BridgeResult<Self> {
        Ok(Self {
            ctx: ctx.runtime(),
            target: Target::Class,
            class: ctx.class(class_name)?,
            class_name: class_name.to_string(),
        })
    }

    /// Construct `class_name` with the best-matching constructor
    pub fn new_instance(
        ctx: &dyn ForeignContext,
        class_name: &str,
        args: Vec<AnyValue>,
    ) -> BridgeResult<Self> {
        Self::for_class(ctx, class_name)?.construct(positional(args))
    }

    /// Construct `class_name` with keyword arguments
    pub fn new_instance_named(
        ctx: &dyn ForeignContext,
        class_name: &str,
        args: Vec<(&str, AnyValue)>,
    ) -> BridgeResult<Self> {
        Self::for_class(ctx, class_name)?.construct(keyword(args))
    }

    fn construct(&self, args: Vec<(Option<String>, AnyValue)>) -> BridgeResult<Self> {
        let ctx = self.ctx.clone();
        attach::scoped(&*ctx, |ctx| {
            let created = self.dispatch(ctx, "<init>", Select::Constructor, args)?;
            match created {
                ForeignValue::Object(obj) => Self::for_instance(ctx, obj),
                _ => Err(BridgeError::UnexpectedNull(self.class_name.clone())),
            }
        })
    }

    /// Concrete class name of the target
    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    /// The instance, if this wraps one
    pub fn as_object(&self) -> Option<ObjRef> {
        match &self.target {
            Target::Instance(global) => Some(global.obj()),
            Target::Class => None,
        }
    }

    /// Whether both wrap the same foreign instance or class
    pub fn same_target(&self, other: &DynamicObject) -> bool {
        if self.ctx.runtime_id() != other.ctx.runtime_id() {
            return false;
        }
        match (&self.target, &other.target) {
            (Target::Instance(a), Target::Instance(b)) => self.ctx.is_same_object(a.obj(), b.obj()),
            (Target::Class, Target::Class) => self.class == other.class,
            _ => false,
        }
    }

    /// The wrapped instance as a slot value
    pub fn to_foreign(&self, ctx: &dyn ForeignContext) -> BridgeResult<ForeignValue> {
        match &self.target {
            Target::Instance(global) if global.belongs_to(ctx) => Ok(ForeignValue::Object(global.obj())),
            Target::Instance(_) => Err(BridgeError::msg(format!(
                "{} belongs to another runtime",
                self.class_name
            ))),
            Target::Class => Err(BridgeError::conversion("object", format!("class {}", self.class_name))),
        }
    }

    // ------------------------------------------------------------------------
    // Properties
    // ------------------------------------------------------------------------

    /// Read property `name`, falling back to `getName()`
    pub fn get(&self, name: &str) -> BridgeResult<AnyValue> {
        self.get_as(name)
    }

    /// Read property `name` as `T`
    pub fn get_as<T: Bridgeable>(&self, name: &str) -> BridgeResult<T> {
        let ctx = self.ctx.clone();
        attach::scoped(&*ctx, |ctx| {
            let options = ConversionOptions::configured();
            let value = match self.property(ctx, name)? {
                Some(member) => {
                    let args: Vec<Option<ForeignValue>> = member
                        .params
                        .iter()
                        .map(|p| if p.is_receiver() { self.receiver() } else { None })
                        .collect();
                    let value = ctx.invoke_member(&member, &args);
                    ctx.check()?;
                    value?
                }
                None => self
                    .dispatch(ctx, &accessor("get", name), Select::Function, Vec::new())
                    .map_err(|e| self.missing_property(e, name, ""))?,
            };
            T::from_foreign(ctx, value, options)
        })
    }

    /// Write property `name`, falling back to `setName(value)`
    pub fn set(&self, name: &str, value: impl Into<AnyValue>) -> BridgeResult<()> {
        let value = value.into();
        let ctx = self.ctx.clone();
        attach::scoped(&*ctx, |ctx| {
            let options = ConversionOptions::configured();
            match self.property(ctx, name)?.filter(|m| m.is_mutable_property()) {
                Some(member) => {
                    let slot = coerce(ctx, value.to_foreign(ctx, options)?, &member.return_type)?;
                    let written = ctx.set_property(&member, self.as_object(), slot);
                    ctx.check()?;
                    written?;
                }
                None => {
                    self.dispatch(ctx, &accessor("set", name), Select::Function, vec![(None, value)])
                        .map_err(|e| self.missing_property(e, name, "="))?;
                }
            }
            Ok(())
        })
    }

    fn property(&self, ctx: &dyn ForeignContext, name: &str) -> BridgeResult<Option<MemberDesc>> {
        let members = members_of(ctx, self.class)?;
        let wants_static = matches!(self.target, Target::Class);
        Ok(members
            .iter()
            .find(|m| m.is_property() && m.name == name && m.is_static == wants_static)
            .cloned())
    }

    fn missing_property(&self, error: BridgeError, name: &str, suffix: &str) -> BridgeError {
        match error {
            BridgeError::NoSuchMember { arguments, .. } => BridgeError::NoSuchMember {
                target: self.class_name.clone(),
                member: format!("{}{}", name, suffix),
                arguments,
            },
            other => other,
        }
    }

    // ------------------------------------------------------------------------
    // Calls
    // ------------------------------------------------------------------------

    /// Call method `name` with positional arguments
    pub fn call(&self, name: &str, args: Vec<AnyValue>) -> BridgeResult<AnyValue> {
        self.call_as(name, args)
    }

    /// Call method `name`, converting the result to `T`
    pub fn call_as<T: Bridgeable>(&self, name: &str, args: Vec<AnyValue>) -> BridgeResult<T> {
        self.invoke_with(name, positional(args))
    }

    /// Call method `name` with keyword arguments
    pub fn call_named(&self, name: &str, args: Vec<(&str, AnyValue)>) -> BridgeResult<AnyValue> {
        self.call_named_as(name, args)
    }

    /// Call method `name` with keyword arguments, converting the result to `T`
    pub fn call_named_as<T: Bridgeable>(&self, name: &str, args: Vec<(&str, AnyValue)>) -> BridgeResult<T> {
        self.invoke_with(name, keyword(args))
    }

    /// A callable bound to method `name`
    pub fn method(&self, name: &str) -> DynamicCall {
        DynamicCall {
            object: self.clone(),
            name: name.to_string(),
        }
    }

    fn invoke_with<T: Bridgeable>(
        &self,
        name: &str,
        args: Vec<(Option<String>, AnyValue)>,
    ) -> BridgeResult<T> {
        let ctx = self.ctx.clone();
        attach::scoped(&*ctx, |ctx| {
            let value = self.dispatch(ctx, name, Select::Function, args)?;
            T::from_foreign(ctx, value, ConversionOptions::configured())
        })
    }

    fn receiver(&self) -> Option<ForeignValue> {
        self.as_object().map(ForeignValue::Object)
    }

    fn accepts(&self, member: &MemberDesc, name: &str, select: Select) -> bool {
        match select {
            Select::Constructor => member.kind == MemberKind::Constructor,
            Select::Function => {
                member.kind == MemberKind::Function
                    && member.name == name
                    && match self.target {
                        Target::Instance(_) => {
                            !member.is_static || member.params.iter().any(|p| p.is_receiver())
                        }
                        Target::Class => {
                            member.is_static && !member.params.iter().any(|p| p.is_receiver())
                        }
                    }
            }
        }
    }

    /// Resolve and invoke `name` on the target
    fn dispatch(
        &self,
        ctx: &dyn ForeignContext,
        name: &str,
        select: Select,
        args: Vec<(Option<String>, AnyValue)>,
    ) -> BridgeResult<ForeignValue> {
        let options = ConversionOptions::configured();
        let prepared = prepare(ctx, args, options)?;
        let members = members_of(ctx, self.class)?;
        let candidates: Vec<MemberDesc> = members
            .iter()
            .filter(|m| self.accepts(m, name, select))
            .cloned()
            .collect();

        let Some(chosen) = resolve(&candidates, &prepared.shapes, &ContextOracle(ctx)) else {
            return Err(BridgeError::NoSuchMember {
                target: self.class_name.clone(),
                member: name.to_string(),
                arguments: describe_arguments(&prepared.shapes),
            });
        };
        tracing::debug!(
            target_class = %self.class_name,
            member = %chosen.member.display(),
            score = chosen.score,
            candidates = candidates.len(),
            "overload selected"
        );

        let mut call_args = Vec::with_capacity(chosen.slots.len());
        for (param, slot) in chosen.member.params.iter().zip(&chosen.slots) {
            let arg = match slot {
                Slot::Receiver => Some(self.receiver().ok_or_else(|| {
                    BridgeError::msg(format!("{} needs an instance", chosen.member.display()))
                })?),
                Slot::Arg(i) => Some(coerce(ctx, prepared.values[*i], &param.ty)?),
                Slot::Vararg(indices) => {
                    let items = indices
                        .iter()
                        .map(|&i| {
                            let item = coerce(ctx, prepared.values[i], &param.ty)?;
                            ctx.boxed(item)
                        })
                        .collect::<BridgeResult<Vec<_>>>()?;
                    Some(build_list(ctx, items, ConversionOptions::NATIVE_CONTAINER)?)
                }
                Slot::Default => None,
            };
            call_args.push(arg);
        }

        let result = ctx.invoke_member(chosen.member, &call_args);
        ctx.check()?;
        Ok(result?)
    }
}

macro_rules! typed_object_forms {
    ($($get:ident, $call:ident => $ty:ty;)*) => {
        impl DynamicObject {
            $(
                #[doc = concat!("Read a property as `", stringify!($ty), "`")]
                pub fn $get(&self, name: &str) -> BridgeResult<$ty> {
                    self.get_as::<$ty>(name)
                }

                #[doc = concat!("Call a method returning `", stringify!($ty), "`")]
                pub fn $call(&self, name: &str, args: Vec<AnyValue>) -> BridgeResult<$ty> {
                    self.call_as::<$ty>(name, args)
                }
            )*
        }
    };
}

typed_object_forms! {
    get_bool, call_bool => bool;
    get_byte, call_byte => i8;
    get_char, call_char => char;
    get_double, call_double => f64;
    get_float, call_float => f32;
    get_int, call_int => i32;
    get_long, call_long => i64;
    get_short, call_short => i16;
    get_string, call_string => String;
}

impl fmt::Debug for DynamicObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.target {
            Target::Instance(global) => f
                .debug_struct("DynamicObject")
                .field("class", &self.class_name)
                .field("object", &global.obj())
                .finish(),
            Target::Class => f.debug_struct("DynamicClass").field("class", &self.class_name).finish(),
        }
    }
}

// ============================================================================
// DynamicCall
// ============================================================================

/// A method of a [`DynamicObject`], resolved anew on each invocation
#[derive(Debug, Clone)]
pub struct DynamicCall {
    object: DynamicObject,
    name: String,
}

impl DynamicCall {
    /// Method name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Invoke with positional arguments
    pub fn invoke(&self, args: Vec<AnyValue>) -> BridgeResult<AnyValue> {
        self.object.call(&self.name, args)
    }

    /// Invoke with positional arguments, converting the result to `T`
    pub fn invoke_as<T: Bridgeable>(&self, args: Vec<AnyValue>) -> BridgeResult<T> {
        self.object.call_as(&self.name, args)
    }

    /// Invoke with keyword arguments
    pub fn invoke_named(&self, args: Vec<(&str, AnyValue)>) -> BridgeResult<AnyValue> {
        self.object.call_named(&self.name, args)
    }

    /// Invoke with keyword arguments, converting the result to `T`
    pub fn invoke_named_as<T: Bridgeable>(&self, args: Vec<(&str, AnyValue)>) -> BridgeResult<T> {
        self.object.call_named_as(&self.name, args)
    }
}

macro_rules! typed_call_forms {
    ($($invoke:ident => $ty:ty;)*) => {
        impl DynamicCall {
            $(
                #[doc = concat!("Invoke, returning `", stringify!($ty), "`")]
                pub fn $invoke(&self, args: Vec<AnyValue>) -> BridgeResult<$ty> {
                    self.invoke_as::<$ty>(args)
                }
            )*
        }
    };
}

typed_call_forms! {
    invoke_bool => bool;
    invoke_byte => i8;
    invoke_char => char;
    invoke_double => f64;
    invoke_float => f32;
    invoke_int => i32;
    invoke_long => i64;
    invoke_short => i16;
    invoke_string => String;
}
