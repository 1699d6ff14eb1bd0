//! Checked calls
//!
//! Every call the bridge makes into the foreign runtime goes through
//! [`CallExt`]: look the member up by name (cached per runtime), call it,
//! then turn a pending foreign exception into `BridgeError` and clear it.
//! Queued native errors (see [`crate::error::push_pending`]) surface here
//! too.

use std::sync::LazyLock;

use dashmap::DashMap;
use tether_sdk::names;
use tether_sdk::{ClassRef, FieldId, ForeignContext, ForeignError, ForeignValue, MethodId, ObjRef};

use crate::convert::error::error_from_throwable;
use crate::error::{check_pending, BridgeError, BridgeResult};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum MemberKey {
    Method(ClassRef, String, String),
    Static(ClassRef, String, String),
    Constructor(ClassRef, String),
    Field(ClassRef, String, String),
}

static CLASSES: LazyLock<DashMap<(u64, String), ClassRef>> = LazyLock::new(DashMap::new);
static MEMBERS: LazyLock<DashMap<(u64, MemberKey), u64>> = LazyLock::new(DashMap::new);

fn pack(class: ClassRef, index: u32) -> u64 {
    ((class.index() as u64) << 32) | index as u64
}

fn unpack(packed: u64) -> (ClassRef, u32) {
    (ClassRef::new((packed >> 32) as u32), packed as u32)
}

/// Checked, name-based calls on a foreign runtime
pub trait CallExt {
    /// Resolve a class by name, cached per runtime
    fn class(&self, name: &str) -> BridgeResult<ClassRef>;

    /// Convert and clear a pending foreign exception, then re-raise any
    /// queued native error
    fn check(&self) -> BridgeResult<()>;

    /// Call an instance method (virtual dispatch)
    fn call(&self, obj: ObjRef, name: &str, sig: &str, args: &[ForeignValue])
        -> BridgeResult<ForeignValue>;

    /// Call a static method
    fn call_static(
        &self,
        class: &str,
        name: &str,
        sig: &str,
        args: &[ForeignValue],
    ) -> BridgeResult<ForeignValue>;

    /// Construct an instance of `class`
    fn construct(&self, class: &str, sig: &str, args: &[ForeignValue]) -> BridgeResult<ObjRef>;

    /// Read an instance field by name
    fn field(&self, obj: ObjRef, name: &str, sig: &str) -> BridgeResult<ForeignValue>;

    /// Write an instance field by name
    fn set_field_value(&self, obj: ObjRef, name: &str, sig: &str, value: ForeignValue)
        -> BridgeResult<()>;

    /// Allocate a foreign string
    fn new_str(&self, s: &str) -> BridgeResult<ForeignValue>;

    /// Read a foreign string
    fn string_of(&self, obj: ObjRef) -> BridgeResult<String>;

    /// Class name of `obj`
    fn class_name_of(&self, obj: ObjRef) -> BridgeResult<String>;

    /// Whether `obj` is an instance of the named class. Unknown classes
    /// have no instances.
    fn instance_of(&self, obj: ObjRef, class: &str) -> BridgeResult<bool>;

    /// Box a primitive for a generic slot; objects and null pass through
    fn boxed(&self, value: ForeignValue) -> BridgeResult<ForeignValue>;

    /// Unbox a boxed primitive, `None` if `obj` is not one
    fn unboxed(&self, obj: ObjRef) -> BridgeResult<Option<ForeignValue>>;
}

/// Boxed class and `valueOf` descriptor for each primitive slot code
pub(crate) fn boxed_class(code: char) -> Option<(&'static str, char)> {
    Some(match code {
        'Z' => (names::BOOLEAN, 'Z'),
        'B' => (names::BYTE, 'B'),
        'C' => (names::CHARACTER, 'C'),
        'S' => (names::SHORT, 'S'),
        'I' => (names::INTEGER, 'I'),
        'J' => (names::LONG, 'J'),
        'F' => (names::FLOAT, 'F'),
        'D' => (names::DOUBLE, 'D'),
        _ => return None,
    })
}

fn primitive_code_of_boxed(class: &str) -> Option<char> {
    Some(match class {
        names::BOOLEAN => 'Z',
        names::BYTE => 'B',
        names::CHARACTER => 'C',
        names::SHORT => 'S',
        names::INTEGER => 'I',
        names::LONG => 'J',
        names::FLOAT => 'F',
        names::DOUBLE => 'D',
        _ => return None,
    })
}

impl<'a> CallExt for dyn ForeignContext + 'a {
    fn class(&self, name: &str) -> BridgeResult<ClassRef> {
        let key = (self.runtime_id(), name.to_string());
        if let Some(class) = CLASSES.get(&key) {
            return Ok(*class);
        }
        let class = self.find_class(name)?;
        CLASSES.insert(key, class);
        Ok(class)
    }

    fn check(&self) -> BridgeResult<()> {
        if let Some(throwable) = self.exception_occurred() {
            self.exception_clear();
            return Err(error_from_throwable(self, throwable));
        }
        check_pending()
    }

    fn call(
        &self,
        obj: ObjRef,
        name: &str,
        sig: &str,
        args: &[ForeignValue],
    ) -> BridgeResult<ForeignValue> {
        let class = self.class_of(obj)?;
        let method = cached(self, MemberKey::Method(class, name.to_string(), sig.to_string()), || {
            self.method_id(class, name, sig).map(|m| pack(m.class(), m.index()))
        })?;
        let (owner, index) = unpack(method);
        let result = self.call_method(obj, MethodId::new(owner, index), args);
        self.check()?;
        Ok(result?)
    }

    fn call_static(
        &self,
        class: &str,
        name: &str,
        sig: &str,
        args: &[ForeignValue],
    ) -> BridgeResult<ForeignValue> {
        let class = CallExt::class(self, class)?;
        let method = cached(self, MemberKey::Static(class, name.to_string(), sig.to_string()), || {
            self.static_method_id(class, name, sig).map(|m| pack(m.class(), m.index()))
        })?;
        let (owner, index) = unpack(method);
        let result = self.call_static_method(class, MethodId::new(owner, index), args);
        self.check()?;
        Ok(result?)
    }

    fn construct(&self, class_name: &str, sig: &str, args: &[ForeignValue]) -> BridgeResult<ObjRef> {
        let class = CallExt::class(self, class_name)?;
        let ctor = cached(self, MemberKey::Constructor(class, sig.to_string()), || {
            self.constructor_id(class, sig).map(|m| pack(m.class(), m.index()))
        })?;
        let (owner, index) = unpack(ctor);
        let result = self.new_object(class, MethodId::new(owner, index), args);
        self.check()?;
        match result? {
            ForeignValue::Object(obj) => Ok(obj),
            _ => Err(BridgeError::UnexpectedNull(class_name.to_string())),
        }
    }

    fn field(&self, obj: ObjRef, name: &str, sig: &str) -> BridgeResult<ForeignValue> {
        let field = field_of(self, obj, name, sig)?;
        Ok(self.get_field(obj, field)?)
    }

    fn set_field_value(
        &self,
        obj: ObjRef,
        name: &str,
        sig: &str,
        value: ForeignValue,
    ) -> BridgeResult<()> {
        let field = field_of(self, obj, name, sig)?;
        Ok(self.set_field(obj, field, value)?)
    }

    fn new_str(&self, s: &str) -> BridgeResult<ForeignValue> {
        Ok(ForeignValue::Object(self.new_string(s)?))
    }

    fn string_of(&self, obj: ObjRef) -> BridgeResult<String> {
        Ok(self.read_string(obj)?)
    }

    fn class_name_of(&self, obj: ObjRef) -> BridgeResult<String> {
        let class = self.class_of(obj)?;
        Ok(self.class_name(class)?)
    }

    fn instance_of(&self, obj: ObjRef, class: &str) -> BridgeResult<bool> {
        match CallExt::class(self, class) {
            Ok(class) => Ok(self.is_instance_of(obj, class)),
            Err(BridgeError::Abi(ForeignError::NoSuchClass(_))) => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn boxed(&self, value: ForeignValue) -> BridgeResult<ForeignValue> {
        let Some((class, code)) = boxed_class(value.descriptor_code()).filter(|_| value.is_primitive())
        else {
            return Ok(value);
        };
        let sig = format!("({})L{};", code, class);
        self.call_static(class, "valueOf", &sig, &[value])
    }

    fn unboxed(&self, obj: ObjRef) -> BridgeResult<Option<ForeignValue>> {
        let class = self.class_name_of(obj)?;
        match primitive_code_of_boxed(&class) {
            Some(code) => {
                let value = self.field(obj, names::VALUE_FIELD, &code.to_string())?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }
}

fn cached(
    ctx: &dyn ForeignContext,
    key: MemberKey,
    resolve: impl FnOnce() -> Result<u64, ForeignError>,
) -> BridgeResult<u64> {
    let key = (ctx.runtime_id(), key);
    if let Some(packed) = MEMBERS.get(&key) {
        return Ok(*packed);
    }
    let packed = resolve()?;
    MEMBERS.insert(key, packed);
    Ok(packed)
}

fn field_of(ctx: &dyn ForeignContext, obj: ObjRef, name: &str, sig: &str) -> BridgeResult<FieldId> {
    let class = ctx.class_of(obj)?;
    let packed = cached(ctx, MemberKey::Field(class, name.to_string(), sig.to_string()), || {
        ctx.field_id(class, name, sig).map(|f| pack(f.class(), f.index()))
    })?;
    let (owner, index) = unpack(packed);
    Ok(FieldId::new(owner, index))
}
