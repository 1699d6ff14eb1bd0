//! Argument and return slots of the call interface
//!
//! Mirrors the foreign runtime's own calling convention: eight primitive kinds
//! plus object references. Object references are opaque ids owned by the
//! foreign heap; native code never dereferences them.
//!
//! # Encoding
//!
//! ```text
//! Null            no object
//! Bool/Byte/...   primitive, passed by value
//! Char            one UTF-16 code unit
//! Object(ObjRef)  local or global reference to a heap object
//! ```

use std::num::NonZeroU64;

/// Reference to an object on the foreign heap.
///
/// The same id is used for local and global references; whether the native
/// side owns a root is tracked by the runtime (see
/// [`ForeignContext::new_global_ref`](crate::ForeignContext::new_global_ref)).
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct ObjRef(NonZeroU64);

impl ObjRef {
    /// Create from a raw heap id. Returns `None` for `0`.
    #[inline]
    pub const fn from_raw(raw: u64) -> Option<Self> {
        match NonZeroU64::new(raw) {
            Some(id) => Some(Self(id)),
            None => None,
        }
    }

    /// Raw heap id
    #[inline]
    pub const fn raw(self) -> u64 {
        self.0.get()
    }
}

impl std::fmt::Debug for ObjRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ObjRef(#{})", self.0)
    }
}

/// Reference to a class in the foreign runtime's class registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassRef(u32);

impl ClassRef {
    /// Create from a registry index
    #[inline]
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    /// Registry index
    #[inline]
    pub const fn index(self) -> u32 {
        self.0
    }
}

/// Identifier of a resolved method or constructor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MethodId {
    class: ClassRef,
    index: u32,
}

impl MethodId {
    /// Create a method id for slot `index` of `class`
    #[inline]
    pub const fn new(class: ClassRef, index: u32) -> Self {
        Self { class, index }
    }

    /// Declaring class
    #[inline]
    pub const fn class(self) -> ClassRef {
        self.class
    }

    /// Slot index in the declaring class
    #[inline]
    pub const fn index(self) -> u32 {
        self.index
    }
}

/// Identifier of a resolved instance or static field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FieldId {
    class: ClassRef,
    index: u32,
}

impl FieldId {
    /// Create a field id for slot `index` of `class`
    #[inline]
    pub const fn new(class: ClassRef, index: u32) -> Self {
        Self { class, index }
    }

    /// Declaring class
    #[inline]
    pub const fn class(self) -> ClassRef {
        self.class
    }

    /// Slot index in the declaring class
    #[inline]
    pub const fn index(self) -> u32 {
        self.index
    }
}

/// One argument or return value crossing the call interface.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum ForeignValue {
    /// Null reference / void return
    #[default]
    Null,
    /// `Z`
    Bool(bool),
    /// `B`
    Byte(i8),
    /// `C`: one UTF-16 code unit
    Char(u16),
    /// `S`
    Short(i16),
    /// `I`
    Int(i32),
    /// `J`
    Long(i64),
    /// `F`
    Float(f32),
    /// `D`
    Double(f64),
    /// `L...;`
    Object(ObjRef),
}

impl ForeignValue {
    /// Wrap an optional reference, mapping `None` to `Null`
    #[inline]
    pub fn object(obj: Option<ObjRef>) -> Self {
        obj.map_or(Self::Null, Self::Object)
    }

    /// Check if value is null
    #[inline]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Check if value is a primitive (not null, not an object)
    #[inline]
    pub const fn is_primitive(&self) -> bool {
        !matches!(self, Self::Null | Self::Object(_))
    }

    /// Extract boolean value
    #[inline]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Extract int value
    #[inline]
    pub const fn as_int(&self) -> Option<i32> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Extract long value
    #[inline]
    pub const fn as_long(&self) -> Option<i64> {
        match self {
            Self::Long(l) => Some(*l),
            _ => None,
        }
    }

    /// Extract double value
    #[inline]
    pub const fn as_double(&self) -> Option<f64> {
        match self {
            Self::Double(d) => Some(*d),
            _ => None,
        }
    }

    /// Extract object reference (None for null and primitives)
    #[inline]
    pub const fn as_object(&self) -> Option<ObjRef> {
        match self {
            Self::Object(obj) => Some(*obj),
            _ => None,
        }
    }

    /// Descriptor code of the slot kind (`L` for objects and null)
    pub const fn descriptor_code(&self) -> char {
        match self {
            Self::Bool(_) => 'Z',
            Self::Byte(_) => 'B',
            Self::Char(_) => 'C',
            Self::Short(_) => 'S',
            Self::Int(_) => 'I',
            Self::Long(_) => 'J',
            Self::Float(_) => 'F',
            Self::Double(_) => 'D',
            Self::Null | Self::Object(_) => 'L',
        }
    }

    /// Get type name for debugging
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "boolean",
            Self::Byte(_) => "byte",
            Self::Char(_) => "char",
            Self::Short(_) => "short",
            Self::Int(_) => "int",
            Self::Long(_) => "long",
            Self::Float(_) => "float",
            Self::Double(_) => "double",
            Self::Object(_) => "object",
        }
    }
}

impl From<ObjRef> for ForeignValue {
    fn from(obj: ObjRef) -> Self {
        Self::Object(obj)
    }
}
