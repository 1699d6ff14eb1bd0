//! Reflection metadata exposed by the foreign runtime
//!
//! Members are described independently of how the runtime stores them, so
//! overload resolution on the native side can be a pure function over these
//! descriptors.

use crate::value::ClassRef;

/// Declared type of a parameter, property or return value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeDesc {
    /// No value
    Void,
    /// `Z`
    Bool,
    /// `B`
    Byte,
    /// `C`
    Char,
    /// `S`
    Short,
    /// `I`
    Int,
    /// `J`
    Long,
    /// `F`
    Float,
    /// `D`
    Double,
    /// Reference type
    Object {
        /// Fully qualified class name (`util/List`)
        class: String,
        /// Whether null is an acceptable value
        nullable: bool,
    },
}

impl TypeDesc {
    /// Non-null reference to `class`
    pub fn object(class: &str) -> Self {
        Self::Object {
            class: class.to_string(),
            nullable: false,
        }
    }

    /// Nullable reference to `class`
    pub fn nullable(class: &str) -> Self {
        Self::Object {
            class: class.to_string(),
            nullable: true,
        }
    }

    /// Whether this is one of the eight primitive kinds
    pub const fn is_primitive(&self) -> bool {
        !matches!(self, Self::Void | Self::Object { .. })
    }

    /// Whether null is accepted
    pub const fn is_nullable(&self) -> bool {
        matches!(self, Self::Object { nullable: true, .. })
    }

    /// Class name for reference types
    pub fn class_name(&self) -> Option<&str> {
        match self {
            Self::Object { class, .. } => Some(class),
            _ => None,
        }
    }

    /// Descriptor fragment (`I`, `Lutil/List;`, ...)
    pub fn descriptor(&self) -> String {
        match self {
            Self::Void => "V".to_string(),
            Self::Bool => "Z".to_string(),
            Self::Byte => "B".to_string(),
            Self::Char => "C".to_string(),
            Self::Short => "S".to_string(),
            Self::Int => "I".to_string(),
            Self::Long => "J".to_string(),
            Self::Float => "F".to_string(),
            Self::Double => "D".to_string(),
            Self::Object { class, .. } => format!("L{};", class),
        }
    }

    /// Human-readable name used in diagnostics
    pub fn display_name(&self) -> String {
        match self {
            Self::Void => "void".to_string(),
            Self::Bool => "boolean".to_string(),
            Self::Byte => "byte".to_string(),
            Self::Char => "char".to_string(),
            Self::Short => "short".to_string(),
            Self::Int => "int".to_string(),
            Self::Long => "long".to_string(),
            Self::Float => "float".to_string(),
            Self::Double => "double".to_string(),
            Self::Object { class, nullable } => {
                if *nullable {
                    format!("{}?", class)
                } else {
                    class.clone()
                }
            }
        }
    }
}

/// Build a method descriptor such as `(ILlang/String;)Z`.
pub fn method_signature(params: &[TypeDesc], ret: &TypeDesc) -> String {
    let mut sig = String::from("(");
    for param in params {
        sig.push_str(&param.descriptor());
    }
    sig.push(')');
    sig.push_str(&ret.descriptor());
    sig
}

/// Role of a parameter in a member's declared parameter list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    /// Implicit `this`
    Instance,
    /// Receiver of an extension member
    Extension,
    /// Ordinary value parameter
    Value,
}

/// One declared parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamDesc {
    /// Parameter name (receivers are unnamed)
    pub name: Option<String>,
    /// Role of the parameter
    pub kind: ParamKind,
    /// Declared type (element type for varargs)
    pub ty: TypeDesc,
    /// Has a default value and may be omitted
    pub optional: bool,
    /// Consumes all remaining compatible positional arguments
    pub vararg: bool,
}

impl ParamDesc {
    /// Required value parameter
    pub fn value(name: &str, ty: TypeDesc) -> Self {
        Self {
            name: Some(name.to_string()),
            kind: ParamKind::Value,
            ty,
            optional: false,
            vararg: false,
        }
    }

    /// Value parameter with a default
    pub fn optional(name: &str, ty: TypeDesc) -> Self {
        Self {
            optional: true,
            ..Self::value(name, ty)
        }
    }

    /// Vararg parameter of element type `ty`
    pub fn vararg(name: &str, ty: TypeDesc) -> Self {
        Self {
            vararg: true,
            ..Self::value(name, ty)
        }
    }

    /// Instance receiver of class `class`
    pub fn instance(class: &str) -> Self {
        Self {
            name: None,
            kind: ParamKind::Instance,
            ty: TypeDesc::object(class),
            optional: false,
            vararg: false,
        }
    }

    /// Extension receiver of type `ty`
    pub fn extension(ty: TypeDesc) -> Self {
        Self {
            name: None,
            kind: ParamKind::Extension,
            ty,
            optional: false,
            vararg: false,
        }
    }

    /// Whether this parameter is bound implicitly to the target
    pub fn is_receiver(&self) -> bool {
        matches!(self.kind, ParamKind::Instance | ParamKind::Extension)
    }
}

/// What a member is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberKind {
    /// Constructor of the declaring class
    Constructor,
    /// Function / method
    Function,
    /// Property with a getter and, if mutable, a setter
    Property {
        /// Has a setter
        mutable: bool,
    },
}

/// Identity of a member within the runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MemberId {
    /// Declaring class
    pub class: ClassRef,
    /// Slot in the declaring class's member table
    pub index: u32,
}

/// Reflection descriptor for one constructor, function or property.
#[derive(Debug, Clone, PartialEq)]
pub struct MemberDesc {
    /// Runtime identity used for invocation
    pub id: MemberId,
    /// Simple name (`<init>` for constructors)
    pub name: String,
    /// Kind of member
    pub kind: MemberKind,
    /// Static member
    pub is_static: bool,
    /// Declared parameters in order, receivers included
    pub params: Vec<ParamDesc>,
    /// Return type (property type for properties)
    pub return_type: TypeDesc,
}

impl MemberDesc {
    /// Value parameters only (receivers excluded)
    pub fn value_params(&self) -> impl Iterator<Item = &ParamDesc> {
        self.params.iter().filter(|p| !p.is_receiver())
    }

    /// Whether this is a readable property
    pub fn is_property(&self) -> bool {
        matches!(self.kind, MemberKind::Property { .. })
    }

    /// Whether this is a property with a setter
    pub fn is_mutable_property(&self) -> bool {
        matches!(self.kind, MemberKind::Property { mutable: true })
    }

    /// Human-readable `name(type, type)` form used in diagnostics
    pub fn display(&self) -> String {
        let params: Vec<String> = self
            .value_params()
            .map(|p| {
                let mut s = p.ty.display_name();
                if p.vararg {
                    s.push_str("...");
                }
                s
            })
            .collect();
        format!("{}({})", self.name, params.join(", "))
    }
}
