//! Class model and registry
//!
//! Classes have single inheritance, any number of interfaces, instance and
//! static fields, methods with Rust or native-entry bodies, and a reflective
//! member table used by [`ForeignContext::members`](tether_sdk::ForeignContext::members).

use std::sync::Arc;

use rustc_hash::FxHashMap;
use tether_sdk::{
    method_signature, ClassRef, ForeignValue, MemberDesc, MemberId, MemberKind, ObjRef, ParamDesc,
    TypeDesc,
};

use crate::host::{Host, HostResult};

/// Body of a Rust-implemented method or constructor.
///
/// Receives the host, the receiver (`None` for static methods) and the
/// declared arguments.
pub type MethodFn =
    Arc<dyn Fn(&Host, Option<ObjRef>, &[ForeignValue]) -> HostResult<ForeignValue> + Send + Sync>;

/// How a method is implemented
#[derive(Clone)]
pub enum MethodBody {
    /// Implemented in Rust inside the runtime
    Rust(MethodFn),
    /// Dispatched to a native entry point by name
    Native(String),
    /// Declared only (interfaces)
    Abstract,
}

impl std::fmt::Debug for MethodBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MethodBody::Rust(_) => write!(f, "Rust"),
            MethodBody::Native(name) => write!(f, "Native({})", name),
            MethodBody::Abstract => write!(f, "Abstract"),
        }
    }
}

/// A declared method or constructor (`<init>`)
#[derive(Debug, Clone)]
pub struct MethodDef {
    /// Simple name
    pub name: String,
    /// Descriptor
    pub sig: String,
    /// Static method
    pub is_static: bool,
    /// Implementation
    pub body: MethodBody,
}

/// A declared field
#[derive(Debug, Clone)]
pub struct FieldDef {
    /// Field name
    pub name: String,
    /// Type descriptor
    pub sig: String,
}

/// What a reflective member maps onto
#[derive(Debug, Clone, Copy)]
pub enum MemberTarget {
    /// Method slot in the declaring class
    Method(u32),
    /// Constructor slot in the declaring class
    Constructor(u32),
    /// Absolute instance field slot
    Field(u32),
    /// Static field slot
    StaticField(u32),
}

/// One reflective member with its runtime target
#[derive(Debug, Clone)]
pub struct MemberEntry {
    /// Descriptor handed out to callers
    pub desc: MemberDesc,
    /// Backing slot
    pub target: MemberTarget,
}

/// Runtime class
#[derive(Debug)]
pub struct Class {
    /// Registry id
    pub id: ClassRef,
    /// Fully qualified name
    pub name: String,
    /// Superclass (None only for the root)
    pub superclass: Option<ClassRef>,
    /// Implemented interfaces (direct)
    pub interfaces: Vec<ClassRef>,
    /// Declared as an interface
    pub is_interface: bool,
    /// First absolute slot of this class's declared fields
    pub field_base: usize,
    /// Declared instance fields
    pub fields: Vec<FieldDef>,
    /// Declared static fields
    pub static_fields: Vec<FieldDef>,
    /// Static field storage
    pub static_values: Vec<ForeignValue>,
    /// Declared methods (instance and static)
    pub methods: Vec<MethodDef>,
    /// Declared constructors
    pub constructors: Vec<MethodDef>,
    /// Declared reflective members
    pub members: Vec<MemberEntry>,
    /// Native entry called when an instance is collected
    pub finalizer: Option<String>,
}

impl Class {
    /// Total instance field slots including inherited ones
    pub fn field_count(&self) -> usize {
        self.field_base + self.fields.len()
    }
}

// ============================================================================
// ClassBuilder
// ============================================================================

/// Builder for class definitions.
///
/// Raw methods (`method`, `constructor`) are reachable by name + descriptor
/// only. Reflective members (`function`, `property`, `reflective_constructor`)
/// additionally appear in the member table.
pub struct ClassBuilder {
    pub(crate) name: String,
    pub(crate) superclass: Option<String>,
    pub(crate) interfaces: Vec<String>,
    pub(crate) is_interface: bool,
    pub(crate) fields: Vec<FieldDef>,
    pub(crate) static_fields: Vec<FieldDef>,
    pub(crate) methods: Vec<MethodDef>,
    pub(crate) constructors: Vec<MethodDef>,
    pub(crate) members: Vec<PendingMember>,
    pub(crate) finalizer: Option<String>,
}

/// Member declared on a builder; targets are resolved at registration
pub(crate) struct PendingMember {
    pub(crate) name: String,
    pub(crate) kind: MemberKind,
    pub(crate) is_static: bool,
    pub(crate) params: Vec<ParamDesc>,
    pub(crate) return_type: TypeDesc,
    pub(crate) target: PendingTarget,
}

pub(crate) enum PendingTarget {
    Method(u32),
    Constructor(u32),
    Field(u32),
    StaticField(u32),
}

impl ClassBuilder {
    /// Start a class extending `lang/Object`
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            superclass: Some(tether_sdk::names::OBJECT.to_string()),
            interfaces: Vec::new(),
            is_interface: false,
            fields: Vec::new(),
            static_fields: Vec::new(),
            methods: Vec::new(),
            constructors: Vec::new(),
            members: Vec::new(),
            finalizer: None,
        }
    }

    /// Start an interface
    pub fn interface(name: &str) -> Self {
        Self {
            is_interface: true,
            ..Self::new(name)
        }
    }

    /// The root class
    pub(crate) fn root(name: &str) -> Self {
        Self {
            superclass: None,
            ..Self::new(name)
        }
    }

    /// Set the superclass
    pub fn extends(mut self, superclass: &str) -> Self {
        self.superclass = Some(superclass.to_string());
        self
    }

    /// Add an implemented interface
    pub fn implements(mut self, interface: &str) -> Self {
        self.interfaces.push(interface.to_string());
        self
    }

    /// Declare an instance field
    pub fn field(mut self, name: &str, sig: &str) -> Self {
        self.fields.push(FieldDef {
            name: name.to_string(),
            sig: sig.to_string(),
        });
        self
    }

    /// Declare a static field
    pub fn static_field(mut self, name: &str, sig: &str) -> Self {
        self.static_fields.push(FieldDef {
            name: name.to_string(),
            sig: sig.to_string(),
        });
        self
    }

    /// Declare a raw constructor
    pub fn constructor<F>(mut self, sig: &str, body: F) -> Self
    where
        F: Fn(&Host, Option<ObjRef>, &[ForeignValue]) -> HostResult<ForeignValue>
            + Send
            + Sync
            + 'static,
    {
        self.constructors.push(MethodDef {
            name: "<init>".to_string(),
            sig: sig.to_string(),
            is_static: false,
            body: MethodBody::Rust(Arc::new(body)),
        });
        self
    }

    /// Declare a constructor that stores its arguments into this class's
    /// declared fields, in declaration order
    pub fn field_constructor(self) -> Self {
        let params: String = self.fields.iter().map(|f| f.sig.as_str()).collect();
        let sig = format!("({})V", params);
        let class_name = self.name.clone();
        self.constructor(&sig, move |host, this, args| {
            let this = host.require_receiver(this)?;
            let base = host.field_base_of(&class_name)?;
            for (i, value) in args.iter().enumerate() {
                host.write_slot(this, base + i, *value)?;
            }
            Ok(ForeignValue::Null)
        })
    }

    /// Declare a raw instance method
    pub fn method<F>(mut self, name: &str, sig: &str, body: F) -> Self
    where
        F: Fn(&Host, Option<ObjRef>, &[ForeignValue]) -> HostResult<ForeignValue>
            + Send
            + Sync
            + 'static,
    {
        self.methods.push(MethodDef {
            name: name.to_string(),
            sig: sig.to_string(),
            is_static: false,
            body: MethodBody::Rust(Arc::new(body)),
        });
        self
    }

    /// Declare a raw static method
    pub fn static_method<F>(mut self, name: &str, sig: &str, body: F) -> Self
    where
        F: Fn(&Host, Option<ObjRef>, &[ForeignValue]) -> HostResult<ForeignValue>
            + Send
            + Sync
            + 'static,
    {
        self.methods.push(MethodDef {
            name: name.to_string(),
            sig: sig.to_string(),
            is_static: true,
            body: MethodBody::Rust(Arc::new(body)),
        });
        self
    }

    /// Declare an instance method dispatched to a native entry point
    pub fn native_method(mut self, name: &str, sig: &str, entry: &str) -> Self {
        self.methods.push(MethodDef {
            name: name.to_string(),
            sig: sig.to_string(),
            is_static: false,
            body: MethodBody::Native(entry.to_string()),
        });
        self
    }

    /// Declare an abstract instance method
    pub fn abstract_method(mut self, name: &str, sig: &str) -> Self {
        self.methods.push(MethodDef {
            name: name.to_string(),
            sig: sig.to_string(),
            is_static: false,
            body: MethodBody::Abstract,
        });
        self
    }

    /// Native entry point called when an instance is collected
    pub fn finalizer(mut self, entry: &str) -> Self {
        self.finalizer = Some(entry.to_string());
        self
    }

    /// Declare a reflective instance function.
    ///
    /// `params` are value parameters; the instance receiver is added
    /// automatically. Omitted optional parameters arrive as `Null`.
    pub fn function<F>(self, name: &str, params: Vec<ParamDesc>, ret: TypeDesc, body: F) -> Self
    where
        F: Fn(&Host, Option<ObjRef>, &[ForeignValue]) -> HostResult<ForeignValue>
            + Send
            + Sync
            + 'static,
    {
        self.reflective_function(name, params, ret, false, body)
    }

    /// Declare a reflective static function
    pub fn static_function<F>(
        self,
        name: &str,
        params: Vec<ParamDesc>,
        ret: TypeDesc,
        body: F,
    ) -> Self
    where
        F: Fn(&Host, Option<ObjRef>, &[ForeignValue]) -> HostResult<ForeignValue>
            + Send
            + Sync
            + 'static,
    {
        self.reflective_function(name, params, ret, true, body)
    }

    fn reflective_function<F>(
        mut self,
        name: &str,
        params: Vec<ParamDesc>,
        ret: TypeDesc,
        is_static: bool,
        body: F,
    ) -> Self
    where
        F: Fn(&Host, Option<ObjRef>, &[ForeignValue]) -> HostResult<ForeignValue>
            + Send
            + Sync
            + 'static,
    {
        let value_types: Vec<TypeDesc> = params.iter().map(param_slot_type).collect();
        let sig = method_signature(&value_types, &ret);
        let slot = self.methods.len() as u32;
        self.methods.push(MethodDef {
            name: name.to_string(),
            sig,
            is_static,
            body: MethodBody::Rust(Arc::new(body)),
        });
        let mut all_params = Vec::with_capacity(params.len() + 1);
        if !is_static {
            all_params.push(ParamDesc::instance(&self.name));
        }
        all_params.extend(params);
        self.members.push(PendingMember {
            name: name.to_string(),
            kind: MemberKind::Function,
            is_static,
            params: all_params,
            return_type: ret,
            target: PendingTarget::Method(slot),
        });
        self
    }

    /// Declare a reflective constructor
    pub fn reflective_constructor<F>(mut self, params: Vec<ParamDesc>, body: F) -> Self
    where
        F: Fn(&Host, Option<ObjRef>, &[ForeignValue]) -> HostResult<ForeignValue>
            + Send
            + Sync
            + 'static,
    {
        let value_types: Vec<TypeDesc> = params.iter().map(param_slot_type).collect();
        let sig = method_signature(&value_types, &TypeDesc::Void);
        let slot = self.constructors.len() as u32;
        self.constructors.push(MethodDef {
            name: "<init>".to_string(),
            sig,
            is_static: false,
            body: MethodBody::Rust(Arc::new(body)),
        });
        let return_type = TypeDesc::object(&self.name);
        self.members.push(PendingMember {
            name: "<init>".to_string(),
            kind: MemberKind::Constructor,
            is_static: true,
            params,
            return_type,
            target: PendingTarget::Constructor(slot),
        });
        self
    }

    /// Declare a reflective instance property backed by a field
    pub fn property(mut self, name: &str, ty: TypeDesc, mutable: bool) -> Self {
        let slot = self.fields.len() as u32;
        self.fields.push(FieldDef {
            name: name.to_string(),
            sig: ty.descriptor(),
        });
        let receiver = ParamDesc::instance(&self.name);
        self.members.push(PendingMember {
            name: name.to_string(),
            kind: MemberKind::Property { mutable },
            is_static: false,
            params: vec![receiver],
            return_type: ty,
            target: PendingTarget::Field(slot),
        });
        self
    }

    /// Declare a reflective static property backed by a static field
    pub fn static_property(mut self, name: &str, ty: TypeDesc, mutable: bool) -> Self {
        let slot = self.static_fields.len() as u32;
        self.static_fields.push(FieldDef {
            name: name.to_string(),
            sig: ty.descriptor(),
        });
        self.members.push(PendingMember {
            name: name.to_string(),
            kind: MemberKind::Property { mutable },
            is_static: true,
            params: Vec::new(),
            return_type: ty,
            target: PendingTarget::StaticField(slot),
        });
        self
    }
}

/// Slot type used in the raw descriptor for a reflective parameter.
/// Varargs travel as a list.
fn param_slot_type(param: &ParamDesc) -> TypeDesc {
    if param.vararg {
        TypeDesc::object(tether_sdk::names::LIST)
    } else {
        param.ty.clone()
    }
}

// ============================================================================
// ClassRegistry
// ============================================================================

/// Class registry for the host
#[derive(Debug, Default)]
pub struct ClassRegistry {
    /// Classes indexed by id
    classes: Vec<Class>,
    /// Class name to id mapping
    name_to_id: FxHashMap<String, ClassRef>,
}

impl ClassRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a class built by `builder`. The superclass and interfaces
    /// must already be registered.
    pub fn register(&mut self, builder: ClassBuilder) -> Result<ClassRef, String> {
        if self.name_to_id.contains_key(&builder.name) {
            return Err(format!("Class already defined: {}", builder.name));
        }
        let id = ClassRef::new(self.classes.len() as u32);
        let superclass = match &builder.superclass {
            Some(name) => Some(
                self.lookup(name)
                    .ok_or_else(|| format!("Unknown superclass {} of {}", name, builder.name))?,
            ),
            None => None,
        };
        let mut interfaces = Vec::with_capacity(builder.interfaces.len());
        for name in &builder.interfaces {
            interfaces.push(
                self.lookup(name)
                    .ok_or_else(|| format!("Unknown interface {} of {}", name, builder.name))?,
            );
        }
        let field_base = superclass
            .and_then(|s| self.get(s))
            .map(|s| s.field_count())
            .unwrap_or(0);

        let members = builder
            .members
            .into_iter()
            .enumerate()
            .map(|(index, m)| MemberEntry {
                desc: MemberDesc {
                    id: MemberId {
                        class: id,
                        index: index as u32,
                    },
                    name: m.name,
                    kind: m.kind,
                    is_static: m.is_static,
                    params: m.params,
                    return_type: m.return_type,
                },
                target: match m.target {
                    PendingTarget::Method(slot) => MemberTarget::Method(slot),
                    PendingTarget::Constructor(slot) => MemberTarget::Constructor(slot),
                    PendingTarget::Field(slot) => MemberTarget::Field(field_base as u32 + slot),
                    PendingTarget::StaticField(slot) => MemberTarget::StaticField(slot),
                },
            })
            .collect();

        let static_values = vec![ForeignValue::Null; builder.static_fields.len()];
        let static_values = builder
            .static_fields
            .iter()
            .zip(static_values)
            .map(|(f, v)| default_for_sig(&f.sig).unwrap_or(v))
            .collect();

        self.classes.push(Class {
            id,
            name: builder.name.clone(),
            superclass,
            interfaces,
            is_interface: builder.is_interface,
            field_base,
            fields: builder.fields,
            static_fields: builder.static_fields,
            static_values,
            methods: builder.methods,
            constructors: builder.constructors,
            members,
            finalizer: builder.finalizer,
        });
        self.name_to_id.insert(builder.name, id);
        Ok(id)
    }

    /// Get class by id
    pub fn get(&self, id: ClassRef) -> Option<&Class> {
        self.classes.get(id.index() as usize)
    }

    /// Get mutable class by id
    pub fn get_mut(&mut self, id: ClassRef) -> Option<&mut Class> {
        self.classes.get_mut(id.index() as usize)
    }

    /// Look up a class id by name
    pub fn lookup(&self, name: &str) -> Option<ClassRef> {
        self.name_to_id.get(name).copied()
    }

    /// Number of registered classes
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    /// Check if the registry is empty
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// Iterate over all classes
    pub fn iter(&self) -> impl Iterator<Item = &Class> {
        self.classes.iter()
    }

    /// Whether `sub` is `sup` or derives from / implements it
    pub fn is_assignable(&self, sub: ClassRef, sup: ClassRef) -> bool {
        if sub == sup {
            return true;
        }
        let Some(class) = self.get(sub) else {
            return false;
        };
        if class
            .interfaces
            .iter()
            .any(|&iface| self.is_assignable(iface, sup))
        {
            return true;
        }
        match class.superclass {
            Some(parent) => self.is_assignable(parent, sup),
            None => false,
        }
    }

    /// Resolve a method by name + descriptor through the class, its
    /// superclasses and then its interfaces. Concrete bodies win over
    /// abstract declarations.
    pub fn find_method(
        &self,
        class: ClassRef,
        name: &str,
        sig: &str,
        is_static: bool,
    ) -> Option<(ClassRef, u32)> {
        let mut abstract_hit = None;
        let mut current = Some(class);
        while let Some(id) = current {
            let c = self.get(id)?;
            if let Some(slot) = c
                .methods
                .iter()
                .position(|m| m.name == name && m.sig == sig && m.is_static == is_static)
            {
                if !matches!(c.methods[slot].body, MethodBody::Abstract) {
                    return Some((id, slot as u32));
                }
                abstract_hit.get_or_insert((id, slot as u32));
            }
            current = c.superclass;
        }
        if is_static {
            return abstract_hit;
        }
        let mut current = Some(class);
        while let Some(id) = current {
            let c = self.get(id)?;
            for &iface in &c.interfaces {
                if let Some(hit) = self.find_method(iface, name, sig, false) {
                    if !matches!(self.method(hit.0, hit.1).map(|m| &m.body), Some(MethodBody::Abstract)) {
                        return Some(hit);
                    }
                    abstract_hit.get_or_insert(hit);
                }
            }
            current = c.superclass;
        }
        abstract_hit
    }

    /// Resolve an instance field by name + descriptor to its absolute slot
    pub fn find_field(&self, class: ClassRef, name: &str, sig: &str) -> Option<(ClassRef, u32)> {
        let mut current = Some(class);
        while let Some(id) = current {
            let c = self.get(id)?;
            if let Some(slot) = c.fields.iter().position(|f| f.name == name && f.sig == sig) {
                return Some((id, (c.field_base + slot) as u32));
            }
            current = c.superclass;
        }
        None
    }

    /// Resolve a static field declared on `class`
    pub fn find_static_field(&self, class: ClassRef, name: &str, sig: &str) -> Option<u32> {
        let c = self.get(class)?;
        c.static_fields
            .iter()
            .position(|f| f.name == name && f.sig == sig)
            .map(|slot| slot as u32)
    }

    /// Method definition by declaring class + slot
    pub fn method(&self, class: ClassRef, slot: u32) -> Option<&MethodDef> {
        self.get(class)?.methods.get(slot as usize)
    }

    /// Constructor definition by declaring class + slot
    pub fn constructor(&self, class: ClassRef, slot: u32) -> Option<&MethodDef> {
        self.get(class)?.constructors.get(slot as usize)
    }

    /// Finalizer entry for instances of `class`, inherited if not declared
    pub fn finalizer_of(&self, class: ClassRef) -> Option<&str> {
        let mut current = Some(class);
        while let Some(id) = current {
            let c = self.get(id)?;
            if let Some(entry) = &c.finalizer {
                return Some(entry);
            }
            current = c.superclass;
        }
        None
    }

    /// Reflective members visible on `class`: its own members (instance and
    /// static) first, then inherited instance members, nearest first
    pub fn visible_members(&self, class: ClassRef) -> Vec<MemberDesc> {
        let mut out = Vec::new();
        let mut current = Some(class);
        let mut own = true;
        while let Some(id) = current {
            let Some(c) = self.get(id) else { break };
            for entry in &c.members {
                if own || (!entry.desc.is_static && entry.desc.kind != MemberKind::Constructor) {
                    out.push(entry.desc.clone());
                }
            }
            own = false;
            current = c.superclass;
        }
        out
    }

    /// Member entry by id
    pub fn member(&self, id: MemberId) -> Option<&MemberEntry> {
        self.get(id.class)?.members.get(id.index as usize)
    }
}

/// Zero value for a primitive descriptor
pub(crate) fn default_for_sig(sig: &str) -> Option<ForeignValue> {
    Some(match sig {
        "Z" => ForeignValue::Bool(false),
        "B" => ForeignValue::Byte(0),
        "C" => ForeignValue::Char(0),
        "S" => ForeignValue::Short(0),
        "I" => ForeignValue::Int(0),
        "J" => ForeignValue::Long(0),
        "F" => ForeignValue::Float(0.0),
        "D" => ForeignValue::Double(0.0),
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry_with_root() -> ClassRegistry {
        let mut registry = ClassRegistry::new();
        registry
            .register(ClassBuilder::root(tether_sdk::names::OBJECT))
            .unwrap();
        registry
    }

    #[test]
    fn test_register_class() {
        let mut registry = registry_with_root();
        let id = registry
            .register(ClassBuilder::new("test/Point").field("x", "I").field("y", "I"))
            .unwrap();
        assert_eq!(registry.lookup("test/Point"), Some(id));
        assert_eq!(registry.get(id).unwrap().field_count(), 2);
    }

    #[test]
    fn test_duplicate_class_rejected() {
        let mut registry = registry_with_root();
        registry.register(ClassBuilder::new("test/A")).unwrap();
        assert!(registry.register(ClassBuilder::new("test/A")).is_err());
    }

    #[test]
    fn test_inherited_field_slots() {
        let mut registry = registry_with_root();
        registry
            .register(ClassBuilder::new("test/Base").field("a", "I"))
            .unwrap();
        let derived = registry
            .register(ClassBuilder::new("test/Derived").extends("test/Base").field("b", "J"))
            .unwrap();
        assert_eq!(registry.find_field(derived, "a", "I").map(|f| f.1), Some(0));
        assert_eq!(registry.find_field(derived, "b", "J").map(|f| f.1), Some(1));
    }

    #[test]
    fn test_assignability_through_interfaces() {
        let mut registry = registry_with_root();
        let iface = registry.register(ClassBuilder::interface("test/Shape")).unwrap();
        let base = registry
            .register(ClassBuilder::new("test/Base").implements("test/Shape"))
            .unwrap();
        let derived = registry
            .register(ClassBuilder::new("test/Derived").extends("test/Base"))
            .unwrap();
        assert!(registry.is_assignable(derived, iface));
        assert!(registry.is_assignable(derived, base));
        assert!(!registry.is_assignable(base, derived));
    }

    #[test]
    fn test_concrete_method_wins_over_interface() {
        let mut registry = registry_with_root();
        registry
            .register(ClassBuilder::interface("test/Shape").abstract_method("area", "()D"))
            .unwrap();
        let circle = registry
            .register(
                ClassBuilder::new("test/Circle")
                    .implements("test/Shape")
                    .method("area", "()D", |_, _, _| Ok(ForeignValue::Double(3.0))),
            )
            .unwrap();
        let (owner, slot) = registry.find_method(circle, "area", "()D", false).unwrap();
        assert_eq!(owner, circle);
        assert!(matches!(
            registry.method(owner, slot).unwrap().body,
            MethodBody::Rust(_)
        ));
    }

    #[test]
    fn test_visible_members_order() {
        let mut registry = registry_with_root();
        registry
            .register(ClassBuilder::new("test/Base").property("name", TypeDesc::Int, false))
            .unwrap();
        let derived = registry
            .register(
                ClassBuilder::new("test/Derived")
                    .extends("test/Base")
                    .property("size", TypeDesc::Int, true),
            )
            .unwrap();
        let names: Vec<String> = registry
            .visible_members(derived)
            .into_iter()
            .map(|m| m.name)
            .collect();
        assert_eq!(names, vec!["size".to_string(), "name".to_string()]);
    }
}
