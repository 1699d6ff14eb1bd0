//! The low-level call interface
//!
//! Defines the interface a garbage-collected runtime implements so native code
//! can reach it. The bridge core programs against this trait only; it never
//! depends on how the runtime lays out objects or collects garbage.
//!
//! # Exceptions
//!
//! Calls that run foreign code never return foreign exceptions as `Err`.
//! Instead the runtime records a pending exception for the calling thread,
//! which the caller must check with [`ForeignContext::exception_occurred`] and
//! clear with [`ForeignContext::exception_clear`] before making further calls.
//! `Err` is reserved for interface failures (bad reference, unknown member,
//! unattached thread).
//!
//! # Threads
//!
//! Every thread must be attached before using the interface. Attaching is
//! idempotent and a thread stays attached for its lifetime.

use std::sync::Arc;

use crate::error::AbiResult;
use crate::reflect::MemberDesc;
use crate::value::{ClassRef, FieldId, ForeignValue, MethodId, ObjRef};

/// Abstract foreign runtime operations.
pub trait ForeignContext: Send + Sync {
    // ========================================================================
    // Runtime
    // ========================================================================

    /// Owned handle to the same runtime, for use from other threads and tasks
    fn runtime(&self) -> Arc<dyn ForeignContext>;

    /// Stable identifier of this runtime instance
    fn runtime_id(&self) -> u64;

    /// Register the current OS thread with the runtime (idempotent)
    fn attach_current_thread(&self) -> AbiResult<()>;

    /// Whether the current OS thread is registered
    fn is_current_thread_attached(&self) -> bool;

    // ========================================================================
    // Classes
    // ========================================================================

    /// Find a class by fully qualified name
    fn find_class(&self, name: &str) -> AbiResult<ClassRef>;

    /// Concrete class of an object
    fn class_of(&self, obj: ObjRef) -> AbiResult<ClassRef>;

    /// Fully qualified name of a class
    fn class_name(&self, class: ClassRef) -> AbiResult<String>;

    /// Superclass, `None` for the root
    fn superclass(&self, class: ClassRef) -> Option<ClassRef>;

    /// Whether values of `sub` can be assigned to `sup` (subclass or interface)
    fn is_assignable_from(&self, sub: ClassRef, sup: ClassRef) -> bool;

    /// Whether `obj` is an instance of `class`
    fn is_instance_of(&self, obj: ObjRef, class: ClassRef) -> bool;

    // ========================================================================
    // Member lookup (by name + descriptor)
    // ========================================================================

    /// Constructor with descriptor `sig` (return type `V`)
    fn constructor_id(&self, class: ClassRef, sig: &str) -> AbiResult<MethodId>;

    /// Instance method, searched through superclasses and interfaces
    fn method_id(&self, class: ClassRef, name: &str, sig: &str) -> AbiResult<MethodId>;

    /// Static method
    fn static_method_id(&self, class: ClassRef, name: &str, sig: &str) -> AbiResult<MethodId>;

    /// Instance field, `sig` is the field type descriptor
    fn field_id(&self, class: ClassRef, name: &str, sig: &str) -> AbiResult<FieldId>;

    /// Static field
    fn static_field_id(&self, class: ClassRef, name: &str, sig: &str) -> AbiResult<FieldId>;

    // ========================================================================
    // Calls, fields
    // ========================================================================

    /// Allocate and construct an object. Returns `Null` if the constructor threw.
    fn new_object(
        &self,
        class: ClassRef,
        ctor: MethodId,
        args: &[ForeignValue],
    ) -> AbiResult<ForeignValue>;

    /// Call an instance method with virtual dispatch
    fn call_method(
        &self,
        obj: ObjRef,
        method: MethodId,
        args: &[ForeignValue],
    ) -> AbiResult<ForeignValue>;

    /// Call a static method
    fn call_static_method(
        &self,
        class: ClassRef,
        method: MethodId,
        args: &[ForeignValue],
    ) -> AbiResult<ForeignValue>;

    /// Read an instance field
    fn get_field(&self, obj: ObjRef, field: FieldId) -> AbiResult<ForeignValue>;

    /// Write an instance field
    fn set_field(&self, obj: ObjRef, field: FieldId, value: ForeignValue) -> AbiResult<()>;

    /// Read a static field
    fn get_static_field(&self, class: ClassRef, field: FieldId) -> AbiResult<ForeignValue>;

    /// Write a static field
    fn set_static_field(
        &self,
        class: ClassRef,
        field: FieldId,
        value: ForeignValue,
    ) -> AbiResult<()>;

    // ========================================================================
    // Strings and byte arrays
    // ========================================================================

    /// Allocate a string
    fn new_string(&self, s: &str) -> AbiResult<ObjRef>;

    /// Read a string's contents
    fn read_string(&self, obj: ObjRef) -> AbiResult<String>;

    /// Allocate a byte array
    fn new_byte_array(&self, bytes: &[u8]) -> AbiResult<ObjRef>;

    /// Read a byte array's contents
    fn read_byte_array(&self, obj: ObjRef) -> AbiResult<Vec<u8>>;

    // ========================================================================
    // References
    // ========================================================================

    /// Add a global root for `obj`; it survives until `delete_global_ref`
    fn new_global_ref(&self, obj: ObjRef) -> AbiResult<ObjRef>;

    /// Drop one global root
    fn delete_global_ref(&self, obj: ObjRef);

    /// Drop one local root
    fn delete_local_ref(&self, obj: ObjRef);

    /// Reference identity
    fn is_same_object(&self, a: ObjRef, b: ObjRef) -> bool {
        a == b
    }

    // ========================================================================
    // Exceptions
    // ========================================================================

    /// Set the pending exception for the current thread
    fn throw(&self, throwable: ObjRef);

    /// Pending exception for the current thread, if any
    fn exception_occurred(&self) -> Option<ObjRef>;

    /// Clear the pending exception for the current thread
    fn exception_clear(&self);

    // ========================================================================
    // Reflection
    // ========================================================================

    /// All members visible on `class`: declared and inherited, instance and static
    fn members(&self, class: ClassRef) -> AbiResult<Vec<MemberDesc>>;

    /// Invoke a constructor, function or property getter.
    ///
    /// `args` is aligned with `member.params` (receivers included); `None`
    /// means "use the declared default".
    fn invoke_member(
        &self,
        member: &MemberDesc,
        args: &[Option<ForeignValue>],
    ) -> AbiResult<ForeignValue>;

    /// Invoke a mutable property's setter
    fn set_property(
        &self,
        member: &MemberDesc,
        receiver: Option<ObjRef>,
        value: ForeignValue,
    ) -> AbiResult<()>;
}
