//! Tether SDK - the call interface to a garbage-collected foreign runtime
//!
//! This crate defines the contract between native code and the foreign
//! runtime without depending on either the bridge core or any particular
//! runtime implementation:
//!
//! - [`ForeignContext`]: by-name lookup, typed calls, references, exceptions,
//!   reflection
//! - [`ForeignValue`]: one argument/return slot
//! - [`NativeEntryRegistry`]: native functions the runtime can call back into
//! - [`names`]: the fixed class and entry-point naming convention
//!
//! # Example
//!
//! ```ignore
//! use tether_sdk::{ForeignContext, ForeignValue, AbiResult};
//!
//! fn list_size(ctx: &dyn ForeignContext, list: tether_sdk::ObjRef) -> AbiResult<i32> {
//!     let class = ctx.find_class("util/List")?;
//!     let size = ctx.method_id(class, "size", "()I")?;
//!     Ok(ctx.call_method(list, size, &[])?.as_int().unwrap_or(0))
//! }
//! ```

#![warn(missing_docs)]

pub mod context;
pub mod error;
pub mod handler;
pub mod names;
pub mod reflect;
pub mod value;

pub use context::ForeignContext;
pub use error::{AbiResult, ForeignError};
pub use handler::{NativeEntryFn, NativeEntryRegistry};
pub use reflect::{
    method_signature, MemberDesc, MemberId, MemberKind, ParamDesc, ParamKind, TypeDesc,
};
pub use value::{ClassRef, FieldId, ForeignValue, MethodId, ObjRef};
