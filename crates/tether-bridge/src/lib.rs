//! Tether Bridge - native Rust values and code inside a garbage-collected
//! reflective runtime
//!
//! The bridge lets the two sides share values, callables and lazy sequences
//! through any [`tether_sdk::ForeignContext`]:
//!
//! - **Peers** ([`peer`]): native objects retained behind opaque handles in
//!   foreign proxy objects, released by the proxy's finalizer
//! - **Conversion** ([`convert`]): the [`Bridgeable`] protocol for
//!   primitives, strings, foundation types, collections, tuples, results,
//!   errors and bridged objects, plus the erased [`AnyValue`]
//! - **Closures** ([`closure`]): [`BridgedFn`] and [`AsyncBridgedFn`] in
//!   both directions, with continuations for suspending calls
//! - **Streams** ([`stream`]): [`BridgedStream`] exposed as a foreign flow
//!   and foreign flows consumed as `futures::Stream`
//! - **Reflection** ([`reflect`]): [`DynamicObject`] calls by member name
//!   with overload scoring
//!
//! # Example
//!
//! ```rust,ignore
//! use tether_bridge::{Bridgeable, BridgedFn, ConversionOptions};
//!
//! let add = BridgedFn::<(i32, i32), i32>::new(|a, b| Ok(a + b));
//! let proxy = add.to_foreign(ctx, ConversionOptions::configured())?;
//! // foreign code can now call proxy.invoke(2, 3)
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

// ============================================================================
// Plumbing
// ============================================================================

/// Thread attachment
pub mod attach;
/// Checked, name-based calls
pub mod call;
/// Process-wide configuration
pub mod config;
/// Error type and the pending-error slot
pub mod error;
/// Global references and pinned values
pub mod global;
/// Conversion option flags
pub mod options;
/// Shared async runtime
pub mod runtime;

// ============================================================================
// Bridge
// ============================================================================

pub mod closure;
pub mod convert;
pub mod entry;
pub mod peer;
pub mod reflect;
pub mod stream;

// ============================================================================
// Re-exports
// ============================================================================

pub use call::CallExt;
pub use closure::{AsyncBridgedFn, BridgedFn, ContinuationAdapter};
pub use config::{config, configure, BridgeConfig};
pub use convert::{
    register_bridge_impl, register_bridged_class, to_object, AnyClosure, AnyValue, Bridgeable,
    BridgedInstance, BridgedObject, BridgedTypeTag, Data, Locale,
};
pub use entry::entry_points;
pub use error::{BridgeError, BridgeResult};
pub use global::{GlobalRef, Pinned};
pub use options::ConversionOptions;
pub use peer::{PeerHandle, PeerObject};
pub use reflect::{DynamicCall, DynamicObject};
pub use stream::{BridgedStream, StreamState};
