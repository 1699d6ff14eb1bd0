//! Tether Host - a reference garbage-collected runtime
//!
//! Implements [`tether_sdk::ForeignContext`] over an in-process object heap so
//! the bridge can be exercised end to end:
//!
//! - [`class`]: class model, builders and registry
//! - [`heap`]: object storage and mark-sweep collection with finalizers
//! - [`host`]: the runtime, pending exceptions and thread attachment
//! - [`builtins`]: core classes, collections, lambdas, flows
//! - [`support`]: the bridge support library (proxies, wrapped containers)

#![warn(missing_docs)]

pub mod builtins;
pub mod class;
pub mod heap;
pub mod host;
pub mod support;

pub use class::{ClassBuilder, ClassRegistry, MethodBody, MethodFn};
pub use heap::{Completion, HeapStats, Payload};
pub use host::{ContinuationProbe, Host, HostResult, Thrown};
pub use tether_sdk::{ForeignValue, ObjRef};
