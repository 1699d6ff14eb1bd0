//! Reflective access to foreign objects
//!
//! [`resolver`] scores declared overloads against call arguments without
//! touching the runtime; [`DynamicObject`] feeds it the members the runtime
//! reports and performs the chosen call.

mod dynamic;
pub mod resolver;

pub use dynamic::{DynamicCall, DynamicObject};
