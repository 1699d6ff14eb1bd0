//! Shared setup for bridge integration tests

#![allow(dead_code)]

use std::sync::Once;

use tether_host::{ForeignValue, Host, ObjRef};

static TRACING: Once = Once::new();

/// A host linked against the bridge entry points
pub fn host() -> Host {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    });
    Host::new(tether_bridge::entry_points())
}

/// An `i32` from a primitive slot or a boxed host value
pub fn int_of(host: &Host, value: ForeignValue) -> Option<i32> {
    value.as_int().or_else(|| host.unboxed(value).and_then(|v| v.as_int()))
}

/// Read a host string object
pub fn str_of(host: &Host, value: ForeignValue) -> Option<String> {
    value.as_object().and_then(|obj| host.str_value(obj))
}

/// Object out of a slot value, panicking otherwise
pub fn obj(value: ForeignValue) -> ObjRef {
    value.as_object().expect("expected an object")
}
