//! Owned foreign references
//!
//! A [`GlobalRef`] pins a foreign object for as long as the native side holds
//! it and can be moved between threads and tasks. [`Pinned`] does the same
//! for an arbitrary slot value, so primitives and objects travel alike.

use std::fmt;
use std::sync::Arc;

use tether_sdk::{ForeignContext, ForeignValue, ObjRef};

use crate::attach;
use crate::error::BridgeResult;

/// A global reference, deleted on drop
pub struct GlobalRef {
    ctx: Arc<dyn ForeignContext>,
    obj: ObjRef,
}

impl GlobalRef {
    /// Pin `obj`
    pub fn new(ctx: &dyn ForeignContext, obj: ObjRef) -> BridgeResult<Self> {
        let obj = ctx.new_global_ref(obj)?;
        Ok(Self {
            ctx: ctx.runtime(),
            obj,
        })
    }

    /// The pinned object
    pub fn obj(&self) -> ObjRef {
        self.obj
    }

    /// Runtime owning the object
    pub fn runtime(&self) -> &Arc<dyn ForeignContext> {
        &self.ctx
    }

    /// Whether this reference belongs to `ctx`
    pub fn belongs_to(&self, ctx: &dyn ForeignContext) -> bool {
        self.ctx.runtime_id() == ctx.runtime_id()
    }
}

impl Drop for GlobalRef {
    fn drop(&mut self) {
        // The dropping thread may never have touched the runtime
        let _ = attach::ensure_attached(&*self.ctx);
        self.ctx.delete_global_ref(self.obj);
    }
}

impl fmt::Debug for GlobalRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GlobalRef")
            .field("runtime", &self.ctx.runtime_id())
            .field("obj", &self.obj)
            .finish()
    }
}

/// A slot value that stays valid across threads
#[derive(Debug)]
pub enum Pinned {
    /// Null or a primitive
    Value(ForeignValue),
    /// A pinned object
    Object(GlobalRef),
}

impl Pinned {
    /// Pin `value` if it is an object
    pub fn new(ctx: &dyn ForeignContext, value: ForeignValue) -> BridgeResult<Self> {
        Ok(match value {
            ForeignValue::Object(obj) => Pinned::Object(GlobalRef::new(ctx, obj)?),
            other => Pinned::Value(other),
        })
    }

    /// The slot value, valid while `self` lives
    pub fn value(&self) -> ForeignValue {
        match self {
            Pinned::Value(value) => *value,
            Pinned::Object(global) => ForeignValue::Object(global.obj()),
        }
    }
}
