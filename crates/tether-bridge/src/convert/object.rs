//! Native objects exposed by reference
//!
//! Types implementing [`BridgedObject`] cross as `bridge/NativeObject`
//! proxies (or a registered subclass) holding a retained peer. Converting
//! the proxy back yields the same `Arc`.

use std::any::{Any, TypeId};
use std::sync::{Arc, LazyLock};

use dashmap::DashMap;
use tether_sdk::names;
use tether_sdk::{ForeignContext, ForeignValue};

use super::{expect_object, mismatch, Bridgeable};
use crate::error::{BridgeError, BridgeResult};
use crate::options::ConversionOptions;
use crate::peer::{peer_of, wrap_peer, PeerObject};

/// A native type passed to the foreign runtime by reference
pub trait BridgedObject: Any + Send + Sync {
    /// Text for the proxy's `toString()`
    fn describe(&self) -> String {
        std::any::type_name::<Self>().to_string()
    }
}

/// Foreign proxy class per native type
static CLASSES: LazyLock<DashMap<TypeId, String>> = LazyLock::new(DashMap::new);

/// Use `foreign_class` as the proxy class for `T`. The class must extend
/// `bridge/NativeObject` and keep its `(J)V` constructor.
pub fn register_bridged_class<T: BridgedObject>(foreign_class: &str) {
    CLASSES.insert(TypeId::of::<T>(), foreign_class.to_string());
}

fn proxy_class(type_id: TypeId) -> String {
    CLASSES
        .get(&type_id)
        .map(|class| class.clone())
        .unwrap_or_else(|| names::NATIVE_OBJECT.to_string())
}

/// A type-erased bridged object
#[derive(Clone)]
pub struct BridgedInstance {
    any: Arc<dyn Any + Send + Sync>,
    object: Arc<dyn BridgedObject>,
    type_id: TypeId,
}

impl BridgedInstance {
    /// Erase `object`
    pub fn new<T: BridgedObject>(object: Arc<T>) -> Self {
        Self {
            any: object.clone(),
            object,
            type_id: TypeId::of::<T>(),
        }
    }

    /// Recover the typed object
    pub fn downcast<T: BridgedObject>(&self) -> Option<Arc<T>> {
        self.any.clone().downcast::<T>().ok()
    }

    /// Text for the proxy's `toString()`
    pub fn describe(&self) -> String {
        self.object.describe()
    }

    /// Whether both refer to the same native object
    pub fn same_object(&self, other: &BridgedInstance) -> bool {
        Arc::ptr_eq(&self.any, &other.any)
    }

    /// Wrap in a new foreign proxy
    pub fn to_foreign(&self, ctx: &dyn ForeignContext) -> BridgeResult<ForeignValue> {
        let class = proxy_class(self.type_id);
        let proxy = wrap_peer(ctx, &class, "(J)V", &[], Arc::new(PeerObject::Object(self.clone())))?;
        Ok(ForeignValue::Object(proxy))
    }
}

impl std::fmt::Debug for BridgedInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("BridgedInstance").field(&self.describe()).finish()
    }
}

impl<T: BridgedObject> Bridgeable for Arc<T> {
    fn from_foreign(
        ctx: &dyn ForeignContext,
        value: ForeignValue,
        _options: ConversionOptions,
    ) -> BridgeResult<Self> {
        let expected = std::any::type_name::<T>();
        let obj = expect_object(value, expected)?;
        let peer = peer_of(ctx, obj)?.ok_or_else(|| mismatch(ctx, expected, obj))?;
        match &*peer {
            PeerObject::Object(instance) => instance
                .downcast::<T>()
                .ok_or_else(|| BridgeError::conversion(expected, instance.describe())),
            other => Err(BridgeError::conversion(expected, other.kind())),
        }
    }

    fn to_foreign(
        self,
        ctx: &dyn ForeignContext,
        _options: ConversionOptions,
    ) -> BridgeResult<ForeignValue> {
        BridgedInstance::new(self).to_foreign(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tether_host::Host;

    struct Counter(AtomicUsize);

    impl BridgedObject for Counter {
        fn describe(&self) -> String {
            format!("Counter({})", self.0.load(Ordering::SeqCst))
        }
    }

    #[derive(Debug)]
    struct Unrelated;

    impl BridgedObject for Unrelated {}

    #[test]
    fn test_object_round_trip_keeps_identity() {
        let host = Host::new(crate::entry_points());
        let ctx: &dyn ForeignContext = &host;

        let counter = Arc::new(Counter(AtomicUsize::new(3)));
        let proxy = counter.clone().to_foreign(ctx, ConversionOptions::NONE).unwrap();
        let obj = proxy.as_object().unwrap();
        assert!(host.instance_of(obj, names::NATIVE_OBJECT));

        let back = Arc::<Counter>::from_foreign(ctx, proxy, ConversionOptions::NONE).unwrap();
        assert!(Arc::ptr_eq(&back, &counter));
        back.0.fetch_add(1, Ordering::SeqCst);
        assert_eq!(counter.describe(), "Counter(4)");
    }

    #[test]
    fn test_wrong_type_rejected() {
        let host = Host::new(crate::entry_points());
        let ctx: &dyn ForeignContext = &host;

        let proxy = Arc::new(Counter(AtomicUsize::new(0)))
            .to_foreign(ctx, ConversionOptions::NONE)
            .unwrap();
        let err = Arc::<Unrelated>::from_foreign(ctx, proxy, ConversionOptions::NONE).unwrap_err();
        assert!(matches!(err, BridgeError::Conversion { .. }));
    }

    #[test]
    fn test_instance_erasure() {
        let counter = Arc::new(Counter(AtomicUsize::new(7)));
        let erased = BridgedInstance::new(counter.clone());
        assert!(erased.downcast::<Unrelated>().is_none());
        assert!(Arc::ptr_eq(&erased.downcast::<Counter>().unwrap(), &counter));
        assert!(erased.same_object(&erased.clone()));
        assert_eq!(erased.describe(), "Counter(7)");
    }
}
