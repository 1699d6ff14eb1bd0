//! Object heap with mark-sweep collection
//!
//! Objects are addressed by [`ObjRef`] ids that are never reused. Roots are
//! global references, local references, static fields and pending
//! exceptions; tracing follows instance fields and container payloads.
//! Closures held by lambda payloads are opaque: anything they capture must be
//! pinned with a global reference by whoever builds them.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use rustc_hash::{FxHashMap, FxHashSet};
use tether_sdk::{ClassRef, ForeignValue, ObjRef};

use crate::host::{Host, HostResult};

/// Body of a plain lambda: receives the declared arguments
pub type LambdaFn = Arc<dyn Fn(&Host, &[ForeignValue]) -> HostResult<ForeignValue> + Send + Sync>;

/// Body of a suspending lambda: receives the declared arguments and the
/// continuation to resolve. Results are delivered only through the
/// continuation.
pub type SuspendLambdaFn =
    Arc<dyn Fn(&Host, &[ForeignValue], ObjRef) -> HostResult<()> + Send + Sync>;

/// Element source of a flow: produces element `index`, or `None` at the end
pub type FlowSource =
    Arc<dyn Fn(&Host, usize) -> HostResult<Option<ForeignValue>> + Send + Sync>;

/// Outcome recorded by a completable continuation
pub type Completion = Result<ForeignValue, ObjRef>;

/// Shared slot a completable continuation resolves into
#[derive(Debug, Default)]
pub struct CompletionSlot {
    pub(crate) value: parking_lot::Mutex<Option<Completion>>,
    pub(crate) ready: parking_lot::Condvar,
}

/// Per-object native payload
#[derive(Clone, Default)]
pub enum Payload {
    /// Plain object
    #[default]
    None,
    /// `lang/String`
    Str(String),
    /// `lang/ByteArray`
    Bytes(Vec<u8>),
    /// `util/List` and `util/Set` (insertion ordered)
    List(Vec<ForeignValue>),
    /// `util/Map` (insertion ordered)
    Map(Vec<(ForeignValue, ForeignValue)>),
    /// `lang/Lambda{N}`
    Lambda(LambdaFn),
    /// `lang/SuspendLambda{N}`
    SuspendLambda(SuspendLambdaFn),
    /// `lang/FlowImpl`
    Flow {
        /// Element source
        source: FlowSource,
        /// Set by `cancel()`
        cancelled: Arc<AtomicBool>,
    },
    /// `lang/CompletableContinuation`
    Completion(Arc<CompletionSlot>),
}

impl Payload {
    fn trace(&self, out: &mut Vec<ObjRef>) {
        match self {
            Payload::List(items) => out.extend(items.iter().filter_map(|v| v.as_object())),
            Payload::Map(entries) => {
                for (k, v) in entries {
                    out.extend(k.as_object());
                    out.extend(v.as_object());
                }
            }
            Payload::Completion(slot) => {
                if let Some(done) = slot.value.lock().as_ref() {
                    match done {
                        Ok(v) => out.extend(v.as_object()),
                        Err(t) => out.push(*t),
                    }
                }
            }
            _ => {}
        }
    }
}

/// A heap object
#[derive(Clone)]
pub struct HeapObject {
    /// Concrete class
    pub class: ClassRef,
    /// Instance field slots (inherited first)
    pub fields: Vec<ForeignValue>,
    /// Native payload
    pub payload: Payload,
    /// Outstanding global references
    pub globals: u32,
    /// Outstanding local references
    pub locals: u32,
}

/// Heap statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeapStats {
    /// Live objects
    pub live: usize,
    /// Objects holding at least one global reference
    pub globally_rooted: usize,
    /// Total allocations since creation
    pub allocated: u64,
    /// Total objects reclaimed since creation
    pub collected: u64,
}

/// The object heap
#[derive(Default)]
pub struct Heap {
    objects: FxHashMap<u64, HeapObject>,
    next_id: u64,
    allocated: u64,
    collected: u64,
}

impl Heap {
    /// Create an empty heap
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate an object holding one local reference
    pub fn allocate(&mut self, class: ClassRef, field_count: usize, payload: Payload) -> ObjRef {
        self.next_id += 1;
        self.allocated += 1;
        let id = self.next_id;
        self.objects.insert(
            id,
            HeapObject {
                class,
                fields: vec![ForeignValue::Null; field_count],
                payload,
                globals: 0,
                locals: 1,
            },
        );
        // next_id starts at 1, so the id is never zero
        ObjRef::from_raw(id).unwrap_or_else(|| unreachable!())
    }

    /// Look up an object
    pub fn get(&self, obj: ObjRef) -> Option<&HeapObject> {
        self.objects.get(&obj.raw())
    }

    /// Look up an object mutably
    pub fn get_mut(&mut self, obj: ObjRef) -> Option<&mut HeapObject> {
        self.objects.get_mut(&obj.raw())
    }

    /// Whether `obj` names a live object
    pub fn contains(&self, obj: ObjRef) -> bool {
        self.objects.contains_key(&obj.raw())
    }

    /// Drop every local reference (end of a native frame)
    pub fn clear_locals(&mut self) {
        for object in self.objects.values_mut() {
            object.locals = 0;
        }
    }

    /// Statistics snapshot
    pub fn stats(&self) -> HeapStats {
        HeapStats {
            live: self.objects.len(),
            globally_rooted: self.objects.values().filter(|o| o.globals > 0).count(),
            allocated: self.allocated,
            collected: self.collected,
        }
    }

    /// Mark from the given extra roots plus every referenced object; returns
    /// the unreachable ids
    pub fn unreachable(&self, extra_roots: &[ObjRef]) -> Vec<ObjRef> {
        let mut marked: FxHashSet<u64> = FxHashSet::default();
        let mut stack: Vec<ObjRef> = extra_roots.to_vec();
        for (&id, object) in &self.objects {
            if object.globals > 0 || object.locals > 0 {
                if let Some(obj) = ObjRef::from_raw(id) {
                    stack.push(obj);
                }
            }
        }
        while let Some(obj) = stack.pop() {
            if !marked.insert(obj.raw()) {
                continue;
            }
            let Some(object) = self.objects.get(&obj.raw()) else {
                continue;
            };
            stack.extend(object.fields.iter().filter_map(|v| v.as_object()));
            object.payload.trace(&mut stack);
        }
        self.objects
            .keys()
            .filter(|id| !marked.contains(id))
            .filter_map(|&id| ObjRef::from_raw(id))
            .collect()
    }

    /// Remove dead objects
    pub fn sweep(&mut self, dead: &[ObjRef]) -> usize {
        let mut freed = 0;
        for obj in dead {
            if self.objects.remove(&obj.raw()).is_some() {
                freed += 1;
            }
        }
        self.collected += freed as u64;
        freed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_assigns_fresh_ids() {
        let mut heap = Heap::new();
        let a = heap.allocate(ClassRef::new(0), 0, Payload::None);
        let b = heap.allocate(ClassRef::new(0), 0, Payload::None);
        assert_ne!(a, b);
        assert_eq!(heap.stats().live, 2);
    }

    #[test]
    fn test_unreachable_follows_fields_and_lists() {
        let mut heap = Heap::new();
        let root = heap.allocate(ClassRef::new(0), 1, Payload::None);
        let child = heap.allocate(ClassRef::new(0), 0, Payload::None);
        let item = heap.allocate(ClassRef::new(0), 0, Payload::None);
        let orphan = heap.allocate(ClassRef::new(0), 0, Payload::None);
        heap.clear_locals();
        heap.get_mut(root).unwrap().globals = 1;
        heap.get_mut(root).unwrap().fields[0] = ForeignValue::Object(child);
        heap.get_mut(child).unwrap().payload = Payload::List(vec![ForeignValue::Object(item)]);

        let dead = heap.unreachable(&[]);
        assert_eq!(dead, vec![orphan]);
        assert_eq!(heap.sweep(&dead), 1);
        assert!(!heap.contains(orphan));
        assert!(heap.contains(item));
        assert_eq!(heap.stats().collected, 1);
    }

    #[test]
    fn test_extra_roots_are_marked() {
        let mut heap = Heap::new();
        let a = heap.allocate(ClassRef::new(0), 0, Payload::None);
        heap.clear_locals();
        assert!(heap.unreachable(&[a]).is_empty());
        assert_eq!(heap.unreachable(&[]), vec![a]);
    }
}
