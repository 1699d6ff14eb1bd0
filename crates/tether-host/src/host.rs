//! The host runtime and its `ForeignContext` implementation
//!
//! Method bodies signal a throw by returning `Err(Thrown(..))`. Crossing the
//! call interface, a throw becomes the calling thread's pending exception and
//! the call returns `Null`. Native entries report failures the other way
//! round: they set a pending exception, which the host turns back into a
//! `Thrown` when the entry returns.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{JoinHandle, ThreadId};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use rustc_hash::{FxHashMap, FxHashSet};
use tether_sdk::names;
use tether_sdk::{
    AbiResult, ClassRef, FieldId, ForeignContext, ForeignError, ForeignValue, MemberDesc,
    MethodId, NativeEntryRegistry, ObjRef, ParamKind, TypeDesc,
};

use crate::class::{default_for_sig, ClassBuilder, ClassRegistry, MemberTarget, MethodBody};
use crate::heap::{
    Completion, CompletionSlot, FlowSource, Heap, HeapStats, LambdaFn, Payload, SuspendLambdaFn,
};

/// A throwable raised by a method body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Thrown(pub ObjRef);

/// Result of running a method body
pub type HostResult<T> = Result<T, Thrown>;

static NEXT_RUNTIME_ID: AtomicU64 = AtomicU64::new(1);

struct HostInner {
    id: u64,
    classes: RwLock<ClassRegistry>,
    heap: Mutex<Heap>,
    natives: RwLock<NativeEntryRegistry>,
    pending: Mutex<FxHashMap<ThreadId, ObjRef>>,
    attached: Mutex<FxHashSet<ThreadId>>,
}

/// Reference garbage-collected runtime.
///
/// Cheap to clone; all clones share one heap and class registry.
#[derive(Clone)]
pub struct Host {
    inner: Arc<HostInner>,
}

impl std::fmt::Debug for Host {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Host")
            .field("id", &self.inner.id)
            .field("classes", &self.inner.classes.read().len())
            .field("heap", &self.inner.heap.lock().stats())
            .finish()
    }
}

impl Host {
    /// Create a runtime with the built-in classes and the bridge support
    /// library, linked against `natives`. The creating thread is attached.
    pub fn new(natives: NativeEntryRegistry) -> Self {
        let host = Self {
            inner: Arc::new(HostInner {
                id: NEXT_RUNTIME_ID.fetch_add(1, Ordering::Relaxed),
                classes: RwLock::new(ClassRegistry::new()),
                heap: Mutex::new(Heap::new()),
                natives: RwLock::new(natives),
                pending: Mutex::new(FxHashMap::default()),
                attached: Mutex::new(FxHashSet::default()),
            }),
        };
        crate::builtins::install(&host);
        crate::support::install(&host);
        host.inner.attached.lock().insert(std::thread::current().id());
        tracing::debug!(runtime = host.inner.id, "host runtime created");
        host
    }

    // ========================================================================
    // Classes
    // ========================================================================

    /// Define a class
    pub fn define_class(&self, builder: ClassBuilder) -> Result<ClassRef, String> {
        self.inner.classes.write().register(builder)
    }

    /// Look up a class by name
    pub fn class(&self, name: &str) -> Option<ClassRef> {
        self.inner.classes.read().lookup(name)
    }

    /// Add or replace native entry points
    pub fn link_natives(&self, natives: NativeEntryRegistry) {
        self.inner.natives.write().extend(natives);
    }

    /// Whether `obj` is an instance of the class named `class`
    pub fn instance_of(&self, obj: ObjRef, class: &str) -> bool {
        let Some(target) = self.class(class) else {
            return false;
        };
        match self.class_of_obj(obj) {
            Some(actual) => self.inner.classes.read().is_assignable(actual, target),
            None => false,
        }
    }

    /// Name of `obj`'s class
    pub fn class_name_of(&self, obj: ObjRef) -> Option<String> {
        let class = self.class_of_obj(obj)?;
        self.inner
            .classes
            .read()
            .get(class)
            .map(|c| c.name.clone())
    }

    fn class_of_obj(&self, obj: ObjRef) -> Option<ClassRef> {
        self.inner.heap.lock().get(obj).map(|o| o.class)
    }

    // ========================================================================
    // Allocation
    // ========================================================================

    /// Allocate an uninitialized instance of `class`
    pub fn alloc(&self, class: ClassRef) -> ObjRef {
        let (field_count, payload) = {
            let classes = self.inner.classes.read();
            let field_count = classes.get(class).map(|c| c.field_count()).unwrap_or(0);
            let payload = match (
                classes.lookup(names::LIST),
                classes.lookup(names::SET),
                classes.lookup(names::MAP),
            ) {
                (Some(list), _, _) if classes.is_assignable(class, list) => {
                    Payload::List(Vec::new())
                }
                (_, Some(set), _) if classes.is_assignable(class, set) => Payload::List(Vec::new()),
                (_, _, Some(map)) if classes.is_assignable(class, map) => Payload::Map(Vec::new()),
                _ => Payload::None,
            };
            (field_count, payload)
        };
        let obj = self.inner.heap.lock().allocate(class, field_count, payload);
        // Primitive fields start at their zero value
        let sigs: Vec<(usize, String)> = self.field_sigs(class);
        let mut heap = self.inner.heap.lock();
        if let Some(object) = heap.get_mut(obj) {
            for (slot, sig) in sigs {
                if let Some(zero) = default_for_sig(&sig) {
                    object.fields[slot] = zero;
                }
            }
        }
        obj
    }

    fn field_sigs(&self, class: ClassRef) -> Vec<(usize, String)> {
        let classes = self.inner.classes.read();
        let mut out = Vec::new();
        let mut current = Some(class);
        while let Some(id) = current {
            let Some(c) = classes.get(id) else { break };
            for (i, f) in c.fields.iter().enumerate() {
                out.push((c.field_base + i, f.sig.clone()));
            }
            current = c.superclass;
        }
        out
    }

    /// Allocate with a payload
    pub(crate) fn alloc_with(&self, class_name: &str, payload: Payload) -> ObjRef {
        let class = self.class(class_name).unwrap_or(ClassRef::new(0));
        let obj = self.alloc(class);
        if let Some(object) = self.inner.heap.lock().get_mut(obj) {
            object.payload = payload;
        }
        obj
    }

    /// Allocate and run the constructor with descriptor `sig`
    pub fn instantiate(
        &self,
        class_name: &str,
        sig: &str,
        args: &[ForeignValue],
    ) -> HostResult<ObjRef> {
        let (class, body) = {
            let classes = self.inner.classes.read();
            let found = classes.lookup(class_name).and_then(|class| {
                let c = classes.get(class)?;
                let ctor = c.constructors.iter().find(|m| m.sig == sig)?;
                Some((class, ctor.body.clone()))
            });
            match found {
                Some(found) => found,
                None => {
                    drop(classes);
                    return Err(self.throw_new(
                        names::EXCEPTION,
                        &format!("No constructor {}{}", class_name, sig),
                    ));
                }
            }
        };
        let obj = self.alloc(class);
        self.run_body(&body, Some(obj), args)?;
        Ok(obj)
    }

    /// Allocate a string
    pub fn string(&self, s: &str) -> ObjRef {
        self.alloc_with(names::STRING, Payload::Str(s.to_string()))
    }

    /// Contents of a string object
    pub fn str_value(&self, obj: ObjRef) -> Option<String> {
        match &self.inner.heap.lock().get(obj)?.payload {
            Payload::Str(s) => Some(s.clone()),
            _ => None,
        }
    }

    /// Allocate a byte array
    pub fn byte_array(&self, bytes: &[u8]) -> ObjRef {
        self.alloc_with(names::BYTE_ARRAY, Payload::Bytes(bytes.to_vec()))
    }

    /// Box a primitive; objects and null pass through
    pub fn boxed(&self, value: ForeignValue) -> ForeignValue {
        let class = match value {
            ForeignValue::Bool(_) => names::BOOLEAN,
            ForeignValue::Byte(_) => names::BYTE,
            ForeignValue::Char(_) => names::CHARACTER,
            ForeignValue::Short(_) => names::SHORT,
            ForeignValue::Int(_) => names::INTEGER,
            ForeignValue::Long(_) => names::LONG,
            ForeignValue::Float(_) => names::FLOAT,
            ForeignValue::Double(_) => names::DOUBLE,
            ForeignValue::Null | ForeignValue::Object(_) => return value,
        };
        let obj = self.alloc_with(class, Payload::None);
        if let Some(object) = self.inner.heap.lock().get_mut(obj) {
            object.fields[0] = value;
        }
        ForeignValue::Object(obj)
    }

    /// Primitive held by a boxed object
    pub fn unboxed(&self, value: ForeignValue) -> Option<ForeignValue> {
        let obj = value.as_object()?;
        let class = self.class_name_of(obj)?;
        match class.as_str() {
            names::BOOLEAN | names::BYTE | names::CHARACTER | names::SHORT | names::INTEGER
            | names::LONG | names::FLOAT | names::DOUBLE => {
                self.inner.heap.lock().get(obj)?.fields.first().copied()
            }
            _ => None,
        }
    }

    /// Allocate a `util/List`
    pub fn new_list(&self, items: Vec<ForeignValue>) -> ObjRef {
        self.alloc_with(names::LIST, Payload::List(items))
    }

    /// Allocate a `util/Set`, dropping duplicates
    pub fn new_set(&self, items: Vec<ForeignValue>) -> ObjRef {
        let mut unique: Vec<ForeignValue> = Vec::with_capacity(items.len());
        for item in items {
            if !unique.iter().any(|u| self.values_equal(*u, item)) {
                unique.push(item);
            }
        }
        self.alloc_with(names::SET, Payload::List(unique))
    }

    /// Allocate a `util/Map`
    pub fn new_map(&self, entries: Vec<(ForeignValue, ForeignValue)>) -> ObjRef {
        self.alloc_with(names::MAP, Payload::Map(entries))
    }

    /// Elements of a list or set
    pub fn list_items(&self, obj: ObjRef) -> Option<Vec<ForeignValue>> {
        match &self.inner.heap.lock().get(obj)?.payload {
            Payload::List(items) => Some(items.clone()),
            _ => None,
        }
    }

    /// Entries of a map
    pub fn map_entries(&self, obj: ObjRef) -> Option<Vec<(ForeignValue, ForeignValue)>> {
        match &self.inner.heap.lock().get(obj)?.payload {
            Payload::Map(entries) => Some(entries.clone()),
            _ => None,
        }
    }

    pub(crate) fn payload(&self, obj: ObjRef) -> Option<Payload> {
        self.inner.heap.lock().get(obj).map(|o| o.payload.clone())
    }

    pub(crate) fn update_payload<R>(
        &self,
        obj: ObjRef,
        f: impl FnOnce(&mut Payload) -> R,
    ) -> Option<R> {
        self.inner.heap.lock().get_mut(obj).map(|o| f(&mut o.payload))
    }

    /// Reference, string and boxed-value equality
    pub fn values_equal(&self, a: ForeignValue, b: ForeignValue) -> bool {
        match (a, b) {
            (ForeignValue::Object(x), ForeignValue::Object(y)) => {
                if x == y {
                    return true;
                }
                if let (Some(s), Some(t)) = (self.str_value(x), self.str_value(y)) {
                    return s == t;
                }
                match (self.unboxed(a), self.unboxed(b)) {
                    (Some(p), Some(q)) => p == q,
                    _ => false,
                }
            }
            _ => a == b,
        }
    }

    // ========================================================================
    // Lambdas, flows, continuations
    // ========================================================================

    /// Allocate a `lang/Function{arity}` implemented in Rust
    pub fn new_lambda<F>(&self, arity: usize, f: F) -> ObjRef
    where
        F: Fn(&Host, &[ForeignValue]) -> HostResult<ForeignValue> + Send + Sync + 'static,
    {
        let body: LambdaFn = Arc::new(f);
        self.alloc_with(&format!("lang/Lambda{}", arity), Payload::Lambda(body))
    }

    /// Allocate a `lang/SuspendFunction{arity}` implemented in Rust
    pub fn new_suspend_lambda<F>(&self, arity: usize, f: F) -> ObjRef
    where
        F: Fn(&Host, &[ForeignValue], ObjRef) -> HostResult<()> + Send + Sync + 'static,
    {
        let body: SuspendLambdaFn = Arc::new(f);
        self.alloc_with(
            &format!("lang/SuspendLambda{}", arity),
            Payload::SuspendLambda(body),
        )
    }

    /// Allocate a `lang/Flow` whose elements come from `source`
    pub fn new_flow<F>(&self, source: F) -> ObjRef
    where
        F: Fn(&Host, usize) -> HostResult<Option<ForeignValue>> + Send + Sync + 'static,
    {
        let source: FlowSource = Arc::new(source);
        self.alloc_with(
            crate::builtins::FLOW_IMPL,
            Payload::Flow {
                source,
                cancelled: Arc::new(AtomicBool::new(false)),
            },
        )
    }

    /// Allocate a `lang/Flow` emitting `items` and then completing, or
    /// failing with `failure`. The flow pins the items and failure with
    /// global references for its lifetime.
    pub fn new_flow_of(&self, items: Vec<ForeignValue>, failure: Option<ObjRef>) -> ObjRef {
        for obj in items.iter().filter_map(|v| v.as_object()).chain(failure) {
            self.add_global(obj);
        }
        self.new_flow(move |_host, index| match items.get(index) {
            Some(item) => Ok(Some(*item)),
            None => match failure {
                Some(t) => Err(Thrown(t)),
                None => Ok(None),
            },
        })
    }

    /// Whether a flow created by this host has been cancelled
    pub fn flow_cancelled(&self, flow: ObjRef) -> bool {
        match self.payload(flow) {
            Some(Payload::Flow { cancelled, .. }) => cancelled.load(Ordering::SeqCst),
            _ => false,
        }
    }

    /// Allocate a continuation that records its outcome
    pub fn new_continuation(&self) -> (ObjRef, ContinuationProbe) {
        let slot = Arc::new(CompletionSlot::default());
        let obj = self.alloc_with(
            crate::builtins::COMPLETABLE_CONTINUATION,
            Payload::Completion(slot.clone()),
        );
        (obj, ContinuationProbe { slot })
    }

    /// Resolve any `lang/Continuation` through its virtual methods
    pub fn resume(&self, continuation: ObjRef, outcome: Completion) -> HostResult<()> {
        match outcome {
            Ok(value) => self.invoke(
                continuation,
                "resume",
                "(Llang/Object;)V",
                &[self.boxed(value)],
            )?,
            Err(throwable) => self.invoke(
                continuation,
                "resumeWithError",
                "(Llang/Throwable;)V",
                &[ForeignValue::Object(throwable)],
            )?,
        };
        Ok(())
    }

    // ========================================================================
    // Exceptions
    // ========================================================================

    /// Allocate a throwable of class `class_name` with `message`
    pub fn new_exception(&self, class_name: &str, message: &str) -> ObjRef {
        let class = self
            .class(class_name)
            .or_else(|| self.class(names::EXCEPTION))
            .unwrap_or(ClassRef::new(0));
        let obj = self.alloc(class);
        let msg = self.string(message);
        let _ = self.set_field_named(obj, "message", ForeignValue::Object(msg));
        obj
    }

    /// Allocate a throwable for use as `Err(host.throw_new(..))`
    pub fn throw_new(&self, class_name: &str, message: &str) -> Thrown {
        Thrown(self.new_exception(class_name, message))
    }

    /// Message of a throwable
    pub fn exception_message(&self, throwable: ObjRef) -> Option<String> {
        let msg = self.field_named(throwable, "message").ok()?;
        self.str_value(msg.as_object()?)
    }

    /// Pending exception of the current thread, without clearing it
    pub fn pending_exception(&self) -> Option<ObjRef> {
        self.inner
            .pending
            .lock()
            .get(&std::thread::current().id())
            .copied()
    }

    fn set_pending(&self, throwable: ObjRef) {
        self.inner
            .pending
            .lock()
            .insert(std::thread::current().id(), throwable);
    }

    fn take_pending(&self) -> Option<ObjRef> {
        self.inner
            .pending
            .lock()
            .remove(&std::thread::current().id())
    }

    // ========================================================================
    // Fields
    // ========================================================================

    /// Receiver of an instance body
    pub fn require_receiver(&self, this: Option<ObjRef>) -> HostResult<ObjRef> {
        this.ok_or_else(|| self.throw_new(names::EXCEPTION, "missing receiver"))
    }

    /// First absolute field slot of `class_name`'s declared fields
    pub fn field_base_of(&self, class_name: &str) -> HostResult<usize> {
        let base = {
            let classes = self.inner.classes.read();
            classes
                .lookup(class_name)
                .and_then(|id| classes.get(id))
                .map(|c| c.field_base)
        };
        base.ok_or_else(|| self.throw_new(names::EXCEPTION, &format!("No class {}", class_name)))
    }

    /// Read an absolute field slot
    pub fn read_slot(&self, obj: ObjRef, slot: usize) -> HostResult<ForeignValue> {
        let value = self
            .inner
            .heap
            .lock()
            .get(obj)
            .and_then(|o| o.fields.get(slot).copied());
        value.ok_or_else(|| self.throw_new(names::EXCEPTION, "bad field slot"))
    }

    /// Write an absolute field slot
    pub fn write_slot(&self, obj: ObjRef, slot: usize, value: ForeignValue) -> HostResult<()> {
        let written = {
            let mut heap = self.inner.heap.lock();
            match heap.get_mut(obj).and_then(|o| o.fields.get_mut(slot)) {
                Some(field) => {
                    *field = value;
                    true
                }
                None => false,
            }
        };
        if written {
            Ok(())
        } else {
            Err(self.throw_new(names::EXCEPTION, "bad field slot"))
        }
    }

    fn slot_named(&self, obj: ObjRef, name: &str) -> Option<usize> {
        let class = self.class_of_obj(obj)?;
        let classes = self.inner.classes.read();
        let mut current = Some(class);
        while let Some(id) = current {
            let c = classes.get(id)?;
            if let Some(i) = c.fields.iter().position(|f| f.name == name) {
                return Some(c.field_base + i);
            }
            current = c.superclass;
        }
        None
    }

    /// Read a field by name
    pub fn field_named(&self, obj: ObjRef, name: &str) -> HostResult<ForeignValue> {
        match self.slot_named(obj, name) {
            Some(slot) => self.read_slot(obj, slot),
            None => Err(self.throw_new(names::EXCEPTION, &format!("No field {}", name))),
        }
    }

    /// Write a field by name
    pub fn set_field_named(&self, obj: ObjRef, name: &str, value: ForeignValue) -> HostResult<()> {
        match self.slot_named(obj, name) {
            Some(slot) => self.write_slot(obj, slot, value),
            None => Err(self.throw_new(names::EXCEPTION, &format!("No field {}", name))),
        }
    }

    // ========================================================================
    // Invocation
    // ========================================================================

    /// Call an instance method by name with virtual dispatch
    pub fn invoke(
        &self,
        receiver: ObjRef,
        name: &str,
        sig: &str,
        args: &[ForeignValue],
    ) -> HostResult<ForeignValue> {
        let body = {
            let classes = self.inner.classes.read();
            self.class_of_obj(receiver)
                .and_then(|class| classes.find_method(class, name, sig, false))
                .and_then(|(owner, slot)| classes.method(owner, slot))
                .map(|m| m.body.clone())
        };
        match body {
            Some(body) => self.run_body(&body, Some(receiver), args),
            None => Err(self.throw_new(
                names::EXCEPTION,
                &format!("No method {}{}", name, sig),
            )),
        }
    }

    /// Call a static method by name
    pub fn invoke_static(
        &self,
        class_name: &str,
        name: &str,
        sig: &str,
        args: &[ForeignValue],
    ) -> HostResult<ForeignValue> {
        let body = {
            let classes = self.inner.classes.read();
            classes
                .lookup(class_name)
                .and_then(|class| classes.find_method(class, name, sig, true))
                .and_then(|(owner, slot)| classes.method(owner, slot))
                .map(|m| m.body.clone())
        };
        match body {
            Some(body) => self.run_body(&body, None, args),
            None => Err(self.throw_new(
                names::EXCEPTION,
                &format!("No static method {}.{}{}", class_name, name, sig),
            )),
        }
    }

    fn run_body(
        &self,
        body: &MethodBody,
        this: Option<ObjRef>,
        args: &[ForeignValue],
    ) -> HostResult<ForeignValue> {
        match body {
            MethodBody::Rust(f) => f(self, this, args),
            MethodBody::Native(entry) => self.run_native(entry, this, args),
            MethodBody::Abstract => Err(self.throw_new(names::EXCEPTION, "abstract method")),
        }
    }

    fn run_native(
        &self,
        entry: &str,
        this: Option<ObjRef>,
        args: &[ForeignValue],
    ) -> HostResult<ForeignValue> {
        let Some(f) = self.inner.natives.read().get(entry) else {
            return Err(self.throw_new(
                names::EXCEPTION,
                &format!("Unlinked native entry {}", entry),
            ));
        };
        let mut full = Vec::with_capacity(args.len() + 1);
        full.push(ForeignValue::object(this));
        full.extend_from_slice(args);
        let result = f(self, &full);
        match self.take_pending() {
            Some(throwable) => Err(Thrown(throwable)),
            None => Ok(result),
        }
    }

    /// Turn a body outcome into a call-interface return
    fn complete(&self, outcome: HostResult<ForeignValue>) -> ForeignValue {
        match outcome {
            Ok(value) => {
                self.note_local(value);
                value
            }
            Err(Thrown(throwable)) => {
                self.set_pending(throwable);
                ForeignValue::Null
            }
        }
    }

    fn note_local(&self, value: ForeignValue) {
        if let ForeignValue::Object(obj) = value {
            if let Some(object) = self.inner.heap.lock().get_mut(obj) {
                object.locals += 1;
            }
        }
    }

    // ========================================================================
    // References and collection
    // ========================================================================

    fn add_global(&self, obj: ObjRef) {
        if let Some(object) = self.inner.heap.lock().get_mut(obj) {
            object.globals += 1;
        }
    }

    /// Outstanding global references to `obj`
    pub fn global_ref_count(&self, obj: ObjRef) -> u32 {
        self.inner.heap.lock().get(obj).map(|o| o.globals).unwrap_or(0)
    }

    /// Whether `obj` is still on the heap
    pub fn is_live(&self, obj: ObjRef) -> bool {
        self.inner.heap.lock().contains(obj)
    }

    /// Drop all local references, as when the outermost native frame returns
    pub fn drop_local_refs(&self) {
        self.inner.heap.lock().clear_locals();
    }

    /// Heap statistics
    pub fn heap_stats(&self) -> HeapStats {
        self.inner.heap.lock().stats()
    }

    /// Run a full collection on the calling thread, finalizing unreachable
    /// objects first. Returns the number of objects reclaimed.
    pub fn collect_garbage(&self) -> usize {
        let mut roots: Vec<ObjRef> = self.inner.pending.lock().values().copied().collect();
        {
            let classes = self.inner.classes.read();
            for class in classes.iter() {
                roots.extend(class.static_values.iter().filter_map(|v| v.as_object()));
            }
        }
        let dead = self.inner.heap.lock().unreachable(&roots);
        let finalizable: Vec<(ObjRef, String)> = {
            let heap = self.inner.heap.lock();
            let classes = self.inner.classes.read();
            dead.iter()
                .filter_map(|&obj| {
                    let class = heap.get(obj)?.class;
                    classes.finalizer_of(class).map(|e| (obj, e.to_string()))
                })
                .collect()
        };
        for (obj, entry) in finalizable {
            if let Err(Thrown(throwable)) = self.run_native(&entry, Some(obj), &[]) {
                tracing::warn!(
                    object = obj.raw(),
                    error = ?self.exception_message(throwable),
                    "finalizer threw"
                );
            }
        }
        let freed = self.inner.heap.lock().sweep(&dead);
        tracing::debug!(runtime = self.inner.id, freed, "garbage collected");
        freed
    }

    /// Spawn an OS thread that is attached before running `f`
    pub fn spawn_attached<F, R>(&self, f: F) -> JoinHandle<R>
    where
        F: FnOnce(Host) -> R + Send + 'static,
        R: Send + 'static,
    {
        let host = self.clone();
        std::thread::spawn(move || {
            host.inner.attached.lock().insert(std::thread::current().id());
            f(host)
        })
    }

    fn check_attached(&self) -> AbiResult<()> {
        let current = std::thread::current();
        if self.inner.attached.lock().contains(&current.id()) {
            Ok(())
        } else {
            Err(ForeignError::ThreadNotAttached(
                current.name().unwrap_or("<unnamed>").to_string(),
            ))
        }
    }

    fn live(&self, obj: ObjRef) -> AbiResult<()> {
        if self.is_live(obj) {
            Ok(())
        } else {
            Err(ForeignError::InvalidReference(obj.raw()))
        }
    }

    fn class_display(&self, class: ClassRef) -> String {
        self.inner
            .classes
            .read()
            .get(class)
            .map(|c| c.name.clone())
            .unwrap_or_else(|| format!("<class {}>", class.index()))
    }

    fn no_such_member(&self, class: ClassRef, name: &str, sig: &str) -> ForeignError {
        ForeignError::NoSuchMember {
            class: self.class_display(class),
            name: name.to_string(),
            signature: sig.to_string(),
        }
    }
}

/// Observer for a continuation created with [`Host::new_continuation`]
#[derive(Debug, Clone)]
pub struct ContinuationProbe {
    slot: Arc<CompletionSlot>,
}

impl ContinuationProbe {
    /// Outcome if already resolved
    pub fn outcome(&self) -> Option<Completion> {
        *self.slot.value.lock()
    }

    /// Block until resolved or `timeout` elapses
    pub fn wait(&self, timeout: Duration) -> Option<Completion> {
        let mut value = self.slot.value.lock();
        self.slot
            .ready
            .wait_while_for(&mut value, |v| v.is_none(), timeout);
        *value
    }
}

// ============================================================================
// ForeignContext
// ============================================================================

impl ForeignContext for Host {
    fn runtime(&self) -> Arc<dyn ForeignContext> {
        Arc::new(self.clone())
    }

    fn runtime_id(&self) -> u64 {
        self.inner.id
    }

    fn attach_current_thread(&self) -> AbiResult<()> {
        let id = std::thread::current().id();
        if self.inner.attached.lock().insert(id) {
            tracing::debug!(runtime = self.inner.id, thread = ?id, "thread attached");
        }
        Ok(())
    }

    fn is_current_thread_attached(&self) -> bool {
        self.inner
            .attached
            .lock()
            .contains(&std::thread::current().id())
    }

    fn find_class(&self, name: &str) -> AbiResult<ClassRef> {
        self.check_attached()?;
        self.class(name)
            .ok_or_else(|| ForeignError::NoSuchClass(name.to_string()))
    }

    fn class_of(&self, obj: ObjRef) -> AbiResult<ClassRef> {
        self.class_of_obj(obj)
            .ok_or(ForeignError::InvalidReference(obj.raw()))
    }

    fn class_name(&self, class: ClassRef) -> AbiResult<String> {
        self.inner
            .classes
            .read()
            .get(class)
            .map(|c| c.name.clone())
            .ok_or_else(|| ForeignError::AbiError(format!("Unknown class {}", class.index())))
    }

    fn superclass(&self, class: ClassRef) -> Option<ClassRef> {
        self.inner.classes.read().get(class)?.superclass
    }

    fn is_assignable_from(&self, sub: ClassRef, sup: ClassRef) -> bool {
        self.inner.classes.read().is_assignable(sub, sup)
    }

    fn is_instance_of(&self, obj: ObjRef, class: ClassRef) -> bool {
        match self.class_of_obj(obj) {
            Some(actual) => self.inner.classes.read().is_assignable(actual, class),
            None => false,
        }
    }

    fn constructor_id(&self, class: ClassRef, sig: &str) -> AbiResult<MethodId> {
        let found = self
            .inner
            .classes
            .read()
            .get(class)
            .and_then(|c| c.constructors.iter().position(|m| m.sig == sig));
        found
            .map(|slot| MethodId::new(class, slot as u32))
            .ok_or_else(|| self.no_such_member(class, "<init>", sig))
    }

    fn method_id(&self, class: ClassRef, name: &str, sig: &str) -> AbiResult<MethodId> {
        let found = self.inner.classes.read().find_method(class, name, sig, false);
        found
            .map(|(owner, slot)| MethodId::new(owner, slot))
            .ok_or_else(|| self.no_such_member(class, name, sig))
    }

    fn static_method_id(&self, class: ClassRef, name: &str, sig: &str) -> AbiResult<MethodId> {
        let found = self.inner.classes.read().find_method(class, name, sig, true);
        found
            .map(|(owner, slot)| MethodId::new(owner, slot))
            .ok_or_else(|| self.no_such_member(class, name, sig))
    }

    fn field_id(&self, class: ClassRef, name: &str, sig: &str) -> AbiResult<FieldId> {
        let found = self.inner.classes.read().find_field(class, name, sig);
        found
            .map(|(owner, slot)| FieldId::new(owner, slot))
            .ok_or_else(|| self.no_such_member(class, name, sig))
    }

    fn static_field_id(&self, class: ClassRef, name: &str, sig: &str) -> AbiResult<FieldId> {
        let found = self.inner.classes.read().find_static_field(class, name, sig);
        found
            .map(|slot| FieldId::new(class, slot))
            .ok_or_else(|| self.no_such_member(class, name, sig))
    }

    fn new_object(
        &self,
        class: ClassRef,
        ctor: MethodId,
        args: &[ForeignValue],
    ) -> AbiResult<ForeignValue> {
        self.check_attached()?;
        let body = self
            .inner
            .classes
            .read()
            .constructor(ctor.class(), ctor.index())
            .map(|m| m.body.clone());
        let Some(body) = body else {
            return Err(self.no_such_member(class, "<init>", "?"));
        };
        let obj = self.alloc(class);
        let outcome = self
            .run_body(&body, Some(obj), args)
            .map(|_| ForeignValue::Object(obj));
        let result = self.complete(outcome);
        // allocation already counted one local
        if let ForeignValue::Object(obj) = result {
            self.delete_local_ref(obj);
        }
        Ok(result)
    }

    fn call_method(
        &self,
        obj: ObjRef,
        method: MethodId,
        args: &[ForeignValue],
    ) -> AbiResult<ForeignValue> {
        self.check_attached()?;
        self.live(obj)?;
        let body = {
            let classes = self.inner.classes.read();
            let def = classes
                .method(method.class(), method.index())
                .ok_or_else(|| ForeignError::AbiError("Unknown method id".to_string()))?;
            let actual = self
                .class_of_obj(obj)
                .ok_or(ForeignError::InvalidReference(obj.raw()))?;
            let (owner, slot) = classes
                .find_method(actual, &def.name, &def.sig, false)
                .unwrap_or((method.class(), method.index()));
            classes
                .method(owner, slot)
                .map(|m| m.body.clone())
                .ok_or_else(|| ForeignError::AbiError("Unknown method id".to_string()))?
        };
        let outcome = self.run_body(&body, Some(obj), args);
        Ok(self.complete(outcome))
    }

    fn call_static_method(
        &self,
        class: ClassRef,
        method: MethodId,
        args: &[ForeignValue],
    ) -> AbiResult<ForeignValue> {
        self.check_attached()?;
        let body = self
            .inner
            .classes
            .read()
            .method(method.class(), method.index())
            .map(|m| m.body.clone());
        let Some(body) = body else {
            return Err(self.no_such_member(class, "?", "?"));
        };
        let outcome = self.run_body(&body, None, args);
        Ok(self.complete(outcome))
    }

    fn get_field(&self, obj: ObjRef, field: FieldId) -> AbiResult<ForeignValue> {
        self.live(obj)?;
        let value = self
            .inner
            .heap
            .lock()
            .get(obj)
            .and_then(|o| o.fields.get(field.index() as usize).copied())
            .ok_or_else(|| ForeignError::ArgumentError("field out of range".to_string()))?;
        self.note_local(value);
        Ok(value)
    }

    fn set_field(&self, obj: ObjRef, field: FieldId, value: ForeignValue) -> AbiResult<()> {
        self.live(obj)?;
        let mut heap = self.inner.heap.lock();
        let slot = heap
            .get_mut(obj)
            .and_then(|o| o.fields.get_mut(field.index() as usize))
            .ok_or_else(|| ForeignError::ArgumentError("field out of range".to_string()))?;
        *slot = value;
        Ok(())
    }

    fn get_static_field(&self, class: ClassRef, field: FieldId) -> AbiResult<ForeignValue> {
        let classes = self.inner.classes.read();
        classes
            .get(class)
            .and_then(|c| c.static_values.get(field.index() as usize).copied())
            .ok_or_else(|| ForeignError::ArgumentError("static field out of range".to_string()))
    }

    fn set_static_field(
        &self,
        class: ClassRef,
        field: FieldId,
        value: ForeignValue,
    ) -> AbiResult<()> {
        let mut classes = self.inner.classes.write();
        let slot = classes
            .get_mut(class)
            .and_then(|c| c.static_values.get_mut(field.index() as usize))
            .ok_or_else(|| ForeignError::ArgumentError("static field out of range".to_string()))?;
        *slot = value;
        Ok(())
    }

    fn new_string(&self, s: &str) -> AbiResult<ObjRef> {
        Ok(self.string(s))
    }

    fn read_string(&self, obj: ObjRef) -> AbiResult<String> {
        self.live(obj)?;
        self.str_value(obj).ok_or_else(|| ForeignError::TypeMismatch {
            expected: names::STRING.to_string(),
            got: self.class_name_of(obj).unwrap_or_default(),
        })
    }

    fn new_byte_array(&self, bytes: &[u8]) -> AbiResult<ObjRef> {
        Ok(self.byte_array(bytes))
    }

    fn read_byte_array(&self, obj: ObjRef) -> AbiResult<Vec<u8>> {
        self.live(obj)?;
        match self.payload(obj) {
            Some(Payload::Bytes(bytes)) => Ok(bytes),
            _ => Err(ForeignError::TypeMismatch {
                expected: names::BYTE_ARRAY.to_string(),
                got: self.class_name_of(obj).unwrap_or_default(),
            }),
        }
    }

    fn new_global_ref(&self, obj: ObjRef) -> AbiResult<ObjRef> {
        self.live(obj)?;
        self.add_global(obj);
        Ok(obj)
    }

    fn delete_global_ref(&self, obj: ObjRef) {
        if let Some(object) = self.inner.heap.lock().get_mut(obj) {
            object.globals = object.globals.saturating_sub(1);
        }
    }

    fn delete_local_ref(&self, obj: ObjRef) {
        if let Some(object) = self.inner.heap.lock().get_mut(obj) {
            object.locals = object.locals.saturating_sub(1);
        }
    }

    fn throw(&self, throwable: ObjRef) {
        self.set_pending(throwable);
    }

    fn exception_occurred(&self) -> Option<ObjRef> {
        self.pending_exception()
    }

    fn exception_clear(&self) {
        self.take_pending();
    }

    fn members(&self, class: ClassRef) -> AbiResult<Vec<MemberDesc>> {
        let classes = self.inner.classes.read();
        if classes.get(class).is_none() {
            return Err(ForeignError::AbiError(format!(
                "Unknown class {}",
                class.index()
            )));
        }
        Ok(classes.visible_members(class))
    }

    fn invoke_member(
        &self,
        member: &MemberDesc,
        args: &[Option<ForeignValue>],
    ) -> AbiResult<ForeignValue> {
        self.check_attached()?;
        if args.len() != member.params.len() {
            return Err(ForeignError::ArgumentError(format!(
                "{} expects {} arguments, got {}",
                member.display(),
                member.params.len(),
                args.len()
            )));
        }
        let target = self
            .inner
            .classes
            .read()
            .member(member.id)
            .map(|e| e.target)
            .ok_or_else(|| self.no_such_member(member.id.class, &member.name, "?"))?;

        let mut receiver = None;
        let mut values = Vec::with_capacity(args.len());
        for (param, arg) in member.params.iter().zip(args) {
            match param.kind {
                ParamKind::Instance => {
                    receiver = arg.and_then(|v| v.as_object());
                }
                _ => values.push(arg.unwrap_or_else(|| zero_value(&param.ty))),
            }
        }

        let outcome = match target {
            MemberTarget::Method(slot) => {
                let body = {
                    let classes = self.inner.classes.read();
                    let def = classes
                        .method(member.id.class, slot)
                        .ok_or_else(|| ForeignError::AbiError("Unknown member".to_string()))?;
                    let (owner, slot) = match receiver.and_then(|r| self.class_of_obj(r)) {
                        Some(actual) if !def.is_static => classes
                            .find_method(actual, &def.name, &def.sig, false)
                            .unwrap_or((member.id.class, slot)),
                        _ => (member.id.class, slot),
                    };
                    classes
                        .method(owner, slot)
                        .map(|m| m.body.clone())
                        .ok_or_else(|| ForeignError::AbiError("Unknown member".to_string()))?
                };
                if !member.is_static && receiver.is_none() {
                    return Err(ForeignError::ArgumentError(format!(
                        "{} needs a receiver",
                        member.display()
                    )));
                }
                self.run_body(&body, receiver, &values)
            }
            MemberTarget::Constructor(slot) => {
                let body = self
                    .inner
                    .classes
                    .read()
                    .constructor(member.id.class, slot)
                    .map(|m| m.body.clone())
                    .ok_or_else(|| ForeignError::AbiError("Unknown member".to_string()))?;
                let obj = self.alloc(member.id.class);
                self.delete_local_ref(obj);
                self.run_body(&body, Some(obj), &values)
                    .map(|_| ForeignValue::Object(obj))
            }
            MemberTarget::Field(slot) => {
                let obj = receiver.ok_or_else(|| {
                    ForeignError::ArgumentError(format!("{} needs a receiver", member.name))
                })?;
                self.live(obj)?;
                self.read_slot(obj, slot as usize)
            }
            MemberTarget::StaticField(slot) => {
                let field = FieldId::new(member.id.class, slot);
                return self.get_static_field(member.id.class, field);
            }
        };
        Ok(self.complete(outcome))
    }

    fn set_property(
        &self,
        member: &MemberDesc,
        receiver: Option<ObjRef>,
        value: ForeignValue,
    ) -> AbiResult<()> {
        if !member.is_mutable_property() {
            return Err(ForeignError::ArgumentError(format!(
                "{} is not a mutable property",
                member.name
            )));
        }
        let target = self
            .inner
            .classes
            .read()
            .member(member.id)
            .map(|e| e.target)
            .ok_or_else(|| self.no_such_member(member.id.class, &member.name, "?"))?;
        match target {
            MemberTarget::Field(slot) => {
                let obj = receiver.ok_or_else(|| {
                    ForeignError::ArgumentError(format!("{} needs a receiver", member.name))
                })?;
                self.set_field(obj, FieldId::new(member.id.class, slot), value)
            }
            MemberTarget::StaticField(slot) => {
                self.set_static_field(member.id.class, FieldId::new(member.id.class, slot), value)
            }
            _ => Err(ForeignError::ArgumentError(format!(
                "{} is not a property",
                member.name
            ))),
        }
    }
}

/// Value passed for an omitted optional parameter
fn zero_value(ty: &TypeDesc) -> ForeignValue {
    default_for_sig(&ty.descriptor()).unwrap_or(ForeignValue::Null)
}
