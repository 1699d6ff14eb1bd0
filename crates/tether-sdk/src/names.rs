//! Fixed naming convention shared by the bridge core and the foreign runtime
//!
//! Bridged closures, streams, continuations and peer-backed objects are
//! reached under predictable class and entry-point names, so neither side
//! needs runtime string lookup for these fixed operations. Only user-defined
//! members go through reflection.
//!
//! ## Entry-point argument convention
//!
//! The foreign runtime calls a native entry point with the receiving object
//! first, followed by the declared arguments: `[this, arg0, arg1, ...]`.

// ============================================================================
// Foreign runtime core classes
// ============================================================================

/// Root of the class hierarchy
pub const OBJECT: &str = "lang/Object";
/// Immutable string
pub const STRING: &str = "lang/String";
/// Primitive byte array
pub const BYTE_ARRAY: &str = "lang/ByteArray";
/// Root of all exceptions
pub const THROWABLE: &str = "lang/Throwable";
/// Checked exception base
pub const EXCEPTION: &str = "lang/Exception";

/// Boxed `Z`
pub const BOOLEAN: &str = "lang/Boolean";
/// Boxed `B`
pub const BYTE: &str = "lang/Byte";
/// Boxed `C`
pub const CHARACTER: &str = "lang/Character";
/// Boxed `S`
pub const SHORT: &str = "lang/Short";
/// Boxed `I`
pub const INTEGER: &str = "lang/Integer";
/// Boxed `J`
pub const LONG: &str = "lang/Long";
/// Boxed `F`
pub const FLOAT: &str = "lang/Float";
/// Boxed `D`
pub const DOUBLE: &str = "lang/Double";

/// Two-element record
pub const PAIR: &str = "lang/Pair";
/// Three-element record
pub const TRIPLE: &str = "lang/Triple";
/// The runtime's own success/failure record
pub const RESULT: &str = "lang/Result";
/// Push-based asynchronous stream
pub const FLOW: &str = "lang/Flow";
/// Suspending-call continuation
pub const CONTINUATION: &str = "lang/Continuation";

/// Ordered list
pub const LIST: &str = "util/List";
/// Insertion-ordered map
pub const MAP: &str = "util/Map";
/// Insertion-ordered set
pub const SET: &str = "util/Set";
/// Point in time (milliseconds since the epoch)
pub const DATE: &str = "util/Date";
/// 128-bit identifier
pub const UUID: &str = "util/UUID";
/// Resource identifier
pub const URI: &str = "util/URI";
/// Locale identifier
pub const LOCALE: &str = "util/Locale";

/// Maximum closure arity supported by the convention
pub const MAX_ARITY: usize = 5;

/// Callable interface of arity `n` (`lang/Function0` ... `lang/Function5`)
pub fn function_class(arity: usize) -> String {
    format!("lang/Function{}", arity)
}

/// Suspending callable interface of arity `n`
pub fn suspend_function_class(arity: usize) -> String {
    format!("lang/SuspendFunction{}", arity)
}

// ============================================================================
// Bridge support classes (provided by the runtime's bridge library)
// ============================================================================

/// Capability: object carries a peer handle back to a native object
pub const PEER_BRIDGED: &str = "bridge/PeerBridged";
/// Capability: object can produce its native counterpart directly
pub const NATIVE_PROJECTING: &str = "bridge/NativeProjecting";
/// Exception wrapping a native error
pub const NATIVE_ERROR: &str = "bridge/NativeError";
/// Opaque holder for a native bridged object
pub const NATIVE_OBJECT: &str = "bridge/NativeObject";
/// Native-backed continuation adapter
pub const NATIVE_CONTINUATION: &str = "bridge/Continuation";
/// Native producer exposed as a non-throwing stream
pub const NATIVE_STREAM: &str = "bridge/Stream";
/// Native producer exposed as a throwing stream
pub const NATIVE_THROWING_STREAM: &str = "bridge/ThrowingStream";

/// Wrapped native array
pub const WRAPPED_ARRAY: &str = "bridge/Array";
/// Wrapped native dictionary
pub const WRAPPED_DICTIONARY: &str = "bridge/Dictionary";
/// Wrapped native set
pub const WRAPPED_SET: &str = "bridge/Set";
/// Wrapped native byte buffer
pub const WRAPPED_DATA: &str = "bridge/Data";
/// Wrapped native date
pub const WRAPPED_DATE: &str = "bridge/Date";
/// Wrapped native uuid
pub const WRAPPED_UUID: &str = "bridge/UUID";
/// Wrapped native url
pub const WRAPPED_URL: &str = "bridge/URL";
/// Wrapped native locale
pub const WRAPPED_LOCALE: &str = "bridge/Locale";
/// Present value of a nested optional
pub const WRAPPED_OPTIONAL: &str = "bridge/Optional";
/// Wrapped native result (two slots, exactly one populated)
pub const WRAPPED_RESULT: &str = "bridge/Result";
/// Four-element record
pub const TUPLE4: &str = "bridge/Tuple4";
/// Five-element record
pub const TUPLE5: &str = "bridge/Tuple5";

/// Native closure proxy of arity `n`
pub fn closure_class(arity: usize) -> String {
    format!("bridge/Closure{}", arity)
}

/// Native suspending closure proxy of arity `n`
pub fn async_closure_class(arity: usize) -> String {
    format!("bridge/AsyncClosure{}", arity)
}

/// Suffix of a registered bridge implementation for a capability
pub const BRIDGE_IMPL_SUFFIX: &str = "_BridgeImpl";

// ============================================================================
// Native entry points
// ============================================================================

/// Release the peer handle held by a finalized proxy
pub const ENTRY_PEER_RELEASE: &str = "Peer.release";
/// Describe the native object behind a peer (`toString`)
pub const ENTRY_PEER_DESCRIBE: &str = "Peer.describe";
/// Resolve a native continuation with a value
pub const ENTRY_CONTINUATION_RESUME: &str = "Continuation.resume";
/// Resolve a native continuation with an error
pub const ENTRY_CONTINUATION_RESUME_WITH_ERROR: &str = "Continuation.resumeWithError";
/// Start collecting a native stream
pub const ENTRY_STREAM_COLLECT: &str = "Stream.collect";
/// Stop a native stream
pub const ENTRY_STREAM_CANCEL: &str = "Stream.cancel";

/// Invoke a native closure of arity `n`
pub fn closure_invoke_entry(arity: usize) -> String {
    format!("Closure{}.invoke", arity)
}

/// Invoke a native suspending closure of arity `n`
pub fn async_closure_invoke_entry(arity: usize) -> String {
    format!("AsyncClosure{}.invoke", arity)
}

// ============================================================================
// Common signatures
// ============================================================================

/// `invoke(Object, ...) -> Object` for a plain callable of `arity`
pub fn invoke_signature(arity: usize) -> String {
    let mut sig = String::from("(");
    for _ in 0..arity {
        sig.push_str("Llang/Object;");
    }
    sig.push_str(")Llang/Object;");
    sig
}

/// `invoke(Object, ..., Continuation) -> Object` for a suspending callable
pub fn suspend_invoke_signature(arity: usize) -> String {
    let mut sig = String::from("(");
    for _ in 0..arity {
        sig.push_str("Llang/Object;");
    }
    sig.push_str("Llang/Continuation;)Llang/Object;");
    sig
}

/// Field holding a peer handle
pub const PEER_FIELD: &str = "peer";
/// Field holding the plain container inside a wrapped container
pub const STORAGE_FIELD: &str = "storage";
/// Field holding a boxed primitive
pub const VALUE_FIELD: &str = "value";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invoke_signatures() {
        assert_eq!(invoke_signature(0), "()Llang/Object;");
        assert_eq!(invoke_signature(2), "(Llang/Object;Llang/Object;)Llang/Object;");
        assert_eq!(
            suspend_invoke_signature(1),
            "(Llang/Object;Llang/Continuation;)Llang/Object;"
        );
    }

    #[test]
    fn test_entry_names() {
        assert_eq!(closure_invoke_entry(3), "Closure3.invoke");
        assert_eq!(async_closure_invoke_entry(0), "AsyncClosure0.invoke");
        assert_eq!(closure_class(1), "bridge/Closure1");
        assert_eq!(function_class(5), "lang/Function5");
    }
}
