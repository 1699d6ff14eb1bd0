//! Integration tests for closures crossing the boundary in both directions

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tether_bridge::{AnyValue, Bridgeable, BridgeError, BridgedFn, ConversionOptions};
use tether_host::{ClassBuilder, ForeignValue, Thrown};
use tether_sdk::{names, ForeignContext};

use common::{host, int_of, obj, str_of};

const OPTIONS: ConversionOptions = ConversionOptions::NONE;

#[test]
fn test_foreign_calls_native_closure() {
    let host = host();
    let ctx: &dyn ForeignContext = &host;

    let describe = BridgedFn::<(i32,), String>::new(|v| Ok(format!("v={}", v)));
    let proxy = obj(describe.to_foreign(ctx, OPTIONS).unwrap());
    assert!(host.instance_of(proxy, &names::function_class(1)));

    let result = host
        .invoke(proxy, "invoke", &names::invoke_signature(1), &[host.boxed(ForeignValue::Int(5))])
        .unwrap();
    assert_eq!(str_of(&host, result).as_deref(), Some("v=5"));
}

#[test]
fn test_closure_slot_reassignment() {
    let host = host();
    let ctx: &dyn ForeignContext = &host;
    host.define_class(
        ClassBuilder::new("test/Holder")
            .field("callback", "Llang/Function1;")
            .constructor("()V", |_, _, _| Ok(ForeignValue::Null)),
    )
    .unwrap();
    let holder = host.instantiate("test/Holder", "()V", &[]).unwrap();
    let _pin = tether_bridge::GlobalRef::new(ctx, holder).unwrap();

    let first_alive = Arc::new(());
    let marker = first_alive.clone();
    let first = BridgedFn::<(i32,), String>::new(move |v| {
        let _ = &marker;
        Ok(format!("v={}", v))
    });
    let proxy = first.to_foreign(ctx, OPTIONS).unwrap();
    host.set_field_named(holder, "callback", proxy).unwrap();

    let stored = host.field_named(holder, "callback").unwrap();
    let callback = BridgedFn::<(i32,), String>::from_foreign(ctx, stored, OPTIONS).unwrap();
    assert!(!callback.is_foreign());
    assert_eq!(callback.call(5).unwrap(), "v=5");
    drop(callback);

    let second = BridgedFn::<(i32,), String>::new(|v| Ok(format!("w={}", v)));
    let proxy = second.to_foreign(ctx, OPTIONS).unwrap();
    host.set_field_named(holder, "callback", proxy).unwrap();

    host.drop_local_refs();
    host.collect_garbage();
    assert_eq!(Arc::strong_count(&first_alive), 1);

    let stored = host.field_named(holder, "callback").unwrap();
    let callback = BridgedFn::<(i32,), String>::from_foreign(ctx, stored, OPTIONS).unwrap();
    assert_eq!(callback.call(5).unwrap(), "w=5");
}

#[test]
fn test_native_calls_foreign_lambda() {
    let host = host();
    let ctx: &dyn ForeignContext = &host;

    let lambda = host.new_lambda(2, |host, args| {
        let a = int_of(host, args[0]).unwrap_or(0);
        let b = int_of(host, args[1]).unwrap_or(0);
        Ok(host.boxed(ForeignValue::Int(a + b)))
    });
    let add = BridgedFn::<(i32, i32), i32>::from_foreign(ctx, ForeignValue::Object(lambda), OPTIONS).unwrap();
    assert!(add.is_foreign());
    assert_eq!(add.call(2, 3).unwrap(), 5);

    // Back across: the original lambda, not a new proxy
    let back = add.to_foreign(ctx, OPTIONS).unwrap();
    assert!(ctx.is_same_object(obj(back), lambda));
}

#[test]
fn test_native_closure_round_trip_is_lossless() {
    let host = host();
    let ctx: &dyn ForeignContext = &host;

    let square = BridgedFn::<(i64,), i64>::new(|x| Ok(x * x));
    let proxy = square.to_foreign(ctx, OPTIONS).unwrap();
    let back = BridgedFn::<(i64,), i64>::from_foreign(ctx, proxy, OPTIONS).unwrap();
    assert!(!back.is_foreign());
    assert_eq!(back.call(9).unwrap(), 81);
}

#[test]
fn test_erased_closure_through_any_value() {
    let host = host();
    let ctx: &dyn ForeignContext = &host;

    let concat = BridgedFn::<(String, String), String>::new(|a, b| Ok(a + &b));
    let proxy = concat.to_foreign(ctx, OPTIONS).unwrap();
    let AnyValue::Closure(closure) = AnyValue::from_foreign(ctx, proxy, OPTIONS).unwrap() else {
        panic!("expected a closure");
    };
    assert_eq!(closure.arity(), 2);
    let joined = closure
        .call(ctx, vec![AnyValue::from("ab"), AnyValue::from("cd")])
        .unwrap();
    assert_eq!(joined, AnyValue::from("abcd"));
}

#[test]
fn test_arity_mismatch_rejected() {
    let host = host();
    let ctx: &dyn ForeignContext = &host;

    let unary = BridgedFn::<(i32,), i32>::new(Ok);
    let proxy = unary.to_foreign(ctx, OPTIONS).unwrap();
    let err = BridgedFn::<(i32, i32), i32>::from_foreign(ctx, proxy, OPTIONS).unwrap_err();
    assert!(matches!(err, BridgeError::Conversion { .. }));
}

#[test]
fn test_foreign_exception_reaches_native_caller() {
    let host = host();
    let ctx: &dyn ForeignContext = &host;

    let lambda = host.new_lambda(0, |host, _| Err(host.throw_new(names::EXCEPTION, "boom")));
    let fail = BridgedFn::<(), i32>::from_foreign(ctx, ForeignValue::Object(lambda), OPTIONS).unwrap();

    let err = fail.call().unwrap_err();
    assert!(err.is_foreign());
    assert!(err.to_string().contains("boom"));
    assert!(host.pending_exception().is_none());
}

#[test]
fn test_native_error_reaches_foreign_caller() {
    let host = host();
    let ctx: &dyn ForeignContext = &host;

    let fail = BridgedFn::<(), String>::new(|| Err(BridgeError::msg("boom")));
    let proxy = obj(fail.to_foreign(ctx, OPTIONS).unwrap());

    let Err(Thrown(throwable)) = host.invoke(proxy, "invoke", &names::invoke_signature(0), &[]) else {
        panic!("expected a throw");
    };
    assert!(host.instance_of(throwable, names::NATIVE_ERROR));
    assert_eq!(host.exception_message(throwable).as_deref(), Some("boom"));

    // The native error comes back unchanged
    let back = BridgeError::from_foreign(ctx, ForeignValue::Object(throwable), OPTIONS).unwrap();
    assert!(matches!(back, BridgeError::Message(ref m) if m == "boom"));
}

#[test]
fn test_exception_round_trips_through_both_sides() {
    let host = host();
    let ctx: &dyn ForeignContext = &host;

    // foreign lambda throws, native closure propagates it, foreign caller sees the original
    let lambda = host.new_lambda(0, |host, _| Err(host.throw_new(names::EXCEPTION, "boom")));
    let inner = BridgedFn::<(), i32>::from_foreign(ctx, ForeignValue::Object(lambda), OPTIONS).unwrap();
    let outer = BridgedFn::<(), i32>::new(move || inner.call());
    let proxy = obj(outer.to_foreign(ctx, OPTIONS).unwrap());

    let Err(Thrown(throwable)) = host.invoke(proxy, "invoke", &names::invoke_signature(0), &[]) else {
        panic!("expected a throw");
    };
    assert_eq!(host.class_name_of(throwable).as_deref(), Some(names::EXCEPTION));
    assert_eq!(host.exception_message(throwable).as_deref(), Some("boom"));
}

#[test]
fn test_foreign_lambda_pinned_while_wrapped() {
    let host = host();
    let ctx: &dyn ForeignContext = &host;

    let lambda = host.new_lambda(0, |_, _| Ok(ForeignValue::Null));
    let wrapped = BridgedFn::<(), ()>::from_foreign(ctx, ForeignValue::Object(lambda), OPTIONS).unwrap();
    assert_eq!(host.global_ref_count(lambda), 1);

    let copy = wrapped.clone();
    drop(wrapped);
    assert_eq!(host.global_ref_count(lambda), 1);
    drop(copy);
    assert_eq!(host.global_ref_count(lambda), 0);

    host.drop_local_refs();
    host.collect_garbage();
    assert!(!host.is_live(lambda));
}

#[test]
fn test_proxy_finalization_releases_peer() {
    let host = host();
    let ctx: &dyn ForeignContext = &host;

    let alive = Arc::new(());
    let marker = alive.clone();
    let closure = BridgedFn::<(), ()>::new(move || {
        let _ = &marker;
        Ok(())
    });
    let proxy = obj(closure.to_foreign(ctx, OPTIONS).unwrap());
    assert_eq!(Arc::strong_count(&alive), 2);

    host.drop_local_refs();
    host.collect_garbage();
    assert!(!host.is_live(proxy));
    assert_eq!(Arc::strong_count(&alive), 1);
}

#[test]
fn test_concurrent_native_calls_into_foreign() {
    let host = host();
    let ctx: &dyn ForeignContext = &host;

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let lambda = host.new_lambda(1, move |host, args| {
        counter.fetch_add(1, Ordering::SeqCst);
        let x = int_of(host, args[0]).unwrap_or(0);
        Ok(host.boxed(ForeignValue::Int(x * 2)))
    });
    let double = BridgedFn::<(i32,), i32>::from_foreign(ctx, ForeignValue::Object(lambda), OPTIONS).unwrap();

    let threads: Vec<_> = (0..8)
        .map(|t| {
            let double = double.clone();
            std::thread::spawn(move || {
                for i in 0..50 {
                    let x = t * 100 + i;
                    assert_eq!(double.call(x).unwrap(), x * 2);
                }
            })
        })
        .collect();
    for thread in threads {
        thread.join().unwrap();
    }
    assert_eq!(calls.load(Ordering::SeqCst), 8 * 50);
}

#[test]
fn test_concurrent_foreign_calls_into_native() {
    let host = host();
    let ctx: &dyn ForeignContext = &host;

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let increment = BridgedFn::<(i32,), i32>::new(move |x| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(x + 1)
    });
    let proxy = obj(increment.to_foreign(ctx, OPTIONS).unwrap());
    let _pin = tether_bridge::GlobalRef::new(ctx, proxy).unwrap();

    let threads: Vec<_> = (0..8)
        .map(|t| {
            host.spawn_attached(move |host| {
                for i in 0..50 {
                    let x = t * 100 + i;
                    let result = host
                        .invoke(proxy, "invoke", &names::invoke_signature(1), &[host.boxed(ForeignValue::Int(x))])
                        .unwrap();
                    assert_eq!(int_of(&host, result), Some(x + 1));
                }
            })
        })
        .collect();
    for thread in threads {
        thread.join().unwrap();
    }
    assert_eq!(calls.load(Ordering::SeqCst), 8 * 50);
}
