//! Integration tests for suspending closures and continuations

mod common;

use std::time::Duration;

use tether_bridge::{AsyncBridgedFn, Bridgeable, BridgeError, ConversionOptions, ContinuationAdapter};
use tether_host::{ForeignValue, Thrown};
use tether_sdk::{names, ForeignContext};

use common::{host, int_of, obj};

const OPTIONS: ConversionOptions = ConversionOptions::NONE;
const WAIT: Duration = Duration::from_secs(5);

#[test]
fn test_foreign_awaits_native_async_closure() {
    let host = host();
    let ctx: &dyn ForeignContext = &host;

    let next = AsyncBridgedFn::<(i32,), i32>::new(|x| async move {
        tokio::time::sleep(Duration::from_millis(5)).await;
        Ok(x + 1)
    });
    let proxy = obj(next.to_foreign(ctx, OPTIONS).unwrap());
    assert!(host.instance_of(proxy, &names::suspend_function_class(1)));

    let (continuation, probe) = host.new_continuation();
    let returned = host
        .invoke(
            proxy,
            "invoke",
            &names::suspend_invoke_signature(1),
            &[host.boxed(ForeignValue::Int(41)), ForeignValue::Object(continuation)],
        )
        .unwrap();
    assert_eq!(returned, ForeignValue::Null);

    match probe.wait(WAIT) {
        Some(Ok(value)) => assert_eq!(int_of(&host, value), Some(42)),
        other => panic!("unexpected outcome {:?}", other),
    }
}

#[test]
fn test_native_async_failure_resumes_with_error() {
    let host = host();
    let ctx: &dyn ForeignContext = &host;

    let fail = AsyncBridgedFn::<(), String>::new(|| async { Err(BridgeError::msg("boom")) });
    let proxy = obj(fail.to_foreign(ctx, OPTIONS).unwrap());

    let (continuation, probe) = host.new_continuation();
    host.invoke(
        proxy,
        "invoke",
        &names::suspend_invoke_signature(0),
        &[ForeignValue::Object(continuation)],
    )
    .unwrap();

    match probe.wait(WAIT) {
        Some(Err(throwable)) => {
            assert_eq!(host.exception_message(throwable).as_deref(), Some("boom"));
        }
        other => panic!("unexpected outcome {:?}", other),
    }
}

#[test]
fn test_bad_arguments_fail_synchronously() {
    let host = host();
    let ctx: &dyn ForeignContext = &host;

    let next = AsyncBridgedFn::<(i32,), i32>::new(|x| async move { Ok(x + 1) });
    let proxy = obj(next.to_foreign(ctx, OPTIONS).unwrap());

    let (continuation, probe) = host.new_continuation();
    let text = ForeignValue::Object(host.string("not a number"));
    let outcome = host.invoke(
        proxy,
        "invoke",
        &names::suspend_invoke_signature(1),
        &[text, ForeignValue::Object(continuation)],
    );
    assert!(matches!(outcome, Err(Thrown(_))));
    assert!(probe.outcome().is_none());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_native_awaits_foreign_suspend_lambda() {
    let host = host();
    let ctx: &dyn ForeignContext = &host;

    let lambda = host.new_suspend_lambda(1, |host, args, continuation| {
        let x = int_of(host, args[0]).unwrap_or(0);
        host.resume(continuation, Ok(ForeignValue::Int(x * 2)))
    });
    let double =
        AsyncBridgedFn::<(i32,), i32>::from_foreign(ctx, ForeignValue::Object(lambda), OPTIONS).unwrap();
    assert!(double.is_foreign());
    assert_eq!(double.call(21).await.unwrap(), 42);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_foreign_suspend_failure_reaches_native() {
    let host = host();
    let ctx: &dyn ForeignContext = &host;

    let lambda = host.new_suspend_lambda(0, |host, _, continuation| {
        let failure = host.new_exception(names::EXCEPTION, "boom");
        host.resume(continuation, Err(failure))
    });
    let fail = AsyncBridgedFn::<(), i32>::from_foreign(ctx, ForeignValue::Object(lambda), OPTIONS).unwrap();

    let err = fail.call().await.unwrap_err();
    assert!(err.is_foreign());
    assert!(err.to_string().contains("boom"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_foreign_resumes_from_another_thread() {
    let host = host();
    let ctx: &dyn ForeignContext = &host;

    let lambda = host.new_suspend_lambda(0, |host, _, continuation| {
        host.spawn_attached(move |host| {
            std::thread::sleep(Duration::from_millis(10));
            let _ = host.resume(continuation, Ok(ForeignValue::Int(7)));
        });
        Ok(())
    });
    let later = AsyncBridgedFn::<(), i32>::from_foreign(ctx, ForeignValue::Object(lambda), OPTIONS).unwrap();
    assert_eq!(later.call().await.unwrap(), 7);
}

#[tokio::test]
async fn test_adapter_resolves_once() {
    let (adapter, outcome) = ContinuationAdapter::new();
    adapter.resume_with_error(BridgeError::msg("first")).unwrap();
    assert!(matches!(
        adapter.resume_with_error(BridgeError::msg("second")),
        Err(BridgeError::ContinuationResolved)
    ));
    let resolved = outcome.await.unwrap();
    assert_eq!(resolved.unwrap_err().to_string(), "first");
}
