//! Integration tests for streams crossing the boundary

mod common;

use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use parking_lot::Mutex;
use tether_bridge::{AnyValue, Bridgeable, BridgeError, BridgedStream, ConversionOptions};
use tether_host::{ForeignValue, Host, ObjRef};
use tether_sdk::{names, ForeignContext};

use common::{host, int_of, obj};

const OPTIONS: ConversionOptions = ConversionOptions::NONE;
const WAIT: Duration = Duration::from_secs(5);
const COLLECT_SIG: &str = "(Llang/Function1;Llang/Function1;)V";

/// What a foreign collector saw
struct Collected {
    items: Arc<Mutex<Vec<i32>>>,
    done: mpsc::Receiver<Option<String>>,
}

/// Collect `flow` from the foreign side, recording ints and the completion
fn collect_foreign(host: &Host, flow: ObjRef) -> Collected {
    let items = Arc::new(Mutex::new(Vec::new()));
    let sink = items.clone();
    let on_element = host.new_lambda(1, move |host, args| {
        if let Some(v) = int_of(host, args[0]) {
            sink.lock().push(v);
        }
        Ok(ForeignValue::Null)
    });
    let (tx, done) = mpsc::channel();
    let tx = Mutex::new(tx);
    let on_complete = host.new_lambda(1, move |host, args| {
        let failure = args[0].as_object().and_then(|t| host.exception_message(t));
        let _ = tx.lock().send(failure);
        Ok(ForeignValue::Null)
    });
    host.invoke(
        flow,
        "collect",
        COLLECT_SIG,
        &[ForeignValue::Object(on_element), ForeignValue::Object(on_complete)],
    )
    .unwrap();
    Collected { items, done }
}

#[test]
fn test_foreign_collects_native_stream_then_empty() {
    let host = host();
    let ctx: &dyn ForeignContext = &host;

    let stream = BridgedStream::from_iter(vec![1, 2, 3]);
    let flow = obj(stream.to_foreign(ctx, OPTIONS).unwrap());
    assert!(host.instance_of(flow, names::FLOW));
    let _pin = tether_bridge::GlobalRef::new(ctx, flow).unwrap();

    let first = collect_foreign(&host, flow);
    assert_eq!(first.done.recv_timeout(WAIT).unwrap(), None);
    assert_eq!(*first.items.lock(), vec![1, 2, 3]);

    // The producer is spent: a second collection completes empty
    let second = collect_foreign(&host, flow);
    assert_eq!(second.done.recv_timeout(WAIT).unwrap(), None);
    assert!(second.items.lock().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_rebridged_stream_short_circuits() {
    let host = host();
    let ctx: &dyn ForeignContext = &host;

    let flow = BridgedStream::from_iter(vec![1, 2, 3]).to_foreign(ctx, OPTIONS).unwrap();

    let original = BridgedStream::<i32>::from_foreign(ctx, flow, OPTIONS).unwrap();
    let items: Vec<i32> = original.map(|item| item.unwrap()).collect().await;
    assert_eq!(items, vec![1, 2, 3]);

    let again = BridgedStream::<i32>::from_foreign(ctx, flow, OPTIONS).unwrap();
    assert_eq!(again.count().await, 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_rebridged_stream_of_other_type_converts() {
    let host = host();
    let ctx: &dyn ForeignContext = &host;

    let words = BridgedStream::from_iter(vec!["a".to_string(), "b".to_string()]);
    let flow = words.to_foreign(ctx, OPTIONS).unwrap();
    let erased = BridgedStream::<AnyValue>::from_foreign(ctx, flow, OPTIONS).unwrap();
    let items: Vec<AnyValue> = erased.map(|item| item.unwrap()).collect().await;
    assert_eq!(items, vec![AnyValue::from("a"), AnyValue::from("b")]);
}

#[test]
fn test_native_stream_error_reaches_completion() {
    let host = host();
    let ctx: &dyn ForeignContext = &host;

    let stream = BridgedStream::throwing(futures::stream::iter(vec![
        Ok(1),
        Ok(2),
        Err(BridgeError::msg("boom")),
        Ok(3),
    ]));
    let flow = obj(stream.to_foreign(ctx, OPTIONS).unwrap());
    assert!(host.instance_of(flow, names::NATIVE_THROWING_STREAM));

    let collected = collect_foreign(&host, flow);
    assert_eq!(collected.done.recv_timeout(WAIT).unwrap().as_deref(), Some("boom"));
    assert_eq!(*collected.items.lock(), vec![1, 2]);
}

#[test]
fn test_cancel_before_collect_skips_completion() {
    let host = host();
    let ctx: &dyn ForeignContext = &host;

    let flow = obj(BridgedStream::from_iter(vec![1, 2, 3]).to_foreign(ctx, OPTIONS).unwrap());
    host.invoke(flow, "cancel", "()V", &[]).unwrap();

    let collected = collect_foreign(&host, flow);
    assert!(collected.done.recv_timeout(Duration::from_millis(200)).is_err());
    assert!(collected.items.lock().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_native_collects_foreign_flow() {
    let host = host();
    let ctx: &dyn ForeignContext = &host;

    let flow = host.new_flow_of(
        vec![ForeignValue::Int(1), ForeignValue::Int(2), ForeignValue::Int(3)],
        None,
    );
    let stream = BridgedStream::<i32>::from_foreign(ctx, ForeignValue::Object(flow), OPTIONS).unwrap();
    let items: Vec<i32> = stream.map(|item| item.unwrap()).collect().await;
    assert_eq!(items, vec![1, 2, 3]);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_foreign_flow_failure_ends_stream() {
    let host = host();
    let ctx: &dyn ForeignContext = &host;

    let failure = host.new_exception(names::EXCEPTION, "boom");
    let flow = host.new_flow_of(vec![ForeignValue::Int(1)], Some(failure));
    let mut stream =
        BridgedStream::<i32>::from_foreign(ctx, ForeignValue::Object(flow), OPTIONS).unwrap();

    assert_eq!(stream.next().await.unwrap().unwrap(), 1);
    let err = stream.next().await.unwrap().unwrap_err();
    assert!(err.to_string().contains("boom"));
    assert!(stream.next().await.is_none());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_dropping_native_stream_cancels_flow() {
    let host = host();
    let ctx: &dyn ForeignContext = &host;

    let flow = host.new_flow(|_, index| Ok((index < 1000).then(|| ForeignValue::Int(index as i32))));
    let _pin = tether_bridge::GlobalRef::new(ctx, flow).unwrap();
    let mut stream =
        BridgedStream::<i32>::from_foreign(ctx, ForeignValue::Object(flow), OPTIONS).unwrap();

    assert_eq!(stream.next().await.unwrap().unwrap(), 0);
    drop(stream);
    assert!(host.flow_cancelled(flow));
}
