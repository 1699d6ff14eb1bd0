//! Async stream bridge
//!
//! A [`BridgedStream`] crosses as a `bridge/Stream` (or `ThrowingStream`)
//! proxy over a [`StreamDataSource`]. Foreign `collect(onElement,
//! onComplete)` pumps the native stream one pull at a time on the bridge
//! runtime. A foreign `lang/Flow` arrives as a native stream that starts
//! collecting on first poll and cancels the flow when dropped early.
//!
//! State machine: `Idle -> Collecting -> Finished | Errored | Cancelled`.

use std::any::{type_name, Any};
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{ready, Context, Poll};

use futures::stream::{self, BoxStream, Stream, StreamExt};
use tether_sdk::names;
use tether_sdk::{ForeignContext, ForeignValue};
use tokio::sync::{mpsc, Notify};

use crate::attach;
use crate::call::CallExt;
use crate::closure::{arg, closure_proxy, ClosureBox, ResultProducer};
use crate::convert::error::error_from_throwable;
use crate::convert::{expect_object, mismatch, to_object, Bridgeable};
use crate::error::{push_pending, BridgeError, BridgeResult};
use crate::global::{GlobalRef, Pinned};
use crate::options::ConversionOptions;
use crate::peer::{peer_of, wrap_peer, PeerObject};
use crate::runtime;

const COLLECT_SIG: &str = "(Llang/Function1;Llang/Function1;)V";

// ============================================================================
// BridgedStream
// ============================================================================

/// An asynchronous sequence that can cross the boundary
pub struct BridgedStream<T> {
    inner: BoxStream<'static, BridgeResult<T>>,
    throwing: bool,
}

impl<T: Send + 'static> BridgedStream<T> {
    /// Non-throwing stream over `stream`
    pub fn new<S>(stream: S) -> Self
    where
        S: Stream<Item = T> + Send + 'static,
    {
        Self {
            inner: stream.map(Ok).boxed(),
            throwing: false,
        }
    }

    /// Stream whose elements may fail
    pub fn throwing<S>(stream: S) -> Self
    where
        S: Stream<Item = BridgeResult<T>> + Send + 'static,
    {
        Self {
            inner: stream.boxed(),
            throwing: true,
        }
    }

    /// Stream over the items of an iterator
    pub fn from_iter<I>(items: I) -> Self
    where
        I: IntoIterator<Item = T>,
        I::IntoIter: Send + 'static,
    {
        Self::new(stream::iter(items))
    }

    /// A stream that ends immediately
    pub fn empty() -> Self {
        Self::new(stream::empty())
    }
}

impl<T> BridgedStream<T> {
    /// Whether elements may fail
    pub fn is_throwing(&self) -> bool {
        self.throwing
    }
}

impl<T> Stream for BridgedStream<T> {
    type Item = BridgeResult<T>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.poll_next_unpin(cx)
    }
}

impl<T> std::fmt::Debug for BridgedStream<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgedStream")
            .field("item", &type_name::<T>())
            .field("throwing", &self.throwing)
            .finish()
    }
}

impl<T> Bridgeable for BridgedStream<T>
where
    T: Bridgeable + Send + 'static,
{
    fn from_foreign(
        ctx: &dyn ForeignContext,
        value: ForeignValue,
        options: ConversionOptions,
    ) -> BridgeResult<Self> {
        let obj = expect_object(value, names::FLOW)?;
        if let Some(peer) = peer_of(ctx, obj)? {
            return match &*peer {
                PeerObject::Stream(source) => {
                    Ok(source.take::<T>(ctx, options)?.unwrap_or_else(Self::empty))
                }
                other => Err(BridgeError::conversion(names::FLOW, other.kind())),
            };
        }
        if !ctx.instance_of(obj, names::FLOW)? {
            return Err(mismatch(ctx, names::FLOW, obj));
        }
        let flow = Arc::new(GlobalRef::new(ctx, obj)?);
        Ok(Self {
            inner: ForeignFlowStream::<T>::new(flow, ctx.runtime(), options).boxed(),
            throwing: true,
        })
    }

    fn to_foreign(
        self,
        ctx: &dyn ForeignContext,
        options: ConversionOptions,
    ) -> BridgeResult<ForeignValue> {
        let class = if self.throwing {
            names::NATIVE_THROWING_STREAM
        } else {
            names::NATIVE_STREAM
        };
        let source = StreamDataSource::new(self, options);
        let proxy = wrap_peer(ctx, class, "(J)V", &[], Arc::new(PeerObject::Stream(source)))?;
        Ok(ForeignValue::Object(proxy))
    }
}

// ============================================================================
// StreamDataSource
// ============================================================================

/// Lifecycle of a native stream exposed to the foreign side
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// Not collected yet
    Idle,
    /// A collector is pulling
    Collecting,
    /// Ran to completion, or handed back to a native consumer
    Finished,
    /// Ended with an error
    Errored,
    /// Stopped by `cancel()` or finalization
    Cancelled,
}

type ErasedStream = BoxStream<'static, BridgeResult<ResultProducer>>;
type EraseFn = fn(Box<dyn Any + Send>, ConversionOptions) -> Option<ErasedStream>;

/// Typed producer plus the function that erases it for pumping
struct Producer {
    stream: Box<dyn Any + Send>,
    erase: EraseFn,
}

fn erase<T: Bridgeable + Send + 'static>(
    stream: Box<dyn Any + Send>,
    options: ConversionOptions,
) -> Option<ErasedStream> {
    let stream = stream.downcast::<BridgedStream<T>>().ok()?;
    let erased = stream.map(move |item| {
        item.map(|value| {
            let produce: ResultProducer =
                Box::new(move |ctx: &dyn ForeignContext| to_object(value, ctx, options));
            produce
        })
    });
    Some(erased.boxed())
}

/// Native side of a `bridge/Stream` proxy
pub struct StreamDataSource {
    producer: tokio::sync::Mutex<Option<Producer>>,
    item_type: &'static str,
    throwing: bool,
    options: ConversionOptions,
    state: parking_lot::Mutex<StreamState>,
    cancelled: AtomicBool,
    wake: Notify,
}

/// How a pump ended
enum PumpEnd {
    Complete(Option<BridgeError>),
    Cancelled,
}

impl StreamDataSource {
    /// Source over `stream`, converting elements with `options`
    pub fn new<T: Bridgeable + Send + 'static>(
        stream: BridgedStream<T>,
        options: ConversionOptions,
    ) -> Self {
        let throwing = stream.throwing;
        Self {
            producer: tokio::sync::Mutex::new(Some(Producer {
                stream: Box::new(stream),
                erase: erase::<T>,
            })),
            item_type: type_name::<T>(),
            throwing,
            options,
            state: parking_lot::Mutex::new(StreamState::Idle),
            cancelled: AtomicBool::new(false),
            wake: Notify::new(),
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> StreamState {
        *self.state.lock()
    }

    fn transition(&self, next: StreamState) {
        let mut state = self.state.lock();
        if *state != next {
            tracing::debug!(item = self.item_type, from = ?*state, to = ?next, "stream state");
            *state = next;
        }
    }

    /// Hand the original producer back to a native consumer.
    ///
    /// Returns `None` once the stream was consumed. A producer of another
    /// element type is adapted by converting each element through its
    /// foreign form.
    pub fn take<T: Bridgeable + Send + 'static>(
        &self,
        ctx: &dyn ForeignContext,
        options: ConversionOptions,
    ) -> BridgeResult<Option<BridgedStream<T>>> {
        let Ok(mut slot) = self.producer.try_lock() else {
            return Err(BridgeError::msg("stream is being collected"));
        };
        let Some(producer) = slot.take() else {
            return Ok(None);
        };
        self.transition(StreamState::Finished);
        match producer.stream.downcast::<BridgedStream<T>>() {
            Ok(stream) => Ok(Some(*stream)),
            Err(stream) => {
                let erased = (producer.erase)(stream, self.options).ok_or_else(|| {
                    BridgeError::conversion(type_name::<T>(), self.item_type)
                })?;
                let runtime = ctx.runtime();
                let converted = erased.map(move |item| {
                    let produce = item?;
                    attach::scoped(&*runtime, |ctx| T::from_foreign(ctx, produce(ctx)?, options))
                });
                Ok(Some(BridgedStream {
                    inner: converted.boxed(),
                    throwing: self.throwing,
                }))
            }
        }
    }

    /// Stop pumping; the collector gets no completion call
    pub fn cancel(&self) {
        if self.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }
        self.wake.notify_one();
        if let Ok(mut slot) = self.producer.try_lock() {
            // Not collecting: drop the producer now
            slot.take();
        }
        let mut state = self.state.lock();
        if matches!(*state, StreamState::Idle | StreamState::Collecting) {
            tracing::debug!(item = self.item_type, from = ?*state, "stream cancelled");
            *state = StreamState::Cancelled;
        }
    }

    /// Whether `cancel` was called
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Text for the proxy's `toString()`
    pub fn describe(&self) -> String {
        format!("Stream<{}>", self.item_type)
    }

    /// Deliver every element to `on_element`
    async fn pump(&self, runtime: &Arc<dyn ForeignContext>, on_element: &GlobalRef) -> PumpEnd {
        let mut slot = self.producer.lock().await;
        if self.is_cancelled() {
            return PumpEnd::Cancelled;
        }
        let Some(mut stream) = slot
            .take()
            .and_then(|producer| (producer.erase)(producer.stream, self.options))
        else {
            // Already consumed: an empty sequence
            return PumpEnd::Complete(None);
        };
        self.transition(StreamState::Collecting);
        let sig = names::invoke_signature(1);
        loop {
            if self.is_cancelled() {
                return PumpEnd::Cancelled;
            }
            let next = tokio::select! {
                biased;
                _ = self.wake.notified() => continue,
                next = stream.next() => next,
            };
            let produce = match next {
                None => {
                    self.transition(StreamState::Finished);
                    return PumpEnd::Complete(None);
                }
                Some(Err(error)) => {
                    self.transition(StreamState::Errored);
                    return PumpEnd::Complete(Some(error));
                }
                Some(Ok(produce)) => produce,
            };
            let delivered = attach::scoped(&**runtime, |ctx| {
                let element = produce(ctx)?;
                ctx.call(on_element.obj(), "invoke", &sig, &[element])?;
                Ok(())
            });
            if let Err(error) = delivered {
                self.transition(StreamState::Errored);
                return PumpEnd::Complete(Some(error));
            }
        }
    }
}

/// `Stream.collect`: `args` is `[this, onElement, onComplete]`
pub(crate) fn collect_stream(
    ctx: &dyn ForeignContext,
    args: &[ForeignValue],
) -> BridgeResult<ForeignValue> {
    let this = expect_object(arg(args, 0)?, names::NATIVE_STREAM)?;
    let peer = peer_of(ctx, this)?
        .ok_or_else(|| BridgeError::UnexpectedNull(names::NATIVE_STREAM.to_string()))?;
    if !matches!(&*peer, PeerObject::Stream(_)) {
        return Err(BridgeError::conversion(names::NATIVE_STREAM, peer.kind()));
    }
    let on_element = GlobalRef::new(ctx, expect_object(arg(args, 1)?, "onElement")?)?;
    let on_complete = GlobalRef::new(ctx, expect_object(arg(args, 2)?, "onComplete")?)?;
    let runtime = ctx.runtime();

    runtime::spawn(async move {
        let PeerObject::Stream(source) = &*peer else {
            return;
        };
        let end = source.pump(&runtime, &on_element).await;
        let error = match end {
            PumpEnd::Cancelled => {
                tracing::debug!(item = source.item_type, "collection cancelled");
                return;
            }
            PumpEnd::Complete(error) => error,
        };
        let options = source.options;
        let completed = attach::scoped(&*runtime, |ctx| {
            let cause = match &error {
                Some(error) => error.clone().to_foreign(ctx, options)?,
                None => ForeignValue::Null,
            };
            ctx.call(on_complete.obj(), "invoke", &names::invoke_signature(1), &[cause])?;
            Ok(())
        });
        if let Err(e) = completed {
            tracing::error!(error = %e, "cannot deliver stream completion");
            push_pending(e);
        }
    });
    Ok(ForeignValue::Null)
}

/// `Stream.cancel`: `args` is `[this]`
pub(crate) fn cancel_stream(
    ctx: &dyn ForeignContext,
    args: &[ForeignValue],
) -> BridgeResult<ForeignValue> {
    let this = expect_object(arg(args, 0)?, names::NATIVE_STREAM)?;
    if let Some(peer) = peer_of(ctx, this)? {
        if let PeerObject::Stream(source) = &*peer {
            source.cancel();
        }
    }
    Ok(ForeignValue::Null)
}

// ============================================================================
// Foreign flows
// ============================================================================

enum FlowEvent {
    Item(Pinned),
    Done(Option<BridgeError>),
    /// `collect` returned; nothing more will arrive
    Closed,
}

/// Native view of a foreign `lang/Flow`
struct ForeignFlowStream<T> {
    flow: Arc<GlobalRef>,
    runtime: Arc<dyn ForeignContext>,
    options: ConversionOptions,
    events: Option<mpsc::UnboundedReceiver<FlowEvent>>,
    finished: bool,
    item: PhantomData<fn() -> T>,
}

impl<T: Bridgeable> ForeignFlowStream<T> {
    fn new(flow: Arc<GlobalRef>, runtime: Arc<dyn ForeignContext>, options: ConversionOptions) -> Self {
        Self {
            flow,
            runtime,
            options,
            events: None,
            finished: false,
            item: PhantomData,
        }
    }

    /// Create the collector callbacks and run `collect` off the caller
    fn start(&self) -> BridgeResult<mpsc::UnboundedReceiver<FlowEvent>> {
        let (sender, receiver) = mpsc::unbounded_channel();
        let (on_element, on_complete) = attach::scoped(&*self.runtime, |ctx| {
            let items = sender.clone();
            let on_element = ClosureBox::raw(1, move |ctx, args| {
                let item = Pinned::new(ctx, arg(args, 0)?)?;
                // A dropped receiver means the consumer went away
                let _ = items.send(FlowEvent::Item(item));
                Ok(ForeignValue::Null)
            });
            let done = sender.clone();
            let on_complete = ClosureBox::raw(1, move |ctx, args| {
                let error = match arg(args, 0)? {
                    ForeignValue::Object(throwable) => Some(error_from_throwable(ctx, throwable)),
                    _ => None,
                };
                let _ = done.send(FlowEvent::Done(error));
                Ok(ForeignValue::Null)
            });
            let on_element = GlobalRef::new(ctx, closure_proxy(ctx, on_element)?)?;
            let on_complete = GlobalRef::new(ctx, closure_proxy(ctx, on_complete)?)?;
            Ok((on_element, on_complete))
        })?;

        let flow = self.flow.clone();
        let runtime = self.runtime.clone();
        runtime::spawn_blocking(move || {
            let collected = attach::scoped(&*runtime, |ctx| {
                ctx.call(
                    flow.obj(),
                    "collect",
                    COLLECT_SIG,
                    &[
                        ForeignValue::Object(on_element.obj()),
                        ForeignValue::Object(on_complete.obj()),
                    ],
                )
            });
            if let Err(error) = collected {
                let _ = sender.send(FlowEvent::Done(Some(error)));
            }
            let _ = sender.send(FlowEvent::Closed);
        });
        tracing::debug!("foreign flow collection started");
        Ok(receiver)
    }
}

impl<T: Bridgeable> Stream for ForeignFlowStream<T> {
    type Item = BridgeResult<T>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;
        if this.finished {
            return Poll::Ready(None);
        }
        if this.events.is_none() {
            match this.start() {
                Ok(events) => this.events = Some(events),
                Err(error) => {
                    this.finished = true;
                    return Poll::Ready(Some(Err(error)));
                }
            }
        }
        let Some(events) = this.events.as_mut() else {
            return Poll::Ready(None);
        };
        match ready!(events.poll_recv(cx)) {
            Some(FlowEvent::Item(item)) => {
                let options = this.options;
                let value = attach::scoped(&*this.runtime, |ctx| {
                    T::from_foreign(ctx, item.value(), options)
                });
                Poll::Ready(Some(value))
            }
            Some(FlowEvent::Done(Some(error))) => {
                this.finished = true;
                Poll::Ready(Some(Err(error)))
            }
            Some(FlowEvent::Done(None)) | Some(FlowEvent::Closed) | None => {
                this.finished = true;
                Poll::Ready(None)
            }
        }
    }
}

impl<T> Drop for ForeignFlowStream<T> {
    fn drop(&mut self) {
        if self.finished || self.events.is_none() {
            return;
        }
        let cancelled = attach::scoped(&*self.runtime, |ctx| {
            ctx.call(self.flow.obj(), "cancel", "()V", &[])
        });
        match cancelled {
            Ok(_) => tracing::debug!("foreign flow cancelled"),
            Err(e) => tracing::warn!(error = %e, "cannot cancel foreign flow"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_native_stream_yields_items() {
        let stream = BridgedStream::from_iter(vec![1, 2, 3]);
        assert!(!stream.is_throwing());
        let items: Vec<i32> = stream.map(|item| item.unwrap()).collect().await;
        assert_eq!(items, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_throwing_stream_surfaces_error() {
        let stream = BridgedStream::<i32>::throwing(stream::iter(vec![
            Ok(1),
            Err(BridgeError::msg("boom")),
        ]));
        let items: Vec<BridgeResult<i32>> = stream.collect().await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[1].as_ref().unwrap_err().to_string(), "boom");
    }

    #[test]
    fn test_cancel_idle_source() {
        let source = StreamDataSource::new(BridgedStream::from_iter(vec![1]), ConversionOptions::NONE);
        assert_eq!(source.state(), StreamState::Idle);
        source.cancel();
        assert_eq!(source.state(), StreamState::Cancelled);
        assert!(source.is_cancelled());
        assert_eq!(source.describe(), "Stream<i32>");
    }
}
