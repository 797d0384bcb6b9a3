//! Demand-driven event sources.
//!
//! A handler answers a streaming operation with an [`EventSource`]. The
//! consumer subscribes once, then pulls items by granting demand with
//! [`Subscription::request`]; the producer may not hand over more items than
//! were requested. Cancellation is idempotent and releases the producer.

use std::sync::Arc;

use a2a_protocol::A2AError;
use futures_util::future::BoxFuture;
use futures_util::{FutureExt, Stream, StreamExt};
use tokio::sync::{mpsc, Semaphore};
use tracing::debug;

/// One delivery from an event source.
#[derive(Debug, Clone, PartialEq)]
pub enum Signal<T> {
    Next(T),
    Error(A2AError),
    Complete,
}

/// A live subscription to an event source.
pub trait Subscription<T>: Send {
    /// Grant the producer `n` more items.
    fn request(&mut self, n: usize);

    /// Stop delivery and release the producer. Calling it again is a no-op.
    fn cancel(&mut self);

    /// Wait for the next delivery.
    ///
    /// After a terminal signal or a cancel, keeps answering [`Signal::Complete`].
    fn signal(&mut self) -> BoxFuture<'_, Signal<T>>;
}

/// Producer of a request's response events. Consumed by subscribing.
pub trait EventSource<T>: Send {
    fn subscribe(self: Box<Self>) -> Box<dyn Subscription<T>>;
}

pub type BoxEventSource<T> = Box<dyn EventSource<T>>;

// ─────────────────────────────────────────────────────────────────────────────
// Channel-backed source
// ─────────────────────────────────────────────────────────────────────────────

/// Returned by the emitter once the subscriber has gone away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("event subscriber cancelled")]
pub struct Cancelled;

/// Create a connected producer/consumer pair.
///
/// The emitter blocks before each item until the subscriber has granted
/// demand, so nothing is buffered beyond what was requested.
pub fn event_channel<T: Send + 'static>() -> (EventEmitter<T>, ChannelSource<T>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let demand = Arc::new(Semaphore::new(0));
    (
        EventEmitter {
            tx,
            demand: demand.clone(),
        },
        ChannelSource { rx, demand },
    )
}

/// Producer half of [`event_channel`].
pub struct EventEmitter<T> {
    tx: mpsc::UnboundedSender<Signal<T>>,
    demand: Arc<Semaphore>,
}

/// Capacity for exactly one item, obtained from [`EventEmitter::reserve`].
pub struct Reservation<'a, T> {
    tx: &'a mpsc::UnboundedSender<Signal<T>>,
}

impl<T> Reservation<'_, T> {
    pub fn send(self, item: T) -> Result<(), Cancelled> {
        self.tx.send(Signal::Next(item)).map_err(|_| Cancelled)
    }
}

impl<T: Send> EventEmitter<T> {
    /// Wait until the subscriber asks for one more item.
    pub async fn reserve(&self) -> Result<Reservation<'_, T>, Cancelled> {
        let permit = tokio::select! {
            permit = self.demand.acquire() => permit.map_err(|_| Cancelled)?,
            _ = self.tx.closed() => return Err(Cancelled),
        };
        permit.forget();
        Ok(Reservation { tx: &self.tx })
    }

    /// Deliver one item, waiting for demand first.
    pub async fn emit(&self, item: T) -> Result<(), Cancelled> {
        self.reserve().await?.send(item)
    }

    /// Signal successful end of the sequence.
    pub fn complete(self) {
        let _ = self.tx.send(Signal::Complete);
    }

    /// Signal a terminal upstream failure.
    pub fn fail(self, error: A2AError) {
        let _ = self.tx.send(Signal::Error(error));
    }

    /// Resolves once the subscriber cancelled or was dropped.
    pub async fn cancelled(&self) {
        self.tx.closed().await
    }

    pub fn is_cancelled(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Consumer half of [`event_channel`].
pub struct ChannelSource<T> {
    rx: mpsc::UnboundedReceiver<Signal<T>>,
    demand: Arc<Semaphore>,
}

impl<T: Send + 'static> EventSource<T> for ChannelSource<T> {
    fn subscribe(self: Box<Self>) -> Box<dyn Subscription<T>> {
        let ChannelSource { rx, demand } = *self;
        Box::new(ChannelSubscription {
            rx,
            demand,
            done: false,
        })
    }
}

struct ChannelSubscription<T> {
    rx: mpsc::UnboundedReceiver<Signal<T>>,
    demand: Arc<Semaphore>,
    done: bool,
}

impl<T> ChannelSubscription<T> {
    fn shut(&mut self) {
        if !self.done {
            self.done = true;
            self.demand.close();
            self.rx.close();
        }
    }
}

impl<T: Send> Subscription<T> for ChannelSubscription<T> {
    fn request(&mut self, n: usize) {
        if !self.done {
            // Demand saturates at the semaphore's ceiling, which counts as unbounded.
            let room = Semaphore::MAX_PERMITS - self.demand.available_permits();
            self.demand.add_permits(n.min(room));
        }
    }

    fn cancel(&mut self) {
        self.shut();
    }

    fn signal(&mut self) -> BoxFuture<'_, Signal<T>> {
        async move {
            if self.done {
                return Signal::Complete;
            }
            let signal = match self.rx.recv().await {
                Some(signal) => signal,
                None => Signal::Error(A2AError::internal(
                    "event source dropped without completing",
                )),
            };
            if !matches!(signal, Signal::Next(_)) {
                self.shut();
            }
            signal
        }
        .boxed()
    }
}

impl<T> Drop for ChannelSubscription<T> {
    fn drop(&mut self) {
        self.shut();
    }
}

/// Drive a stream as an event source.
///
/// A task pulls the stream only after the subscriber granted demand; an
/// `Err` item fails the source, the end of the stream completes it.
pub fn from_stream<T, S>(stream: S) -> ChannelSource<T>
where
    T: Send + 'static,
    S: Stream<Item = Result<T, A2AError>> + Send + 'static,
{
    let (emitter, source) = event_channel();
    tokio::spawn(async move {
        let mut stream = std::pin::pin!(stream);
        loop {
            let Ok(slot) = emitter.reserve().await else {
                debug!("stream pump stopped: subscriber cancelled");
                return;
            };
            match stream.next().await {
                Some(Ok(item)) => {
                    if slot.send(item).is_err() {
                        return;
                    }
                }
                Some(Err(error)) => return emitter.fail(error),
                None => return emitter.complete(),
            }
        }
    });
    source
}

// ─────────────────────────────────────────────────────────────────────────────
// Combinators
// ─────────────────────────────────────────────────────────────────────────────

pub trait EventSourceExt<T> {
    /// Re-shape every item; demand and cancellation pass straight through.
    fn map<U, F>(self, f: F) -> BoxEventSource<U>
    where
        U: Send + 'static,
        F: FnMut(T) -> U + Send + 'static;
}

impl<T: Send + 'static> EventSourceExt<T> for BoxEventSource<T> {
    fn map<U, F>(self, f: F) -> BoxEventSource<U>
    where
        U: Send + 'static,
        F: FnMut(T) -> U + Send + 'static,
    {
        Box::new(MapSource { inner: self, f })
    }
}

struct MapSource<T, F> {
    inner: BoxEventSource<T>,
    f: F,
}

impl<T, U, F> EventSource<U> for MapSource<T, F>
where
    T: Send + 'static,
    U: Send + 'static,
    F: FnMut(T) -> U + Send + 'static,
{
    fn subscribe(self: Box<Self>) -> Box<dyn Subscription<U>> {
        let MapSource { inner, f } = *self;
        Box::new(MapSubscription {
            inner: inner.subscribe(),
            f,
        })
    }
}

struct MapSubscription<T, F> {
    inner: Box<dyn Subscription<T>>,
    f: F,
}

impl<T, U, F> Subscription<U> for MapSubscription<T, F>
where
    T: Send + 'static,
    U: Send + 'static,
    F: FnMut(T) -> U + Send + 'static,
{
    fn request(&mut self, n: usize) {
        self.inner.request(n);
    }

    fn cancel(&mut self) {
        self.inner.cancel();
    }

    fn signal(&mut self) -> BoxFuture<'_, Signal<U>> {
        async move {
            match self.inner.signal().await {
                Signal::Next(item) => Signal::Next((self.f)(item)),
                Signal::Error(error) => Signal::Error(error),
                Signal::Complete => Signal::Complete,
            }
        }
        .boxed()
    }
}
