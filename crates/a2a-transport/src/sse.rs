//! Server-Sent Events adapter.
//!
//! [`SseAdapter::stream`] subscribes to an [`EventSource`] with a window of
//! one item, writes each item as an SSE frame and checks the sink after every
//! flush. A failed write is how a client disconnect shows up: the adapter then
//! cancels the subscription, fires the request's cancel hook and closes the
//! sink without reporting an error. Upstream errors run the same cleanup and
//! are returned to the caller.

use std::io;
use std::sync::Arc;

use a2a_protocol::{A2AError, RequestContext};
use bytes::Bytes;
use futures_util::future::BoxFuture;
use futures_util::{FutureExt, StreamExt};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error, info, warn};

use crate::source::{EventSource, Signal, Subscription};

// ─────────────────────────────────────────────────────────────────────────────
// Frames
// ─────────────────────────────────────────────────────────────────────────────

/// One SSE frame: a payload and its per-connection id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
    pub id: u64,
    pub data: String,
}

impl SseFrame {
    pub fn new(id: u64, data: impl Into<String>) -> Self {
        Self {
            id,
            data: data.into(),
        }
    }

    /// Wire encoding, terminated by a blank line.
    pub fn encode(&self) -> String {
        let mut out = String::with_capacity(self.data.len() + 24);
        for line in self.data.split('\n') {
            out.push_str("data: ");
            out.push_str(line);
            out.push('\n');
        }
        out.push_str("id: ");
        out.push_str(&self.id.to_string());
        out.push_str("\n\n");
        out
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Sink
// ─────────────────────────────────────────────────────────────────────────────

/// Byte writer for SSE output.
///
/// Writes never raise. A broken connection is only visible through
/// [`check_error`](SseSink::check_error), which must be consulted after
/// every flush.
pub trait SseSink: Send {
    fn write(&mut self, chunk: Bytes) -> BoxFuture<'_, ()>;

    fn flush(&mut self) -> BoxFuture<'_, ()>;

    /// `true` once any write has been lost.
    fn check_error(&self) -> bool;

    fn close(&mut self);

    /// Close the sink so the peer can tell the stream ended abnormally.
    fn abort(&mut self, _error: &A2AError) {
        self.close();
    }
}

/// Sink backed by a bounded channel that feeds an HTTP response body.
///
/// A write fails once the body receiver is gone, which happens when the
/// server drops the response because the client disconnected.
pub struct ChannelSink {
    tx: Option<mpsc::Sender<io::Result<Bytes>>>,
    abort: Option<oneshot::Sender<io::Error>>,
    failed: bool,
}

/// Body half of a [`ChannelSink`].
pub type SseBodyStream = futures_util::stream::BoxStream<'static, io::Result<Bytes>>;

impl ChannelSink {
    /// Create a sink and the byte stream it feeds.
    ///
    /// `buffer` bounds how many encoded frames may wait for the connection.
    /// After [`abort`](SseSink::abort) the stream yields one error once the
    /// buffered frames are drained.
    pub fn channel(buffer: usize) -> (Self, SseBodyStream) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        let (abort_tx, abort_rx) = oneshot::channel::<io::Error>();
        let aborted = futures_util::stream::once(abort_rx)
            .filter_map(|outcome| async move { outcome.ok().map(Err::<Bytes, io::Error>) });
        let body: SseBodyStream = ReceiverStream::new(rx).chain(aborted).boxed();
        (
            Self {
                tx: Some(tx),
                abort: Some(abort_tx),
                failed: false,
            },
            body,
        )
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_none()
    }
}

impl SseSink for ChannelSink {
    fn write(&mut self, chunk: Bytes) -> BoxFuture<'_, ()> {
        async move {
            let Some(tx) = &self.tx else {
                self.failed = true;
                return;
            };
            if tx.send(Ok(chunk)).await.is_err() {
                self.failed = true;
            }
        }
        .boxed()
    }

    fn flush(&mut self) -> BoxFuture<'_, ()> {
        // Every chunk is handed to the connection as its own body frame.
        futures_util::future::ready(()).boxed()
    }

    fn check_error(&self) -> bool {
        self.failed
    }

    fn close(&mut self) {
        self.tx = None;
        self.abort = None;
    }

    fn abort(&mut self, error: &A2AError) {
        if let Some(abort) = self.abort.take() {
            let _ = abort.send(io::Error::other(error.to_string()));
        }
        self.tx = None;
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Adapter
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("upstream event source failed: {0}")]
    Upstream(A2AError),
    #[error("failed to serialize event: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StreamError {
    /// Protocol-level view of the failure.
    pub fn to_a2a_error(&self) -> A2AError {
        match self {
            Self::Upstream(error) => error.clone(),
            Self::Serialization(error) => A2AError::internal(error.to_string()),
        }
    }
}

/// How a stream ended when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamOutcome {
    /// The source completed; every item was written.
    Completed { frames: u64 },
    /// A write failed. `frames` counts writes attempted, including the lost one.
    Disconnected { frames: u64 },
}

impl StreamOutcome {
    pub fn frames(&self) -> u64 {
        match self {
            Self::Completed { frames } | Self::Disconnected { frames } => *frames,
        }
    }
}

type SubscribedHook = Arc<dyn Fn() + Send + Sync>;

/// Streams event sources to SSE sinks.
#[derive(Clone, Default)]
pub struct SseAdapter {
    subscribed_hook: Option<SubscribedHook>,
}

impl SseAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Callback fired each time a subscription becomes active.
    pub fn with_subscribed_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.subscribed_hook = Some(Arc::new(hook));
        self
    }

    /// Deliver `source` to `sink` until the stream terminates.
    ///
    /// Resolves only after completion, disconnect or failure, with cleanup
    /// already done. Dropping the future mid-stream cancels the subscription
    /// and fires the cancel hook.
    pub async fn stream<T>(
        &self,
        source: Box<dyn EventSource<T>>,
        sink: &mut dyn SseSink,
        ctx: &RequestContext,
    ) -> Result<StreamOutcome, StreamError>
    where
        T: Serialize + Send + 'static,
    {
        let request_id = ctx.request_id();
        let mut active = Teardown {
            subscription: Some(source.subscribe()),
            ctx,
        };
        debug!(%request_id, "SSE subscription active");

        active.request(1);
        if let Some(hook) = &self.subscribed_hook {
            hook();
        }

        let mut next_id: u64 = 0;
        loop {
            match active.signal().await {
                Signal::Next(item) => {
                    let data = match serde_json::to_string(&item) {
                        Ok(data) => data,
                        Err(e) => {
                            error!(%request_id, frame = next_id, "Failed to serialize SSE event: {e}");
                            let err = StreamError::from(e);
                            active.teardown();
                            sink.abort(&err.to_a2a_error());
                            return Err(err);
                        }
                    };

                    let frame = SseFrame::new(next_id, data);
                    next_id += 1;
                    sink.write(Bytes::from(frame.encode())).await;
                    sink.flush().await;

                    if sink.check_error() {
                        info!(%request_id, frames = next_id, "SSE client disconnected");
                        active.teardown();
                        sink.close();
                        return Ok(StreamOutcome::Disconnected { frames: next_id });
                    }
                    debug!(%request_id, frame = frame.id, "SSE frame written");
                    active.request(1);
                }
                Signal::Error(upstream) => {
                    warn!(%request_id, frames = next_id, "SSE upstream error: {upstream}");
                    active.teardown();
                    sink.abort(&upstream);
                    return Err(StreamError::Upstream(upstream));
                }
                Signal::Complete => {
                    active.finish();
                    sink.close();
                    debug!(%request_id, frames = next_id, "SSE stream complete");
                    return Ok(StreamOutcome::Completed { frames: next_id });
                }
            }
        }
    }
}

/// Owns the subscription for the duration of a stream.
///
/// Unless the stream finishes normally the subscription is cancelled and the
/// cancel hook fired, also when the owning future is dropped.
struct Teardown<'a, T> {
    subscription: Option<Box<dyn Subscription<T>>>,
    ctx: &'a RequestContext,
}

impl<T> Teardown<'_, T> {
    fn request(&mut self, n: usize) {
        if let Some(subscription) = self.subscription.as_mut() {
            subscription.request(n);
        }
    }

    async fn signal(&mut self) -> Signal<T> {
        match self.subscription.as_mut() {
            Some(subscription) => subscription.signal().await,
            None => Signal::Complete,
        }
    }

    fn teardown(&mut self) {
        if let Some(mut subscription) = self.subscription.take() {
            subscription.cancel();
            if self.ctx.invoke_cancel_hook() {
                debug!(request_id = %self.ctx.request_id(), "Cancel hook invoked");
            }
        }
    }

    fn finish(&mut self) {
        self.subscription = None;
    }
}

impl<T> Drop for Teardown<'_, T> {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// Encode a single error frame with id 0.
///
/// Used when a streaming operation fails before any event source exists.
pub fn error_frame<E: Serialize>(payload: &E) -> Bytes {
    let data = serde_json::to_string(payload)
        .unwrap_or_else(|e| serde_json::json!({ "error": e.to_string() }).to_string());
    Bytes::from(SseFrame::new(0, data).encode())
}

