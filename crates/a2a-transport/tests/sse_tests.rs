//! SSE adapter tests: frame ids, backpressure window, disconnect and
//! upstream-error cleanup, driven by scripted sources and recording sinks.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use a2a_protocol::{A2AError, A2AErrorCode, RequestContext};
use a2a_transport::source::{event_channel, EventSource, Signal, Subscription};
use a2a_transport::sse::{error_frame, ChannelSink, SseAdapter, SseFrame, SseSink, StreamError, StreamOutcome};
use bytes::Bytes;
use futures_util::future::BoxFuture;
use futures_util::{FutureExt, StreamExt};
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::time::timeout;

// ─────────────────────────────────────────────────────────────────────────────
// Test doubles
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Default)]
struct Probe {
    outstanding: usize,
    max_outstanding: usize,
    delivered: usize,
    cancelled: bool,
}

/// Source replaying a fixed script, refusing to deliver without demand.
struct ScriptedSource<T> {
    script: VecDeque<Signal<T>>,
    probe: Arc<Mutex<Probe>>,
}

impl<T> ScriptedSource<T> {
    fn new(script: impl IntoIterator<Item = Signal<T>>) -> (Self, Arc<Mutex<Probe>>) {
        let probe = Arc::new(Mutex::new(Probe::default()));
        (
            Self {
                script: script.into_iter().collect(),
                probe: probe.clone(),
            },
            probe,
        )
    }
}

impl<T: Send + 'static> EventSource<T> for ScriptedSource<T> {
    fn subscribe(self: Box<Self>) -> Box<dyn Subscription<T>> {
        Box::new(ScriptedSubscription {
            script: self.script,
            probe: self.probe,
        })
    }
}

struct ScriptedSubscription<T> {
    script: VecDeque<Signal<T>>,
    probe: Arc<Mutex<Probe>>,
}

impl<T: Send> Subscription<T> for ScriptedSubscription<T> {
    fn request(&mut self, n: usize) {
        let mut probe = self.probe.lock();
        probe.outstanding += n;
        probe.max_outstanding = probe.max_outstanding.max(probe.outstanding);
    }

    fn cancel(&mut self) {
        self.probe.lock().cancelled = true;
    }

    fn signal(&mut self) -> BoxFuture<'_, Signal<T>> {
        let mut probe = self.probe.lock();
        let signal = if probe.cancelled {
            Signal::Complete
        } else {
            match self.script.pop_front() {
                Some(Signal::Next(item)) => {
                    assert!(probe.outstanding > 0, "item delivered without demand");
                    probe.outstanding -= 1;
                    probe.delivered += 1;
                    Signal::Next(item)
                }
                Some(terminal) => terminal,
                None => Signal::Complete,
            }
        };
        futures_util::future::ready(signal).boxed()
    }
}

#[derive(Default)]
struct Recorded {
    writes: Vec<String>,
    closed: bool,
    aborted: Option<A2AError>,
}

/// Sink recording every write attempt; fails from write number `fail_on` on.
struct RecordingSink {
    recorded: Arc<Mutex<Recorded>>,
    fail_on: Option<usize>,
    failed: bool,
}

impl RecordingSink {
    fn new() -> (Self, Arc<Mutex<Recorded>>) {
        Self::failing_on(None)
    }

    fn failing_on(fail_on: Option<usize>) -> (Self, Arc<Mutex<Recorded>>) {
        let recorded = Arc::new(Mutex::new(Recorded::default()));
        (
            Self {
                recorded: recorded.clone(),
                fail_on,
                failed: false,
            },
            recorded,
        )
    }
}

impl SseSink for RecordingSink {
    fn write(&mut self, chunk: Bytes) -> BoxFuture<'_, ()> {
        let mut recorded = self.recorded.lock();
        recorded
            .writes
            .push(String::from_utf8_lossy(&chunk).into_owned());
        if self.fail_on.is_some_and(|n| recorded.writes.len() >= n) {
            self.failed = true;
        }
        futures_util::future::ready(()).boxed()
    }

    fn flush(&mut self) -> BoxFuture<'_, ()> {
        futures_util::future::ready(()).boxed()
    }

    fn check_error(&self) -> bool {
        self.failed
    }

    fn close(&mut self) {
        self.recorded.lock().closed = true;
    }

    fn abort(&mut self, error: &A2AError) {
        let mut recorded = self.recorded.lock();
        recorded.aborted = Some(error.clone());
        recorded.closed = true;
    }
}

fn counting_context() -> (RequestContext, Arc<AtomicUsize>) {
    let ctx = RequestContext::builder().build();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    ctx.set_cancel_hook(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    })
    .unwrap();
    (ctx, calls)
}

fn frame_ids(writes: &[String]) -> Vec<u64> {
    writes
        .iter()
        .map(|w| {
            let line = w.lines().find(|l| l.starts_with("id: ")).unwrap();
            line["id: ".len()..].parse().unwrap()
        })
        .collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// Frames
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn frame_encoding() {
    assert_eq!(
        SseFrame::new(0, r#"{"a":1}"#).encode(),
        "data: {\"a\":1}\nid: 0\n\n"
    );
    assert_eq!(
        SseFrame::new(7, "one\ntwo").encode(),
        "data: one\ndata: two\nid: 7\n\n"
    );
}

struct QuotedFailure;

impl serde::Serialize for QuotedFailure {
    fn serialize<S: serde::Serializer>(&self, _: S) -> Result<S::Ok, S::Error> {
        Err(serde::ser::Error::custom(r#"bad "value" at C:\tmp"#))
    }
}

#[test]
fn error_frame_fallback_is_valid_json() {
    let frame = error_frame(&QuotedFailure);
    let text = std::str::from_utf8(&frame).unwrap();
    assert!(text.ends_with("\nid: 0\n\n"));

    let data = text.strip_prefix("data: ").unwrap().split('\n').next().unwrap();
    let parsed: Value = serde_json::from_str(data).unwrap();
    assert_eq!(parsed["error"], r#"bad "value" at C:\tmp"#);
}

#[test]
fn error_frame_encodes_payload() {
    let frame = error_frame(&json!({"jsonrpc": "2.0", "id": 4}));
    assert_eq!(&frame[..], b"data: {\"id\":4,\"jsonrpc\":\"2.0\"}\nid: 0\n\n");
}

// ─────────────────────────────────────────────────────────────────────────────
// Adapter
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn three_items_then_complete() {
    let (source, probe) = ScriptedSource::new([
        Signal::Next(json!({"n": 0})),
        Signal::Next(json!({"n": 1})),
        Signal::Next(json!({"n": 2})),
        Signal::Complete,
    ]);
    let (mut sink, recorded) = RecordingSink::new();
    let (ctx, hook_calls) = counting_context();

    let outcome = SseAdapter::new()
        .stream(Box::new(source), &mut sink, &ctx)
        .await
        .unwrap();

    assert_eq!(outcome, StreamOutcome::Completed { frames: 3 });
    let recorded = recorded.lock();
    assert_eq!(frame_ids(&recorded.writes), vec![0, 1, 2]);
    assert_eq!(recorded.writes[1], "data: {\"n\":1}\nid: 1\n\n");
    assert!(recorded.closed);
    assert!(recorded.aborted.is_none());
    assert_eq!(hook_calls.load(Ordering::SeqCst), 0);
    assert!(!probe.lock().cancelled);
}

#[tokio::test]
async fn sink_failure_on_second_write_cancels() {
    let (source, probe) = ScriptedSource::new([
        Signal::Next(json!("a")),
        Signal::Next(json!("b")),
        Signal::Next(json!("c")),
        Signal::Complete,
    ]);
    let (mut sink, recorded) = RecordingSink::failing_on(Some(2));
    let (ctx, hook_calls) = counting_context();

    let outcome = SseAdapter::new()
        .stream(Box::new(source), &mut sink, &ctx)
        .await
        .unwrap();

    assert_eq!(outcome, StreamOutcome::Disconnected { frames: 2 });
    assert_eq!(frame_ids(&recorded.lock().writes), vec![0, 1]);
    assert!(recorded.lock().closed);
    assert_eq!(hook_calls.load(Ordering::SeqCst), 1);

    let probe = probe.lock();
    assert!(probe.cancelled);
    assert_eq!(probe.delivered, 2);
    assert_eq!(probe.outstanding, 0);
}

#[tokio::test]
async fn never_more_than_one_outstanding_request() {
    let script: Vec<_> = (0..20)
        .map(|n| Signal::Next(json!(n)))
        .chain([Signal::Complete])
        .collect();
    let (source, probe) = ScriptedSource::new(script);
    let (mut sink, recorded) = RecordingSink::new();
    let ctx = RequestContext::builder().build();

    SseAdapter::new()
        .stream(Box::new(source), &mut sink, &ctx)
        .await
        .unwrap();

    assert_eq!(probe.lock().max_outstanding, 1);
    assert_eq!(frame_ids(&recorded.lock().writes), (0..20).collect::<Vec<u64>>());
}

#[tokio::test]
async fn upstream_error_runs_cleanup_and_returns_error() {
    let (source, probe) = ScriptedSource::new([
        Signal::Next(json!("first")),
        Signal::Error(A2AError::task_not_found("t-9")),
    ]);
    let (mut sink, recorded) = RecordingSink::new();
    let (ctx, hook_calls) = counting_context();

    let err = SseAdapter::new()
        .stream(Box::new(source), &mut sink, &ctx)
        .await
        .unwrap_err();

    match &err {
        StreamError::Upstream(e) => assert_eq!(e.error_code(), A2AErrorCode::TaskNotFound),
        other => panic!("expected upstream error, got {other:?}"),
    }
    let recorded = recorded.lock();
    assert_eq!(recorded.writes.len(), 1);
    assert_eq!(recorded.aborted.as_ref().map(|e| e.code), Some(-32001));
    assert_eq!(hook_calls.load(Ordering::SeqCst), 1);
    assert!(probe.lock().cancelled);
}

struct Unserializable;

impl serde::Serialize for Unserializable {
    fn serialize<S: serde::Serializer>(&self, _: S) -> Result<S::Ok, S::Error> {
        Err(serde::ser::Error::custom("cannot encode"))
    }
}

#[tokio::test]
async fn serialization_failure_is_terminal() {
    let (source, probe) = ScriptedSource::new([
        Signal::Next(Unserializable),
        Signal::Next(Unserializable),
        Signal::Complete,
    ]);
    let (mut sink, recorded) = RecordingSink::new();
    let (ctx, hook_calls) = counting_context();

    let err = SseAdapter::new()
        .stream(Box::new(source), &mut sink, &ctx)
        .await
        .unwrap_err();

    assert!(matches!(err, StreamError::Serialization(_)));
    assert!(recorded.lock().writes.is_empty());
    assert!(recorded.lock().aborted.is_some());
    assert_eq!(hook_calls.load(Ordering::SeqCst), 1);
    let probe = probe.lock();
    assert!(probe.cancelled);
    assert_eq!(probe.delivered, 1);
}

#[tokio::test]
async fn empty_stream_writes_nothing() {
    let (source, _probe) = ScriptedSource::<Value>::new([Signal::Complete]);
    let (mut sink, recorded) = RecordingSink::new();
    let (ctx, hook_calls) = counting_context();

    let outcome = SseAdapter::new()
        .stream(Box::new(source), &mut sink, &ctx)
        .await
        .unwrap();

    assert_eq!(outcome.frames(), 0);
    assert!(recorded.lock().writes.is_empty());
    assert!(recorded.lock().closed);
    assert_eq!(hook_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn subscribed_hook_fires_once_per_stream() {
    let fired = Arc::new(AtomicUsize::new(0));
    let counter = fired.clone();
    let adapter = SseAdapter::new().with_subscribed_hook(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    for _ in 0..2 {
        let (source, _) = ScriptedSource::new([Signal::Next(json!(1)), Signal::Complete]);
        let (mut sink, _) = RecordingSink::new();
        let ctx = RequestContext::builder().build();
        adapter.stream(Box::new(source), &mut sink, &ctx).await.unwrap();
    }

    assert_eq!(fired.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn items_produced_on_another_task_keep_order() {
    let (emitter, source) = event_channel();
    let producer = tokio::spawn(async move {
        for n in 0..10u32 {
            emitter.emit(json!({"seq": n})).await.unwrap();
        }
        emitter.complete();
    });

    let (mut sink, recorded) = RecordingSink::new();
    let ctx = RequestContext::builder().build();
    let outcome = SseAdapter::new()
        .stream(Box::new(source), &mut sink, &ctx)
        .await
        .unwrap();
    producer.await.unwrap();

    assert_eq!(outcome, StreamOutcome::Completed { frames: 10 });
    let recorded = recorded.lock();
    assert_eq!(frame_ids(&recorded.writes), (0..10).collect::<Vec<u64>>());
    for (n, write) in recorded.writes.iter().enumerate() {
        assert!(write.starts_with(&format!("data: {{\"seq\":{n}}}\n")));
    }
}

#[tokio::test]
async fn dropping_stream_future_cancels_subscription() {
    let (emitter, source) = event_channel::<Value>();
    let hook_calls = Arc::new(AtomicUsize::new(0));
    let ctx = Arc::new(RequestContext::builder().build());
    let counter = hook_calls.clone();
    ctx.set_cancel_hook(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    })
    .unwrap();

    let task = tokio::spawn({
        let ctx = ctx.clone();
        async move {
            let (mut sink, _) = RecordingSink::new();
            SseAdapter::new()
                .stream(Box::new(source), &mut sink, &ctx)
                .await
        }
    });

    emitter.emit(json!("only")).await.unwrap();
    task.abort();
    let _ = task.await;

    timeout(Duration::from_secs(2), emitter.cancelled())
        .await
        .expect("producer should observe cancellation");
    assert_eq!(hook_calls.load(Ordering::SeqCst), 1);
    assert!(ctx.is_cancelled());
}

// ─────────────────────────────────────────────────────────────────────────────
// Channel sink
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn channel_sink_detects_dropped_body() {
    let (emitter, source) = event_channel();
    tokio::spawn(async move {
        for n in 0..5 {
            if emitter.emit(json!(n)).await.is_err() {
                return;
            }
        }
        emitter.complete();
    });

    let (mut sink, body) = ChannelSink::channel(1);
    drop(body);
    let (ctx, hook_calls) = counting_context();

    let outcome = SseAdapter::new()
        .stream(Box::new(source), &mut sink, &ctx)
        .await
        .unwrap();

    assert_eq!(outcome, StreamOutcome::Disconnected { frames: 1 });
    assert!(sink.check_error());
    assert!(sink.is_closed());
    assert_eq!(hook_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn channel_sink_body_ends_with_error_after_abort() {
    let (emitter, source) = event_channel();
    tokio::spawn(async move {
        emitter.emit(json!("before")).await.unwrap();
        emitter.fail(A2AError::internal("agent crashed"));
    });

    let (mut sink, body) = ChannelSink::channel(4);
    let collector = tokio::spawn(async move { body.collect::<Vec<_>>().await });
    let ctx = RequestContext::builder().build();

    let result = SseAdapter::new()
        .stream(Box::new(source), &mut sink, &ctx)
        .await;
    assert!(matches!(result, Err(StreamError::Upstream(_))));
    drop(sink);

    let chunks = collector.await.unwrap();
    assert_eq!(chunks.len(), 2);
    assert_eq!(
        chunks[0].as_ref().unwrap(),
        &Bytes::from("data: \"before\"\nid: 0\n\n")
    );
    assert!(chunks[1].as_ref().unwrap_err().to_string().contains("agent crashed"));
}

#[tokio::test]
async fn channel_sink_body_ends_cleanly_on_complete() {
    let (emitter, source) = event_channel();
    tokio::spawn(async move {
        emitter.emit(json!(1)).await.unwrap();
        emitter.emit(json!(2)).await.unwrap();
        emitter.complete();
    });

    let (mut sink, body) = ChannelSink::channel(1);
    let collector = tokio::spawn(async move { body.collect::<Vec<_>>().await });
    let ctx = RequestContext::builder().build();

    SseAdapter::new()
        .stream(Box::new(source), &mut sink, &ctx)
        .await
        .unwrap();

    let chunks = collector.await.unwrap();
    assert_eq!(chunks.len(), 2);
    assert!(chunks.iter().all(Result::is_ok));
}
