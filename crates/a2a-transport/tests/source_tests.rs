//! Event source tests: demand accounting, cancellation and producer loss.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use a2a_protocol::{A2AError, A2AErrorCode};
use a2a_transport::source::{
    event_channel, from_stream, BoxEventSource, Cancelled, EventSource, EventSourceExt, Signal,
};
use futures_util::StreamExt;
use serde_json::{json, Value};
use tokio::time::timeout;

const SHORT: Duration = Duration::from_millis(50);

#[tokio::test]
async fn emitter_waits_for_demand() {
    let (emitter, source) = event_channel::<u32>();
    let mut subscription = Box::new(source).subscribe();

    assert!(timeout(SHORT, emitter.emit(1)).await.is_err(), "emitted without demand");

    subscription.request(1);
    timeout(SHORT, emitter.emit(1)).await.unwrap().unwrap();
    assert_eq!(subscription.signal().await, Signal::Next(1));

    assert!(timeout(SHORT, emitter.emit(2)).await.is_err(), "credit was reused");
}

#[tokio::test]
async fn demand_accumulates() {
    let (emitter, source) = event_channel::<u32>();
    let mut subscription = Box::new(source).subscribe();
    subscription.request(3);

    for n in 0..3 {
        emitter.emit(n).await.unwrap();
    }
    emitter.complete();

    for n in 0..3 {
        assert_eq!(subscription.signal().await, Signal::Next(n));
    }
    assert_eq!(subscription.signal().await, Signal::Complete);
    assert_eq!(subscription.signal().await, Signal::Complete);
}

#[tokio::test]
async fn unbounded_request_saturates_demand() {
    let (emitter, source) = event_channel::<u32>();
    let mut subscription = Box::new(source).subscribe();
    subscription.request(usize::MAX);
    subscription.request(usize::MAX);

    for n in 0..100 {
        emitter.emit(n).await.unwrap();
    }
    emitter.complete();

    for n in 0..100 {
        assert_eq!(subscription.signal().await, Signal::Next(n));
    }
    assert_eq!(subscription.signal().await, Signal::Complete);
}

#[tokio::test]
async fn cancel_wakes_waiting_producer() {
    let (emitter, source) = event_channel::<u32>();
    let mut subscription = Box::new(source).subscribe();

    let producer = tokio::spawn(async move {
        let result = emitter.emit(7).await;
        (result, emitter.is_cancelled())
    });
    tokio::time::sleep(SHORT).await;

    subscription.cancel();
    subscription.cancel();

    let (result, cancelled) = timeout(Duration::from_secs(1), producer)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(result, Err(Cancelled));
    assert!(cancelled);
    assert_eq!(subscription.signal().await, Signal::Complete);
}

#[tokio::test]
async fn dropping_subscription_releases_producer() {
    let (emitter, source) = event_channel::<u32>();
    let subscription = Box::new(source).subscribe();
    drop(subscription);

    timeout(Duration::from_secs(1), emitter.cancelled())
        .await
        .unwrap();
    assert_eq!(emitter.emit(1).await, Err(Cancelled));
}

#[tokio::test]
async fn producer_dropped_without_terminal_is_an_error() {
    let (emitter, source) = event_channel::<u32>();
    let mut subscription = Box::new(source).subscribe();
    drop(emitter);

    match subscription.signal().await {
        Signal::Error(e) => assert_eq!(e.error_code(), A2AErrorCode::InternalError),
        other => panic!("expected error, got {other:?}"),
    }
    assert_eq!(subscription.signal().await, Signal::Complete);
}

#[tokio::test]
async fn fail_delivers_error_signal() {
    let (emitter, source) = event_channel::<u32>();
    let mut subscription = Box::new(source).subscribe();
    emitter.fail(A2AError::task_not_found("t-1"));

    assert_eq!(
        subscription.signal().await,
        Signal::Error(A2AError::task_not_found("t-1"))
    );
}

#[tokio::test]
async fn from_stream_pulls_only_on_demand() {
    let pulled = Arc::new(AtomicUsize::new(0));
    let counter = pulled.clone();
    let stream = futures_util::stream::iter(0..5u32)
        .inspect(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .map(Ok::<_, A2AError>);

    let mut subscription = Box::new(from_stream(stream)).subscribe();
    tokio::time::sleep(SHORT).await;
    assert_eq!(pulled.load(Ordering::SeqCst), 0);

    subscription.request(2);
    assert_eq!(subscription.signal().await, Signal::Next(0));
    assert_eq!(subscription.signal().await, Signal::Next(1));
    tokio::time::sleep(SHORT).await;
    assert_eq!(pulled.load(Ordering::SeqCst), 2);

    subscription.request(10);
    for n in 2..5 {
        assert_eq!(subscription.signal().await, Signal::Next(n));
    }
    assert_eq!(subscription.signal().await, Signal::Complete);
}

#[tokio::test]
async fn from_stream_error_item_fails_source() {
    let stream = futures_util::stream::iter([
        Ok(json!("ok")),
        Err(A2AError::internal("broken")),
        Ok(json!("never")),
    ]);
    let mut subscription = Box::new(from_stream(stream)).subscribe();
    subscription.request(3);

    assert_eq!(subscription.signal().await, Signal::Next(json!("ok")));
    assert!(matches!(subscription.signal().await, Signal::Error(_)));
    assert_eq!(subscription.signal().await, Signal::Complete);
}

#[tokio::test]
async fn map_reshapes_items_and_forwards_cancel() {
    let (emitter, source) = event_channel::<u32>();
    let source: BoxEventSource<u32> = Box::new(source);
    let mut subscription = source.map(|n| json!({ "value": n })).subscribe();

    subscription.request(1);
    emitter.emit(4).await.unwrap();
    assert_eq!(
        subscription.signal().await,
        Signal::Next::<Value>(json!({"value": 4}))
    );

    subscription.cancel();
    timeout(Duration::from_secs(1), emitter.cancelled())
        .await
        .unwrap();
}
