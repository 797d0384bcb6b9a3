//! Echo agent: the request handler the binary serves out of the box.
//!
//! `message/send` answers with an agent message repeating the caller's text.
//! `message/stream` runs the same exchange as a task: a `working` status, the
//! echoed text as artifact chunks, then a final `completed` status. Streamed
//! tasks are kept in memory so they can be fetched, listed and resubscribed.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use a2a_protocol::{A2AError, AgentCard, HandlerResult, RequestContext};
use a2a_transport::{event_channel, from_stream, EventEmitter, EventStream, RequestHandler, StreamResult};
use chrono::Utc;
use futures_util::future::{self, BoxFuture};
use futures_util::{stream, FutureExt};
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::sync::oneshot;
use tracing::{debug, info};
use uuid::Uuid;

/// Build the card advertised for the echo agent.
pub fn agent_card(name: &str, url: &str) -> AgentCard {
    AgentCard::new(json!({
        "name": name,
        "description": "Repeats every message it receives",
        "url": url,
        "version": env!("CARGO_PKG_VERSION"),
        "protocolVersion": "0.3.0",
        "preferredTransport": "JSONRPC",
        "capabilities": {
            "streaming": true,
            "pushNotifications": false,
        },
        "defaultInputModes": ["text/plain"],
        "defaultOutputModes": ["text/plain"],
        "skills": [{
            "id": "echo",
            "name": "Echo",
            "description": "Echoes the text parts of a message",
            "tags": ["echo"],
        }],
    }))
}

/// In-memory echo agent.
#[derive(Clone)]
pub struct EchoAgent {
    card: AgentCard,
    tasks: Arc<Mutex<HashMap<String, Value>>>,
    step_delay: Duration,
    cancelled_streams: Arc<AtomicUsize>,
}

impl EchoAgent {
    pub fn new(card: AgentCard) -> Self {
        Self {
            card,
            tasks: Arc::new(Mutex::new(HashMap::new())),
            step_delay: Duration::ZERO,
            cancelled_streams: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Pause between streamed events.
    pub fn with_step_delay(mut self, delay: Duration) -> Self {
        self.step_delay = delay;
        self
    }

    /// Number of streams whose subscriber went away before completion.
    pub fn cancelled_streams(&self) -> usize {
        self.cancelled_streams.load(Ordering::Acquire)
    }

    fn task(&self, params: &Value) -> Result<Value, A2AError> {
        let id = task_id(params)?;
        self.tasks
            .lock()
            .get(id)
            .cloned()
            .ok_or_else(|| A2AError::task_not_found(id))
    }
}

fn task_id(params: &Value) -> Result<&str, A2AError> {
    params
        .get("id")
        .and_then(Value::as_str)
        .ok_or_else(|| A2AError::invalid_params("Missing task id"))
}

/// Concatenated text parts of the `message` parameter.
fn message_text(params: &Value) -> Result<String, A2AError> {
    let parts = params
        .pointer("/message/parts")
        .and_then(Value::as_array)
        .ok_or_else(|| A2AError::invalid_params("Missing message parts"))?;
    Ok(parts
        .iter()
        .filter_map(|part| part.get("text").and_then(Value::as_str))
        .collect::<Vec<_>>()
        .join(""))
}

fn context_id(params: &Value) -> String {
    params
        .pointer("/message/contextId")
        .and_then(Value::as_str)
        .map(String::from)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

fn text_parts(text: &str) -> Value {
    json!([{ "kind": "text", "text": text }])
}

fn status_update(task_id: &str, context_id: &str, state: &str, is_final: bool) -> Value {
    json!({
        "kind": "status-update",
        "taskId": task_id,
        "contextId": context_id,
        "status": {
            "state": state,
            "timestamp": Utc::now().to_rfc3339(),
        },
        "final": is_final,
    })
}

impl RequestHandler for EchoAgent {
    fn get_agent_card<'a>(
        &'a self,
        _ctx: &'a RequestContext,
    ) -> BoxFuture<'a, Result<AgentCard, A2AError>> {
        future::ready(Ok(self.card.clone())).boxed()
    }

    fn on_message_send<'a>(
        &'a self,
        params: Value,
        ctx: &'a RequestContext,
    ) -> BoxFuture<'a, HandlerResult> {
        async move {
            let text = message_text(&params)?;
            debug!(request_id = %ctx.request_id(), len = text.len(), "Echoing message");
            Ok(json!({
                "kind": "message",
                "role": "agent",
                "messageId": Uuid::new_v4().to_string(),
                "contextId": context_id(&params),
                "parts": text_parts(&text),
            }))
        }
        .boxed()
    }

    fn on_message_send_stream<'a>(
        &'a self,
        params: Value,
        ctx: &'a RequestContext,
    ) -> BoxFuture<'a, StreamResult> {
        async move {
            let text = message_text(&params)?;
            let task_id = Uuid::new_v4().to_string();
            let context_id = context_id(&params);

            let (emitter, source) = event_channel();
            let (stop_tx, stop_rx) = oneshot::channel();
            let cancelled = self.cancelled_streams.clone();
            ctx.set_cancel_hook(move || {
                cancelled.fetch_add(1, Ordering::AcqRel);
                let _ = stop_tx.send(());
            })
            .map_err(|e| A2AError::internal(e.to_string()))?;

            info!(request_id = %ctx.request_id(), %task_id, "Starting echo task");
            let run = EchoRun {
                tasks: self.tasks.clone(),
                task_id,
                context_id,
                text,
                step_delay: self.step_delay,
            };
            tokio::spawn(async move {
                let finished = tokio::select! {
                    _ = run.drive(&emitter) => true,
                    Ok(()) = stop_rx => false,
                };
                if finished {
                    emitter.complete();
                } else {
                    debug!("Echo task stopped by subscriber");
                }
            });

            Ok(Box::new(source) as EventStream)
        }
        .boxed()
    }

    fn on_get_task<'a>(
        &'a self,
        params: Value,
        _ctx: &'a RequestContext,
    ) -> BoxFuture<'a, HandlerResult> {
        future::ready(self.task(&params)).boxed()
    }

    fn on_cancel_task<'a>(
        &'a self,
        params: Value,
        _ctx: &'a RequestContext,
    ) -> BoxFuture<'a, HandlerResult> {
        // Stored tasks are always completed, so none is cancelable.
        let result: HandlerResult = task_id(&params).and_then(|id| {
            if self.tasks.lock().contains_key(id) {
                Err(A2AError::task_not_cancelable(id))
            } else {
                Err(A2AError::task_not_found(id))
            }
        });
        future::ready(result).boxed()
    }

    fn on_list_tasks<'a>(
        &'a self,
        _params: Value,
        _ctx: &'a RequestContext,
    ) -> BoxFuture<'a, HandlerResult> {
        let mut tasks: Vec<Value> = self.tasks.lock().values().cloned().collect();
        tasks.sort_by(|a, b| a["id"].as_str().cmp(&b["id"].as_str()));
        future::ready(Ok(json!({ "tasks": tasks }))).boxed()
    }

    fn on_resubscribe_to_task<'a>(
        &'a self,
        params: Value,
        _ctx: &'a RequestContext,
    ) -> BoxFuture<'a, StreamResult> {
        let result = self.task(&params).map(|task| {
            let replay = stream::iter([Ok(task)]);
            Box::new(from_stream(replay)) as EventStream
        });
        future::ready(result).boxed()
    }
}

/// One streamed echo task.
struct EchoRun {
    tasks: Arc<Mutex<HashMap<String, Value>>>,
    task_id: String,
    context_id: String,
    text: String,
    step_delay: Duration,
}

impl EchoRun {
    /// Emit the task's events; the echoed text goes out one word per
    /// artifact chunk.
    async fn drive(self, emitter: &EventEmitter<Value>) {
        let artifact_id = Uuid::new_v4().to_string();
        let mut chunks: Vec<&str> = self.text.split_inclusive(' ').collect();
        if chunks.is_empty() {
            chunks.push("");
        }
        let last = chunks.len() - 1;

        let mut events = vec![status_update(&self.task_id, &self.context_id, "working", false)];
        events.extend(chunks.iter().enumerate().map(|(i, chunk)| {
            json!({
                "kind": "artifact-update",
                "taskId": self.task_id,
                "contextId": self.context_id,
                "artifact": {
                    "artifactId": artifact_id,
                    "name": "echo",
                    "parts": text_parts(chunk),
                },
                "append": i > 0,
                "lastChunk": i == last,
            })
        }));

        for (step, event) in events.into_iter().enumerate() {
            if step > 0 && !self.step_delay.is_zero() {
                tokio::time::sleep(self.step_delay).await;
            }
            if emitter.emit(event).await.is_err() {
                debug!(task_id = %self.task_id, "Echo subscriber gone");
                return;
            }
        }

        // Visible to tasks/get before the subscriber sees the final event.
        self.tasks.lock().insert(
            self.task_id.clone(),
            json!({
                "kind": "task",
                "id": self.task_id,
                "contextId": self.context_id,
                "status": { "state": "completed", "timestamp": Utc::now().to_rfc3339() },
                "artifacts": [{
                    "artifactId": artifact_id,
                    "name": "echo",
                    "parts": text_parts(&self.text),
                }],
            }),
        );

        if !self.step_delay.is_zero() {
            tokio::time::sleep(self.step_delay).await;
        }
        let completed = status_update(&self.task_id, &self.context_id, "completed", true);
        if emitter.emit(completed).await.is_err() {
            debug!(task_id = %self.task_id, "Echo subscriber gone");
        }
    }
}
