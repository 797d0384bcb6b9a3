//! HTTP transport server using Axum.
//!
//! Serves the A2A JSON-RPC binding on `POST /` and the REST binding under
//! `/v1`. Single-reply operations answer with one JSON body; streaming
//! operations answer `text/event-stream` through the [`SseAdapter`], driven
//! by a task spawned on the configured executor.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use a2a_protocol::{
    is_known_method, is_streaming_method, A2AError, HandlerResult, JsonRpcRequest,
    JsonRpcResponse, Methods, RequestContext, RequestId,
};
use axum::{
    Router,
    body::Body,
    extract::{Path, Query, Request, State},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use serde::Serialize;
use serde_json::{json, Map, Value};
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tower_http::cors::CorsLayer;
use tracing::{debug, info, warn};

use crate::context_builder::CallContextBuilder;
use crate::handler::{RequestHandler, StreamResult};
use crate::source::{BoxEventSource, EventSourceExt};
use crate::sse::{self, ChannelSink, SseAdapter};

/// Largest request body accepted, in bytes.
const MAX_BODY_BYTES: usize = 4 * 1024 * 1024;

const EVENT_STREAM: &str = "text/event-stream";

/// Transport server configuration.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Port to listen on (0 for OS-assigned)
    pub port: u16,
    /// Hostname to bind to
    pub hostname: String,
    /// Enable permissive CORS
    pub enable_cors: bool,
    /// Maximum concurrent SSE streams
    pub max_streams: Option<usize>,
    /// Encoded frames buffered per stream ahead of the connection
    pub stream_buffer: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            port: 7070,
            hostname: "127.0.0.1".into(),
            enable_cors: false,
            max_streams: Some(64),
            stream_buffer: 1,
        }
    }
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid listen address: {0}")]
    Address(#[from] std::net::AddrParseError),
    #[error("failed to bind listener: {0}")]
    Io(#[from] std::io::Error),
}

/// Shared state for the transport server.
struct AppState {
    handler: Arc<dyn RequestHandler>,
    builder: Arc<dyn CallContextBuilder>,
    executor: Handle,
    adapter: SseAdapter,
    config: TransportConfig,
    /// Open SSE streams (for the limit and the health check)
    active_streams: Arc<AtomicUsize>,
}

/// The transport server: binds the listener and serves until stopped.
pub struct TransportServer {
    /// Shutdown signal
    shutdown_tx: Option<mpsc::Sender<()>>,
    /// Server task handle
    handle: Option<tokio::task::JoinHandle<()>>,
    /// Actual bound port
    port: u16,
}

impl TransportServer {
    /// Start serving `handler`. Streams are driven on `executor`.
    pub async fn start(
        config: TransportConfig,
        handler: Arc<dyn RequestHandler>,
        builder: Arc<dyn CallContextBuilder>,
        executor: Handle,
    ) -> Result<Self, TransportError> {
        Self::start_with_adapter(config, handler, builder, executor, SseAdapter::new()).await
    }

    /// Like [`start`](Self::start), with a preconfigured SSE adapter.
    pub async fn start_with_adapter(
        config: TransportConfig,
        handler: Arc<dyn RequestHandler>,
        builder: Arc<dyn CallContextBuilder>,
        executor: Handle,
        adapter: SseAdapter,
    ) -> Result<Self, TransportError> {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);

        let state = Arc::new(AppState {
            handler,
            builder,
            executor: executor.clone(),
            adapter,
            config: config.clone(),
            active_streams: Arc::new(AtomicUsize::new(0)),
        });

        let mut app = router(state);
        if config.enable_cors {
            app = app.layer(CorsLayer::permissive());
        }

        let addr: SocketAddr = format!("{}:{}", config.hostname, config.port).parse()?;
        let listener = tokio::net::TcpListener::bind(addr).await?;
        let actual_port = listener.local_addr()?.port();

        info!("A2A transport listening on http://{}:{}", config.hostname, actual_port);

        let handle = executor.spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.recv().await;
                })
                .await
                .ok();
        });

        Ok(Self {
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
            port: actual_port,
        })
    }

    /// Get the actual bound port.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Gracefully stop the server.
    pub async fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(()).await;
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
        info!("A2A transport server stopped");
    }
}

fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", post(jsonrpc_handler))
        .route("/.well-known/agent-card.json", get(agent_card_handler))
        .route("/health", get(health_handler))
        .route("/v1/message:send", post(rest_send_message))
        .route("/v1/message:stream", post(rest_stream_message))
        .route("/v1/card", get(rest_extended_card))
        .route("/v1/extendedAgentCard", get(rest_extended_card))
        .route("/v1/tasks", get(rest_list_tasks))
        .route(
            "/v1/tasks/{task_id}",
            get(rest_get_task).post(rest_task_action),
        )
        .route(
            "/v1/tasks/{task_id}/pushNotificationConfigs",
            get(rest_list_push_configs).post(rest_set_push_config),
        )
        .route(
            "/v1/tasks/{task_id}/pushNotificationConfigs/{config_id}",
            get(rest_get_push_config).delete(rest_delete_push_config),
        )
        .with_state(state)
}

// ─────────────────────────────────────────────────────────────────────────────
// Streaming
// ─────────────────────────────────────────────────────────────────────────────

/// Held for the lifetime of one SSE stream.
struct StreamSlot {
    active: Arc<AtomicUsize>,
}

impl StreamSlot {
    fn acquire(state: &AppState) -> Option<Self> {
        let active = state.active_streams.clone();
        let previous = active.fetch_add(1, Ordering::AcqRel);
        if let Some(max) = state.config.max_streams {
            if previous >= max {
                active.fetch_sub(1, Ordering::AcqRel);
                warn!("Stream rejected: max streams reached ({max})");
                return None;
            }
        }
        Some(Self { active })
    }
}

impl Drop for StreamSlot {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Hand `source` to the SSE adapter and answer with the body it feeds.
///
/// The adapter runs on its own task and owns `ctx` until the stream ends.
fn sse_response<T>(
    state: &AppState,
    source: BoxEventSource<T>,
    ctx: RequestContext,
    slot: StreamSlot,
) -> Response
where
    T: Serialize + Send + 'static,
{
    let (mut sink, body) = ChannelSink::channel(state.config.stream_buffer);
    let adapter = state.adapter.clone();

    state.executor.spawn(async move {
        let _slot = slot;
        let request_id = ctx.request_id();
        match adapter.stream(source, &mut sink, &ctx).await {
            Ok(outcome) => debug!(%request_id, ?outcome, "SSE stream finished"),
            Err(e) => warn!(%request_id, "SSE stream failed: {e}"),
        }
    });

    event_stream(Body::from_stream(body))
}

fn event_stream(body: Body) -> Response {
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, HeaderValue::from_static(EVENT_STREAM)),
            (header::CACHE_CONTROL, HeaderValue::from_static("no-cache")),
        ],
        body,
    )
        .into_response()
}

fn service_unavailable() -> Response {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(A2AError::internal("Too many concurrent streams")),
    )
        .into_response()
}

// ─────────────────────────────────────────────────────────────────────────────
// JSON-RPC binding
// ─────────────────────────────────────────────────────────────────────────────

async fn jsonrpc_handler(State(state): State<Arc<AppState>>, request: Request) -> Response {
    let (parts, body) = request.into_parts();

    let bytes = match axum::body::to_bytes(body, MAX_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(e) => return jsonrpc_reply(None, Err(A2AError::parse_error(e.to_string()))),
    };
    let parsed: Value = match serde_json::from_slice(&bytes) {
        Ok(v) => v,
        Err(_) => return jsonrpc_reply(None, Err(A2AError::parse_error("Failed to parse JSON"))),
    };

    let id: Option<RequestId> = parsed
        .get("id")
        .cloned()
        .and_then(|v| serde_json::from_value(v).ok());
    let request = match serde_json::from_value::<JsonRpcRequest>(parsed) {
        Ok(r) if r.is_valid() => r,
        _ => {
            return jsonrpc_reply(
                id,
                Err(A2AError::invalid_request("Invalid JSON-RPC 2.0 request")),
            );
        }
    };

    let method = request.method.as_str();
    if !is_known_method(method) {
        return jsonrpc_reply(id, Err(A2AError::method_not_found(method)));
    }

    let ctx = state.builder.build(&parts);
    let params = request.params.clone().unwrap_or_else(|| Value::Object(Map::new()));
    debug!(request_id = %ctx.request_id(), method, "JSON-RPC request");

    if !is_streaming_method(method) {
        let result = dispatch(state.handler.as_ref(), method, params, &ctx).await;
        return jsonrpc_reply(id, result);
    }

    let Some(slot) = StreamSlot::acquire(&state) else {
        return service_unavailable();
    };
    match open_stream(state.handler.as_ref(), method, params, &ctx).await {
        Ok(source) => {
            let frame_id = id.clone();
            let source = source.map(move |item| JsonRpcResponse::success(frame_id.clone(), item));
            sse_response(&state, source, ctx, slot)
        }
        Err(error) => {
            warn!(request_id = %ctx.request_id(), method, "Streaming request failed: {error}");
            let frame = sse::error_frame(&JsonRpcResponse::error(id, error));
            event_stream(Body::from(frame))
        }
    }
}

fn jsonrpc_reply(id: Option<RequestId>, result: HandlerResult) -> Response {
    Json(JsonRpcResponse::from_result(id, result)).into_response()
}

/// Route a single-reply method to its handler operation.
async fn dispatch(
    handler: &dyn RequestHandler,
    method: &str,
    params: Value,
    ctx: &RequestContext,
) -> HandlerResult {
    match method {
        Methods::MESSAGE_SEND => handler.on_message_send(params, ctx).await,
        Methods::TASKS_GET => handler.on_get_task(params, ctx).await,
        Methods::TASKS_CANCEL => handler.on_cancel_task(params, ctx).await,
        Methods::TASKS_LIST => handler.on_list_tasks(params, ctx).await,
        Methods::PUSH_CONFIG_SET => handler.on_set_push_notification_config(params, ctx).await,
        Methods::PUSH_CONFIG_GET => handler.on_get_push_notification_config(params, ctx).await,
        Methods::PUSH_CONFIG_LIST => handler.on_list_push_notification_configs(params, ctx).await,
        Methods::PUSH_CONFIG_DELETE => {
            handler.on_delete_push_notification_config(params, ctx).await
        }
        Methods::AGENT_EXTENDED_CARD => handler
            .get_extended_agent_card(ctx)
            .await
            .map(|card| card.into_value()),
        other => Err(A2AError::method_not_found(other)),
    }
}

/// Route a streaming method to its handler operation.
async fn open_stream(
    handler: &dyn RequestHandler,
    method: &str,
    params: Value,
    ctx: &RequestContext,
) -> StreamResult {
    match method {
        Methods::MESSAGE_STREAM => handler.on_message_send_stream(params, ctx).await,
        Methods::TASKS_RESUBSCRIBE => handler.on_resubscribe_to_task(params, ctx).await,
        other => Err(A2AError::method_not_found(other)),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Agent card / health
// ─────────────────────────────────────────────────────────────────────────────

async fn agent_card_handler(State(state): State<Arc<AppState>>, request: Request) -> Response {
    let (parts, _) = request.into_parts();
    let ctx = state.builder.build(&parts);
    match state.handler.get_agent_card(&ctx).await {
        Ok(card) => Json(card).into_response(),
        Err(e) => rest_error(e),
    }
}

async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "activeStreams": state.active_streams.load(Ordering::Relaxed),
    }))
}

// ─────────────────────────────────────────────────────────────────────────────
// REST binding
// ─────────────────────────────────────────────────────────────────────────────

fn rest_error(error: A2AError) -> Response {
    let status =
        StatusCode::from_u16(error.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(error)).into_response()
}

fn rest_reply(result: HandlerResult) -> Response {
    match result {
        Ok(value) => Json(value).into_response(),
        Err(e) => rest_error(e),
    }
}

/// Request body as JSON; an empty body reads as an empty object.
async fn json_body(body: Body) -> Result<Value, A2AError> {
    let bytes = axum::body::to_bytes(body, MAX_BODY_BYTES)
        .await
        .map_err(|e| A2AError::parse_error(e.to_string()))?;
    if bytes.is_empty() {
        return Ok(Value::Object(Map::new()));
    }
    serde_json::from_slice(&bytes).map_err(|e| A2AError::parse_error(e.to_string()))
}

/// Query parameters merged into `params`, unparsed.
fn with_query(parts: &axum::http::request::Parts, mut params: Map<String, Value>) -> Value {
    if let Ok(Query(query)) = Query::<BTreeMap<String, String>>::try_from_uri(&parts.uri) {
        for (key, value) in query {
            params.entry(key).or_insert(Value::String(value));
        }
    }
    Value::Object(params)
}

fn id_params(key: &str, id: String) -> Map<String, Value> {
    let mut params = Map::new();
    params.insert(key.to_string(), Value::String(id));
    params
}

/// Serve a REST streaming operation: raw events as frames, or an HTTP error.
async fn rest_stream(
    state: &AppState,
    method: &str,
    params: Value,
    ctx: RequestContext,
) -> Response {
    let Some(slot) = StreamSlot::acquire(state) else {
        return service_unavailable();
    };
    match open_stream(state.handler.as_ref(), method, params, &ctx).await {
        Ok(source) => sse_response(state, source, ctx, slot),
        Err(e) => {
            warn!(request_id = %ctx.request_id(), "Streaming request failed: {e}");
            rest_error(e)
        }
    }
}

async fn rest_send_message(State(state): State<Arc<AppState>>, request: Request) -> Response {
    let (parts, body) = request.into_parts();
    let ctx = state.builder.build(&parts);
    let params = match json_body(body).await {
        Ok(p) => p,
        Err(e) => return rest_error(e),
    };
    rest_reply(state.handler.on_message_send(params, &ctx).await)
}

async fn rest_stream_message(State(state): State<Arc<AppState>>, request: Request) -> Response {
    let (parts, body) = request.into_parts();
    let ctx = state.builder.build(&parts);
    let params = match json_body(body).await {
        Ok(p) => p,
        Err(e) => return rest_error(e),
    };
    rest_stream(&state, Methods::MESSAGE_STREAM, params, ctx).await
}

async fn rest_extended_card(State(state): State<Arc<AppState>>, request: Request) -> Response {
    let (parts, _) = request.into_parts();
    let ctx = state.builder.build(&parts);
    match state.handler.get_extended_agent_card(&ctx).await {
        Ok(card) => Json(card).into_response(),
        Err(e) => rest_error(e),
    }
}

async fn rest_list_tasks(State(state): State<Arc<AppState>>, request: Request) -> Response {
    let (parts, _) = request.into_parts();
    let ctx = state.builder.build(&parts);
    let params = with_query(&parts, Map::new());
    rest_reply(state.handler.on_list_tasks(params, &ctx).await)
}

async fn rest_get_task(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<String>,
    request: Request,
) -> Response {
    let (parts, _) = request.into_parts();
    let ctx = state.builder.build(&parts);
    let params = with_query(&parts, id_params("id", task_id));
    rest_reply(state.handler.on_get_task(params, &ctx).await)
}

/// `POST /v1/tasks/{id}:cancel` and `POST /v1/tasks/{id}:subscribe`.
async fn rest_task_action(
    State(state): State<Arc<AppState>>,
    Path(task_action): Path<String>,
    request: Request,
) -> Response {
    let (parts, _) = request.into_parts();
    let ctx = state.builder.build(&parts);

    match task_action.rsplit_once(':') {
        Some((task_id, "cancel")) if !task_id.is_empty() => {
            let params = Value::Object(id_params("id", task_id.to_string()));
            rest_reply(state.handler.on_cancel_task(params, &ctx).await)
        }
        Some((task_id, "subscribe")) if !task_id.is_empty() => {
            let params = Value::Object(id_params("id", task_id.to_string()));
            rest_stream(&state, Methods::TASKS_RESUBSCRIBE, params, ctx).await
        }
        _ => rest_error(A2AError::method_not_found(&format!(
            "POST {}",
            parts.uri.path()
        ))),
    }
}

async fn rest_set_push_config(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<String>,
    request: Request,
) -> Response {
    let (parts, body) = request.into_parts();
    let ctx = state.builder.build(&parts);
    let config = match json_body(body).await {
        Ok(c) => c,
        Err(e) => return rest_error(e),
    };
    let mut params = id_params("taskId", task_id);
    params.insert("pushNotificationConfig".into(), config);
    rest_reply(
        state
            .handler
            .on_set_push_notification_config(Value::Object(params), &ctx)
            .await,
    )
}

async fn rest_list_push_configs(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<String>,
    request: Request,
) -> Response {
    let (parts, _) = request.into_parts();
    let ctx = state.builder.build(&parts);
    let params = with_query(&parts, id_params("id", task_id));
    rest_reply(state.handler.on_list_push_notification_configs(params, &ctx).await)
}

async fn rest_get_push_config(
    State(state): State<Arc<AppState>>,
    Path((task_id, config_id)): Path<(String, String)>,
    request: Request,
) -> Response {
    let (parts, _) = request.into_parts();
    let ctx = state.builder.build(&parts);
    let mut params = id_params("id", task_id);
    params.insert("pushNotificationConfigId".into(), Value::String(config_id));
    rest_reply(
        state
            .handler
            .on_get_push_notification_config(Value::Object(params), &ctx)
            .await,
    )
}

async fn rest_delete_push_config(
    State(state): State<Arc<AppState>>,
    Path((task_id, config_id)): Path<(String, String)>,
    request: Request,
) -> Response {
    let (parts, _) = request.into_parts();
    let ctx = state.builder.build(&parts);
    let mut params = id_params("id", task_id);
    params.insert("pushNotificationConfigId".into(), Value::String(config_id));
    rest_reply(
        state
            .handler
            .on_delete_push_notification_config(Value::Object(params), &ctx)
            .await,
    )
}
