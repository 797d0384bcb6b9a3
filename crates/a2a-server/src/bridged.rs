//! Argument-less handler and context builder backed by the dependency bridge.
//!
//! Both are constructed with `Default`, without access to startup state, and
//! look their dependencies up on every call. A call that arrives before the
//! bridge is published fails with an error naming the missing dependency.

use std::sync::Arc;

use a2a_protocol::{A2AError, AgentCard, HandlerResult, RequestContext};
use a2a_transport::http::request::Parts;
use a2a_transport::{CallContextBuilder, DefaultCallContextBuilder, RequestHandler, StreamResult};
use futures_util::future::{self, BoxFuture};
use futures_util::FutureExt;
use serde_json::Value;
use tokio::runtime::Handle;
use tracing::warn;

use crate::bridge::{BridgeError, Dependency, DependencyBridge};
use crate::wrapper::ContextSwitchingHandler;

type Resolved = ContextSwitchingHandler<Arc<dyn RequestHandler>>;

fn missing(error: BridgeError) -> A2AError {
    warn!("Bridged call failed: {error}");
    A2AError::internal(error.to_string())
}

/// Request handler that forwards to the bridge's handler, switching to the
/// bridge's loading context for each call.
pub struct BridgedRequestHandler {
    bridge: &'static DependencyBridge,
}

impl Default for BridgedRequestHandler {
    fn default() -> Self {
        Self {
            bridge: DependencyBridge::global(),
        }
    }
}

impl BridgedRequestHandler {
    /// Resolve against `bridge` instead of the global one.
    pub fn with_bridge(bridge: &'static DependencyBridge) -> Self {
        Self { bridge }
    }

    /// Runtime published by startup, for driving streams.
    pub fn executor(&self) -> Result<Handle, BridgeError> {
        self.bridge.executor()
    }

    fn resolve(&self) -> Result<Resolved, A2AError> {
        let state = self
            .bridge
            .read()
            .ok_or(BridgeError::MissingDependency(Dependency::RequestHandler))
            .map_err(missing)?;
        Ok(ContextSwitchingHandler::new(
            state.request_handler().clone(),
            state.loading_context().clone(),
        ))
    }
}

impl RequestHandler for BridgedRequestHandler {
    fn get_agent_card<'a>(
        &'a self,
        _ctx: &'a RequestContext,
    ) -> BoxFuture<'a, Result<AgentCard, A2AError>> {
        future::ready(self.bridge.agent_card().map_err(missing)).boxed()
    }

    fn get_extended_agent_card<'a>(
        &'a self,
        _ctx: &'a RequestContext,
    ) -> BoxFuture<'a, Result<AgentCard, A2AError>> {
        let card = match self.bridge.extended_agent_card() {
            Ok(Some(card)) => Ok(card),
            Ok(None) => Err(A2AError::extended_card_not_configured()),
            Err(e) => Err(missing(e)),
        };
        future::ready(card).boxed()
    }

    fn on_message_send<'a>(
        &'a self,
        params: Value,
        ctx: &'a RequestContext,
    ) -> BoxFuture<'a, HandlerResult> {
        let handler = self.resolve();
        async move {
            let handler = handler?;
            handler.on_message_send(params, ctx).await
        }
        .boxed()
    }

    fn on_message_send_stream<'a>(
        &'a self,
        params: Value,
        ctx: &'a RequestContext,
    ) -> BoxFuture<'a, StreamResult> {
        let handler = self.resolve();
        async move {
            let handler = handler?;
            handler.on_message_send_stream(params, ctx).await
        }
        .boxed()
    }

    fn on_get_task<'a>(
        &'a self,
        params: Value,
        ctx: &'a RequestContext,
    ) -> BoxFuture<'a, HandlerResult> {
        let handler = self.resolve();
        async move {
            let handler = handler?;
            handler.on_get_task(params, ctx).await
        }
        .boxed()
    }

    fn on_cancel_task<'a>(
        &'a self,
        params: Value,
        ctx: &'a RequestContext,
    ) -> BoxFuture<'a, HandlerResult> {
        let handler = self.resolve();
        async move {
            let handler = handler?;
            handler.on_cancel_task(params, ctx).await
        }
        .boxed()
    }

    fn on_list_tasks<'a>(
        &'a self,
        params: Value,
        ctx: &'a RequestContext,
    ) -> BoxFuture<'a, HandlerResult> {
        let handler = self.resolve();
        async move {
            let handler = handler?;
            handler.on_list_tasks(params, ctx).await
        }
        .boxed()
    }

    fn on_resubscribe_to_task<'a>(
        &'a self,
        params: Value,
        ctx: &'a RequestContext,
    ) -> BoxFuture<'a, StreamResult> {
        let handler = self.resolve();
        async move {
            let handler = handler?;
            handler.on_resubscribe_to_task(params, ctx).await
        }
        .boxed()
    }

    fn on_set_push_notification_config<'a>(
        &'a self,
        params: Value,
        ctx: &'a RequestContext,
    ) -> BoxFuture<'a, HandlerResult> {
        let handler = self.resolve();
        async move {
            let handler = handler?;
            handler.on_set_push_notification_config(params, ctx).await
        }
        .boxed()
    }

    fn on_get_push_notification_config<'a>(
        &'a self,
        params: Value,
        ctx: &'a RequestContext,
    ) -> BoxFuture<'a, HandlerResult> {
        let handler = self.resolve();
        async move {
            let handler = handler?;
            handler.on_get_push_notification_config(params, ctx).await
        }
        .boxed()
    }

    fn on_list_push_notification_configs<'a>(
        &'a self,
        params: Value,
        ctx: &'a RequestContext,
    ) -> BoxFuture<'a, HandlerResult> {
        let handler = self.resolve();
        async move {
            let handler = handler?;
            handler.on_list_push_notification_configs(params, ctx).await
        }
        .boxed()
    }

    fn on_delete_push_notification_config<'a>(
        &'a self,
        params: Value,
        ctx: &'a RequestContext,
    ) -> BoxFuture<'a, HandlerResult> {
        let handler = self.resolve();
        async move {
            let handler = handler?;
            handler.on_delete_push_notification_config(params, ctx).await
        }
        .boxed()
    }
}

/// Call-context builder that defers to the bridge's builder when one was
/// published, and to [`DefaultCallContextBuilder`] otherwise.
pub struct BridgedCallContextBuilder {
    bridge: &'static DependencyBridge,
}

impl Default for BridgedCallContextBuilder {
    fn default() -> Self {
        Self {
            bridge: DependencyBridge::global(),
        }
    }
}

impl BridgedCallContextBuilder {
    pub fn with_bridge(bridge: &'static DependencyBridge) -> Self {
        Self { bridge }
    }
}

impl CallContextBuilder for BridgedCallContextBuilder {
    fn build(&self, parts: &Parts) -> RequestContext {
        match self.bridge.context_builder() {
            Ok(Some(builder)) => builder.build(parts),
            _ => DefaultCallContextBuilder.build(parts),
        }
    }
}
