//! Protocol request-handler contract.
//!
//! The transport calls one operation per inbound request. Payloads stay raw
//! JSON: the handler owns their meaning. Streaming operations answer with an
//! [`EventSource`](crate::source::EventSource) that the SSE adapter delivers.

use std::sync::Arc;

use a2a_protocol::{A2AError, AgentCard, HandlerResult, RequestContext};
use futures_util::future::{self, BoxFuture};
use futures_util::FutureExt;
use serde_json::Value;

use crate::source::BoxEventSource;

/// Event source returned by streaming operations.
pub type EventStream = BoxEventSource<Value>;

pub type StreamResult = Result<EventStream, A2AError>;

/// Implemented by the agent side to serve A2A operations.
///
/// Every method receives the per-request [`RequestContext`]. Streaming
/// operations that hold per-subscriber resources should register a cancel
/// hook on the context before returning their source.
pub trait RequestHandler: Send + Sync + 'static {
    fn get_agent_card<'a>(&'a self, ctx: &'a RequestContext)
    -> BoxFuture<'a, Result<AgentCard, A2AError>>;

    fn get_extended_agent_card<'a>(
        &'a self,
        _ctx: &'a RequestContext,
    ) -> BoxFuture<'a, Result<AgentCard, A2AError>> {
        future::ready(Err(A2AError::extended_card_not_configured())).boxed()
    }

    fn on_message_send<'a>(
        &'a self,
        params: Value,
        ctx: &'a RequestContext,
    ) -> BoxFuture<'a, HandlerResult>;

    fn on_message_send_stream<'a>(
        &'a self,
        params: Value,
        ctx: &'a RequestContext,
    ) -> BoxFuture<'a, StreamResult>;

    fn on_get_task<'a>(&'a self, params: Value, ctx: &'a RequestContext)
    -> BoxFuture<'a, HandlerResult>;

    fn on_cancel_task<'a>(
        &'a self,
        params: Value,
        ctx: &'a RequestContext,
    ) -> BoxFuture<'a, HandlerResult>;

    fn on_list_tasks<'a>(
        &'a self,
        params: Value,
        ctx: &'a RequestContext,
    ) -> BoxFuture<'a, HandlerResult>;

    fn on_resubscribe_to_task<'a>(
        &'a self,
        params: Value,
        ctx: &'a RequestContext,
    ) -> BoxFuture<'a, StreamResult>;

    // ── Push notification configs ───────────────────────────────────────

    fn on_set_push_notification_config<'a>(
        &'a self,
        _params: Value,
        _ctx: &'a RequestContext,
    ) -> BoxFuture<'a, HandlerResult> {
        unsupported_push()
    }

    fn on_get_push_notification_config<'a>(
        &'a self,
        _params: Value,
        _ctx: &'a RequestContext,
    ) -> BoxFuture<'a, HandlerResult> {
        unsupported_push()
    }

    fn on_list_push_notification_configs<'a>(
        &'a self,
        _params: Value,
        _ctx: &'a RequestContext,
    ) -> BoxFuture<'a, HandlerResult> {
        unsupported_push()
    }

    fn on_delete_push_notification_config<'a>(
        &'a self,
        _params: Value,
        _ctx: &'a RequestContext,
    ) -> BoxFuture<'a, HandlerResult> {
        unsupported_push()
    }
}

fn unsupported_push<'a>() -> BoxFuture<'a, HandlerResult> {
    future::ready(Err(A2AError::push_notification_not_supported())).boxed()
}

impl<H: RequestHandler + ?Sized> RequestHandler for Arc<H> {
    fn get_agent_card<'a>(
        &'a self,
        ctx: &'a RequestContext,
    ) -> BoxFuture<'a, Result<AgentCard, A2AError>> {
        (**self).get_agent_card(ctx)
    }

    fn get_extended_agent_card<'a>(
        &'a self,
        ctx: &'a RequestContext,
    ) -> BoxFuture<'a, Result<AgentCard, A2AError>> {
        (**self).get_extended_agent_card(ctx)
    }

    fn on_message_send<'a>(
        &'a self,
        params: Value,
        ctx: &'a RequestContext,
    ) -> BoxFuture<'a, HandlerResult> {
        (**self).on_message_send(params, ctx)
    }

    fn on_message_send_stream<'a>(
        &'a self,
        params: Value,
        ctx: &'a RequestContext,
    ) -> BoxFuture<'a, StreamResult> {
        (**self).on_message_send_stream(params, ctx)
    }

    fn on_get_task<'a>(
        &'a self,
        params: Value,
        ctx: &'a RequestContext,
    ) -> BoxFuture<'a, HandlerResult> {
        (**self).on_get_task(params, ctx)
    }

    fn on_cancel_task<'a>(
        &'a self,
        params: Value,
        ctx: &'a RequestContext,
    ) -> BoxFuture<'a, HandlerResult> {
        (**self).on_cancel_task(params, ctx)
    }

    fn on_list_tasks<'a>(
        &'a self,
        params: Value,
        ctx: &'a RequestContext,
    ) -> BoxFuture<'a, HandlerResult> {
        (**self).on_list_tasks(params, ctx)
    }

    fn on_resubscribe_to_task<'a>(
        &'a self,
        params: Value,
        ctx: &'a RequestContext,
    ) -> BoxFuture<'a, StreamResult> {
        (**self).on_resubscribe_to_task(params, ctx)
    }

    fn on_set_push_notification_config<'a>(
        &'a self,
        params: Value,
        ctx: &'a RequestContext,
    ) -> BoxFuture<'a, HandlerResult> {
        (**self).on_set_push_notification_config(params, ctx)
    }

    fn on_get_push_notification_config<'a>(
        &'a self,
        params: Value,
        ctx: &'a RequestContext,
    ) -> BoxFuture<'a, HandlerResult> {
        (**self).on_get_push_notification_config(params, ctx)
    }

    fn on_list_push_notification_configs<'a>(
        &'a self,
        params: Value,
        ctx: &'a RequestContext,
    ) -> BoxFuture<'a, HandlerResult> {
        (**self).on_list_push_notification_configs(params, ctx)
    }

    fn on_delete_push_notification_config<'a>(
        &'a self,
        params: Value,
        ctx: &'a RequestContext,
    ) -> BoxFuture<'a, HandlerResult> {
        (**self).on_delete_push_notification_config(params, ctx)
    }
}
