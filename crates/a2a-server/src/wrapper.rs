//! Handler wrapper that runs every operation under a fixed loading context.
//!
//! Each operation installs the context before calling into the wrapped
//! handler and keeps it installed across every poll of the returned future.
//! The previous context comes back on every exit path: completion, error,
//! panic or the future being dropped. For streaming operations the context
//! covers only obtaining the event source; frame delivery runs without it.

use a2a_protocol::{A2AError, AgentCard, HandlerResult, RequestContext};
use a2a_transport::{RequestHandler, StreamResult};
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use serde_json::Value;

use crate::loading::LoadingContext;

pub struct ContextSwitchingHandler<H> {
    inner: H,
    loading_context: LoadingContext,
}

impl<H: RequestHandler> ContextSwitchingHandler<H> {
    pub fn new(inner: H, loading_context: LoadingContext) -> Self {
        Self {
            inner,
            loading_context,
        }
    }

    pub fn loading_context(&self) -> &LoadingContext {
        &self.loading_context
    }

    pub fn inner(&self) -> &H {
        &self.inner
    }

    fn switched<'a, T: 'a>(
        &'a self,
        call: impl FnOnce(&'a H) -> BoxFuture<'a, T>,
    ) -> BoxFuture<'a, T> {
        let future = {
            let _guard = self.loading_context.enter();
            call(&self.inner)
        };
        self.loading_context.scope(future).boxed()
    }
}

impl<H: RequestHandler> RequestHandler for ContextSwitchingHandler<H> {
    fn get_agent_card<'a>(
        &'a self,
        ctx: &'a RequestContext,
    ) -> BoxFuture<'a, Result<AgentCard, A2AError>> {
        self.switched(|h| h.get_agent_card(ctx))
    }

    fn get_extended_agent_card<'a>(
        &'a self,
        ctx: &'a RequestContext,
    ) -> BoxFuture<'a, Result<AgentCard, A2AError>> {
        self.switched(|h| h.get_extended_agent_card(ctx))
    }

    fn on_message_send<'a>(
        &'a self,
        params: Value,
        ctx: &'a RequestContext,
    ) -> BoxFuture<'a, HandlerResult> {
        self.switched(|h| h.on_message_send(params, ctx))
    }

    fn on_message_send_stream<'a>(
        &'a self,
        params: Value,
        ctx: &'a RequestContext,
    ) -> BoxFuture<'a, StreamResult> {
        self.switched(|h| h.on_message_send_stream(params, ctx))
    }

    fn on_get_task<'a>(
        &'a self,
        params: Value,
        ctx: &'a RequestContext,
    ) -> BoxFuture<'a, HandlerResult> {
        self.switched(|h| h.on_get_task(params, ctx))
    }

    fn on_cancel_task<'a>(
        &'a self,
        params: Value,
        ctx: &'a RequestContext,
    ) -> BoxFuture<'a, HandlerResult> {
        self.switched(|h| h.on_cancel_task(params, ctx))
    }

    fn on_list_tasks<'a>(
        &'a self,
        params: Value,
        ctx: &'a RequestContext,
    ) -> BoxFuture<'a, HandlerResult> {
        self.switched(|h| h.on_list_tasks(params, ctx))
    }

    fn on_resubscribe_to_task<'a>(
        &'a self,
        params: Value,
        ctx: &'a RequestContext,
    ) -> BoxFuture<'a, StreamResult> {
        self.switched(|h| h.on_resubscribe_to_task(params, ctx))
    }

    fn on_set_push_notification_config<'a>(
        &'a self,
        params: Value,
        ctx: &'a RequestContext,
    ) -> BoxFuture<'a, HandlerResult> {
        self.switched(|h| h.on_set_push_notification_config(params, ctx))
    }

    fn on_get_push_notification_config<'a>(
        &'a self,
        params: Value,
        ctx: &'a RequestContext,
    ) -> BoxFuture<'a, HandlerResult> {
        self.switched(|h| h.on_get_push_notification_config(params, ctx))
    }

    fn on_list_push_notification_configs<'a>(
        &'a self,
        params: Value,
        ctx: &'a RequestContext,
    ) -> BoxFuture<'a, HandlerResult> {
        self.switched(|h| h.on_list_push_notification_configs(params, ctx))
    }

    fn on_delete_push_notification_config<'a>(
        &'a self,
        params: Value,
        ctx: &'a RequestContext,
    ) -> BoxFuture<'a, HandlerResult> {
        self.switched(|h| h.on_delete_push_notification_config(params, ctx))
    }
}
