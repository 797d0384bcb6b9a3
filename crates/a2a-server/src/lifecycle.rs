//! Startup and shutdown of the dependency bridge.

use std::sync::Arc;

use a2a_protocol::AgentCard;
use a2a_transport::{CallContextBuilder, RequestHandler};
use tokio::runtime::Handle;
use tracing::info;

use crate::bridge::{BridgeError, BridgeState, DependencyBridge};
use crate::loading::LoadingContext;

/// Holds the managed dependencies until startup publishes them.
pub struct BridgeInitializer {
    agent_card: AgentCard,
    extended_agent_card: Option<AgentCard>,
    request_handler: Arc<dyn RequestHandler>,
    context_builder: Option<Arc<dyn CallContextBuilder>>,
    loading_context: Option<LoadingContext>,
}

impl BridgeInitializer {
    pub fn new(agent_card: AgentCard, request_handler: Arc<dyn RequestHandler>) -> Self {
        Self {
            agent_card,
            extended_agent_card: None,
            request_handler,
            context_builder: None,
            loading_context: None,
        }
    }

    pub fn with_extended_agent_card(mut self, card: AgentCard) -> Self {
        self.extended_agent_card = Some(card);
        self
    }

    pub fn with_context_builder(mut self, builder: Arc<dyn CallContextBuilder>) -> Self {
        self.context_builder = Some(builder);
        self
    }

    /// Context to install around handler calls. Defaults to the one current
    /// on the startup thread, or a fresh empty context.
    pub fn with_loading_context(mut self, context: LoadingContext) -> Self {
        self.loading_context = Some(context);
        self
    }

    /// Publish to `bridge`, capturing the current runtime as executor.
    ///
    /// The bridge stays published until the returned registration is
    /// dropped or shut down.
    pub fn on_startup(
        self,
        bridge: &DependencyBridge,
    ) -> Result<BridgeRegistration<'_>, BridgeError> {
        let executor = Handle::try_current().map_err(|_| BridgeError::NoRuntime)?;
        let loading_context = self
            .loading_context
            .or_else(LoadingContext::current)
            .unwrap_or_else(|| LoadingContext::new("deployment"));

        info!(
            agent = self.agent_card.name().unwrap_or("<unnamed>"),
            loading_context = loading_context.name(),
            "Initializing dependency bridge"
        );

        let mut state = BridgeState::new(
            self.agent_card,
            self.request_handler,
            executor,
            loading_context,
        );
        if let Some(card) = self.extended_agent_card {
            state = state.with_extended_agent_card(card);
        }
        if let Some(builder) = self.context_builder {
            state = state.with_context_builder(builder);
        }
        bridge.publish(state);

        Ok(BridgeRegistration { bridge })
    }
}

/// Keeps the bridge published; clears it on drop.
#[must_use = "dropping the registration clears the bridge"]
pub struct BridgeRegistration<'a> {
    bridge: &'a DependencyBridge,
}

impl BridgeRegistration<'_> {
    /// Clear the bridge now.
    pub fn shutdown(self) {
        drop(self);
    }
}

impl Drop for BridgeRegistration<'_> {
    fn drop(&mut self) {
        info!("Shutting down dependency bridge");
        self.bridge.clear();
    }
}
