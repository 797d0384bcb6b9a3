//! Dependency bridge: the process-wide slot for components built outside
//! the managed startup path.
//!
//! A [`BridgedRequestHandler`](crate::BridgedRequestHandler) is created with
//! no arguments, so it cannot be handed the agent card, the real handler or
//! the runtime. Startup publishes them here as one [`BridgeState`]; readers on
//! any thread get either the whole snapshot or nothing.

use std::sync::Arc;

use a2a_protocol::AgentCard;
use a2a_transport::{CallContextBuilder, RequestHandler};
use parking_lot::RwLock;
use thiserror::Error;
use tokio::runtime::Handle;
use tracing::{debug, info};

use crate::loading::LoadingContext;

/// Dependencies carried by the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dependency {
    AgentCard,
    ExtendedAgentCard,
    RequestHandler,
    CallContextBuilder,
    Executor,
    LoadingContext,
}

impl std::fmt::Display for Dependency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::AgentCard => "AgentCard",
            Self::ExtendedAgentCard => "Extended AgentCard",
            Self::RequestHandler => "RequestHandler",
            Self::CallContextBuilder => "CallContextBuilder",
            Self::Executor => "Executor",
            Self::LoadingContext => "LoadingContext",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BridgeError {
    #[error("{0} not available. Startup may not have run yet.")]
    MissingDependency(Dependency),
    #[error("bridge startup must run inside a Tokio runtime")]
    NoRuntime,
}

/// Everything the bridge publishes, replaced as a unit.
#[derive(Clone)]
pub struct BridgeState {
    agent_card: AgentCard,
    extended_agent_card: Option<AgentCard>,
    request_handler: Arc<dyn RequestHandler>,
    context_builder: Option<Arc<dyn CallContextBuilder>>,
    executor: Handle,
    loading_context: LoadingContext,
}

impl BridgeState {
    pub fn new(
        agent_card: AgentCard,
        request_handler: Arc<dyn RequestHandler>,
        executor: Handle,
        loading_context: LoadingContext,
    ) -> Self {
        Self {
            agent_card,
            extended_agent_card: None,
            request_handler,
            context_builder: None,
            executor,
            loading_context,
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

    pub fn agent_card(&self) -> &AgentCard {
        &self.agent_card
    }

    pub fn extended_agent_card(&self) -> Option<&AgentCard> {
        self.extended_agent_card.as_ref()
    }

    pub fn request_handler(&self) -> &Arc<dyn RequestHandler> {
        &self.request_handler
    }

    pub fn context_builder(&self) -> Option<&Arc<dyn CallContextBuilder>> {
        self.context_builder.as_ref()
    }

    pub fn executor(&self) -> &Handle {
        &self.executor
    }

    pub fn loading_context(&self) -> &LoadingContext {
        &self.loading_context
    }
}

impl std::fmt::Debug for BridgeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeState")
            .field("agent_card", &self.agent_card.name())
            .field("extended_agent_card", &self.extended_agent_card.is_some())
            .field("context_builder", &self.context_builder.is_some())
            .field("loading_context", &self.loading_context)
            .finish_non_exhaustive()
    }
}

static GLOBAL: DependencyBridge = DependencyBridge::new();

/// Atomically published [`BridgeState`] snapshot.
///
/// Written at startup and shutdown, read on every bridged request. The lock
/// only guards swapping the `Arc`; readers never hold it while using state.
pub struct DependencyBridge {
    state: RwLock<Option<Arc<BridgeState>>>,
}

impl DependencyBridge {
    /// A standalone bridge. Production code uses [`global`](Self::global).
    pub const fn new() -> Self {
        Self {
            state: parking_lot::const_rwlock(None),
        }
    }

    /// The process-wide bridge.
    pub fn global() -> &'static DependencyBridge {
        &GLOBAL
    }

    /// Replace the whole snapshot.
    pub fn publish(&self, state: BridgeState) {
        debug!(?state, "Publishing bridge state");
        *self.state.write() = Some(Arc::new(state));
        info!("Dependency bridge published");
    }

    pub fn clear(&self) {
        if self.state.write().take().is_some() {
            info!("Dependency bridge cleared");
        }
    }

    /// The current snapshot, if published.
    pub fn read(&self) -> Option<Arc<BridgeState>> {
        self.state.read().clone()
    }

    pub fn is_published(&self) -> bool {
        self.state.read().is_some()
    }

    fn require(&self, dependency: Dependency) -> Result<Arc<BridgeState>, BridgeError> {
        self.read().ok_or(BridgeError::MissingDependency(dependency))
    }

    pub fn agent_card(&self) -> Result<AgentCard, BridgeError> {
        Ok(self.require(Dependency::AgentCard)?.agent_card.clone())
    }

    /// `Ok(None)` when published without an extended card.
    pub fn extended_agent_card(&self) -> Result<Option<AgentCard>, BridgeError> {
        Ok(self
            .require(Dependency::ExtendedAgentCard)?
            .extended_agent_card
            .clone())
    }

    pub fn request_handler(&self) -> Result<Arc<dyn RequestHandler>, BridgeError> {
        Ok(self.require(Dependency::RequestHandler)?.request_handler.clone())
    }

    /// `Ok(None)` when published without a custom builder.
    pub fn context_builder(&self) -> Result<Option<Arc<dyn CallContextBuilder>>, BridgeError> {
        Ok(self
            .require(Dependency::CallContextBuilder)?
            .context_builder
            .clone())
    }

    pub fn executor(&self) -> Result<Handle, BridgeError> {
        Ok(self.require(Dependency::Executor)?.executor.clone())
    }

    pub fn loading_context(&self) -> Result<LoadingContext, BridgeError> {
        Ok(self.require(Dependency::LoadingContext)?.loading_context.clone())
    }
}

impl Default for DependencyBridge {
    fn default() -> Self {
        Self::new()
    }
}
