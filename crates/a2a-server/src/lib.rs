//! A2A Server: wiring between startup-managed state and the transport.
//!
//! The transport may be handed a handler it builds itself, with no
//! arguments. This crate makes that work: startup publishes the real handler
//! and its companions through the [`DependencyBridge`], and the
//! [`BridgedRequestHandler`] picks them up per call, running each call under
//! the deployment's [`LoadingContext`].

pub mod bridge;
pub mod bridged;
pub mod lifecycle;
pub mod loading;
pub mod wrapper;

pub use bridge::{BridgeError, BridgeState, Dependency, DependencyBridge};
pub use bridged::{BridgedCallContextBuilder, BridgedRequestHandler};
pub use lifecycle::{BridgeInitializer, BridgeRegistration};
pub use loading::{ContextGuard, LoadingContext, Scoped};
pub use wrapper::ContextSwitchingHandler;
