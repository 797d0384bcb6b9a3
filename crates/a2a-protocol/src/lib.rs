//! A2A (Agent-to-Agent) - Protocol Types
//!
//! JSON-RPC 2.0 envelopes, error codes and method names for the A2A
//! protocol, plus the per-request [`RequestContext`] threaded through every
//! handler call. Payloads themselves stay opaque `serde_json::Value`s; this
//! crate never interprets task or message bodies.

pub mod card;
pub mod context;
pub mod error;
pub mod extensions;
pub mod jsonrpc;
pub mod methods;
pub mod user;

pub use card::AgentCard;
pub use context::{ContextError, RequestContext, RequestContextBuilder};
pub use error::{A2AError, A2AErrorCode};
pub use extensions::{requested_extensions, EXTENSIONS_HEADER};
pub use jsonrpc::{
    HandlerResult, JsonRpcErrorResponse, JsonRpcRequest, JsonRpcResponse,
    JsonRpcSuccessResponse, RequestId,
};
pub use methods::{is_known_method, is_streaming_method, MethodName, Methods};
pub use user::User;
