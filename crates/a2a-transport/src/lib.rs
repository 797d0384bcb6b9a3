//! A2A Transport Layer
//!
//! HTTP transport for an A2A agent:
//! - The [`RequestHandler`] contract the agent side implements
//! - Demand-driven [`EventSource`]s for streaming operations
//! - The [`SseAdapter`] that writes a source to a client with a window of one
//! - Per-request context construction ([`CallContextBuilder`])
//! - The Axum server exposing the JSON-RPC and REST bindings
//!
//! The transport is decoupled from the agent via the `RequestHandler` trait.

pub mod context_builder;
pub mod handler;
pub mod server;
pub mod source;
pub mod sse;

pub use axum::http;
pub use context_builder::{CallContextBuilder, DefaultCallContextBuilder};
pub use handler::{EventStream, RequestHandler, StreamResult};
pub use server::{TransportConfig, TransportError, TransportServer};
pub use source::{
    event_channel, from_stream, BoxEventSource, Cancelled, ChannelSource, EventEmitter,
    EventSource, EventSourceExt, Signal, Subscription,
};
pub use sse::{ChannelSink, SseAdapter, SseFrame, SseSink, StreamError, StreamOutcome};
