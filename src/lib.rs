//! A2A HTTP bridge: serves an A2A request handler over JSON-RPC, REST and
//! Server-Sent Events.
//!
//! The binary wires the [`echo`] agent through the dependency bridge; other
//! deployments publish their own handler the same way.

pub mod echo;
