//! A2A method name constants for the JSON-RPC binding.
//!
//! Each constant is the exact string sent over the wire as the `method`
//! field of a JSON-RPC request.

/// All A2A method names.
pub struct Methods;

impl Methods {
    // ── Messages ────────────────────────────────────────────────────────
    pub const MESSAGE_SEND: &str = "message/send";
    pub const MESSAGE_STREAM: &str = "message/stream";

    // ── Tasks ───────────────────────────────────────────────────────────
    pub const TASKS_GET: &str = "tasks/get";
    pub const TASKS_CANCEL: &str = "tasks/cancel";
    pub const TASKS_LIST: &str = "tasks/list";
    pub const TASKS_RESUBSCRIBE: &str = "tasks/resubscribe";

    // ── Push notification configs ───────────────────────────────────────
    pub const PUSH_CONFIG_SET: &str = "tasks/pushNotificationConfig/set";
    pub const PUSH_CONFIG_GET: &str = "tasks/pushNotificationConfig/get";
    pub const PUSH_CONFIG_LIST: &str = "tasks/pushNotificationConfig/list";
    pub const PUSH_CONFIG_DELETE: &str = "tasks/pushNotificationConfig/delete";

    // ── Agent ───────────────────────────────────────────────────────────
    pub const AGENT_EXTENDED_CARD: &str = "agent/getAuthenticatedExtendedCard";

    /// Methods answered with a stream of events rather than one reply.
    pub const STREAMING: &[&str] = &[Self::MESSAGE_STREAM, Self::TASKS_RESUBSCRIBE];

    /// Methods answered with exactly one JSON-RPC response.
    pub const NON_STREAMING: &[&str] = &[
        Self::MESSAGE_SEND,
        Self::TASKS_GET,
        Self::TASKS_CANCEL,
        Self::TASKS_LIST,
        Self::PUSH_CONFIG_SET,
        Self::PUSH_CONFIG_GET,
        Self::PUSH_CONFIG_LIST,
        Self::PUSH_CONFIG_DELETE,
        Self::AGENT_EXTENDED_CARD,
    ];
}

/// Whether the method produces an SSE stream.
pub fn is_streaming_method(method: &str) -> bool {
    Methods::STREAMING.contains(&method)
}

/// Returns true if the given string is a known A2A method.
pub fn is_known_method(method: &str) -> bool {
    is_streaming_method(method) || Methods::NON_STREAMING.contains(&method)
}

/// Type alias: the method name is always a `&str` at the protocol level.
pub type MethodName = &'static str;
