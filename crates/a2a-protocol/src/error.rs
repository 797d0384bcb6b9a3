//! A2A error types: standard JSON-RPC 2.0 codes plus the A2A-specific range.

use serde::{Deserialize, Serialize};

/// Standard JSON-RPC 2.0 error codes plus A2A protocol errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum A2AErrorCode {
    // JSON-RPC 2.0 standard errors
    ParseError,
    InvalidRequest,
    MethodNotFound,
    InvalidParams,
    InternalError,

    // A2A errors
    TaskNotFound,
    TaskNotCancelable,
    PushNotificationNotSupported,
    UnsupportedOperation,
    ContentTypeNotSupported,
    InvalidAgentResponse,
    ExtendedAgentCardNotConfigured,

    // Custom code
    Custom(i32),
}

impl A2AErrorCode {
    pub fn code(&self) -> i32 {
        match self {
            Self::ParseError => -32700,
            Self::InvalidRequest => -32600,
            Self::MethodNotFound => -32601,
            Self::InvalidParams => -32602,
            Self::InternalError => -32603,
            Self::TaskNotFound => -32001,
            Self::TaskNotCancelable => -32002,
            Self::PushNotificationNotSupported => -32003,
            Self::UnsupportedOperation => -32004,
            Self::ContentTypeNotSupported => -32005,
            Self::InvalidAgentResponse => -32006,
            Self::ExtendedAgentCardNotConfigured => -32007,
            Self::Custom(c) => *c,
        }
    }

    pub fn from_code(code: i32) -> Self {
        match code {
            -32700 => Self::ParseError,
            -32600 => Self::InvalidRequest,
            -32601 => Self::MethodNotFound,
            -32602 => Self::InvalidParams,
            -32603 => Self::InternalError,
            -32001 => Self::TaskNotFound,
            -32002 => Self::TaskNotCancelable,
            -32003 => Self::PushNotificationNotSupported,
            -32004 => Self::UnsupportedOperation,
            -32005 => Self::ContentTypeNotSupported,
            -32006 => Self::InvalidAgentResponse,
            -32007 => Self::ExtendedAgentCardNotConfigured,
            c => Self::Custom(c),
        }
    }

    /// HTTP status used by the REST binding for this code.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::ParseError | Self::InvalidRequest | Self::InvalidParams => 400,
            Self::MethodNotFound | Self::TaskNotFound => 404,
            Self::TaskNotCancelable => 409,
            Self::ContentTypeNotSupported => 415,
            Self::PushNotificationNotSupported
            | Self::UnsupportedOperation
            | Self::ExtendedAgentCardNotConfigured => 501,
            Self::InvalidAgentResponse => 502,
            Self::InternalError | Self::Custom(_) => 500,
        }
    }
}

/// JSON-RPC 2.0 error object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct A2AError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl A2AError {
    pub fn new(code: A2AErrorCode, message: impl Into<String>) -> Self {
        Self {
            code: code.code(),
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn parse_error(message: impl Into<String>) -> Self {
        Self::new(A2AErrorCode::ParseError, message)
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(A2AErrorCode::InvalidRequest, message)
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(A2AErrorCode::MethodNotFound, format!("Method not found: {method}"))
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(A2AErrorCode::InvalidParams, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(A2AErrorCode::InternalError, message)
    }

    pub fn task_not_found(task_id: &str) -> Self {
        Self::new(A2AErrorCode::TaskNotFound, format!("Task not found: {task_id}"))
    }

    pub fn task_not_cancelable(task_id: &str) -> Self {
        Self::new(
            A2AErrorCode::TaskNotCancelable,
            format!("Task cannot be canceled: {task_id}"),
        )
    }

    pub fn push_notification_not_supported() -> Self {
        Self::new(
            A2AErrorCode::PushNotificationNotSupported,
            "Push Notification is not supported",
        )
    }

    pub fn unsupported_operation() -> Self {
        Self::new(A2AErrorCode::UnsupportedOperation, "This operation is not supported")
    }

    pub fn extended_card_not_configured() -> Self {
        Self::new(
            A2AErrorCode::ExtendedAgentCardNotConfigured,
            "Extended agent card is not configured",
        )
    }

    pub fn error_code(&self) -> A2AErrorCode {
        A2AErrorCode::from_code(self.code)
    }

    pub fn http_status(&self) -> u16 {
        self.error_code().http_status()
    }
}

impl std::fmt::Display for A2AError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "A2A Error [{}]: {}", self.code, self.message)
    }
}

impl std::error::Error for A2AError {}
