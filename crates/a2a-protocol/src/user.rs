//! Caller identity attached to every request.

use serde::{Deserialize, Serialize};

/// Caller identity: either anonymous or an authenticated principal.
///
/// Authentication itself happens outside this crate; an outer layer decides
/// who the caller is and the transport copies that decision into the
/// [`RequestContext`](crate::RequestContext).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum User {
    #[default]
    #[serde(rename = "anonymous")]
    Anonymous,
    #[serde(rename = "authenticated")]
    Authenticated { username: String },
}

impl User {
    pub fn authenticated(username: impl Into<String>) -> Self {
        Self::Authenticated {
            username: username.into(),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated { .. })
    }

    /// Principal name, empty for anonymous callers.
    pub fn username(&self) -> &str {
        match self {
            Self::Anonymous => "",
            Self::Authenticated { username } => username,
        }
    }
}
