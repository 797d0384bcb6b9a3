//! Agent descriptor ("agent card").

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The agent's self-description served at `/.well-known/agent-card.json`.
///
/// Construction of the card belongs to the deployment; the adapter only
/// stores and serves it, so the document is kept as raw JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentCard(Value);

impl AgentCard {
    pub fn new(document: Value) -> Self {
        Self(document)
    }

    /// The card's `name` field, if present.
    pub fn name(&self) -> Option<&str> {
        self.0.get("name").and_then(Value::as_str)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }
}

impl From<Value> for AgentCard {
    fn from(document: Value) -> Self {
        Self(document)
    }
}
