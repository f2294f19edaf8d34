//! Request and response shapes exchanged with agents.
//!
//! A dispatch carries either a message list (conversational invocation) or a
//! trigger (webhook invocation); a message invocation may additionally carry
//! trigger context, but exactly one of the two is primary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::tool::ToolDefinition;
use crate::CubiclerError;

/// The agent's own identity as included in every request it receives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentInfo {
    pub identifier: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub prompt: String,
}

/// One backend server entry in the catalog handed to an agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerInfo {
    pub identifier: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageSender {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// One conversational message in a dispatch body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub sender: MessageSender,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(rename = "type")]
    pub kind: String,
    pub content: String,
}

/// A non-message invocation source. Today the only trigger type is a webhook.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trigger {
    #[serde(rename = "type")]
    pub kind: String,
    pub identifier: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub triggered_at: DateTime<Utc>,
    pub payload: Value,
}

impl Trigger {
    pub fn webhook(
        identifier: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
        payload: Value,
    ) -> Self {
        Self {
            kind: "webhook".to_string(),
            identifier: identifier.into(),
            name: name.into(),
            description: description.into(),
            triggered_at: Utc::now(),
            payload,
        }
    }
}

/// The full request delivered to an agent on each dispatch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRequest {
    pub agent: AgentInfo,
    pub tools: Vec<ToolDefinition>,
    pub servers: Vec<ServerInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub messages: Option<Vec<Message>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trigger: Option<Trigger>,
}

impl AgentRequest {
    /// Exactly one of `messages` / `trigger` must be primary. A request with
    /// neither carries nothing to act on.
    pub fn validate(&self) -> Result<(), CubiclerError> {
        if self.messages.is_none() && self.trigger.is_none() {
            return Err(CubiclerError::Validation(
                "agent request requires messages or a trigger".to_string(),
            ));
        }
        Ok(())
    }
}

/// An agent's answer to a dispatch. All four fields are required; transports
/// reject responses that omit any of them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentResponse {
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub kind: String,
    pub content: String,
    pub metadata: Value,
}

impl AgentResponse {
    /// Parse a JSON value into an `AgentResponse`, reporting which required
    /// fields are missing rather than a generic serde error.
    pub fn from_value(value: Value) -> Result<Self, CubiclerError> {
        let missing: Vec<&str> = ["timestamp", "type", "content", "metadata"]
            .into_iter()
            .filter(|field| value.get(field).is_none())
            .collect();
        if !missing.is_empty() {
            return Err(CubiclerError::Agent(format!(
                "agent response missing required fields: {}",
                missing.join(", ")
            )));
        }
        serde_json::from_value(value)
            .map_err(|e| CubiclerError::Agent(format!("invalid agent response: {}", e)))
    }
}
