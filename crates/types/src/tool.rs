//! Tool definitions as presented to agents.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One callable tool: a name, a human-readable description, and a JSON-Schema
/// object describing its parameters.
///
/// Upstream MCP servers call the schema field `inputSchema`; REST endpoint
/// conversion and the internal tools build it directly. Both spellings are
/// accepted on input, and the aggregated list presented to agents always uses
/// `parameters`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(alias = "inputSchema", alias = "input_schema")]
    pub parameters: Value,
}

impl ToolDefinition {
    pub fn new(name: impl Into<String>, description: impl Into<String>, parameters: Value) -> Self {
        Self { name: name.into(), description: description.into(), parameters }
    }
}

/// Wrap a tool result into the MCP content envelope:
/// `{"content":[{"type":"text","text":<stringified result>}]}`.
pub fn text_content_envelope(result: &Value) -> Value {
    let text = match result {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    serde_json::json!({
        "content": [{ "type": "text", "text": text }]
    })
}
