//! JSON-RPC 2.0 message types for the MCP wire protocol.
//!
//! Every provider conversation and every upstream MCP request is one of these
//! shapes. Responses carry exactly one of `result` or `error`; requests and
//! responses are correlated by `id`, which the protocol allows to be either a
//! number or a string.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// JSON-RPC error code: the request object is not valid.
pub const INVALID_REQUEST: i64 = -32600;
/// JSON-RPC error code: the method does not exist.
pub const METHOD_NOT_FOUND: i64 = -32601;
/// JSON-RPC error code: invalid method parameters.
pub const INVALID_PARAMS: i64 = -32602;
/// JSON-RPC error code: internal server error.
pub const INTERNAL_ERROR: i64 = -32603;

/// Request identifier: JSON-RPC permits both numbers and strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    Number(i64),
    String(String),
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{}", n),
            Self::String(s) => write!(f, "{}", s),
        }
    }
}

impl From<i64> for RequestId {
    fn from(n: i64) -> Self {
        Self::Number(n)
    }
}

impl From<&str> for RequestId {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

/// A JSON-RPC 2.0 request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpRequest {
    pub jsonrpc: String,
    pub id: RequestId,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl McpRequest {
    pub fn new(id: impl Into<RequestId>, method: impl Into<String>, params: Option<Value>) -> Self {
        Self { jsonrpc: "2.0".to_string(), id: id.into(), method: method.into(), params }
    }

    /// Basic shape validation: `jsonrpc` must be exactly "2.0" and the method
    /// must be non-empty.
    pub fn validate(&self) -> Result<(), crate::CubiclerError> {
        if self.jsonrpc != "2.0" {
            return Err(crate::CubiclerError::Validation(format!(
                "unsupported jsonrpc version: {}",
                self.jsonrpc
            )));
        }
        if self.method.is_empty() {
            return Err(crate::CubiclerError::Validation("method must not be empty".to_string()));
        }
        Ok(())
    }
}

/// A JSON-RPC 2.0 error object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

/// A JSON-RPC 2.0 response. Exactly one of `result` / `error` is present on
/// the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpResponse {
    pub jsonrpc: String,
    pub id: RequestId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl McpResponse {
    pub fn success(id: impl Into<RequestId>, result: Value) -> Self {
        Self { jsonrpc: "2.0".to_string(), id: id.into(), result: Some(result), error: None }
    }

    pub fn error(id: impl Into<RequestId>, code: i64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: id.into(),
            result: None,
            error: Some(RpcError { code, message: message.into() }),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_id_roundtrips_numbers_and_strings() {
        let num: RequestId = serde_json::from_value(json!(42)).unwrap();
        assert_eq!(num, RequestId::Number(42));

        let text: RequestId = serde_json::from_value(json!("req-1")).unwrap();
        assert_eq!(text, RequestId::String("req-1".to_string()));

        assert_eq!(serde_json::to_value(&num).unwrap(), json!(42));
        assert_eq!(serde_json::to_value(&text).unwrap(), json!("req-1"));
    }

    #[test]
    fn response_has_exactly_one_of_result_or_error() {
        let ok = McpResponse::success(1, json!({"tools": []}));
        let value = serde_json::to_value(&ok).unwrap();
        assert!(value.get("result").is_some());
        assert!(value.get("error").is_none());

        let err = McpResponse::error(1, INTERNAL_ERROR, "boom");
        let value = serde_json::to_value(&err).unwrap();
        assert!(value.get("result").is_none());
        assert_eq!(value["error"]["code"], json!(INTERNAL_ERROR));
    }

    #[test]
    fn request_validation_rejects_bad_version() {
        let mut req = McpRequest::new(1, "tools/list", None);
        assert!(req.validate().is_ok());

        req.jsonrpc = "1.0".to_string();
        assert!(req.validate().is_err());
    }
}
