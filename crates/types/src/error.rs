use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum CubiclerError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Authentication failed")]
    Auth,

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Process error: {0}")]
    Process(String),

    #[error("JSON decode error: {0}")]
    JsonDecode(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("MCP error: {0}")]
    Mcp(String),

    #[error("Agent error: {0}")]
    Agent(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CubiclerError {
    /// The uniform denial raised whenever an agent fails a restriction check,
    /// regardless of which check failed.
    pub fn access_denied() -> Self {
        Self::AccessDenied("insufficient permissions for requested operation".to_string())
    }
}
