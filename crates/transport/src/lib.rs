//! MCP transport layer for Cubicler.
//!
//! This crate carries one JSON-RPC 2.0 request/response pair to a backend
//! provider. The transport layer handles:
//! - Process spawning and lifecycle management (stdio)
//! - Request/response correlation by id over shared channels (sse, stdio)
//! - Stateless request/response exchange (http)
//! - Error handling, timeouts, and restart supervision
//!
//! # Example
//!
//! ```rust,no_run
//! use cubicler_transport::{create_transport, McpTransport};
//! use cubicler_types::config::McpServerConfig;
//! use cubicler_types::McpRequest;
//! use std::time::Duration;
//!
//! # async fn example(config: McpServerConfig) -> Result<(), Box<dyn std::error::Error>> {
//!     let mut transport = create_transport(&config, Duration::from_secs(30))?;
//!     transport.initialize().await?;
//!
//!     let response = transport.send(McpRequest::new(1, "tools/list", None)).await?;
//!     println!("tools: {:?}", response.result);
//!
//!     transport.close().await?;
//!     Ok(())
//! }
//! ```

pub mod auto;
pub mod http;
pub mod jwt;
pub mod pending;
pub mod reader;
pub mod sse;
pub mod stdio;

use std::time::Duration;

use async_trait::async_trait;
use cubicler_types::config::{McpServerConfig, TransportKind};
use cubicler_types::{CubiclerError, McpRequest, McpResponse};

pub use auto::AutoTransport;
pub use http::HttpTransport;
pub use jwt::JwtHelper;
pub use sse::SseTransport;
pub use stdio::StdioTransport;

/// Transport for one backend MCP server.
///
/// All implementations are `Send + Sync`; `send` may be called concurrently
/// from multiple tasks and requests may be pipelined — responses are matched
/// back to callers by request id.
///
/// # Lifecycle
///
/// 1. **initialize**: validate configuration, open the connection or spawn
///    the child process
/// 2. **send**: deliver one request, await the correlated response
/// 3. **close**: reject in-flight requests, release the connection, disable
///    restarts
#[async_trait]
pub trait McpTransport: Send + Sync {
    /// Establish the connection for this transport.
    ///
    /// # Errors
    ///
    /// Returns `CubiclerError::Config` for invalid configuration (bad URL,
    /// missing command) and `CubiclerError::Transport` / `Process` when the
    /// connection cannot be established.
    async fn initialize(&mut self) -> Result<(), CubiclerError>;

    /// Send one request and await its response.
    ///
    /// Transient upstream failures (refused connections, timeouts, non-2xx
    /// statuses) are not surfaced as `Err` by the HTTP transport; they come
    /// back as an `McpResponse` carrying a `-32603` error with the original
    /// request id. `Err` is reserved for local conditions: validation
    /// failures, a closed transport, or a request deadline expiring.
    async fn send(&self, request: McpRequest) -> Result<McpResponse, CubiclerError>;

    /// Close the transport, rejecting all pending requests and disabling
    /// any restart scheduling.
    async fn close(&mut self) -> Result<(), CubiclerError>;

    /// Whether the transport currently holds a usable connection.
    fn is_connected(&self) -> bool;

    /// Identifier of the server this transport belongs to.
    fn server_id(&self) -> &str;
}

/// Create the transport for a server config.
///
/// URL-based servers without an explicit transport get the SSE-then-HTTP
/// auto fallback.
pub fn create_transport(
    config: &McpServerConfig,
    call_timeout: Duration,
) -> Result<Box<dyn McpTransport>, CubiclerError> {
    match config.effective_transport()? {
        TransportKind::Http => Ok(Box::new(HttpTransport::new(config.clone(), call_timeout)?)),
        TransportKind::Sse => Ok(Box::new(SseTransport::new(config.clone(), call_timeout)?)),
        TransportKind::Stdio => Ok(Box::new(StdioTransport::new(config.clone(), call_timeout)?)),
        TransportKind::Auto => Ok(Box::new(AutoTransport::new(config.clone(), call_timeout)?)),
    }
}
