//! SSE-then-HTTP fallback for URL-based servers without an explicit
//! transport.
//!
//! `initialize` first attempts SSE; on failure it falls back to HTTP. The
//! first variant that initializes successfully is retained for the lifetime
//! of this transport, and `send`/`close` delegate to it.

use std::time::Duration;

use async_trait::async_trait;
use cubicler_types::config::McpServerConfig;
use cubicler_types::{CubiclerError, McpRequest, McpResponse};
use tracing::debug;

use crate::http::HttpTransport;
use crate::sse::SseTransport;
use crate::McpTransport;

pub struct AutoTransport {
    server_id: String,
    config: McpServerConfig,
    call_timeout: Duration,
    inner: Option<Box<dyn McpTransport>>,
}

impl AutoTransport {
    pub fn new(config: McpServerConfig, call_timeout: Duration) -> Result<Self, CubiclerError> {
        if config.url.is_none() {
            return Err(CubiclerError::Config(format!(
                "server {}: auto transport requires 'url'",
                config.identifier
            )));
        }
        Ok(Self { server_id: config.identifier.clone(), config, call_timeout, inner: None })
    }
}

#[async_trait]
impl McpTransport for AutoTransport {
    async fn initialize(&mut self) -> Result<(), CubiclerError> {
        let mut sse = SseTransport::new(self.config.clone(), self.call_timeout)?;
        match sse.initialize().await {
            Ok(()) => {
                debug!(server = %self.server_id, "auto transport selected sse");
                self.inner = Some(Box::new(sse));
                return Ok(());
            }
            Err(e) => {
                debug!(server = %self.server_id, error = %e, "sse unavailable, trying http");
            }
        }

        let mut http = HttpTransport::new(self.config.clone(), self.call_timeout)?;
        http.initialize().await?;
        debug!(server = %self.server_id, "auto transport selected http");
        self.inner = Some(Box::new(http));
        Ok(())
    }

    async fn send(&self, request: McpRequest) -> Result<McpResponse, CubiclerError> {
        match self.inner {
            Some(ref inner) => inner.send(request).await,
            None => Err(CubiclerError::Transport("transport not initialized".to_string())),
        }
    }

    async fn close(&mut self) -> Result<(), CubiclerError> {
        match self.inner {
            Some(ref mut inner) => inner.close().await,
            None => Ok(()),
        }
    }

    fn is_connected(&self) -> bool {
        self.inner.as_ref().is_some_and(|inner| inner.is_connected())
    }

    fn server_id(&self) -> &str {
        &self.server_id
    }
}
