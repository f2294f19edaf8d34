//! Stateless HTTP MCP transport.
//!
//! Each request is one `POST` with a JSON-RPC body. Upstream failures are
//! not surfaced as `Err`: network errors, timeouts, and non-2xx statuses
//! come back as an `McpResponse` carrying `-32603` with the original
//! request id, so the router can forward them like any provider error.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use cubicler_types::config::{AuthConfig, JwtAuthConfig, McpServerConfig};
use cubicler_types::jsonrpc::INTERNAL_ERROR;
use cubicler_types::{CubiclerError, McpRequest, McpResponse};
use tracing::warn;
use url::Url;

use crate::jwt::JwtHelper;
use crate::McpTransport;

pub struct HttpTransport {
    server_id: String,
    url: String,
    headers: HashMap<String, String>,
    auth: Option<JwtAuthConfig>,
    jwt: JwtHelper,
    client: reqwest::Client,
    connected: AtomicBool,
}

impl HttpTransport {
    pub fn new(config: McpServerConfig, call_timeout: Duration) -> Result<Self, CubiclerError> {
        let url = config.url.clone().ok_or_else(|| {
            CubiclerError::Config(format!(
                "server {}: http transport requires 'url'",
                config.identifier
            ))
        })?;
        let auth = config.auth.map(|AuthConfig::Jwt(jwt)| jwt);
        let client = reqwest::Client::builder()
            .timeout(call_timeout)
            .build()
            .map_err(|e| CubiclerError::Transport(format!("failed to build client: {}", e)))?;

        Ok(Self {
            server_id: config.identifier,
            url,
            headers: config.headers,
            auth,
            jwt: JwtHelper::new(),
            client,
            connected: AtomicBool::new(false),
        })
    }

    async fn post(&self, request: &McpRequest) -> Result<McpResponse, String> {
        let mut builder = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/json");
        for (key, value) in &self.headers {
            builder = builder.header(key, value);
        }
        if let Some(ref auth) = self.auth {
            let token = self.jwt.token(auth).await.map_err(|e| e.to_string())?;
            builder = builder.bearer_auth(token);
        }

        let response = builder.json(request).send().await.map_err(|e| e.to_string())?;
        let status = response.status();
        if !status.is_success() {
            return Err(format!("status {}", status));
        }

        let parsed: McpResponse = response
            .json()
            .await
            .map_err(|e| format!("invalid response body: {}", e))?;
        if parsed.id != request.id {
            return Err(format!("response id {} does not match request", parsed.id));
        }
        Ok(parsed)
    }
}

#[async_trait]
impl McpTransport for HttpTransport {
    async fn initialize(&mut self) -> Result<(), CubiclerError> {
        let parsed = Url::parse(&self.url)
            .map_err(|e| CubiclerError::Config(format!("invalid url: {}", e)))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(CubiclerError::Config(format!(
                "url must be http or https: {}",
                self.url
            )));
        }
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn send(&self, request: McpRequest) -> Result<McpResponse, CubiclerError> {
        request.validate()?;
        match self.post(&request).await {
            Ok(response) => Ok(response),
            Err(cause) => {
                warn!(server = %self.server_id, cause = %cause, "http request failed");
                Ok(McpResponse::error(
                    request.id,
                    INTERNAL_ERROR,
                    format!("HTTP request failed: {}", cause),
                ))
            }
        }
    }

    async fn close(&mut self) -> Result<(), CubiclerError> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn server_id(&self) -> &str {
        &self.server_id
    }
}
