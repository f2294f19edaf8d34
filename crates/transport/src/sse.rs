//! SSE MCP transport: responses stream in, requests POST out.
//!
//! The transport opens one long-lived event stream at the configured URL.
//! Requests are delivered via an auxiliary `POST <url-stem>/mcp` carrying
//! the same JSON-RPC body as the HTTP transport; responses arrive on the
//! stream either as an unnamed `message` event or as an `mcp-response`
//! named event and are matched to their awaiters by id. Unknown or
//! unparseable events are logged and dropped.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cubicler_types::config::{AuthConfig, JwtAuthConfig, McpServerConfig};
use cubicler_types::jsonrpc::INTERNAL_ERROR;
use cubicler_types::{CubiclerError, McpRequest, McpResponse};
use futures::StreamExt;
use tracing::{debug, warn};
use url::Url;

use crate::jwt::JwtHelper;
use crate::pending::PendingRequests;
use crate::McpTransport;

/// One parsed server-sent event: the event name (empty for unnamed events)
/// and the joined data lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SseEvent {
    pub name: String,
    pub data: String,
}

/// Incremental SSE framing: drain complete `\n\n`-terminated events out of
/// the buffer, leaving any partial event in place.
pub(crate) fn drain_events(buffer: &mut String) -> Vec<SseEvent> {
    let mut events = Vec::new();
    loop {
        // An event ends at a blank line; accept both LF and CRLF framing.
        let (end, sep_len) = match (buffer.find("\n\n"), buffer.find("\r\n\r\n")) {
            (Some(lf), Some(crlf)) if crlf < lf => (crlf, 4),
            (Some(lf), _) => (lf, 2),
            (None, Some(crlf)) => (crlf, 4),
            (None, None) => break,
        };
        let block: String = buffer.drain(..end + sep_len).collect();
        let mut name = String::new();
        let mut data_lines = Vec::new();
        for line in block.lines() {
            let line = line.trim_end_matches('\r');
            if let Some(value) = line.strip_prefix("event:") {
                name = value.trim().to_string();
            } else if let Some(value) = line.strip_prefix("data:") {
                data_lines.push(value.strip_prefix(' ').unwrap_or(value).to_string());
            }
            // Comment lines (leading ':') and unknown fields are ignored.
        }
        if !data_lines.is_empty() || !name.is_empty() {
            events.push(SseEvent { name, data: data_lines.join("\n") });
        }
    }
    events
}

pub struct SseTransport {
    server_id: String,
    url: String,
    post_url: String,
    headers: HashMap<String, String>,
    auth: Option<JwtAuthConfig>,
    jwt: JwtHelper,
    client: reqwest::Client,
    call_timeout: Duration,
    pending: PendingRequests,
    connected: Arc<AtomicBool>,
    reader_abort: Option<tokio::task::AbortHandle>,
}

impl SseTransport {
    pub fn new(config: McpServerConfig, call_timeout: Duration) -> Result<Self, CubiclerError> {
        let url = config.url.clone().ok_or_else(|| {
            CubiclerError::Config(format!(
                "server {}: sse transport requires 'url'",
                config.identifier
            ))
        })?;
        let post_url = format!("{}/mcp", url.trim_end_matches('/'));
        let auth = config.auth.map(|AuthConfig::Jwt(jwt)| jwt);
        // No overall timeout on this client: it owns the long-lived stream.
        // Per-request deadlines are applied around the pending receiver.
        let client = reqwest::Client::new();

        Ok(Self {
            server_id: config.identifier,
            url,
            post_url,
            headers: config.headers,
            auth,
            jwt: JwtHelper::new(),
            client,
            call_timeout,
            pending: PendingRequests::new(),
            connected: Arc::new(AtomicBool::new(false)),
            reader_abort: None,
        })
    }

    async fn bearer(&self) -> Result<Option<String>, CubiclerError> {
        match self.auth {
            Some(ref auth) => Ok(Some(self.jwt.token(auth).await?)),
            None => Ok(None),
        }
    }
}

fn handle_event(server_id: &str, pending: &PendingRequests, event: SseEvent) {
    if !event.name.is_empty() && event.name != "message" && event.name != "mcp-response" {
        debug!(server = %server_id, event = %event.name, "ignoring unknown sse event");
        return;
    }
    match serde_json::from_str::<McpResponse>(&event.data) {
        Ok(response) => {
            if !pending.resolve(response) {
                warn!(server = %server_id, "dropping sse response with no pending request");
            }
        }
        Err(e) => {
            warn!(server = %server_id, error = %e, "dropping unparseable sse event");
        }
    }
}

#[async_trait]
impl McpTransport for SseTransport {
    async fn initialize(&mut self) -> Result<(), CubiclerError> {
        let parsed = Url::parse(&self.url)
            .map_err(|e| CubiclerError::Config(format!("invalid url: {}", e)))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(CubiclerError::Config(format!(
                "url must be http or https: {}",
                self.url
            )));
        }

        let mut builder = self
            .client
            .get(&self.url)
            .header("Accept", "text/event-stream");
        for (key, value) in &self.headers {
            builder = builder.header(key, value);
        }
        if let Some(token) = self.bearer().await? {
            builder = builder.bearer_auth(token);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| CubiclerError::Transport(format!("sse connect failed: {}", e)))?;
        if !response.status().is_success() {
            return Err(CubiclerError::Transport(format!(
                "sse connect failed: status {}",
                response.status()
            )));
        }

        self.connected.store(true, Ordering::SeqCst);

        let server_id = self.server_id.clone();
        let pending = self.pending.clone();
        let connected = Arc::clone(&self.connected);
        let abort = tokio::spawn(async move {
            let mut stream = response.bytes_stream();
            let mut buffer = String::new();
            while let Some(chunk) = stream.next().await {
                match chunk {
                    Ok(bytes) => {
                        buffer.push_str(&String::from_utf8_lossy(&bytes));
                        for event in drain_events(&mut buffer) {
                            handle_event(&server_id, &pending, event);
                        }
                    }
                    Err(e) => {
                        warn!(server = %server_id, error = %e, "sse stream error");
                        break;
                    }
                }
            }
            connected.store(false, Ordering::SeqCst);
            pending.reject_all(INTERNAL_ERROR, "connection closed");
        })
        .abort_handle();
        self.reader_abort = Some(abort);

        Ok(())
    }

    async fn send(&self, request: McpRequest) -> Result<McpResponse, CubiclerError> {
        request.validate()?;
        if !self.is_connected() {
            return Err(CubiclerError::Transport("transport not connected".to_string()));
        }

        let id = request.id.clone();
        let rx = self.pending.register(id.clone())?;

        let mut builder = self
            .client
            .post(&self.post_url)
            .header("Content-Type", "application/json");
        for (key, value) in &self.headers {
            builder = builder.header(key, value);
        }
        match self.bearer().await {
            Ok(Some(token)) => builder = builder.bearer_auth(token),
            Ok(None) => {}
            Err(e) => {
                self.pending.forget(&id);
                return Err(e);
            }
        }

        let delivery = builder.json(&request).send().await;
        match delivery {
            Ok(response) if response.status().is_success() => {}
            Ok(response) => {
                self.pending.forget(&id);
                return Ok(McpResponse::error(
                    id,
                    INTERNAL_ERROR,
                    format!("HTTP request failed: status {}", response.status()),
                ));
            }
            Err(e) => {
                self.pending.forget(&id);
                return Ok(McpResponse::error(
                    id,
                    INTERNAL_ERROR,
                    format!("HTTP request failed: {}", e),
                ));
            }
        }

        match tokio::time::timeout(self.call_timeout, rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(CubiclerError::Transport("connection closed".to_string())),
            Err(_) => {
                self.pending.forget(&id);
                Err(CubiclerError::Timeout(format!(
                    "request {} timed out after {}ms",
                    id,
                    self.call_timeout.as_millis()
                )))
            }
        }
    }

    async fn close(&mut self) -> Result<(), CubiclerError> {
        if let Some(abort) = self.reader_abort.take() {
            abort.abort();
        }
        self.connected.store(false, Ordering::SeqCst);
        self.pending.reject_all(INTERNAL_ERROR, "connection closed");
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn server_id(&self) -> &str {
        &self.server_id
    }
}
