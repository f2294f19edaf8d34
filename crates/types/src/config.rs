//! Configuration types for providers, agents, and webhooks.
//!
//! These are read-only after load. The configuration provider replaces whole
//! documents on reload; dependent transports notice via `config_hash` and
//! re-initialize.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use crate::security::{validate_identifier, validate_not_empty, Secret};
use crate::CubiclerError;

/// Transport used to reach a backend MCP server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    Http,
    Sse,
    Stdio,
    Auto,
}

/// Transport used to reach an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentTransportKind {
    Http,
    Sse,
    Stdio,
    Direct,
}

/// Authentication attached to an outbound HTTP/SSE connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "config", rename_all = "lowercase")]
pub enum AuthConfig {
    Jwt(JwtAuthConfig),
}

fn default_refresh_threshold() -> u64 {
    300
}

/// JWT credential configuration: either a static token or OAuth2
/// client-credentials against a token endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JwtAuthConfig {
    OAuth2 {
        #[serde(rename = "tokenUrl")]
        token_url: String,
        #[serde(rename = "clientId")]
        client_id: String,
        #[serde(rename = "clientSecret")]
        client_secret: Secret,
        #[serde(skip_serializing_if = "Option::is_none")]
        audience: Option<String>,
        /// Seconds before expiry at which a cached token is considered stale.
        #[serde(rename = "refreshThreshold", default = "default_refresh_threshold")]
        refresh_threshold: u64,
    },
    Static {
        token: Secret,
    },
}

impl JwtAuthConfig {
    /// Cache key for the token cache: static tokens are never cached, OAuth2
    /// tokens are keyed by `(token_url, client_id, audience)`.
    pub fn cache_key(&self) -> Option<String> {
        match self {
            Self::Static { .. } => None,
            Self::OAuth2 { token_url, client_id, audience, .. } => Some(format!(
                "{}|{}|{}",
                token_url,
                client_id,
                audience.as_deref().unwrap_or("")
            )),
        }
    }
}

/// One backend MCP server. URL-based transports carry `url`/`headers`/`auth`;
/// stdio carries `command`/`args`/`env`/`cwd`. A URL-based server that omits
/// `transport` gets the SSE-then-HTTP auto fallback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpServerConfig {
    pub identifier: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transport: Option<TransportKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub headers: HashMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth: Option<AuthConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub env: HashMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cwd: Option<PathBuf>,
}

impl McpServerConfig {
    /// Resolve the transport to use, defaulting URL-based servers to `auto`.
    pub fn effective_transport(&self) -> Result<TransportKind, CubiclerError> {
        match self.transport {
            Some(TransportKind::Stdio) => {
                if self.command.is_none() {
                    return Err(CubiclerError::Config(format!(
                        "server {}: stdio transport requires 'command'",
                        self.identifier
                    )));
                }
                Ok(TransportKind::Stdio)
            }
            Some(kind) => {
                if self.url.is_none() {
                    return Err(CubiclerError::Config(format!(
                        "server {}: {:?} transport requires 'url'",
                        self.identifier, kind
                    )));
                }
                Ok(kind)
            }
            None => {
                if self.command.is_some() {
                    Ok(TransportKind::Stdio)
                } else if self.url.is_some() {
                    Ok(TransportKind::Auto)
                } else {
                    Err(CubiclerError::Config(format!(
                        "server {}: requires 'url' or 'command'",
                        self.identifier
                    )))
                }
            }
        }
    }

    pub fn validate(&self) -> Result<(), CubiclerError> {
        validate_identifier("server identifier", &self.identifier)?;
        validate_not_empty("server name", &self.name)?;
        let transport = self.effective_transport()?;
        if let Some(ref url) = self.url {
            validate_http_url("server url", url)?;
        }
        if transport == TransportKind::Stdio {
            if let Some(ref command) = self.command {
                validate_not_empty("server command", command)?;
            }
        }
        Ok(())
    }
}

/// One declarative REST endpoint exposed as a tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestEndpointConfig {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Path relative to the server's base URL; `{placeholder}` segments are
    /// substituted from call arguments.
    pub path: String,
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub headers: HashMap<String, String>,
    /// JSON-Schema object whose `properties` become the tool parameters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,
    /// JSON-Schema for a request body, appended as a `payload` property.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub response_transform: Vec<TransformStep>,
}

fn default_method() -> String {
    "GET".to_string()
}

/// One backend REST server described by declarative endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestServerConfig {
    pub identifier: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub url: String,
    #[serde(default, rename = "defaultHeaders", skip_serializing_if = "HashMap::is_empty")]
    pub default_headers: HashMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth: Option<AuthConfig>,
    #[serde(default)]
    pub endpoints: Vec<RestEndpointConfig>,
}

impl RestServerConfig {
    pub fn validate(&self) -> Result<(), CubiclerError> {
        validate_identifier("server identifier", &self.identifier)?;
        validate_not_empty("server name", &self.name)?;
        validate_http_url("server url", &self.url)?;
        for endpoint in &self.endpoints {
            validate_identifier("endpoint name", &endpoint.name)?;
            validate_not_empty("endpoint path", &endpoint.path)?;
        }
        Ok(())
    }
}

/// The providers document: MCP servers plus REST servers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProvidersConfig {
    #[serde(default, rename = "mcpServers")]
    pub mcp_servers: Vec<McpServerConfig>,
    #[serde(default, rename = "restServers")]
    pub rest_servers: Vec<RestServerConfig>,
}

impl ProvidersConfig {
    pub fn validate(&self) -> Result<(), CubiclerError> {
        let mut seen = std::collections::HashSet::new();
        for server in &self.mcp_servers {
            server.validate()?;
            if !seen.insert(server.identifier.clone()) {
                return Err(CubiclerError::Config(format!(
                    "duplicate server identifier: {}",
                    server.identifier
                )));
            }
        }
        for server in &self.rest_servers {
            server.validate()?;
            if !seen.insert(server.identifier.clone()) {
                return Err(CubiclerError::Config(format!(
                    "duplicate server identifier: {}",
                    server.identifier
                )));
            }
        }
        Ok(())
    }
}

/// Where an agent's prompt text comes from.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PromptSource {
    File { file: PathBuf },
    Url { url: String },
    Inline(String),
}

fn default_max_pool_size() -> usize {
    4
}

fn default_max_idle_time_ms() -> u64 {
    300_000
}

fn default_queue_max_size() -> usize {
    10
}

fn default_queue_timeout_ms() -> u64 {
    30_000
}

/// Stdio agent pool sizing and queueing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolConfig {
    #[serde(default = "default_max_pool_size")]
    pub max_pool_size: usize,
    /// Idle milliseconds after which a non-primary worker is reaped.
    #[serde(rename = "maxIdleTime", default = "default_max_idle_time_ms")]
    pub max_idle_time_ms: u64,
    #[serde(default = "default_queue_max_size")]
    pub queue_max_size: usize,
    #[serde(default = "default_queue_timeout_ms")]
    pub queue_timeout_ms: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_pool_size: default_max_pool_size(),
            max_idle_time_ms: default_max_idle_time_ms(),
            queue_max_size: default_queue_max_size(),
            queue_timeout_ms: default_queue_timeout_ms(),
        }
    }
}

/// One agent. Tool restrictions use fully qualified dotted names
/// (`<server-identifier>.<tool-name>`); server restrictions use identifiers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub identifier: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub transport: AgentTransportKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth: Option<AuthConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub env: HashMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cwd: Option<PathBuf>,
    /// In-process implementation name for `direct` transport.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<PromptSource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pooling: Option<PoolConfig>,
    #[serde(default, rename = "allowedServers", skip_serializing_if = "Vec::is_empty")]
    pub allowed_servers: Vec<String>,
    #[serde(default, rename = "allowedTools", skip_serializing_if = "Vec::is_empty")]
    pub allowed_tools: Vec<String>,
    #[serde(default, rename = "restrictedServers", skip_serializing_if = "Vec::is_empty")]
    pub restricted_servers: Vec<String>,
    #[serde(default, rename = "restrictedTools", skip_serializing_if = "Vec::is_empty")]
    pub restricted_tools: Vec<String>,
}

impl AgentConfig {
    pub fn validate(&self) -> Result<(), CubiclerError> {
        validate_identifier("agent identifier", &self.identifier)?;
        validate_not_empty("agent name", &self.name)?;
        match self.transport {
            AgentTransportKind::Http => {
                let url = self.url.as_deref().ok_or_else(|| {
                    CubiclerError::Config(format!(
                        "agent {}: http transport requires 'url'",
                        self.identifier
                    ))
                })?;
                validate_http_url("agent url", url)?;
            }
            AgentTransportKind::Stdio => {
                let command = self.command.as_deref().ok_or_else(|| {
                    CubiclerError::Config(format!(
                        "agent {}: stdio transport requires 'command'",
                        self.identifier
                    ))
                })?;
                validate_not_empty("agent command", command)?;
            }
            AgentTransportKind::Direct => {
                if self.provider.is_none() {
                    return Err(CubiclerError::Config(format!(
                        "agent {}: direct transport requires 'provider'",
                        self.identifier
                    )));
                }
            }
            AgentTransportKind::Sse => {}
        }
        Ok(())
    }
}

/// The agents document, with the shared base prompt and the fallback prompt
/// for agents that configure none.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentsConfig {
    #[serde(default, rename = "basePrompt", skip_serializing_if = "Option::is_none")]
    pub base_prompt: Option<String>,
    #[serde(default, rename = "defaultPrompt", skip_serializing_if = "Option::is_none")]
    pub default_prompt: Option<String>,
    #[serde(default)]
    pub agents: Vec<AgentConfig>,
}

impl AgentsConfig {
    pub fn validate(&self) -> Result<(), CubiclerError> {
        let mut seen = std::collections::HashSet::new();
        for agent in &self.agents {
            agent.validate()?;
            if !seen.insert(agent.identifier.clone()) {
                return Err(CubiclerError::Config(format!(
                    "duplicate agent identifier: {}",
                    agent.identifier
                )));
            }
        }
        Ok(())
    }

    pub fn get(&self, identifier: &str) -> Option<&AgentConfig> {
        self.agents.iter().find(|a| a.identifier == identifier)
    }
}

/// Webhook endpoint authentication.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WebhookAuthConfig {
    /// HMAC-SHA256 of the raw payload, checked against `x-signature-256`.
    Signature { secret: Secret },
    /// Static bearer token in the `Authorization` header.
    Bearer { token: Secret },
    /// Incoming bearer must equal the token the JWT helper holds.
    Jwt { config: JwtAuthConfig },
}

/// One webhook endpoint: who may call it, which agents it may trigger, and
/// how its payload is reshaped before dispatch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    pub identifier: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth: Option<WebhookAuthConfig>,
    #[serde(default)]
    pub agents: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub payload_transform: Vec<TransformStep>,
}

impl WebhookConfig {
    pub fn validate(&self) -> Result<(), CubiclerError> {
        validate_identifier("webhook identifier", &self.identifier)?;
        validate_not_empty("webhook name", &self.name)?;
        Ok(())
    }

    pub fn allows_agent(&self, agent_id: &str) -> bool {
        self.agents.iter().any(|a| a == agent_id)
    }
}

/// The webhooks document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WebhooksConfig {
    #[serde(default)]
    pub webhooks: Vec<WebhookConfig>,
}

impl WebhooksConfig {
    pub fn validate(&self) -> Result<(), CubiclerError> {
        let mut seen = std::collections::HashSet::new();
        for webhook in &self.webhooks {
            webhook.validate()?;
            if !seen.insert(webhook.identifier.clone()) {
                return Err(CubiclerError::Config(format!(
                    "duplicate webhook identifier: {}",
                    webhook.identifier
                )));
            }
        }
        Ok(())
    }

    pub fn get(&self, identifier: &str) -> Option<&WebhookConfig> {
        self.webhooks.iter().find(|w| w.identifier == identifier)
    }
}

/// One step of the declarative payload-transform pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransformStep {
    /// Dotted path; `[]` iterates arrays, `_root[]` addresses an array root.
    pub path: String,
    #[serde(flatten)]
    pub op: TransformOp,
}

/// The transform applied at a step's path.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "transform", rename_all = "snake_case")]
pub enum TransformOp {
    /// Replace the value via lookup of its string form; keep it if absent.
    Map { map: HashMap<String, Value> },
    /// Reformat an ISO-8601 timestamp using `YYYY`/`MM`/`DD`/`HH`/`mm`/`ss`.
    DateFormat { format: String },
    /// Replace `{value}` occurrences in the template with the string form.
    Template { template: String },
    /// Global regex replacement; an invalid pattern keeps the original.
    RegexReplace { pattern: String, replacement: String },
    /// Delete the addressed key or array entries.
    Remove,
}

fn validate_http_url(field: &str, value: &str) -> Result<(), CubiclerError> {
    let parsed = Url::parse(value)
        .map_err(|e| CubiclerError::Config(format!("{} is not a valid URL: {}", field, e)))?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(CubiclerError::Config(format!(
            "{} must be http or https, got {}",
            field, other
        ))),
    }
}
