//! Provider wrapping one backend MCP server.
//!
//! Owns the server's transport exclusively. `initialize` performs the MCP
//! handshake upstream and warms the tool-list cache; the cache is keyed by
//! config hash so a reloaded configuration invalidates it.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use cubicler_transport::{create_transport, McpTransport};
use cubicler_types::config::McpServerConfig;
use cubicler_types::naming::{config_hash, decode_external_name, server_hash};
use cubicler_types::{CubiclerError, McpRequest, McpResponse, ToolDefinition};
use serde_json::{json, Value};
use tokio::sync::RwLock;
use tracing::debug;

/// MCP protocol revision spoken upstream and advertised downstream.
pub const MCP_PROTOCOL_VERSION: &str = "2024-11-05";

struct CachedTools {
    tools: Vec<ToolDefinition>,
    config_hash: String,
}

pub struct McpProvider {
    config: McpServerConfig,
    hash: String,
    // Reads (send) run concurrently; initialize/close take the write half.
    transport: RwLock<Box<dyn McpTransport>>,
    tools: RwLock<Option<CachedTools>>,
    next_id: AtomicI64,
}

impl McpProvider {
    pub fn new(config: McpServerConfig, call_timeout: Duration) -> Result<Self, CubiclerError> {
        config.validate()?;
        let transport = create_transport(&config, call_timeout)?;
        Ok(Self {
            hash: server_hash(&config.identifier),
            config,
            transport: RwLock::new(transport),
            tools: RwLock::new(None),
            next_id: AtomicI64::new(1),
        })
    }

    pub fn server_hash(&self) -> &str {
        &self.hash
    }

    async fn request(&self, method: &str, params: Option<Value>) -> Result<Value, CubiclerError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let request = McpRequest::new(id, method, params);
        let response: McpResponse = self.transport.read().await.send(request).await?;
        if let Some(error) = response.error {
            return Err(CubiclerError::Mcp(error.message));
        }
        response
            .result
            .ok_or_else(|| CubiclerError::Mcp("response carried neither result nor error".to_string()))
    }

    async fn fetch_tools(&self) -> Result<Vec<ToolDefinition>, CubiclerError> {
        let result = self.request("tools/list", None).await?;
        let tools_value = result
            .get("tools")
            .cloned()
            .ok_or_else(|| CubiclerError::Mcp("tools/list result missing 'tools'".to_string()))?;
        serde_json::from_value(tools_value)
            .map_err(|e| CubiclerError::JsonDecode(format!("invalid tool list: {}", e)))
    }

    async fn cached_or_fetch_tools(&self) -> Result<Vec<ToolDefinition>, CubiclerError> {
        let current_hash = config_hash(&self.config);
        {
            let cache = self.tools.read().await;
            if let Some(ref cached) = *cache {
                if cached.config_hash == current_hash {
                    return Ok(cached.tools.clone());
                }
            }
        }

        let tools = self.fetch_tools().await?;
        debug!(server = %self.config.identifier, count = tools.len(), "cached tool list");
        *self.tools.write().await = Some(CachedTools { tools: tools.clone(), config_hash: current_hash });
        Ok(tools)
    }
}

#[async_trait]
impl super::ToolProvider for McpProvider {
    fn identifier(&self) -> &str {
        &self.config.identifier
    }

    fn name(&self) -> &str {
        &self.config.name
    }

    fn description(&self) -> &str {
        &self.config.description
    }

    async fn initialize(&self) -> Result<(), CubiclerError> {
        self.transport.write().await.initialize().await?;

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let request = McpRequest::new(
            id,
            "initialize",
            Some(json!({
                "protocolVersion": MCP_PROTOCOL_VERSION,
                "capabilities": {},
                "clientInfo": {
                    "name": "cubicler",
                    "version": env!("CARGO_PKG_VERSION"),
                }
            })),
        );
        let response = self.transport.read().await.send(request).await?;
        if let Some(error) = response.error {
            return Err(CubiclerError::Mcp(error.message));
        }

        // Warm the cache; a failure here is not fatal to initialization.
        if let Err(e) = self.cached_or_fetch_tools().await {
            debug!(server = %self.config.identifier, error = %e, "tool list warmup failed");
        }
        Ok(())
    }

    async fn tools_list(&self) -> Result<Vec<ToolDefinition>, CubiclerError> {
        self.cached_or_fetch_tools().await
    }

    async fn tools_call(&self, tool: &str, args: Value) -> Result<Value, CubiclerError> {
        let local = match decode_external_name(tool) {
            Some((hash, local)) if hash == self.hash => local,
            _ => {
                return Err(CubiclerError::Mcp(format!(
                    "tool {} does not belong to this provider",
                    tool
                )))
            }
        };

        let result = self
            .request("tools/call", Some(json!({ "name": local, "arguments": args })))
            .await?;

        // The MCP result envelope carries text content; a JSON payload
        // travels as a JSON string inside it.
        let text = result
            .get("content")
            .and_then(|content| content.get(0))
            .and_then(|entry| entry.get("text"))
            .and_then(|text| text.as_str());
        match text {
            Some(text) => match serde_json::from_str::<Value>(text) {
                Ok(parsed) => Ok(parsed),
                Err(_) => Ok(Value::String(text.to_string())),
            },
            None => Ok(result),
        }
    }

    async fn can_handle(&self, tool: &str) -> bool {
        let Some((hash, local)) = decode_external_name(tool) else {
            return false;
        };
        if hash != self.hash {
            return false;
        }
        match self.cached_or_fetch_tools().await {
            Ok(tools) => tools.iter().any(|t| t.name == local),
            Err(_) => false,
        }
    }

    async fn close(&self) -> Result<(), CubiclerError> {
        self.transport.write().await.close().await
    }
}
