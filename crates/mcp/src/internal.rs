//! Built-in tools served by Cubicler itself.
//!
//! Two tools with fixed schemas let agents explore the backend catalog:
//! `cubicler_available_servers` lists the registered servers with their
//! tool counts, and `cubicler_fetch_server_tools` returns one server's
//! tool definitions. Failures of individual backends degrade gracefully:
//! a failing server is omitted from `available_servers` results.

use async_trait::async_trait;
use cubicler_types::naming::external_tool_name;
use cubicler_types::{CubiclerError, ToolDefinition};
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::warn;

use crate::provider::{ProviderRegistry, ToolProvider};

pub const AVAILABLE_SERVERS_TOOL: &str = "cubicler_available_servers";
pub const FETCH_SERVER_TOOLS_TOOL: &str = "cubicler_fetch_server_tools";

/// Identifier the internal provider registers under.
pub const INTERNAL_PROVIDER_ID: &str = "cubicler";

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
struct FetchServerToolsParams {
    /// Identifier of the server whose tools to fetch.
    server_identifier: String,
}

pub struct InternalToolsProvider {
    registry: ProviderRegistry,
}

impl InternalToolsProvider {
    pub fn new(registry: ProviderRegistry) -> Self {
        Self { registry }
    }

    async fn available_servers(&self) -> Value {
        let mut servers = Vec::new();
        for provider in self.registry.snapshot().await {
            if provider.identifier() == INTERNAL_PROVIDER_ID {
                continue;
            }
            match provider.tools_list().await {
                Ok(tools) => servers.push(json!({
                    "identifier": provider.identifier(),
                    "name": provider.name(),
                    "description": provider.description(),
                    "toolsCount": tools.len(),
                })),
                Err(e) => {
                    // A failing backend is omitted rather than failing the
                    // whole catalog.
                    warn!(server = %provider.identifier(), error = %e, "omitting failing server");
                }
            }
        }
        json!({ "total": servers.len(), "servers": servers })
    }

    async fn fetch_server_tools(&self, args: Value) -> Result<Value, CubiclerError> {
        let params: FetchServerToolsParams = serde_json::from_value(args)
            .map_err(|e| CubiclerError::Validation(format!("invalid parameters: {}", e)))?;

        let provider = self
            .registry
            .get(&params.server_identifier)
            .await
            .ok_or_else(|| {
                CubiclerError::NotFound(format!("unknown server: {}", params.server_identifier))
            })?;

        let tools: Vec<ToolDefinition> = provider
            .tools_list()
            .await?
            .into_iter()
            .map(|tool| ToolDefinition {
                name: external_tool_name(provider.identifier(), &tool.name),
                ..tool
            })
            .collect();
        Ok(json!({ "tools": tools }))
    }
}

#[async_trait]
impl ToolProvider for InternalToolsProvider {
    fn identifier(&self) -> &str {
        INTERNAL_PROVIDER_ID
    }

    fn name(&self) -> &str {
        "Cubicler"
    }

    fn description(&self) -> &str {
        "Built-in server and tool discovery"
    }

    async fn initialize(&self) -> Result<(), CubiclerError> {
        Ok(())
    }

    async fn tools_list(&self) -> Result<Vec<ToolDefinition>, CubiclerError> {
        let fetch_schema = serde_json::to_value(schemars::schema_for!(FetchServerToolsParams))
            .map_err(|e| CubiclerError::Internal(format!("schema generation failed: {}", e)))?;
        Ok(vec![
            ToolDefinition::new(
                AVAILABLE_SERVERS_TOOL,
                "List the available servers with their tool counts",
                json!({ "type": "object", "properties": {} }),
            ),
            ToolDefinition::new(
                FETCH_SERVER_TOOLS_TOOL,
                "Fetch the tool definitions of one server",
                fetch_schema,
            ),
        ])
    }

    async fn tools_call(&self, tool: &str, args: Value) -> Result<Value, CubiclerError> {
        match tool {
            AVAILABLE_SERVERS_TOOL => Ok(self.available_servers().await),
            FETCH_SERVER_TOOLS_TOOL => self.fetch_server_tools(args).await,
            other => Err(CubiclerError::NotFound(format!("unknown internal tool: {}", other))),
        }
    }

    async fn can_handle(&self, tool: &str) -> bool {
        tool == AVAILABLE_SERVERS_TOOL || tool == FETCH_SERVER_TOOLS_TOOL
    }

    async fn close(&self) -> Result<(), CubiclerError> {
        Ok(())
    }
}
