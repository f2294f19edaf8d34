//! The MCP request router.
//!
//! Accepts JSON-RPC requests from agents and routes `initialize`,
//! `tools/list`, and `tools/call` across the registered providers. Tool
//! names are rewritten to their external form on aggregation; duplicate
//! external names keep the first writer and drop later ones with a
//! warning. When an agent context is supplied, the restriction filter is
//! applied to both the aggregated list and every call.

use std::collections::HashSet;

use cubicler_types::jsonrpc::{INTERNAL_ERROR, INVALID_PARAMS, INVALID_REQUEST, METHOD_NOT_FOUND};
use cubicler_types::naming::external_tool_name;
use cubicler_types::tool::text_content_envelope;
use cubicler_types::{
    AgentConfig, CubiclerError, McpRequest, McpResponse, ServerInfo, ToolDefinition,
};
use serde_json::{json, Value};
use tracing::warn;

use crate::internal::{AVAILABLE_SERVERS_TOOL, FETCH_SERVER_TOOLS_TOOL, INTERNAL_PROVIDER_ID};
use crate::provider::ProviderRegistry;
use crate::restriction::RestrictionFilter;

#[derive(Clone)]
pub struct McpRouter {
    registry: ProviderRegistry,
    filter: RestrictionFilter,
    strict_params: bool,
}

impl McpRouter {
    pub fn new(registry: ProviderRegistry) -> Self {
        Self { filter: RestrictionFilter::new(registry.clone()), registry, strict_params: false }
    }

    /// Reject requests whose `params` carry properties outside the MCP
    /// shape.
    pub fn with_strict_params(mut self, strict: bool) -> Self {
        self.strict_params = strict;
        self
    }

    pub fn restriction_filter(&self) -> &RestrictionFilter {
        &self.filter
    }

    /// Handle one JSON-RPC request. Never returns `Err`: every failure is
    /// mapped to a JSON-RPC error response with the original id.
    pub async fn handle_request(
        &self,
        agent: Option<&AgentConfig>,
        request: McpRequest,
    ) -> McpResponse {
        if let Err(e) = request.validate() {
            return McpResponse::error(request.id, INVALID_REQUEST, e.to_string());
        }

        let id = request.id.clone();
        match request.method.as_str() {
            "initialize" => {
                for provider in self.registry.snapshot().await {
                    if let Err(e) = provider.initialize().await {
                        warn!(server = %provider.identifier(), error = %e, "provider initialize failed");
                    }
                }
                McpResponse::success(
                    id,
                    json!({
                        "protocolVersion": crate::mcp_provider::MCP_PROTOCOL_VERSION,
                        "capabilities": { "tools": { "listChanged": true } },
                        "serverInfo": {
                            "name": "cubicler",
                            "version": env!("CARGO_PKG_VERSION"),
                        }
                    }),
                )
            }
            "tools/list" => {
                let tools = self.aggregated_tools(agent).await;
                McpResponse::success(id, json!({ "tools": tools }))
            }
            "tools/call" => {
                let params = request.params.unwrap_or_else(|| json!({}));
                let Some(name) = params.get("name").and_then(|n| n.as_str()) else {
                    return McpResponse::error(
                        id,
                        INVALID_PARAMS,
                        "Missing required parameter: name",
                    );
                };
                if self.strict_params {
                    if let Some(object) = params.as_object() {
                        if let Some(unknown) =
                            object.keys().find(|k| *k != "name" && *k != "arguments")
                        {
                            return McpResponse::error(
                                id,
                                INVALID_PARAMS,
                                format!("Unknown parameter: {}", unknown),
                            );
                        }
                    }
                }
                let args = params.get("arguments").cloned().unwrap_or_else(|| json!({}));

                match self.call_tool(agent, name, args).await {
                    Ok(result) => McpResponse::success(id, text_content_envelope(&result)),
                    Err(e) => {
                        // Keep the provider's canonical message; the enum
                        // prefix is for logs, not the wire.
                        let message = match &e {
                            CubiclerError::Mcp(inner) => inner.clone(),
                            other => other.to_string(),
                        };
                        McpResponse::error(id, INTERNAL_ERROR, message)
                    }
                }
            }
            other => {
                McpResponse::error(id, METHOD_NOT_FOUND, format!("Method not found: {}", other))
            }
        }
    }

    /// Aggregate every provider's tools under external names, first-writer
    /// wins on duplicates, filtered by the agent's restrictions when given.
    pub async fn aggregated_tools(&self, agent: Option<&AgentConfig>) -> Vec<ToolDefinition> {
        let mut seen: HashSet<String> = HashSet::new();
        let mut aggregated = Vec::new();

        for provider in self.registry.snapshot().await {
            let tools = match provider.tools_list().await {
                Ok(tools) => tools,
                Err(e) => {
                    warn!(server = %provider.identifier(), error = %e, "skipping provider in tools/list");
                    continue;
                }
            };
            for tool in tools {
                let external = if provider.identifier() == INTERNAL_PROVIDER_ID {
                    tool.name.clone()
                } else {
                    external_tool_name(provider.identifier(), &tool.name)
                };
                if !seen.insert(external.clone()) {
                    warn!(tool = %external, "dropping duplicate tool name");
                    continue;
                }
                if let Some(agent) = agent {
                    if !self.filter.is_tool_allowed(agent, &external).await {
                        continue;
                    }
                }
                aggregated.push(ToolDefinition { name: external, ..tool });
            }
        }
        aggregated
    }

    /// The server catalog, restriction-filtered when an agent is given.
    /// The internal provider is not part of the catalog.
    pub async fn available_servers(&self, agent: Option<&AgentConfig>) -> Vec<ServerInfo> {
        let mut servers = Vec::new();
        for provider in self.registry.snapshot().await {
            if provider.identifier() == INTERNAL_PROVIDER_ID {
                continue;
            }
            if let Some(agent) = agent {
                if !crate::restriction::is_server_allowed(agent, provider.identifier()) {
                    continue;
                }
            }
            servers.push(ServerInfo {
                identifier: provider.identifier().to_string(),
                name: provider.name().to_string(),
                description: provider.description().to_string(),
            });
        }
        servers
    }

    /// Invoke one tool by external name, applying restriction checks for
    /// the agent when given. This is also the client surface handed to
    /// in-process (direct) agents.
    pub async fn call_tool(
        &self,
        agent: Option<&AgentConfig>,
        name: &str,
        args: Value,
    ) -> Result<Value, CubiclerError> {
        if let Some(agent) = agent {
            self.filter.validate_tool_access(agent, name).await?;
            if name == FETCH_SERVER_TOOLS_TOOL {
                if let Some(server_id) = args.get("serverIdentifier").and_then(|s| s.as_str()) {
                    RestrictionFilter::validate_server_access(agent, server_id)?;
                }
            }
        }

        for provider in self.registry.snapshot().await {
            if provider.can_handle(name).await {
                let mut result = provider.tools_call(name, args).await?;
                if let Some(agent) = agent {
                    self.filter_internal_result(agent, name, &mut result).await;
                }
                return Ok(result);
            }
        }
        Err(CubiclerError::Mcp(format!("No provider found for tool: {}", name)))
    }

    /// The internal discovery tools return catalogs too; they get the same
    /// restriction filtering as the aggregated list and server catalog.
    async fn filter_internal_result(&self, agent: &AgentConfig, name: &str, result: &mut Value) {
        match name {
            AVAILABLE_SERVERS_TOOL => {
                let total = match result.get_mut("servers") {
                    Some(Value::Array(servers)) => {
                        servers.retain(|server| {
                            server
                                .get("identifier")
                                .and_then(|id| id.as_str())
                                .is_some_and(|id| {
                                    crate::restriction::is_server_allowed(agent, id)
                                })
                        });
                        Some(servers.len())
                    }
                    _ => None,
                };
                if let (Some(total), Some(object)) = (total, result.as_object_mut()) {
                    object.insert("total".to_string(), json!(total));
                }
            }
            FETCH_SERVER_TOOLS_TOOL => {
                if let Some(Value::Array(tools)) = result.get_mut("tools") {
                    let mut allowed = Vec::with_capacity(tools.len());
                    for tool in tools.drain(..) {
                        let keep = match tool.get("name").and_then(|n| n.as_str()) {
                            Some(external) => self.filter.is_tool_allowed(agent, external).await,
                            None => false,
                        };
                        if keep {
                            allowed.push(tool);
                        }
                    }
                    *tools = allowed;
                }
            }
            _ => {}
        }
    }
}
