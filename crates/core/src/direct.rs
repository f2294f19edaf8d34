//! In-process (direct) agents.
//!
//! A direct agent is embedded in the Cubicler process, typically a thin
//! wrapper over an LLM SDK. It gets two dual surfaces: the *server* side is
//! the usual `AgentTransport` (start/stop are no-ops), and the *client*
//! side is a tool-call handle that routes through the MCP router with the
//! agent's restrictions applied.

use std::sync::Arc;

use async_trait::async_trait;
use cubicler_mcp::McpRouter;
use cubicler_types::config::AgentConfig;
use cubicler_types::{AgentRequest, AgentResponse, CubiclerError};
use serde_json::Value;

use crate::transport::AgentTransport;

/// Tool-call surface handed to a direct agent implementation.
#[async_trait]
pub trait AgentToolClient: Send + Sync {
    async fn call_tool(&self, name: &str, args: Value) -> Result<Value, CubiclerError>;
}

/// An in-process agent implementation. Concrete providers translate
/// `AgentRequest` into provider-native messages and may call tools through
/// the supplied client while producing their answer.
#[async_trait]
pub trait DirectAgent: Send + Sync {
    async fn dispatch(
        &self,
        request: AgentRequest,
        tools: &dyn AgentToolClient,
    ) -> Result<AgentResponse, CubiclerError>;
}

/// Router-backed tool client enforcing the agent's restrictions.
pub struct RouterToolClient {
    router: McpRouter,
    agent: AgentConfig,
}

impl RouterToolClient {
    pub fn new(router: McpRouter, agent: AgentConfig) -> Self {
        Self { router, agent }
    }
}

#[async_trait]
impl AgentToolClient for RouterToolClient {
    async fn call_tool(&self, name: &str, args: Value) -> Result<Value, CubiclerError> {
        self.router.call_tool(Some(&self.agent), name, args).await
    }
}

/// `AgentTransport` adapter for a direct agent.
pub struct DirectAgentTransport {
    agent: Arc<dyn DirectAgent>,
    tools: RouterToolClient,
}

impl DirectAgentTransport {
    pub fn new(agent: Arc<dyn DirectAgent>, router: McpRouter, config: AgentConfig) -> Self {
        Self { agent, tools: RouterToolClient::new(router, config) }
    }
}

#[async_trait]
impl AgentTransport for DirectAgentTransport {
    async fn dispatch(&self, request: AgentRequest) -> Result<AgentResponse, CubiclerError> {
        self.agent.dispatch(request, &self.tools).await
    }
}
