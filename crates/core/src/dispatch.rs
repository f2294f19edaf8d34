//! The dispatch service: compose prompt + tool catalog, invoke the agent's
//! transport, hand back its response.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use cubicler_mcp::McpRouter;
use cubicler_types::agent::AgentInfo;
use cubicler_types::config::{AgentConfig, AgentsConfig};
use cubicler_types::{AgentRequest, AgentResponse, CubiclerError, Message, Trigger};
use tokio::sync::RwLock;

use crate::prompt::{InvocationContext, PromptProvider};
use crate::transport::AgentTransport;

/// Source of the current agents document. Implemented by the configuration
/// provider at the edge.
#[async_trait]
pub trait AgentsSource: Send + Sync {
    async fn agents_config(&self) -> Result<AgentsConfig, CubiclerError>;
}

pub struct DispatchService {
    router: McpRouter,
    agents: Arc<dyn AgentsSource>,
    prompts: PromptProvider,
    transports: RwLock<HashMap<String, Arc<dyn AgentTransport>>>,
}

impl DispatchService {
    pub fn new(router: McpRouter, agents: Arc<dyn AgentsSource>, prompts: PromptProvider) -> Self {
        Self { router, agents, prompts, transports: RwLock::new(HashMap::new()) }
    }

    /// Attach the transport owned by an agent identifier.
    pub async fn register_transport(&self, agent_id: &str, transport: Arc<dyn AgentTransport>) {
        self.transports.write().await.insert(agent_id.to_string(), transport);
    }

    pub async fn transport(&self, agent_id: &str) -> Option<Arc<dyn AgentTransport>> {
        self.transports.read().await.get(agent_id).cloned()
    }

    pub async fn registered_agents(&self) -> Vec<String> {
        self.transports.read().await.keys().cloned().collect()
    }

    /// Dispatch a message conversation. Without an agent id the first
    /// configured agent takes the call.
    pub async fn dispatch(
        &self,
        agent_id: Option<&str>,
        messages: Vec<Message>,
    ) -> Result<AgentResponse, CubiclerError> {
        if messages.is_empty() {
            return Err(CubiclerError::Validation("messages must not be empty".to_string()));
        }
        let config = self.agents.agents_config().await?;
        let agent = self.resolve_agent(&config, agent_id)?.clone();

        let request = self
            .build_request(&config, &agent, Some(messages), None, &InvocationContext::Messages)
            .await?;
        self.deliver(&agent, request).await
    }

    /// Dispatch a webhook trigger to one authorized agent.
    pub async fn dispatch_webhook(
        &self,
        agent_id: &str,
        trigger: Trigger,
    ) -> Result<AgentResponse, CubiclerError> {
        let config = self.agents.agents_config().await?;
        let agent = self.resolve_agent(&config, Some(agent_id))?.clone();

        let context_trigger = trigger.clone();
        let request = self
            .build_request(
                &config,
                &agent,
                None,
                Some(trigger),
                &InvocationContext::Webhook(&context_trigger),
            )
            .await?;
        self.deliver(&agent, request).await
    }

    fn resolve_agent<'a>(
        &self,
        config: &'a AgentsConfig,
        agent_id: Option<&str>,
    ) -> Result<&'a AgentConfig, CubiclerError> {
        match agent_id {
            Some(id) => config
                .get(id)
                .ok_or_else(|| CubiclerError::NotFound(format!("unknown agent: {}", id))),
            None => config
                .agents
                .first()
                .ok_or_else(|| CubiclerError::NotFound("no agents configured".to_string())),
        }
    }

    async fn build_request(
        &self,
        config: &AgentsConfig,
        agent: &AgentConfig,
        messages: Option<Vec<Message>>,
        trigger: Option<Trigger>,
        context: &InvocationContext<'_>,
    ) -> Result<AgentRequest, CubiclerError> {
        let prompt = self.prompts.resolve(config, agent, context).await?;
        let tools = self.router.aggregated_tools(Some(agent)).await;
        let servers = self.router.available_servers(Some(agent)).await;

        let request = AgentRequest {
            agent: AgentInfo {
                identifier: agent.identifier.clone(),
                name: agent.name.clone(),
                description: agent.description.clone(),
                prompt,
            },
            tools,
            servers,
            messages,
            trigger,
        };
        request.validate()?;
        Ok(request)
    }

    async fn deliver(
        &self,
        agent: &AgentConfig,
        request: AgentRequest,
    ) -> Result<AgentResponse, CubiclerError> {
        let transport = self.transport(&agent.identifier).await.ok_or_else(|| {
            CubiclerError::NotFound(format!("no transport for agent: {}", agent.identifier))
        })?;
        // The transport's validation and timeout errors propagate as-is.
        transport.dispatch(request).await
    }
}
