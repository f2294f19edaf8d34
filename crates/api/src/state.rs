//! Process wiring: build services top-down at startup, shut down
//! bottom-up.

use std::collections::HashMap;
use std::sync::Arc;

use cubicler_core::direct::{DirectAgent, DirectAgentTransport};
use cubicler_core::dispatch::DispatchService;
use cubicler_core::prompt::PromptProvider;
use cubicler_core::transport::{
    AgentTransport, HttpAgentTransport, SseAgentHub, SseAgentTransport, StdioAgentTransport,
};
use cubicler_mcp::provider::ProviderRegistry;
use cubicler_mcp::{InternalToolsProvider, McpProvider, McpRouter, RestProvider};
use cubicler_types::config::AgentTransportKind;
use cubicler_types::CubiclerError;
use tracing::{info, warn};

use crate::config::{ConfigProvider, Settings};
use crate::webhook::WebhookService;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub config: Arc<ConfigProvider>,
    pub registry: ProviderRegistry,
    pub router: McpRouter,
    pub dispatch: Arc<DispatchService>,
    pub sse_hub: SseAgentHub,
    pub webhooks: WebhookService,
}

/// Build the full service graph from settings. `direct_agents` supplies
/// in-process implementations, keyed by the `provider` names agent configs
/// refer to.
pub async fn build_state(
    settings: Settings,
    direct_agents: HashMap<String, Arc<dyn DirectAgent>>,
) -> Result<AppState, CubiclerError> {
    let settings = Arc::new(settings);
    let config = Arc::new(ConfigProvider::new(&settings)?);

    // Providers: internal first, then MCP, then REST; the registry order is
    // the aggregation order.
    let registry = ProviderRegistry::new();
    registry
        .register(Arc::new(InternalToolsProvider::new(registry.clone())))
        .await;

    let providers = config.providers().await?;
    for server in &providers.mcp_servers {
        let provider = McpProvider::new(server.clone(), settings.provider_call_timeout)?;
        registry.register(Arc::new(provider)).await;
    }
    for server in &providers.rest_servers {
        let provider = RestProvider::new(server.clone(), settings.provider_call_timeout)?;
        registry.register(Arc::new(provider)).await;
    }

    let router = McpRouter::new(registry.clone()).with_strict_params(settings.strict_params);
    let sse_hub = SseAgentHub::new(settings.agent_call_timeout);
    let prompts = PromptProvider::new(settings.config_timeout)?;
    let dispatch = Arc::new(DispatchService::new(router.clone(), config.clone(), prompts));

    // One transport per agent identifier.
    let agents = config.agents().await?;
    for agent in &agents.agents {
        let transport: Arc<dyn AgentTransport> = match agent.transport {
            AgentTransportKind::Http => {
                Arc::new(HttpAgentTransport::new(agent, settings.agent_call_timeout)?)
            }
            AgentTransportKind::Sse => {
                Arc::new(SseAgentTransport::new(&agent.identifier, sse_hub.clone()))
            }
            AgentTransportKind::Stdio => {
                Arc::new(StdioAgentTransport::new(agent, settings.agent_call_timeout)?)
            }
            AgentTransportKind::Direct => {
                let provider_name = agent.provider.as_deref().unwrap_or_default();
                let Some(implementation) = direct_agents.get(provider_name) else {
                    warn!(
                        agent = %agent.identifier,
                        provider = %provider_name,
                        "no direct agent implementation registered, skipping"
                    );
                    continue;
                };
                Arc::new(DirectAgentTransport::new(
                    Arc::clone(implementation),
                    router.clone(),
                    agent.clone(),
                ))
            }
        };
        if let Err(e) = transport.start().await {
            warn!(agent = %agent.identifier, error = %e, "agent transport failed to start");
        }
        dispatch.register_transport(&agent.identifier, transport).await;
    }

    info!(
        agents = agents.agents.len(),
        mcp_servers = providers.mcp_servers.len(),
        rest_servers = providers.rest_servers.len(),
        "cubicler state ready"
    );

    Ok(AppState {
        settings,
        config,
        registry,
        router,
        dispatch,
        sse_hub,
        webhooks: WebhookService::new(),
    })
}

/// Tear down bottom-up: agent transports, then providers, then caches.
pub async fn shutdown_state(state: &AppState) {
    for agent_id in state.dispatch.registered_agents().await {
        if let Some(transport) = state.dispatch.transport(&agent_id).await {
            if let Err(e) = transport.stop().await {
                warn!(agent = %agent_id, error = %e, "agent transport shutdown failed");
            }
        }
    }
    for provider in state.registry.snapshot().await {
        if let Err(e) = provider.close().await {
            warn!(server = %provider.identifier(), error = %e, "provider shutdown failed");
        }
    }
    state.config.clear().await;
    info!("cubicler state shut down");
}
