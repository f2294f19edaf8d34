//! Dispatch service composition tests with stub transports.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use cubicler_core::dispatch::{AgentsSource, DispatchService};
use cubicler_core::prompt::PromptProvider;
use cubicler_core::transport::AgentTransport;
use cubicler_mcp::internal::InternalToolsProvider;
use cubicler_mcp::provider::ProviderRegistry;
use cubicler_mcp::McpRouter;
use cubicler_types::config::AgentsConfig;
use cubicler_types::{
    AgentRequest, AgentResponse, CubiclerError, Message, MessageSender, Trigger,
};
use serde_json::json;
use tokio::sync::Mutex;

struct FixedAgents(AgentsConfig);

#[async_trait]
impl AgentsSource for FixedAgents {
    async fn agents_config(&self) -> Result<AgentsConfig, CubiclerError> {
        Ok(self.0.clone())
    }
}

/// Records the request it receives and answers with a canned response.
struct RecordingTransport {
    seen: Mutex<Option<AgentRequest>>,
}

impl RecordingTransport {
    fn new() -> Arc<Self> {
        Arc::new(Self { seen: Mutex::new(None) })
    }
}

#[async_trait]
impl AgentTransport for RecordingTransport {
    async fn dispatch(&self, request: AgentRequest) -> Result<AgentResponse, CubiclerError> {
        *self.seen.lock().await = Some(request);
        Ok(AgentResponse {
            timestamp: Utc::now(),
            kind: "text".to_string(),
            content: "done".to_string(),
            metadata: json!({}),
        })
    }
}

fn agents_config() -> AgentsConfig {
    serde_json::from_value(json!({
        "basePrompt": "You work for Cubicler.",
        "defaultPrompt": "Be helpful.",
        "agents": [{
            "identifier": "agent_1",
            "name": "Agent One",
            "transport": "http",
            "url": "http://localhost:9/agent"
        }]
    }))
    .expect("config")
}

async fn service() -> (DispatchService, Arc<RecordingTransport>) {
    let registry = ProviderRegistry::new();
    registry
        .register(Arc::new(InternalToolsProvider::new(registry.clone())))
        .await;
    let router = McpRouter::new(registry);
    let service = DispatchService::new(
        router,
        Arc::new(FixedAgents(agents_config())),
        PromptProvider::new(Duration::from_secs(2)).unwrap(),
    );
    let transport = RecordingTransport::new();
    service.register_transport("agent_1", transport.clone()).await;
    (service, transport)
}

fn message(content: &str) -> Message {
    Message {
        sender: MessageSender { id: "user_1".to_string(), name: None },
        timestamp: None,
        kind: "text".to_string(),
        content: content.to_string(),
    }
}

#[tokio::test]
async fn dispatch_builds_request_with_prompt_tools_and_servers() {
    let (service, transport) = service().await;

    let response = service.dispatch(Some("agent_1"), vec![message("hello")]).await.unwrap();
    assert_eq!(response.content, "done");

    let seen = transport.seen.lock().await.clone().expect("request delivered");
    assert_eq!(seen.agent.identifier, "agent_1");
    assert!(seen.agent.prompt.starts_with("You work for Cubicler."));
    assert!(seen.agent.prompt.contains("Be helpful."));
    assert!(seen.agent.prompt.contains("## Invocation Context"));
    // The internal discovery tools are always in the catalog.
    assert!(seen.tools.iter().any(|t| t.name == "cubicler_available_servers"));
    assert_eq!(seen.messages.as_ref().unwrap().len(), 1);
    assert!(seen.trigger.is_none());
}

#[tokio::test]
async fn dispatch_without_agent_id_uses_first_configured_agent() {
    let (service, transport) = service().await;
    service.dispatch(None, vec![message("hello")]).await.unwrap();
    let seen = transport.seen.lock().await.clone().unwrap();
    assert_eq!(seen.agent.identifier, "agent_1");
}

#[tokio::test]
async fn dispatch_rejects_empty_messages() {
    let (service, _) = service().await;
    assert!(matches!(
        service.dispatch(Some("agent_1"), vec![]).await,
        Err(CubiclerError::Validation(_))
    ));
}

#[tokio::test]
async fn dispatch_to_unknown_agent_is_not_found() {
    let (service, _) = service().await;
    assert!(matches!(
        service.dispatch(Some("nope"), vec![message("hello")]).await,
        Err(CubiclerError::NotFound(_))
    ));
}

#[tokio::test]
async fn webhook_dispatch_carries_the_trigger() {
    let (service, transport) = service().await;
    let trigger = Trigger::webhook("github", "GitHub", "push events", json!({ "a": 1 }));

    service.dispatch_webhook("agent_1", trigger).await.unwrap();

    let seen = transport.seen.lock().await.clone().unwrap();
    let trigger = seen.trigger.expect("trigger present");
    assert_eq!(trigger.identifier, "github");
    assert_eq!(trigger.payload, json!({ "a": 1 }));
    assert!(seen.messages.is_none());
    assert!(seen.agent.prompt.contains("triggered by webhook GitHub (github)"));
}
