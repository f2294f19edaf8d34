//! HTTP agent transport tests using wiremock.

use std::time::Duration;

use cubicler_core::transport::{AgentTransport, HttpAgentTransport};
use cubicler_types::agent::AgentInfo;
use cubicler_types::config::AgentConfig;
use cubicler_types::{AgentRequest, CubiclerError};
use serde_json::json;
use wiremock::matchers::{body_partial_json, method};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn agent_config(url: &str) -> AgentConfig {
    serde_json::from_value(json!({
        "identifier": "agent_1",
        "name": "Agent One",
        "transport": "http",
        "url": url
    }))
    .expect("config")
}

fn request() -> AgentRequest {
    AgentRequest {
        agent: AgentInfo {
            identifier: "agent_1".to_string(),
            name: "Agent One".to_string(),
            description: String::new(),
            prompt: "hi".to_string(),
        },
        tools: vec![],
        servers: vec![],
        messages: None,
        trigger: None,
    }
}

#[tokio::test]
async fn dispatch_posts_request_and_parses_response() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({ "agent": { "identifier": "agent_1" } })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "timestamp": "2024-01-01T00:00:00Z",
            "type": "text",
            "content": "hello back",
            "metadata": { "tokens": 12 }
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let transport =
        HttpAgentTransport::new(&agent_config(&mock_server.uri()), Duration::from_secs(5)).unwrap();
    let response = transport.dispatch(request()).await.unwrap();
    assert_eq!(response.content, "hello back");
    assert_eq!(response.metadata["tokens"], json!(12));
}

#[tokio::test]
async fn missing_response_fields_are_rejected() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "timestamp": "2024-01-01T00:00:00Z",
            "content": "incomplete"
        })))
        .mount(&mock_server)
        .await;

    let transport =
        HttpAgentTransport::new(&agent_config(&mock_server.uri()), Duration::from_secs(5)).unwrap();
    let error = transport.dispatch(request()).await.unwrap_err();
    assert!(error.to_string().contains("missing required fields"), "got: {}", error);
}

#[tokio::test]
async fn non_2xx_is_an_agent_error() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&mock_server)
        .await;

    let transport =
        HttpAgentTransport::new(&agent_config(&mock_server.uri()), Duration::from_secs(5)).unwrap();
    assert!(matches!(
        transport.dispatch(request()).await,
        Err(CubiclerError::Agent(_))
    ));
}
