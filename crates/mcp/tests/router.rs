//! Router aggregation, restriction, and error-mapping tests.

use async_trait::async_trait;
use cubicler_mcp::internal::InternalToolsProvider;
use cubicler_mcp::provider::{ProviderRegistry, ToolProvider};
use cubicler_mcp::router::McpRouter;
use cubicler_types::jsonrpc::{INTERNAL_ERROR, INVALID_PARAMS, METHOD_NOT_FOUND};
use cubicler_types::naming::{external_tool_name, server_hash};
use cubicler_types::{AgentConfig, CubiclerError, McpRequest, ToolDefinition};
use serde_json::{json, Value};
use std::sync::Arc;

struct StubProvider {
    identifier: String,
    display_name: String,
    tools: Vec<ToolDefinition>,
    failing: bool,
}

impl StubProvider {
    fn new(identifier: &str, tools: &[&str]) -> Self {
        Self {
            identifier: identifier.to_string(),
            display_name: identifier.replace('_', " "),
            tools: tools
                .iter()
                .map(|name| ToolDefinition::new(*name, "", json!({ "type": "object" })))
                .collect(),
            failing: false,
        }
    }

    fn failing(identifier: &str) -> Self {
        let mut stub = Self::new(identifier, &[]);
        stub.failing = true;
        stub
    }
}

#[async_trait]
impl ToolProvider for StubProvider {
    fn identifier(&self) -> &str {
        &self.identifier
    }

    fn name(&self) -> &str {
        &self.display_name
    }

    fn description(&self) -> &str {
        ""
    }

    async fn initialize(&self) -> Result<(), CubiclerError> {
        Ok(())
    }

    async fn tools_list(&self) -> Result<Vec<ToolDefinition>, CubiclerError> {
        if self.failing {
            return Err(CubiclerError::Transport("unreachable".to_string()));
        }
        Ok(self.tools.clone())
    }

    async fn tools_call(&self, tool: &str, args: Value) -> Result<Value, CubiclerError> {
        Ok(json!({ "tool": tool, "args": args }))
    }

    async fn can_handle(&self, tool: &str) -> bool {
        match cubicler_types::naming::decode_external_name(tool) {
            Some((hash, local)) => {
                hash == server_hash(&self.identifier) && self.tools.iter().any(|t| t.name == local)
            }
            None => false,
        }
    }

    async fn close(&self) -> Result<(), CubiclerError> {
        Ok(())
    }
}

async fn build_router(providers: Vec<Arc<dyn ToolProvider>>) -> McpRouter {
    let registry = ProviderRegistry::new();
    registry
        .register(Arc::new(InternalToolsProvider::new(registry.clone())))
        .await;
    for provider in providers {
        registry.register(provider).await;
    }
    McpRouter::new(registry)
}

fn agent(extra: Value) -> AgentConfig {
    let mut base = json!({
        "identifier": "agent_1",
        "name": "Agent One",
        "transport": "sse"
    });
    base.as_object_mut().unwrap().extend(extra.as_object().unwrap().clone());
    serde_json::from_value(base).unwrap()
}

#[tokio::test]
async fn tools_list_aggregates_internal_and_provider_tools() {
    let router = build_router(vec![
        Arc::new(StubProvider::new("weather_service", &["get_weather", "get_forecast"])),
        Arc::new(StubProvider::new("news_service", &["get_headlines"])),
    ])
    .await;

    let response = router
        .handle_request(None, McpRequest::new(1, "tools/list", None))
        .await;
    let tools = response.result.unwrap()["tools"].as_array().unwrap().clone();
    let names: Vec<String> =
        tools.iter().map(|t| t["name"].as_str().unwrap().to_string()).collect();

    let expected = vec![
        "cubicler_available_servers".to_string(),
        "cubicler_fetch_server_tools".to_string(),
        external_tool_name("weather_service", "get_weather"),
        external_tool_name("weather_service", "get_forecast"),
        external_tool_name("news_service", "get_headlines"),
    ];
    assert_eq!(names, expected);
}

#[tokio::test]
async fn failing_provider_is_skipped_not_fatal() {
    let router = build_router(vec![
        Arc::new(StubProvider::failing("broken_service")),
        Arc::new(StubProvider::new("news_service", &["get_headlines"])),
    ])
    .await;

    let tools = router.aggregated_tools(None).await;
    assert!(tools.iter().any(|t| t.name == external_tool_name("news_service", "get_headlines")));
    assert!(!tools.iter().any(|t| t.name.contains(&server_hash("broken_service"))));
}

#[tokio::test]
async fn duplicate_external_names_keep_first_writer() {
    let router = build_router(vec![
        Arc::new(StubProvider::new("weather_service", &["get_weather"])),
        Arc::new(StubProvider::new("weather_service", &["get_weather"])),
    ])
    .await;

    let tools = router.aggregated_tools(None).await;
    let expected = external_tool_name("weather_service", "get_weather");
    assert_eq!(tools.iter().filter(|t| t.name == expected).count(), 1);
}

#[tokio::test]
async fn restricted_tools_are_filtered_from_the_list() {
    let router =
        build_router(vec![Arc::new(StubProvider::new("weather_service", &["get_weather"]))]).await;
    let agent = agent(json!({ "restrictedTools": ["weather_service.get_weather"] }));

    let tools = router.aggregated_tools(Some(&agent)).await;
    assert!(!tools
        .iter()
        .any(|t| t.name == external_tool_name("weather_service", "get_weather")));
    // Internal tools stay visible.
    assert!(tools.iter().any(|t| t.name == "cubicler_available_servers"));
}

#[tokio::test]
async fn fetch_server_tools_for_disallowed_server_is_denied() {
    let router = build_router(vec![
        Arc::new(StubProvider::new("weather_service", &["get_weather"])),
        Arc::new(StubProvider::new("news_service", &["get_headlines"])),
    ])
    .await;
    let agent = agent(json!({ "allowedServers": ["news_service"] }));

    let request = McpRequest::new(
        1,
        "tools/call",
        Some(json!({
            "name": "cubicler_fetch_server_tools",
            "arguments": { "serverIdentifier": "weather_service" }
        })),
    );
    let response = router.handle_request(Some(&agent), request).await;
    let error = response.error.expect("denied");
    assert_eq!(error.code, INTERNAL_ERROR);
    assert_eq!(
        error.message,
        "Access denied: insufficient permissions for requested operation"
    );
}

#[tokio::test]
async fn tools_call_wraps_result_in_content_envelope() {
    let router =
        build_router(vec![Arc::new(StubProvider::new("weather_service", &["get_weather"]))]).await;
    let name = external_tool_name("weather_service", "get_weather");

    let request = McpRequest::new(
        1,
        "tools/call",
        Some(json!({ "name": name, "arguments": { "city": "Oslo" } })),
    );
    let response = router.handle_request(None, request).await;
    let result = response.result.unwrap();
    let text = result["content"][0]["text"].as_str().unwrap();
    let parsed: Value = serde_json::from_str(text).unwrap();
    assert_eq!(parsed["args"]["city"], json!("Oslo"));
}

#[tokio::test]
async fn missing_name_is_invalid_params() {
    let router = build_router(vec![]).await;
    let request = McpRequest::new(1, "tools/call", Some(json!({ "arguments": {} })));
    let response = router.handle_request(None, request).await;
    let error = response.error.unwrap();
    assert_eq!(error.code, INVALID_PARAMS);
    assert_eq!(error.message, "Missing required parameter: name");
}

#[tokio::test]
async fn unknown_tool_reports_no_provider() {
    let router = build_router(vec![]).await;
    let request =
        McpRequest::new(1, "tools/call", Some(json!({ "name": "abc123_missing" })));
    let response = router.handle_request(None, request).await;
    let error = response.error.unwrap();
    assert_eq!(error.code, INTERNAL_ERROR);
    assert_eq!(error.message, "No provider found for tool: abc123_missing");
}

#[tokio::test]
async fn unknown_method_is_method_not_found() {
    let router = build_router(vec![]).await;
    let response = router
        .handle_request(None, McpRequest::new(1, "resources/list", None))
        .await;
    assert_eq!(response.error.unwrap().code, METHOD_NOT_FOUND);
}

#[tokio::test]
async fn initialize_reports_protocol_and_capabilities() {
    let router = build_router(vec![]).await;
    let response = router
        .handle_request(None, McpRequest::new(1, "initialize", None))
        .await;
    let result = response.result.unwrap();
    assert_eq!(result["protocolVersion"], json!("2024-11-05"));
    assert_eq!(result["capabilities"]["tools"]["listChanged"], json!(true));
    assert_eq!(result["serverInfo"]["name"], json!("cubicler"));
}

#[tokio::test]
async fn available_servers_tool_degrades_gracefully() {
    let router = build_router(vec![
        Arc::new(StubProvider::new("news_service", &["get_headlines"])),
        Arc::new(StubProvider::failing("broken_service")),
    ])
    .await;

    let result = router
        .call_tool(None, "cubicler_available_servers", json!({}))
        .await
        .unwrap();
    assert_eq!(result["total"], json!(1));
    assert_eq!(result["servers"][0]["identifier"], json!("news_service"));
    assert_eq!(result["servers"][0]["toolsCount"], json!(1));
}

#[tokio::test]
async fn available_servers_hides_restricted_servers_from_the_agent() {
    let router = build_router(vec![
        Arc::new(StubProvider::new("weather_service", &["get_weather"])),
        Arc::new(StubProvider::new("news_service", &["get_headlines"])),
    ])
    .await;
    let agent = agent(json!({ "allowedServers": ["news_service"] }));

    let result = router
        .call_tool(Some(&agent), "cubicler_available_servers", json!({}))
        .await
        .unwrap();
    assert_eq!(result["total"], json!(1));
    assert_eq!(result["servers"][0]["identifier"], json!("news_service"));
    assert!(!result["servers"]
        .as_array()
        .unwrap()
        .iter()
        .any(|s| s["identifier"] == json!("weather_service")));
}

#[tokio::test]
async fn fetch_server_tools_hides_restricted_tools_from_the_agent() {
    let router = build_router(vec![Arc::new(StubProvider::new(
        "weather_service",
        &["get_weather", "get_forecast"],
    ))])
    .await;
    let agent = agent(json!({ "restrictedTools": ["weather_service.get_forecast"] }));

    let result = router
        .call_tool(
            Some(&agent),
            "cubicler_fetch_server_tools",
            json!({ "serverIdentifier": "weather_service" }),
        )
        .await
        .unwrap();
    let names: Vec<&str> = result["tools"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec![external_tool_name("weather_service", "get_weather").as_str()]);
}

#[tokio::test]
async fn strict_params_rejects_unknown_keys() {
    let registry = ProviderRegistry::new();
    let router = McpRouter::new(registry).with_strict_params(true);

    let request = McpRequest::new(
        1,
        "tools/call",
        Some(json!({ "name": "cubicler_available_servers", "extra": true })),
    );
    let response = router.handle_request(None, request).await;
    assert_eq!(response.error.unwrap().code, INVALID_PARAMS);
}
