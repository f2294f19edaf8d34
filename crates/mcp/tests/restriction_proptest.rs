//! Property tests for the restriction closure: `is_server_allowed` and
//! `is_tool_allowed` must equal their boolean formulas under any
//! combination of allow/deny lists.

use std::sync::Arc;

use async_trait::async_trait;
use cubicler_mcp::provider::{ProviderRegistry, ToolProvider};
use cubicler_mcp::restriction::{is_server_allowed, RestrictionFilter};
use cubicler_types::naming::external_tool_name;
use cubicler_types::{AgentConfig, CubiclerError, ToolDefinition};
use proptest::prelude::*;
use proptest::sample::subsequence;
use serde_json::{json, Value};

const SERVERS: [&str; 3] = ["alpha_service", "beta_service", "gamma_service"];
const TOOLS: [&str; 2] = ["get_one", "get_two"];

/// Registry entry: only the identifier matters for hash resolution.
struct NamedProvider(&'static str);

#[async_trait]
impl ToolProvider for NamedProvider {
    fn identifier(&self) -> &str {
        self.0
    }

    fn name(&self) -> &str {
        self.0
    }

    fn description(&self) -> &str {
        ""
    }

    async fn initialize(&self) -> Result<(), CubiclerError> {
        Ok(())
    }

    async fn tools_list(&self) -> Result<Vec<ToolDefinition>, CubiclerError> {
        Ok(vec![])
    }

    async fn tools_call(&self, _tool: &str, _args: Value) -> Result<Value, CubiclerError> {
        Ok(Value::Null)
    }

    async fn can_handle(&self, _tool: &str) -> bool {
        false
    }

    async fn close(&self) -> Result<(), CubiclerError> {
        Ok(())
    }
}

fn dotted_names() -> Vec<String> {
    SERVERS
        .iter()
        .flat_map(|server| TOOLS.iter().map(move |tool| format!("{}.{}", server, tool)))
        .collect()
}

fn agent_with(
    allowed_servers: &[&str],
    restricted_servers: &[&str],
    allowed_tools: &[String],
    restricted_tools: &[String],
) -> AgentConfig {
    serde_json::from_value(json!({
        "identifier": "agent_1",
        "name": "Agent One",
        "transport": "sse",
        "allowedServers": allowed_servers,
        "restrictedServers": restricted_servers,
        "allowedTools": allowed_tools,
        "restrictedTools": restricted_tools,
    }))
    .expect("config")
}

proptest! {
    #[test]
    fn closure_matches_the_boolean_formula(
        allowed_servers in subsequence(SERVERS.to_vec(), 0..=SERVERS.len()),
        restricted_servers in subsequence(SERVERS.to_vec(), 0..=SERVERS.len()),
        allowed_tools in subsequence(dotted_names(), 0..=SERVERS.len() * TOOLS.len()),
        restricted_tools in subsequence(dotted_names(), 0..=SERVERS.len() * TOOLS.len()),
        server_idx in 0..SERVERS.len(),
        tool_idx in 0..TOOLS.len(),
    ) {
        let agent = agent_with(
            &allowed_servers,
            &restricted_servers,
            &allowed_tools,
            &restricted_tools,
        );
        let server = SERVERS[server_idx];
        let tool = TOOLS[tool_idx];
        let dotted = format!("{}.{}", server, tool);

        let expect_server = (allowed_servers.is_empty() || allowed_servers.contains(&server))
            && !restricted_servers.contains(&server);
        prop_assert_eq!(is_server_allowed(&agent, server), expect_server);

        let expect_tool = expect_server
            && (allowed_tools.is_empty() || allowed_tools.contains(&dotted))
            && !restricted_tools.contains(&dotted);

        let runtime = tokio::runtime::Builder::new_current_thread()
            .build()
            .expect("runtime");
        let (registered, unresolvable, internal_open, internal_closed) = runtime.block_on(async {
            let registry = ProviderRegistry::new();
            for server in SERVERS {
                registry.register(Arc::new(NamedProvider(server))).await;
            }
            let filter = RestrictionFilter::new(registry);

            let registered =
                filter.is_tool_allowed(&agent, &external_tool_name(server, tool)).await;
            // A hash that resolves to no registered server fails closed.
            let unresolvable = filter
                .is_tool_allowed(&agent, &external_tool_name("delta_service", tool))
                .await;
            let internal_open =
                filter.is_tool_allowed(&agent, "cubicler_available_servers").await;
            let closed_agent = agent_with(
                &allowed_servers,
                &restricted_servers,
                &allowed_tools,
                &["cubicler_available_servers".to_string()],
            );
            let internal_closed = filter
                .is_tool_allowed(&closed_agent, "cubicler_available_servers")
                .await;
            (registered, unresolvable, internal_open, internal_closed)
        });

        prop_assert_eq!(registered, expect_tool);
        prop_assert!(!unresolvable);
        // Internal tools ignore the server lists entirely.
        prop_assert!(internal_open == !restricted_tools
            .contains(&"cubicler_available_servers".to_string()));
        prop_assert!(!internal_closed);
    }
}
