//! Per-agent allow/deny evaluation over servers and tools.
//!
//! Server restrictions use identifiers; tool restrictions use the dotted
//! logical form `<serverIdentifier>.<toolName>`. Restrictions override
//! allows, and any resolution error fails closed. Denials surface one
//! uniform message regardless of which check failed, so callers cannot
//! probe the restriction structure.

use cubicler_types::naming::{decode_external_name, is_internal_tool, logical_tool_name};
use cubicler_types::{AgentConfig, CubiclerError};

use crate::provider::ProviderRegistry;

/// `(allowedServers empty OR listed) AND not restricted`.
pub fn is_server_allowed(agent: &AgentConfig, server_id: &str) -> bool {
    let allowed = agent.allowed_servers.is_empty()
        || agent.allowed_servers.iter().any(|s| s == server_id);
    let restricted = agent.restricted_servers.iter().any(|s| s == server_id);
    allowed && !restricted
}

#[derive(Clone)]
pub struct RestrictionFilter {
    registry: ProviderRegistry,
}

impl RestrictionFilter {
    pub fn new(registry: ProviderRegistry) -> Self {
        Self { registry }
    }

    /// Evaluate tool access for an agent against an external tool name.
    ///
    /// Internal tools are allowed unless listed in `restrictedTools` by
    /// their literal name. External names must decode, their hash must
    /// resolve to a registered server, and the dotted name must pass the
    /// allow/deny lists.
    pub async fn is_tool_allowed(&self, agent: &AgentConfig, tool: &str) -> bool {
        if is_internal_tool(tool) {
            return !agent.restricted_tools.iter().any(|t| t == tool);
        }

        let Some((hash, local)) = decode_external_name(tool) else {
            return false;
        };
        let Some(server_id) = self.registry.resolve_hash(hash).await else {
            return false;
        };
        let dotted = logical_tool_name(&server_id, local);

        is_server_allowed(agent, &server_id)
            && (agent.allowed_tools.is_empty() || agent.allowed_tools.iter().any(|t| *t == dotted))
            && !agent.restricted_tools.iter().any(|t| *t == dotted)
    }

    /// Gate a tool call, raising the uniform denial on any failure.
    pub async fn validate_tool_access(
        &self,
        agent: &AgentConfig,
        tool: &str,
    ) -> Result<(), CubiclerError> {
        if self.is_tool_allowed(agent, tool).await {
            Ok(())
        } else {
            Err(CubiclerError::access_denied())
        }
    }

    /// Gate server-addressed operations, raising the uniform denial.
    pub fn validate_server_access(
        agent: &AgentConfig,
        server_id: &str,
    ) -> Result<(), CubiclerError> {
        if is_server_allowed(agent, server_id) {
            Ok(())
        } else {
            Err(CubiclerError::access_denied())
        }
    }
}
