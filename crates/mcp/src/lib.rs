//! Tool providers and MCP routing for Cubicler.
//!
//! A [`ToolProvider`](provider::ToolProvider) wraps one backend — an MCP
//! server, a REST API described by declarative endpoints, or the built-in
//! tools — and the [`McpRouter`](router::McpRouter) aggregates them into the
//! single MCP surface agents talk to.

pub mod internal;
pub mod mcp_provider;
pub mod provider;
pub mod rest_provider;
pub mod restriction;
pub mod router;
pub mod transform;

pub use internal::InternalToolsProvider;
pub use mcp_provider::McpProvider;
pub use provider::{ProviderRegistry, ToolProvider};
pub use rest_provider::RestProvider;
pub use restriction::RestrictionFilter;
pub use router::McpRouter;
pub use transform::transform_response;
