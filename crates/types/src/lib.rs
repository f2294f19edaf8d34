//! Type definitions for Cubicler.

pub mod agent;
pub mod config;
pub mod error;
pub mod jsonrpc;
pub mod naming;
pub mod security;
pub mod tool;

pub use agent::{AgentInfo, AgentRequest, AgentResponse, Message, MessageSender, ServerInfo, Trigger};
pub use config::{AgentConfig, McpServerConfig, RestServerConfig, WebhookConfig};
pub use error::CubiclerError;
pub use jsonrpc::{McpRequest, McpResponse, RequestId, RpcError};
pub use tool::ToolDefinition;
