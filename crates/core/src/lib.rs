//! Agent-side core of Cubicler: agent transports, the stdio agent pool,
//! prompt resolution, and the dispatch service that ties them to the MCP
//! router.

pub mod direct;
pub mod dispatch;
pub mod pool;
pub mod prompt;
pub mod transport;

pub use dispatch::{AgentsSource, DispatchService};
pub use direct::{AgentToolClient, DirectAgent, DirectAgentTransport};
pub use pool::StdioAgentPool;
pub use prompt::{InvocationContext, PromptProvider};
pub use transport::{AgentTransport, HttpAgentTransport, SseAgentHub, SseAgentTransport, StdioAgentTransport};
