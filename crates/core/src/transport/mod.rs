//! Agent transports: deliver an `AgentRequest` and return the
//! `AgentResponse`.

pub mod http;
pub mod sse;
pub mod stdio;

use async_trait::async_trait;
use cubicler_types::{AgentRequest, AgentResponse, CubiclerError};

pub use http::HttpAgentTransport;
pub use sse::{SseAgentHub, SseAgentTransport, SseEventPayload};
pub use stdio::StdioAgentTransport;

/// Delivery of one dispatch to an agent.
///
/// Implementations are `Send + Sync`; a single transport instance is owned
/// by exactly one agent identifier.
#[async_trait]
pub trait AgentTransport: Send + Sync {
    /// Deliver the request and await the agent's answer.
    ///
    /// # Errors
    ///
    /// Returns `CubiclerError::Agent` for malformed agent responses,
    /// `Timeout` when the agent misses its deadline, and `Transport` when
    /// the channel to the agent is gone.
    async fn dispatch(&self, request: AgentRequest) -> Result<AgentResponse, CubiclerError>;

    /// Bring the transport up (spawn pool workers, open channels). No-op by
    /// default.
    async fn start(&self) -> Result<(), CubiclerError> {
        Ok(())
    }

    /// Tear the transport down, rejecting anything in flight. No-op by
    /// default.
    async fn stop(&self) -> Result<(), CubiclerError> {
        Ok(())
    }
}
