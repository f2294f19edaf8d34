//! Stdio agent transport: JSON-RPC `dispatch` over a worker pool.

use std::time::Duration;

use async_trait::async_trait;
use cubicler_types::config::AgentConfig;
use cubicler_types::{AgentRequest, AgentResponse, CubiclerError};

use crate::pool::StdioAgentPool;

use super::AgentTransport;

pub struct StdioAgentTransport {
    pool: StdioAgentPool,
}

impl StdioAgentTransport {
    pub fn new(config: &AgentConfig, call_timeout: Duration) -> Result<Self, CubiclerError> {
        Ok(Self { pool: StdioAgentPool::new(config.clone(), call_timeout)? })
    }

    pub fn pool(&self) -> &StdioAgentPool {
        &self.pool
    }
}

#[async_trait]
impl AgentTransport for StdioAgentTransport {
    async fn dispatch(&self, request: AgentRequest) -> Result<AgentResponse, CubiclerError> {
        self.pool.dispatch(request).await
    }

    async fn start(&self) -> Result<(), CubiclerError> {
        self.pool.start().await
    }

    async fn stop(&self) -> Result<(), CubiclerError> {
        self.pool.shutdown().await
    }
}
