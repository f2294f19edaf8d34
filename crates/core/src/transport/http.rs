//! HTTP agent transport: one POST per dispatch.

use std::time::Duration;

use async_trait::async_trait;
use cubicler_transport::JwtHelper;
use cubicler_types::config::{AgentConfig, AuthConfig, JwtAuthConfig};
use cubicler_types::{AgentRequest, AgentResponse, CubiclerError};
use serde_json::Value;

use super::AgentTransport;

pub struct HttpAgentTransport {
    agent_id: String,
    url: String,
    auth: Option<JwtAuthConfig>,
    jwt: JwtHelper,
    client: reqwest::Client,
}

impl HttpAgentTransport {
    pub fn new(config: &AgentConfig, call_timeout: Duration) -> Result<Self, CubiclerError> {
        let url = config.url.clone().ok_or_else(|| {
            CubiclerError::Config(format!(
                "agent {}: http transport requires 'url'",
                config.identifier
            ))
        })?;
        let client = reqwest::Client::builder()
            .timeout(call_timeout)
            .build()
            .map_err(|e| CubiclerError::Transport(format!("failed to build client: {}", e)))?;
        Ok(Self {
            agent_id: config.identifier.clone(),
            url,
            auth: config.auth.clone().map(|AuthConfig::Jwt(jwt)| jwt),
            jwt: JwtHelper::new(),
            client,
        })
    }
}

#[async_trait]
impl AgentTransport for HttpAgentTransport {
    async fn dispatch(&self, request: AgentRequest) -> Result<AgentResponse, CubiclerError> {
        let mut builder = self.client.post(&self.url).json(&request);
        if let Some(ref auth) = self.auth {
            builder = builder.bearer_auth(self.jwt.token(auth).await?);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                CubiclerError::Timeout(format!("agent {} timed out", self.agent_id))
            } else {
                CubiclerError::Transport(format!("agent request failed: {}", e))
            }
        })?;
        let status = response.status();
        if !status.is_success() {
            return Err(CubiclerError::Agent(format!(
                "agent request failed: status {}",
                status
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| CubiclerError::JsonDecode(format!("invalid agent response: {}", e)))?;
        AgentResponse::from_value(body)
    }
}
