//! Prompt resolution: base prompt, agent/default prompt, invocation
//! context.
//!
//! An agent's prompt may be inline text, a file path, or a URL. The final
//! prompt handed to the agent is the shared base prompt, then the agent's
//! own prompt (or the configured default), then a short invocation-context
//! section naming what triggered this dispatch.

use std::time::Duration;

use cubicler_types::config::{AgentConfig, AgentsConfig, PromptSource};
use cubicler_types::{CubiclerError, Trigger};

/// What caused the dispatch; rendered into the prompt's closing section.
pub enum InvocationContext<'a> {
    Messages,
    Webhook(&'a Trigger),
}

#[derive(Clone)]
pub struct PromptProvider {
    client: reqwest::Client,
}

impl PromptProvider {
    pub fn new(fetch_timeout: Duration) -> Result<Self, CubiclerError> {
        let client = reqwest::Client::builder()
            .timeout(fetch_timeout)
            .build()
            .map_err(|e| CubiclerError::Transport(format!("failed to build client: {}", e)))?;
        Ok(Self { client })
    }

    async fn load_source(&self, source: &PromptSource) -> Result<String, CubiclerError> {
        match source {
            PromptSource::Inline(text) => Ok(text.clone()),
            PromptSource::File { file } => tokio::fs::read_to_string(file).await.map_err(|e| {
                CubiclerError::Config(format!("failed to read prompt file {}: {}", file.display(), e))
            }),
            PromptSource::Url { url } => {
                let response = self.client.get(url).send().await.map_err(|e| {
                    CubiclerError::Transport(format!("failed to fetch prompt {}: {}", url, e))
                })?;
                if !response.status().is_success() {
                    return Err(CubiclerError::Transport(format!(
                        "failed to fetch prompt {}: status {}",
                        url,
                        response.status()
                    )));
                }
                response.text().await.map_err(|e| {
                    CubiclerError::Transport(format!("failed to fetch prompt {}: {}", url, e))
                })
            }
        }
    }

    pub async fn resolve(
        &self,
        config: &AgentsConfig,
        agent: &AgentConfig,
        context: &InvocationContext<'_>,
    ) -> Result<String, CubiclerError> {
        let mut parts: Vec<String> = Vec::new();

        if let Some(base) = config.base_prompt.as_deref() {
            if !base.trim().is_empty() {
                parts.push(base.trim().to_string());
            }
        }

        let own = match agent.prompt {
            Some(ref source) => Some(self.load_source(source).await?),
            None => config.default_prompt.clone(),
        };
        if let Some(own) = own {
            if !own.trim().is_empty() {
                parts.push(own.trim().to_string());
            }
        }

        parts.push(render_context(context));
        Ok(parts.join("\n\n"))
    }
}

fn render_context(context: &InvocationContext<'_>) -> String {
    match context {
        InvocationContext::Messages => {
            "## Invocation Context\nThis request was invoked by user messages.".to_string()
        }
        InvocationContext::Webhook(trigger) => format!(
            "## Invocation Context\nThis request was triggered by webhook {} ({}) at {}.",
            trigger.name,
            trigger.identifier,
            trigger.triggered_at.to_rfc3339(),
        ),
    }
}
