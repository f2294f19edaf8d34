//! Server-push SSE agent transport.
//!
//! Cubicler is the SSE *server* here: each agent process opens a long-lived
//! stream at registration and replies over a separate HTTP endpoint. The
//! hub owns one channel per connected agent plus a pending-resolver map
//! keyed by server-generated request ids.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cubicler_types::{AgentRequest, AgentResponse, CubiclerError};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, warn};
use uuid::Uuid;

use super::AgentTransport;

/// Event body written to an agent's stream for one dispatch.
#[derive(Debug, Clone, Serialize)]
pub struct SseEventPayload {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub data: AgentRequest,
}

struct AgentChannel {
    connection_id: u64,
    events: mpsc::Sender<SseEventPayload>,
    pending: HashMap<String, oneshot::Sender<Value>>,
}

/// Registry of connected SSE agents, shared with the HTTP edge.
#[derive(Clone)]
pub struct SseAgentHub {
    channels: Arc<Mutex<HashMap<String, AgentChannel>>>,
    connection_seq: Arc<std::sync::atomic::AtomicU64>,
    dispatch_timeout: Duration,
}

const EVENT_BUFFER: usize = 16;

impl SseAgentHub {
    pub fn new(dispatch_timeout: Duration) -> Self {
        Self {
            channels: Arc::new(Mutex::new(HashMap::new())),
            connection_seq: Arc::new(std::sync::atomic::AtomicU64::new(0)),
            dispatch_timeout,
        }
    }

    /// Register a newly connected agent stream, replacing any previous
    /// connection for the same id. Returns the connection id and the
    /// receiving half the edge turns into SSE events.
    pub async fn connect(&self, agent_id: &str) -> (u64, mpsc::Receiver<SseEventPayload>) {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let connection_id = self
            .connection_seq
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        let mut channels = self.channels.lock().await;
        if let Some(previous) = channels.insert(
            agent_id.to_string(),
            AgentChannel { connection_id, events: tx, pending: HashMap::new() },
        ) {
            reject_pending(previous);
            debug!(agent = %agent_id, "replaced existing sse connection");
        }
        (connection_id, rx)
    }

    /// Drop an agent's connection, rejecting everything in flight.
    pub async fn disconnect(&self, agent_id: &str) {
        if let Some(channel) = self.channels.lock().await.remove(agent_id) {
            reject_pending(channel);
        }
    }

    /// Drop a specific connection. A stale teardown (the stream replaced by
    /// a newer connection) leaves the newer one untouched.
    pub async fn disconnect_connection(&self, agent_id: &str, connection_id: u64) {
        let mut channels = self.channels.lock().await;
        if channels.get(agent_id).is_some_and(|c| c.connection_id == connection_id) {
            if let Some(channel) = channels.remove(agent_id) {
                reject_pending(channel);
            }
        }
    }

    pub async fn is_connected(&self, agent_id: &str) -> bool {
        self.channels.lock().await.contains_key(agent_id)
    }

    /// Resolve a pending dispatch from the agent's reply channel.
    pub async fn handle_response(
        &self,
        agent_id: &str,
        request_id: &str,
        response: Value,
    ) -> Result<(), CubiclerError> {
        let mut channels = self.channels.lock().await;
        let channel = channels
            .get_mut(agent_id)
            .ok_or_else(|| CubiclerError::NotFound(format!("agent not connected: {}", agent_id)))?;
        match channel.pending.remove(request_id) {
            Some(tx) => {
                let _ = tx.send(response);
                Ok(())
            }
            None => {
                warn!(agent = %agent_id, id = %request_id, "dropping reply with no pending dispatch");
                Err(CubiclerError::NotFound(format!("no pending request: {}", request_id)))
            }
        }
    }

    pub async fn dispatch(
        &self,
        agent_id: &str,
        request: AgentRequest,
    ) -> Result<AgentResponse, CubiclerError> {
        let request_id = Uuid::new_v4().to_string();
        let rx = {
            let mut channels = self.channels.lock().await;
            let channel = channels.get_mut(agent_id).ok_or_else(|| {
                CubiclerError::Transport(format!("agent not connected: {}", agent_id))
            })?;
            let (tx, rx) = oneshot::channel();
            channel.pending.insert(request_id.clone(), tx);
            let payload = SseEventPayload {
                id: request_id.clone(),
                kind: "agent_request".to_string(),
                data: request,
            };
            if channel.events.try_send(payload).is_err() {
                channel.pending.remove(&request_id);
                return Err(CubiclerError::Transport(format!(
                    "agent stream is not accepting events: {}",
                    agent_id
                )));
            }
            rx
        };

        match tokio::time::timeout(self.dispatch_timeout, rx).await {
            Ok(Ok(value)) => AgentResponse::from_value(value),
            Ok(Err(_)) => Err(CubiclerError::Transport("transport disconnected".to_string())),
            Err(_) => {
                let mut channels = self.channels.lock().await;
                if let Some(channel) = channels.get_mut(agent_id) {
                    channel.pending.remove(&request_id);
                }
                Err(CubiclerError::Timeout(format!(
                    "agent {} timed out after {}ms",
                    agent_id,
                    self.dispatch_timeout.as_millis()
                )))
            }
        }
    }
}

fn reject_pending(channel: AgentChannel) {
    // Dropping the oneshot senders rejects the awaiters with
    // "transport disconnected".
    drop(channel);
}

/// The per-agent view over the hub.
pub struct SseAgentTransport {
    agent_id: String,
    hub: SseAgentHub,
}

impl SseAgentTransport {
    pub fn new(agent_id: impl Into<String>, hub: SseAgentHub) -> Self {
        Self { agent_id: agent_id.into(), hub }
    }
}

#[async_trait]
impl AgentTransport for SseAgentTransport {
    async fn dispatch(&self, request: AgentRequest) -> Result<AgentResponse, CubiclerError> {
        self.hub.dispatch(&self.agent_id, request).await
    }

    async fn stop(&self) -> Result<(), CubiclerError> {
        self.hub.disconnect(&self.agent_id).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cubicler_types::agent::AgentInfo;
    use serde_json::json;

    fn request() -> AgentRequest {
        AgentRequest {
            agent: AgentInfo {
                identifier: "agent_1".to_string(),
                name: "Agent One".to_string(),
                description: String::new(),
                prompt: "hi".to_string(),
            },
            tools: vec![],
            servers: vec![],
            messages: None,
            trigger: None,
        }
    }

    #[tokio::test]
    async fn dispatch_resolves_via_reply_channel() {
        let hub = SseAgentHub::new(Duration::from_secs(2));
        let (_, mut events) = hub.connect("agent_1").await;

        let dispatch_hub = hub.clone();
        let dispatching =
            tokio::spawn(async move { dispatch_hub.dispatch("agent_1", request()).await });

        let event = events.recv().await.expect("event written to stream");
        assert_eq!(event.kind, "agent_request");

        hub.handle_response(
            "agent_1",
            &event.id,
            json!({
                "timestamp": "2024-01-01T00:00:00Z",
                "type": "text",
                "content": "done",
                "metadata": {}
            }),
        )
        .await
        .unwrap();

        let response = dispatching.await.unwrap().unwrap();
        assert_eq!(response.content, "done");
    }

    #[tokio::test]
    async fn dispatch_to_unconnected_agent_fails() {
        let hub = SseAgentHub::new(Duration::from_secs(1));
        assert!(hub.dispatch("ghost", request()).await.is_err());
    }

    #[tokio::test]
    async fn disconnect_rejects_in_flight_dispatches() {
        let hub = SseAgentHub::new(Duration::from_secs(5));
        let (_, _events) = hub.connect("agent_1").await;

        let dispatch_hub = hub.clone();
        let dispatching =
            tokio::spawn(async move { dispatch_hub.dispatch("agent_1", request()).await });
        // Give the dispatch a moment to register its pending entry.
        tokio::time::sleep(Duration::from_millis(50)).await;

        hub.disconnect("agent_1").await;
        let result = dispatching.await.unwrap();
        match result {
            Err(CubiclerError::Transport(message)) => {
                assert_eq!(message, "transport disconnected")
            }
            other => panic!("expected disconnect error, got {:?}", other.map(|r| r.content)),
        }
    }

    #[tokio::test]
    async fn dispatch_times_out_without_reply() {
        let hub = SseAgentHub::new(Duration::from_millis(100));
        let (_, _events) = hub.connect("agent_1").await;
        let result = hub.dispatch("agent_1", request()).await;
        assert!(matches!(result, Err(CubiclerError::Timeout(_))));
    }

    #[tokio::test]
    async fn late_reply_is_rejected() {
        let hub = SseAgentHub::new(Duration::from_millis(50));
        let (_, _events) = hub.connect("agent_1").await;
        let _ = hub.dispatch("agent_1", request()).await;

        let result = hub.handle_response("agent_1", "stale-id", json!({})).await;
        assert!(result.is_err());
    }
}
