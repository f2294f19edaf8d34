//! The axum HTTP edge.
//!
//! Routes: `POST /mcp` (JSON-RPC from agents), `POST /dispatch[/{agentId}]`
//! (message invocations), `POST /webhook/{identifier}/{agentId}` (trigger
//! ingestion), `GET /agent/sse/{agentId}` plus its `/response` reply
//! channel (server-push agents), and `GET /health`.

use std::convert::Infallible;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use cubicler_core::transport::SseEventPayload;
use cubicler_core::SseAgentHub;
use cubicler_types::config::AgentTransportKind;
use cubicler_types::jsonrpc::INVALID_REQUEST;
use cubicler_types::{CubiclerError, McpRequest, McpResponse, Message, RequestId};
use futures::stream::{self, Stream, StreamExt};
use serde_json::{json, Value};
use tokio_stream::wrappers::ReceiverStream;
use tracing::debug;

use crate::error::ApiError;
use crate::health::health_report;
use crate::state::AppState;

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/mcp", post(handle_mcp))
        .route("/dispatch", post(handle_dispatch_default))
        .route("/dispatch/{agent_id}", post(handle_dispatch))
        .route("/webhook/{identifier}/{agent_id}", post(handle_webhook))
        .route("/agent/sse/{agent_id}", get(handle_agent_sse))
        .route("/agent/sse/{agent_id}/response", post(handle_agent_sse_response))
        .route("/health", get(handle_health))
        .with_state(state)
}

fn request_id_of(value: &Value) -> RequestId {
    value
        .get("id")
        .cloned()
        .and_then(|id| serde_json::from_value(id).ok())
        .unwrap_or(RequestId::Number(0))
}

async fn handle_mcp(State(state): State<AppState>, Json(body): Json<Value>) -> Json<McpResponse> {
    let id = request_id_of(&body);
    let request: McpRequest = match serde_json::from_value(body) {
        Ok(request) => request,
        Err(e) => {
            return Json(McpResponse::error(id, INVALID_REQUEST, format!("invalid request: {}", e)))
        }
    };
    Json(state.router.handle_request(None, request).await)
}

fn parse_dispatch_body(state: &AppState, body: Value) -> Result<Vec<Message>, CubiclerError> {
    if state.settings.strict_params {
        if let Some(object) = body.as_object() {
            if let Some(unknown) = object.keys().find(|k| *k != "messages") {
                return Err(CubiclerError::Validation(format!(
                    "unknown property: {}",
                    unknown
                )));
            }
        }
    }
    let messages = body
        .get("messages")
        .cloned()
        .ok_or_else(|| CubiclerError::Validation("missing required field: messages".to_string()))?;
    serde_json::from_value(messages)
        .map_err(|e| CubiclerError::Validation(format!("invalid messages: {}", e)))
}

async fn handle_dispatch_default(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<impl IntoResponse, ApiError> {
    let messages = parse_dispatch_body(&state, body)?;
    let response = state.dispatch.dispatch(None, messages).await?;
    Ok(Json(response))
}

async fn handle_dispatch(
    State(state): State<AppState>,
    Path(agent_id): Path<String>,
    Json(body): Json<Value>,
) -> Result<impl IntoResponse, ApiError> {
    let messages = parse_dispatch_body(&state, body)?;
    let response = state.dispatch.dispatch(Some(&agent_id), messages).await?;
    Ok(Json(response))
}

async fn handle_webhook(
    State(state): State<AppState>,
    Path((identifier, agent_id)): Path<(String, String)>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let webhooks = state.config.webhooks().await?;
    let webhook = webhooks
        .get(&identifier)
        .ok_or_else(|| CubiclerError::NotFound(format!("unknown webhook: {}", identifier)))?;

    state.webhooks.authenticate(webhook, &headers, &body).await?;

    if !webhook.allows_agent(&agent_id) {
        return Err(CubiclerError::AccessDenied(
            "agent not authorized for webhook".to_string(),
        )
        .into());
    }

    let payload: Value = serde_json::from_slice(&body)
        .map_err(|e| CubiclerError::Validation(format!("invalid JSON payload: {}", e)))?;
    let trigger = state.webhooks.build_trigger(webhook, payload);

    let response = state.dispatch.dispatch_webhook(&agent_id, trigger).await?;
    Ok(Json(response))
}

/// Keeps the hub entry alive exactly as long as the client's stream.
struct StreamGuard {
    hub: SseAgentHub,
    agent_id: String,
    connection_id: u64,
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        let hub = self.hub.clone();
        let agent_id = self.agent_id.clone();
        let connection_id = self.connection_id;
        tokio::spawn(async move {
            hub.disconnect_connection(&agent_id, connection_id).await;
        });
    }
}

async fn handle_agent_sse(
    State(state): State<AppState>,
    Path(agent_id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let agents = state.config.agents().await?;
    let agent = agents
        .get(&agent_id)
        .ok_or_else(|| CubiclerError::NotFound(format!("unknown agent: {}", agent_id)))?;
    if agent.transport != AgentTransportKind::Sse {
        return Err(CubiclerError::Validation(format!(
            "agent {} does not use the sse transport",
            agent_id
        ))
        .into());
    }

    let (connection_id, rx) = state.sse_hub.connect(&agent_id).await;
    debug!(agent = %agent_id, connection = connection_id, "agent sse stream opened");

    let connected = Event::default()
        .event("connected")
        .data(json!({ "message": "Connected to Cubicler", "agentId": &agent_id }).to_string());

    let guard = Arc::new(StreamGuard {
        hub: state.sse_hub.clone(),
        agent_id,
        connection_id,
    });
    let events = ReceiverStream::new(rx).map(move |payload: SseEventPayload| {
        let _guard = &guard;
        let data = serde_json::to_string(&payload).unwrap_or_else(|_| "{}".to_string());
        Ok(Event::default().event("agent_request").data(data))
    });

    let stream = stream::once(async move { Ok(connected) }).chain(events);
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

async fn handle_agent_sse_response(
    State(state): State<AppState>,
    Path(agent_id): Path<String>,
    Json(body): Json<Value>,
) -> Result<impl IntoResponse, ApiError> {
    let request_id = body
        .get("id")
        .and_then(|id| id.as_str())
        .ok_or_else(|| CubiclerError::Validation("missing required field: id".to_string()))?
        .to_string();
    let response = body
        .get("response")
        .cloned()
        .ok_or_else(|| CubiclerError::Validation("missing required field: response".to_string()))?;

    state.sse_hub.handle_response(&agent_id, &request_id, response).await?;
    Ok(Json(json!({ "status": "accepted" })))
}

async fn handle_health(State(state): State<AppState>) -> impl IntoResponse {
    let (healthy, report) = health_report(&state).await;
    let status = if healthy { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status, Json(report))
}
