//! Aggregate health document for `GET /health`.

use chrono::Utc;
use serde_json::{json, Value};

use crate::state::AppState;

/// Build the health report. Returns the overall health alongside the body.
pub async fn health_report(state: &AppState) -> (bool, Value) {
    let agents = match state.config.agents().await {
        Ok(_) => {
            let registered = state.dispatch.registered_agents().await;
            json!({
                "status": "healthy",
                "count": registered.len(),
                "agents": registered,
            })
        }
        Err(e) => json!({ "status": "unhealthy", "error": e.to_string() }),
    };

    let providers = match state.config.providers().await {
        Ok(config) => json!({
            "status": "healthy",
            "count": config.mcp_servers.len() + config.rest_servers.len(),
        }),
        Err(e) => json!({ "status": "unhealthy", "error": e.to_string() }),
    };

    let healthy = agents["status"] == "healthy" && providers["status"] == "healthy";
    let report = json!({
        "status": if healthy { "healthy" } else { "unhealthy" },
        "timestamp": Utc::now().to_rfc3339(),
        "services": {
            "agents": agents,
            "providers": providers,
            "mcp": { "status": "healthy" },
        }
    });
    (healthy, report)
}
