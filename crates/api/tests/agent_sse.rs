//! End-to-end SSE agent flow over a real socket: the agent opens its
//! stream, a dispatch arrives as an `agent_request` event, and the reply
//! posted to the response endpoint resolves the dispatch.

use std::collections::HashMap;
use std::time::Duration;

use cubicler_api::{app, build_state, Settings};
use futures::StreamExt;
use serde_json::{json, Value};

async fn write_config(dir: &tempfile::TempDir, name: &str, value: Value) -> String {
    let path = dir.path().join(name);
    tokio::fs::write(&path, serde_json::to_string(&value).unwrap()).await.unwrap();
    path.to_string_lossy().into_owned()
}

/// Serve a stack with one SSE agent on an ephemeral port.
async fn serve() -> (String, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let agents = write_config(
        &dir,
        "agents.json",
        json!({
            "agents": [{
                "identifier": "agent_1",
                "name": "Agent One",
                "transport": "sse"
            }]
        }),
    )
    .await;
    let providers = write_config(&dir, "providers.json", json!({})).await;

    let settings = Settings {
        agents_list: Some(agents),
        providers_list: Some(providers),
        agent_call_timeout: Duration::from_secs(5),
        ..Settings::default()
    };
    let state = build_state(settings, HashMap::new()).await.unwrap();

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app(state)).await.unwrap();
    });
    (format!("http://{}", addr), dir)
}

/// Minimal SSE framing for the test client side.
fn drain_events(buffer: &mut String) -> Vec<(String, String)> {
    let mut events = Vec::new();
    while let Some(end) = buffer.find("\n\n") {
        let block: String = buffer.drain(..end + 2).collect();
        let mut name = String::new();
        let mut data = Vec::new();
        for line in block.lines() {
            if let Some(value) = line.strip_prefix("event:") {
                name = value.trim().to_string();
            } else if let Some(value) = line.strip_prefix("data:") {
                data.push(value.trim_start().to_string());
            }
        }
        if !name.is_empty() || !data.is_empty() {
            events.push((name, data.join("\n")));
        }
    }
    events
}

#[tokio::test]
async fn sse_agent_receives_dispatch_and_replies() {
    let (base_url, _dir) = serve().await;
    let client = reqwest::Client::new();

    // The agent connects its long-lived stream.
    let stream_response = client
        .get(format!("{}/agent/sse/agent_1", base_url))
        .send()
        .await
        .unwrap();
    assert!(stream_response
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("text/event-stream")));
    let mut stream = stream_response.bytes_stream();
    let mut buffer = String::new();

    // First event announces the connection.
    let mut connected = None;
    while connected.is_none() {
        let chunk = stream.next().await.unwrap().unwrap();
        buffer.push_str(&String::from_utf8_lossy(&chunk));
        for (name, data) in drain_events(&mut buffer) {
            if name == "connected" {
                connected = Some(data);
            }
        }
    }
    let connected: Value = serde_json::from_str(&connected.unwrap()).unwrap();
    assert_eq!(connected["agentId"], json!("agent_1"));

    // A user dispatch arrives while the agent is connected.
    let dispatch_client = client.clone();
    let dispatch_url = format!("{}/dispatch/agent_1", base_url);
    let dispatching = tokio::spawn(async move {
        dispatch_client
            .post(dispatch_url)
            .json(&json!({
                "messages": [{
                    "sender": { "id": "user_1" },
                    "type": "text",
                    "content": "ping"
                }]
            }))
            .send()
            .await
            .unwrap()
    });

    // The dispatch shows up on the stream as an agent_request event.
    let mut request_event = None;
    while request_event.is_none() {
        let chunk = stream.next().await.unwrap().unwrap();
        buffer.push_str(&String::from_utf8_lossy(&chunk));
        for (name, data) in drain_events(&mut buffer) {
            if name == "agent_request" {
                request_event = Some(data);
            }
        }
    }
    let request_event: Value = serde_json::from_str(&request_event.unwrap()).unwrap();
    assert_eq!(request_event["type"], json!("agent_request"));
    assert_eq!(request_event["data"]["agent"]["identifier"], json!("agent_1"));
    let request_id = request_event["id"].as_str().unwrap().to_string();

    // The agent replies over the separate response channel.
    let reply = client
        .post(format!("{}/agent/sse/agent_1/response", base_url))
        .json(&json!({
            "id": request_id,
            "response": {
                "timestamp": "2024-01-01T00:00:00Z",
                "type": "text",
                "content": "pong",
                "metadata": {}
            }
        }))
        .send()
        .await
        .unwrap();
    assert!(reply.status().is_success());

    // The original dispatch resolves with the agent's answer.
    let response = dispatching.await.unwrap();
    assert!(response.status().is_success());
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["content"], json!("pong"));
}

#[tokio::test]
async fn sse_stream_for_non_sse_agent_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let agents = write_config(
        &dir,
        "agents.json",
        json!({
            "agents": [{
                "identifier": "agent_http",
                "name": "HTTP Agent",
                "transport": "http",
                "url": "http://localhost:9/agent"
            }]
        }),
    )
    .await;
    let providers = write_config(&dir, "providers.json", json!({})).await;

    let settings = Settings {
        agents_list: Some(agents),
        providers_list: Some(providers),
        ..Settings::default()
    };
    let state = build_state(settings, HashMap::new()).await.unwrap();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app(state)).await.unwrap();
    });

    let client = reqwest::Client::new();
    let response = client
        .get(format!("http://{}/agent/sse/agent_http", addr))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);

    let response = client
        .get(format!("http://{}/agent/sse/ghost", addr))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);
}
