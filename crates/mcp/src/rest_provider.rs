//! Provider exposing a REST API's declarative endpoints as tools.
//!
//! Each configured endpoint becomes one tool: its `parameters.properties`
//! are copied into the tool schema and a `payload` property is appended
//! when the endpoint takes a body. On a call, `{placeholder}` path segments
//! are substituted from the arguments, leftover arguments are URL-encoded
//! into the query string, and the JSON response runs through the endpoint's
//! response-transform pipeline.

use std::time::Duration;

use async_trait::async_trait;
use cubicler_transport::JwtHelper;
use cubicler_types::config::{AuthConfig, JwtAuthConfig, RestEndpointConfig, RestServerConfig};
use cubicler_types::naming::{decode_external_name, server_hash};
use cubicler_types::{CubiclerError, ToolDefinition};
use serde_json::{json, Map, Value};

use crate::transform::transform_response;

pub struct RestProvider {
    config: RestServerConfig,
    hash: String,
    auth: Option<JwtAuthConfig>,
    jwt: JwtHelper,
    client: reqwest::Client,
}

fn endpoint_tool(endpoint: &RestEndpointConfig) -> ToolDefinition {
    let mut properties = Map::new();
    if let Some(params) = endpoint.parameters.as_ref().and_then(|p| p.get("properties")) {
        if let Some(object) = params.as_object() {
            properties.extend(object.clone());
        }
    }
    if let Some(ref payload) = endpoint.payload {
        properties.insert("payload".to_string(), payload.clone());
    }

    ToolDefinition::new(
        endpoint.name.clone(),
        endpoint.description.clone(),
        json!({ "type": "object", "properties": Value::Object(properties) }),
    )
}

fn query_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl RestProvider {
    pub fn new(config: RestServerConfig, call_timeout: Duration) -> Result<Self, CubiclerError> {
        config.validate()?;
        let auth = config.auth.clone().map(|AuthConfig::Jwt(jwt)| jwt);
        let client = reqwest::Client::builder()
            .timeout(call_timeout)
            .build()
            .map_err(|e| CubiclerError::Transport(format!("failed to build client: {}", e)))?;
        Ok(Self {
            hash: server_hash(&config.identifier),
            config,
            auth,
            jwt: JwtHelper::new(),
            client,
        })
    }

    fn endpoint(&self, local: &str) -> Option<&RestEndpointConfig> {
        self.config.endpoints.iter().find(|e| e.name == local)
    }

    async fn call_endpoint(
        &self,
        endpoint: &RestEndpointConfig,
        args: Value,
    ) -> Result<Value, CubiclerError> {
        let mut args = match args {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                return Err(CubiclerError::Validation(format!(
                    "tool arguments must be an object, got {}",
                    other
                )))
            }
        };

        // Substitute {placeholder} path segments from the arguments.
        let mut path = endpoint.path.clone();
        let placeholders: Vec<String> = args
            .keys()
            .filter(|key| path.contains(&format!("{{{}}}", key)))
            .cloned()
            .collect();
        for key in placeholders {
            if let Some(value) = args.remove(&key) {
                path = path.replace(&format!("{{{}}}", key), &query_value(&value));
            }
        }

        let body = args.remove("payload");

        let url = format!(
            "{}/{}",
            self.config.url.trim_end_matches('/'),
            path.trim_start_matches('/')
        );
        let method: reqwest::Method = endpoint.method.to_uppercase().parse().map_err(|_| {
            CubiclerError::Config(format!("invalid method {} for {}", endpoint.method, endpoint.name))
        })?;

        let mut builder = self.client.request(method, &url);
        for (key, value) in &self.config.default_headers {
            builder = builder.header(key, value);
        }
        for (key, value) in &endpoint.headers {
            builder = builder.header(key, value);
        }
        if let Some(ref auth) = self.auth {
            builder = builder.bearer_auth(self.jwt.token(auth).await?);
        }

        // Leftover arguments travel as the query string.
        let query: Vec<(String, String)> =
            args.iter().map(|(k, v)| (k.clone(), query_value(v))).collect();
        if !query.is_empty() {
            builder = builder.query(&query);
        }
        if let Some(body) = body {
            builder = builder.json(&body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| CubiclerError::Transport(format!("REST request failed: {}", e)))?;
        let status = response.status();
        if !status.is_success() {
            return Err(CubiclerError::Transport(format!(
                "REST request failed: status {}",
                status
            )));
        }

        let parsed: Value = response
            .json()
            .await
            .map_err(|e| CubiclerError::JsonDecode(format!("invalid REST response: {}", e)))?;

        if endpoint.response_transform.is_empty() {
            Ok(parsed)
        } else {
            Ok(transform_response(&parsed, &endpoint.response_transform))
        }
    }
}

#[async_trait]
impl super::ToolProvider for RestProvider {
    fn identifier(&self) -> &str {
        &self.config.identifier
    }

    fn name(&self) -> &str {
        &self.config.name
    }

    fn description(&self) -> &str {
        &self.config.description
    }

    async fn initialize(&self) -> Result<(), CubiclerError> {
        // Declarative endpoints need no upstream handshake.
        Ok(())
    }

    async fn tools_list(&self) -> Result<Vec<ToolDefinition>, CubiclerError> {
        Ok(self.config.endpoints.iter().map(endpoint_tool).collect())
    }

    async fn tools_call(&self, tool: &str, args: Value) -> Result<Value, CubiclerError> {
        let local = match decode_external_name(tool) {
            Some((hash, local)) if hash == self.hash => local,
            _ => {
                return Err(CubiclerError::Mcp(format!(
                    "tool {} does not belong to this provider",
                    tool
                )))
            }
        };
        let endpoint = self
            .endpoint(local)
            .ok_or_else(|| CubiclerError::NotFound(format!("unknown endpoint: {}", local)))?;
        self.call_endpoint(endpoint, args).await
    }

    async fn can_handle(&self, tool: &str) -> bool {
        match decode_external_name(tool) {
            Some((hash, local)) => hash == self.hash && self.endpoint(local).is_some(),
            None => false,
        }
    }

    async fn close(&self) -> Result<(), CubiclerError> {
        Ok(())
    }
}
