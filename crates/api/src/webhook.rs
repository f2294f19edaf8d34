//! Webhook ingestion: authentication, payload transformation, trigger
//! construction.
//!
//! Signature auth is HMAC-SHA256 over the *raw* payload bytes, compared
//! constant-time against the `x-signature-256` header (`sha256=<hex>`).
//! Bearer and JWT modes compare the incoming bearer token constant-time
//! against the configured or helper-held token. Every failure path answers
//! the same way so callers cannot probe which check failed.

use axum::http::HeaderMap;
use cubicler_mcp::transform_response;
use cubicler_transport::JwtHelper;
use cubicler_types::config::{WebhookAuthConfig, WebhookConfig};
use cubicler_types::security::constant_time_str_eq;
use cubicler_types::{CubiclerError, Trigger};
use hmac::{Hmac, Mac};
use serde_json::Value;
use sha2::Sha256;
use tracing::debug;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "x-signature-256";

#[derive(Clone, Default)]
pub struct WebhookService {
    jwt: JwtHelper,
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

pub fn signature_for(secret: &str, raw_body: &[u8]) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("hmac accepts any key length");
    mac.update(raw_body);
    format!("sha256={}", hex_encode(&mac.finalize().into_bytes()))
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
}

impl WebhookService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Authenticate an inbound delivery against the webhook's config.
    ///
    /// # Errors
    ///
    /// Returns `CubiclerError::Auth` on any mismatch; the cause is logged,
    /// never surfaced.
    pub async fn authenticate(
        &self,
        webhook: &WebhookConfig,
        headers: &HeaderMap,
        raw_body: &[u8],
    ) -> Result<(), CubiclerError> {
        let Some(ref auth) = webhook.auth else {
            return Ok(());
        };
        match auth {
            WebhookAuthConfig::Signature { secret } => {
                let Some(provided) = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok())
                else {
                    debug!(webhook = %webhook.identifier, "missing signature header");
                    return Err(CubiclerError::Auth);
                };
                let expected = signature_for(secret.expose(), raw_body);
                if constant_time_str_eq(provided, &expected) {
                    Ok(())
                } else {
                    debug!(webhook = %webhook.identifier, "signature mismatch");
                    Err(CubiclerError::Auth)
                }
            }
            WebhookAuthConfig::Bearer { token } => {
                let Some(provided) = bearer_token(headers) else {
                    return Err(CubiclerError::Auth);
                };
                if constant_time_str_eq(provided, token.expose()) {
                    Ok(())
                } else {
                    Err(CubiclerError::Auth)
                }
            }
            WebhookAuthConfig::Jwt { config } => {
                let Some(provided) = bearer_token(headers) else {
                    return Err(CubiclerError::Auth);
                };
                // Shared-secret-rotated-by-an-authority: the incoming token
                // must equal the token the helper currently holds.
                let expected = self.jwt.token(config).await.map_err(|e| {
                    debug!(webhook = %webhook.identifier, error = %e, "token fetch failed");
                    CubiclerError::Auth
                })?;
                if constant_time_str_eq(provided, &expected) {
                    Ok(())
                } else {
                    Err(CubiclerError::Auth)
                }
            }
        }
    }

    /// Apply the webhook's payload transforms and build the trigger handed
    /// to dispatch.
    pub fn build_trigger(&self, webhook: &WebhookConfig, payload: Value) -> Trigger {
        let payload = if webhook.payload_transform.is_empty() {
            payload
        } else {
            transform_response(&payload, &webhook.payload_transform)
        };
        Trigger::webhook(
            webhook.identifier.clone(),
            webhook.name.clone(),
            webhook.description.clone(),
            payload,
        )
    }
}
