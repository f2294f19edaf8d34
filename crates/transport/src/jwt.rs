//! JWT credential helper for outbound connections.
//!
//! Two credential modes per `JwtAuthConfig`: a static token returned
//! verbatim, and OAuth2 client-credentials against a token endpoint with a
//! shared cache keyed by `(token_url, client_id, audience)`. Cached tokens
//! are reused while `now < expires_at - refresh_threshold`.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use cubicler_types::config::JwtAuthConfig;
use cubicler_types::CubiclerError;
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::debug;

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 3600;

/// Shared token source. Cheap to clone; all clones share one cache.
#[derive(Clone, Default)]
pub struct JwtHelper {
    client: reqwest::Client,
    // Held across the token fetch so concurrent callers for the same key
    // trigger exactly one upstream request.
    cache: Arc<Mutex<HashMap<String, CachedToken>>>,
}

impl JwtHelper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve the current bearer token for a credential config.
    pub async fn token(&self, config: &JwtAuthConfig) -> Result<String, CubiclerError> {
        match config {
            JwtAuthConfig::Static { token } => Ok(token.expose().to_string()),
            JwtAuthConfig::OAuth2 { token_url, client_id, client_secret, audience, refresh_threshold } => {
                let key = config
                    .cache_key()
                    .ok_or_else(|| CubiclerError::Internal("missing jwt cache key".to_string()))?;
                let mut cache = self.cache.lock().await;
                if let Some(cached) = cache.get(&key) {
                    let threshold = ChronoDuration::seconds(*refresh_threshold as i64);
                    if Utc::now() < cached.expires_at - threshold {
                        return Ok(cached.access_token.clone());
                    }
                }

                debug!(token_url = %token_url, client_id = %client_id, "fetching oauth2 token");
                let fetched = self
                    .fetch_token(token_url, client_id, client_secret.expose(), audience.as_deref())
                    .await?;
                let token = fetched.access_token.clone();
                cache.insert(key, fetched);
                Ok(token)
            }
        }
    }

    async fn fetch_token(
        &self,
        token_url: &str,
        client_id: &str,
        client_secret: &str,
        audience: Option<&str>,
    ) -> Result<CachedToken, CubiclerError> {
        let mut form = vec![
            ("grant_type", "client_credentials"),
            ("client_id", client_id),
            ("client_secret", client_secret),
        ];
        if let Some(audience) = audience {
            form.push(("audience", audience));
        }

        let response = self
            .client
            .post(token_url)
            .form(&form)
            .send()
            .await
            .map_err(|e| CubiclerError::Transport(format!("token request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(CubiclerError::Transport(format!(
                "token request failed: status {}",
                response.status()
            )));
        }

        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| CubiclerError::JsonDecode(format!("invalid token response: {}", e)))?;

        let lifetime = body.expires_in.unwrap_or(DEFAULT_TOKEN_LIFETIME_SECS);
        Ok(CachedToken {
            access_token: body.access_token,
            expires_at: Utc::now() + ChronoDuration::seconds(lifetime),
        })
    }

    /// Drop every cached token.
    pub async fn clear(&self) {
        self.cache.lock().await.clear();
    }
}

/// Options for `verify_token`. Unset fields skip that check; algorithms
/// default to HS256 and RS256.
#[derive(Debug, Clone, Default)]
pub struct VerifyOptions {
    pub issuer: Option<String>,
    pub audience: Option<String>,
    pub algorithms: Option<Vec<Algorithm>>,
}

/// Verify a JWT's signature, not-before, expiry, and issuer/audience
/// equality; returns the decoded claims.
///
/// The secret is interpreted per the token's algorithm family: HMAC
/// algorithms take it as the shared secret, RSA algorithms as a public key
/// in PEM form.
pub fn verify_token(
    token: &str,
    secret: &str,
    options: &VerifyOptions,
) -> Result<Value, CubiclerError> {
    let header = jsonwebtoken::decode_header(token).map_err(|e| {
        debug!(error = %e, "invalid token header");
        CubiclerError::Auth
    })?;

    let allowed = options
        .algorithms
        .clone()
        .unwrap_or_else(|| vec![Algorithm::HS256, Algorithm::RS256]);
    if !allowed.contains(&header.alg) {
        return Err(CubiclerError::Auth);
    }

    let key = match header.alg {
        Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => {
            DecodingKey::from_secret(secret.as_bytes())
        }
        Algorithm::RS256 | Algorithm::RS384 | Algorithm::RS512 => {
            DecodingKey::from_rsa_pem(secret.as_bytes()).map_err(|e| {
                debug!(error = %e, "invalid public key");
                CubiclerError::Auth
            })?
        }
        _ => return Err(CubiclerError::Auth),
    };

    let mut validation = Validation::new(header.alg);
    validation.validate_nbf = true;
    if let Some(ref issuer) = options.issuer {
        validation.set_issuer(&[issuer]);
    }
    if let Some(ref audience) = options.audience {
        validation.set_audience(&[audience]);
    } else {
        validation.validate_aud = false;
    }

    let decoded = jsonwebtoken::decode::<Value>(token, &key, &validation).map_err(|e| {
        debug!(error = %e, "token rejected");
        CubiclerError::Auth
    })?;
    Ok(decoded.claims)
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde_json::json;

    fn make_token(claims: &Value, secret: &str) -> String {
        encode(&Header::new(Algorithm::HS256), claims, &EncodingKey::from_secret(secret.as_bytes()))
            .unwrap()
    }

    #[test]
    fn verifies_valid_hs256_token() {
        let exp = (Utc::now() + ChronoDuration::hours(1)).timestamp();
        let token = make_token(&json!({"sub": "agent_1", "exp": exp}), "secret");

        let claims = verify_token(&token, "secret", &VerifyOptions::default()).unwrap();
        assert_eq!(claims["sub"], json!("agent_1"));
    }

    #[test]
    fn rejects_bad_signature() {
        let exp = (Utc::now() + ChronoDuration::hours(1)).timestamp();
        let token = make_token(&json!({"exp": exp}), "secret");
        assert!(verify_token(&token, "other", &VerifyOptions::default()).is_err());
    }

    #[test]
    fn rejects_expired_token() {
        let exp = (Utc::now() - ChronoDuration::hours(1)).timestamp();
        let token = make_token(&json!({"exp": exp}), "secret");
        assert!(verify_token(&token, "secret", &VerifyOptions::default()).is_err());
    }

    #[test]
    fn enforces_issuer_and_audience() {
        let exp = (Utc::now() + ChronoDuration::hours(1)).timestamp();
        let token = make_token(
            &json!({"exp": exp, "iss": "cubicler", "aud": "providers"}),
            "secret",
        );

        let ok = VerifyOptions {
            issuer: Some("cubicler".to_string()),
            audience: Some("providers".to_string()),
            algorithms: None,
        };
        assert!(verify_token(&token, "secret", &ok).is_ok());

        let wrong_issuer = VerifyOptions {
            issuer: Some("someone-else".to_string()),
            audience: None,
            algorithms: None,
        };
        assert!(verify_token(&token, "secret", &wrong_issuer).is_err());
    }

    #[test]
    fn rejects_disallowed_algorithm() {
        let exp = (Utc::now() + ChronoDuration::hours(1)).timestamp();
        let token = make_token(&json!({"exp": exp}), "secret");
        let rsa_only = VerifyOptions {
            issuer: None,
            audience: None,
            algorithms: Some(vec![Algorithm::RS256]),
        };
        assert!(verify_token(&token, "secret", &rsa_only).is_err());
    }
}
