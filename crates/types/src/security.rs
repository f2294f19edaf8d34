//! Security utilities for handling sensitive data.
//!
//! This module provides types and utilities for secure handling of sensitive data:
//! - `Secret` for tokens and signing keys (prevents accidental logging)
//! - Constant-time comparison for credential checks

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use subtle::ConstantTimeEq;

/// A wrapper around `SecretString` that implements Serialize/Deserialize.
///
/// Used for webhook secrets, bearer tokens, and JWT client secrets. Display
/// and Debug are redacted, and serialization never emits the actual value.
///
/// # Example
///
/// ```rust
/// use cubicler_types::security::Secret;
///
/// let secret = Secret::new("s3cr3t");
/// assert_eq!(format!("{}", secret), "[REDACTED]");
/// assert_eq!(secret.expose(), "s3cr3t");
/// ```
#[derive(Clone)]
pub struct Secret(SecretString);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(SecretString::from(value.into()))
    }

    /// Expose the secret value. The exposed value must not be logged.
    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }

    pub fn is_empty(&self) -> bool {
        self.0.expose_secret().is_empty()
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Secret([REDACTED])")
    }
}

impl std::fmt::Display for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl Serialize for Secret {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        // Never serialize the actual secret
        serializer.serialize_str("[REDACTED]")
    }
}

impl<'de> Deserialize<'de> for Secret {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Secret::new(s))
    }
}

/// Constant-time comparison for sensitive data.
///
/// Equal-length buffers are compared byte-for-byte without data-dependent
/// branching; the length check itself is not secret (lengths of HMAC digests
/// and tokens are public).
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}

/// Constant-time string comparison.
pub fn constant_time_str_eq(a: &str, b: &str) -> bool {
    constant_time_eq(a.as_bytes(), b.as_bytes())
}

/// Validate that an identifier is non-empty and matches `[a-z0-9_-]+`.
pub fn validate_identifier(field: &str, value: &str) -> Result<(), crate::CubiclerError> {
    if value.is_empty() {
        return Err(crate::CubiclerError::Validation(format!("{} must not be empty", field)));
    }
    let valid = value
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-');
    if !valid {
        return Err(crate::CubiclerError::Validation(format!(
            "{} must match [a-z0-9_-]+: {}",
            field, value
        )));
    }
    Ok(())
}

/// Validate that a string is not empty or whitespace-only.
pub fn validate_not_empty(field: &str, value: &str) -> Result<(), crate::CubiclerError> {
    if value.trim().is_empty() {
        Err(crate::CubiclerError::Validation(format!("{} must not be empty", field)))
    } else {
        Ok(())
    }
}
