//! Tool-name encoding between server identifiers and agent-visible names.
//!
//! Agents see external names of the form `<hash>_<localTool>`, where `hash`
//! is a stable 6-character token derived from the server identifier. The
//! dotted logical form `<serverIdentifier>.<localTool>` is what restriction
//! lists use; it never contains the hash, so configurations are insensitive
//! to the hash function.
//!
//! The hash is fixed as the lowercase first 6 hex characters of the SHA-256
//! of the identifier.

use serde::Serialize;
use sha2::{Digest, Sha256};

/// Name prefix reserved for Cubicler's built-in tools. Internal tool names
/// are passed through verbatim, never hash-encoded.
pub const INTERNAL_TOOL_PREFIX: &str = "cubicler_";

/// Length of the server-hash token in external tool names.
pub const SERVER_HASH_LEN: usize = 6;

/// Derive the 6-character server hash for an identifier.
pub fn server_hash(identifier: &str) -> String {
    let digest = Sha256::digest(identifier.as_bytes());
    let hex: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
    hex[..SERVER_HASH_LEN].to_string()
}

/// Build the agent-visible name for a server-local tool.
pub fn external_tool_name(identifier: &str, local_tool: &str) -> String {
    format!("{}_{}", server_hash(identifier), local_tool)
}

/// Split an external name back into `(server_hash, local_tool)`.
///
/// Splits on the first `_`; returns `None` when either side is empty.
pub fn decode_external_name(name: &str) -> Option<(&str, &str)> {
    let (hash, local) = name.split_once('_')?;
    if hash.is_empty() || local.is_empty() {
        return None;
    }
    Some((hash, local))
}

/// The dotted logical name used by restriction lists.
pub fn logical_tool_name(identifier: &str, local_tool: &str) -> String {
    format!("{}.{}", identifier, local_tool)
}

pub fn is_internal_tool(name: &str) -> bool {
    name.starts_with(INTERNAL_TOOL_PREFIX)
}

/// Hash of a serializable config value, used to detect configuration changes
/// that must invalidate dependent transports and cached tool lists.
pub fn config_hash<T: Serialize>(value: &T) -> String {
    let serialized = serde_json::to_string(value).unwrap_or_default();
    let digest = Sha256::digest(serialized.as_bytes());
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_hash_is_deterministic_and_lowercase_hex() {
        let first = server_hash("weather_service");
        let second = server_hash("weather_service");
        assert_eq!(first, second);
        assert_eq!(first.len(), SERVER_HASH_LEN);
        assert!(first.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn distinct_identifiers_get_distinct_hashes() {
        assert_ne!(server_hash("weather_service"), server_hash("news_service"));
    }

    #[test]
    fn external_names_decode_on_first_underscore() {
        let name = external_tool_name("weather_service", "get_forecast");
        let (hash, local) = decode_external_name(&name).unwrap();
        assert_eq!(hash, server_hash("weather_service"));
        // The local tool keeps its own underscores intact.
        assert_eq!(local, "get_forecast");
    }

    #[test]
    fn decode_rejects_degenerate_names() {
        assert!(decode_external_name("nounderscores").is_none());
        assert!(decode_external_name("_leading").is_none());
        assert!(decode_external_name("trailing_").is_none());
    }

    #[test]
    fn internal_names_are_recognized() {
        assert!(is_internal_tool("cubicler_available_servers"));
        assert!(!is_internal_tool("1r2dj4_get_weather"));
    }

    #[test]
    fn config_hash_tracks_content() {
        let a = config_hash(&serde_json::json!({"url": "http://a"}));
        let b = config_hash(&serde_json::json!({"url": "http://b"}));
        assert_ne!(a, b);
        assert_eq!(a, config_hash(&serde_json::json!({"url": "http://a"})));
    }
}
