//! The tool-provider seam and the shared provider registry.
//!
//! # Architecture
//!
//! The registry is the indirection that breaks the wiring cycle between
//! providers and the router: it is created first, handed to everything that
//! needs to look providers up, and populated once after all providers
//! exist. The router and the internal tools provider hold registry handles,
//! never each other.

use std::sync::Arc;

use async_trait::async_trait;
use cubicler_types::naming::server_hash;
use cubicler_types::{CubiclerError, ToolDefinition};
use serde_json::Value;
use tokio::sync::RwLock;

/// One backend exposing tools.
///
/// `tools_list` returns server-local tool names; the router rewrites them to
/// their external form. `tools_call` receives the external name and decodes
/// it back. All implementations are `Send + Sync`; calls may arrive
/// concurrently from multiple dispatches.
#[async_trait]
pub trait ToolProvider: Send + Sync {
    /// Configured server identifier.
    fn identifier(&self) -> &str;

    /// Human-readable server name.
    fn name(&self) -> &str;

    /// Human-readable server description.
    fn description(&self) -> &str;

    /// Establish the upstream connection and warm caches.
    ///
    /// # Errors
    ///
    /// Returns `CubiclerError` when the upstream handshake fails; the
    /// provider stays registered and may recover on a later call.
    async fn initialize(&self) -> Result<(), CubiclerError>;

    /// Tools exposed by this backend, under their server-local names.
    async fn tools_list(&self) -> Result<Vec<ToolDefinition>, CubiclerError>;

    /// Invoke a tool by its external name.
    async fn tools_call(&self, tool: &str, args: Value) -> Result<Value, CubiclerError>;

    /// Whether this provider owns the external tool name.
    async fn can_handle(&self, tool: &str) -> bool;

    /// Release the upstream connection.
    async fn close(&self) -> Result<(), CubiclerError>;
}

/// Shared, ordered collection of providers.
///
/// Registration order is aggregation order (internal first, then MCP, then
/// REST — the wiring in the binary registers them that way). The handle is
/// cheap to clone; population happens once at startup and on config reload.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: Arc<RwLock<Vec<Arc<dyn ToolProvider>>>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, provider: Arc<dyn ToolProvider>) {
        self.providers.write().await.push(provider);
    }

    /// Replace the whole provider set (config reload).
    pub async fn replace(&self, providers: Vec<Arc<dyn ToolProvider>>) {
        *self.providers.write().await = providers;
    }

    /// Snapshot for iteration without holding the lock across awaits.
    pub async fn snapshot(&self) -> Vec<Arc<dyn ToolProvider>> {
        self.providers.read().await.clone()
    }

    pub async fn get(&self, identifier: &str) -> Option<Arc<dyn ToolProvider>> {
        self.providers
            .read()
            .await
            .iter()
            .find(|p| p.identifier() == identifier)
            .cloned()
    }

    /// Resolve a 6-character server hash back to its identifier.
    pub async fn resolve_hash(&self, hash: &str) -> Option<String> {
        self.providers
            .read()
            .await
            .iter()
            .map(|p| p.identifier().to_string())
            .find(|id| server_hash(id) == hash)
    }
}
