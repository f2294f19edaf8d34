//! Pending-request bookkeeping shared by the correlating transports.
//!
//! Stdio and SSE deliver responses out-of-band on a shared channel; each
//! in-flight request parks a oneshot sender here keyed by its id. An entry
//! lives from registration until its response is parsed, its deadline
//! expires, or the transport closes.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use cubicler_types::{CubiclerError, McpResponse, RequestId};
use tokio::sync::oneshot;

/// Map of in-flight request ids to their response channels.
///
/// At most one entry exists per id; registering a duplicate id is rejected
/// so no response can ever be delivered to more than one awaiter. The inner
/// lock is a plain std mutex: it is never held across an await point.
#[derive(Clone, Default)]
pub struct PendingRequests {
    inner: Arc<Mutex<HashMap<RequestId, oneshot::Sender<McpResponse>>>>,
}

impl PendingRequests {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a pending request, returning the receiving half.
    ///
    /// # Errors
    ///
    /// Returns `CubiclerError::Validation` when the id already has a pending
    /// entry.
    pub fn register(
        &self,
        id: RequestId,
    ) -> Result<oneshot::Receiver<McpResponse>, CubiclerError> {
        let (tx, rx) = oneshot::channel();
        let mut pending = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if pending.contains_key(&id) {
            return Err(CubiclerError::Validation(format!(
                "request id {} already in flight",
                id
            )));
        }
        pending.insert(id, tx);
        Ok(rx)
    }

    /// Deliver a response to its awaiter. Returns false when no entry exists
    /// for the id (late response after timeout, or never registered).
    pub fn resolve(&self, response: McpResponse) -> bool {
        let sender = {
            let mut pending = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            pending.remove(&response.id)
        };
        match sender {
            Some(tx) => tx.send(response).is_ok(),
            None => false,
        }
    }

    /// Drop one entry, if present. Used when a request times out locally.
    pub fn forget(&self, id: &RequestId) {
        let mut pending = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        pending.remove(id);
    }

    /// Reject every pending request with an error response carrying the
    /// given message. Used on disconnect, process exit, and close.
    pub fn reject_all(&self, code: i64, message: &str) {
        let drained: Vec<_> = {
            let mut pending = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            pending.drain().collect()
        };
        for (id, tx) in drained {
            let _ = tx.send(McpResponse::error(id, code, message));
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
