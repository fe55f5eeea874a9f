//! Registry of calls waiting for a response.
//!
//! Each outgoing request gets a fresh numeric ID and a one-shot channel. The
//! output pump settles the entry when the matching response arrives; the
//! client removes it on timeout; process death fails every entry at once.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::sync::oneshot;

use crate::error::ClientError;
use crate::mcp::protocol::{JsonRpcErrorData, RequestId};

/// What a waiting caller eventually receives.
pub type CallOutcome = Result<Result<Value, JsonRpcErrorData>, ClientError>;

struct PendingCall {
    created: Instant,
    sender: oneshot::Sender<CallOutcome>,
}

/// Thread-safe map from request ID to the caller awaiting it.
pub struct PendingCalls {
    next_id: AtomicI64,
    calls: Mutex<HashMap<RequestId, PendingCall>>,
}

impl PendingCalls {
    /// Creates an empty registry. IDs start at 1.
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_id: AtomicI64::new(1),
            calls: Mutex::new(HashMap::new()),
        }
    }

    fn calls(&self) -> MutexGuard<'_, HashMap<RequestId, PendingCall>> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Allocates an ID and registers a waiting call under it.
    pub fn register(&self) -> (RequestId, oneshot::Receiver<CallOutcome>) {
        let id = RequestId::Number(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (sender, receiver) = oneshot::channel();
        let call = PendingCall {
            created: Instant::now(),
            sender,
        };
        self.calls().insert(id.clone(), call);
        (id, receiver)
    }

    /// Delivers a response to the call registered under `id`.
    ///
    /// Returns `false` if no such call is outstanding.
    pub fn settle(&self, id: &RequestId, outcome: Result<Value, JsonRpcErrorData>) -> bool {
        let Some(call) = self.calls().remove(id) else {
            return false;
        };
        tracing::trace!(%id, elapsed_ms = call.created.elapsed().as_millis(), "Call settled");
        // The caller may have stopped waiting; that is not an error here.
        let _ = call.sender.send(Ok(outcome));
        true
    }

    /// Removes a call without delivering anything.
    pub fn cancel(&self, id: &RequestId) -> bool {
        self.calls().remove(id).is_some()
    }

    /// Fails every outstanding call with `error`. Returns how many were failed.
    pub fn fail_all(&self, error: &ClientError) -> usize {
        let drained: Vec<PendingCall> = self.calls().drain().map(|(_, call)| call).collect();
        let count = drained.len();
        for call in drained {
            let _ = call.sender.send(Err(error.clone()));
        }
        count
    }

    /// Number of outstanding calls.
    #[must_use]
    pub fn len(&self) -> usize {
        self.calls().len()
    }

    /// Whether no calls are outstanding.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.calls().is_empty()
    }

    /// Age of the longest-waiting call.
    #[must_use]
    pub fn oldest_age(&self) -> Option<Duration> {
        self.calls()
            .values()
            .map(|call| call.created.elapsed())
            .max()
    }
}

impl Default for PendingCalls {
    fn default() -> Self {
        Self::new()
    }
}
