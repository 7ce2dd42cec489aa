use std::collections::HashMap;
use std::sync::Mutex;

use serde_json::Value;

use crate::error::{ErrorObject, RpcError};
use crate::types::RequestId;

/// Callback invoked with the `result` of a matched response.
pub type ResultCallback = Box<dyn FnOnce(Value) + Send>;
/// Callback invoked with the error object of a matched error reply.
pub type ErrorCallback = Box<dyn FnOnce(ErrorObject) + Send>;

/// One outstanding request awaiting its reply.
pub struct PendingCall {
    pub method: String,
    pub on_result: ResultCallback,
    pub on_error: Option<ErrorCallback>,
}

impl std::fmt::Debug for PendingCall {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingCall")
            .field("method", &self.method)
            .field("has_error_callback", &self.on_error.is_some())
            .finish()
    }
}

/// Table of issued requests awaiting a response or error.
///
/// Entries are removed exactly once, on `resolve` or `cancel`; nothing is
/// ever retried or re-delivered. Guarded by a mutex so completions may
/// arrive from whatever threading model the embedding application uses.
#[derive(Debug, Default)]
pub struct PendingCalls {
    calls: Mutex<HashMap<RequestId, PendingCall>>,
}

impl PendingCalls {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind an outstanding id to its callbacks. Fails while the id is still
    /// pending from an earlier request.
    pub fn register(
        &self,
        id: RequestId,
        method: String,
        on_result: ResultCallback,
        on_error: Option<ErrorCallback>,
    ) -> Result<(), RpcError> {
        let mut calls = self.lock();
        if calls.contains_key(&id) {
            return Err(RpcError::DuplicateId(id));
        }
        calls.insert(
            id,
            PendingCall {
                method,
                on_result,
                on_error,
            },
        );
        Ok(())
    }

    /// Take the entry for `id`, removing it. A second resolve of the same id
    /// finds nothing.
    pub fn resolve(&self, id: &RequestId) -> Option<PendingCall> {
        self.lock().remove(id)
    }

    /// Drop an outstanding entry without invoking any callback.
    pub fn cancel(&self, id: &RequestId) -> bool {
        self.lock().remove(id).is_some()
    }

    pub fn contains(&self, id: &RequestId) -> bool {
        self.lock().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Ids still awaiting a reply; the application's leak-inspection surface.
    pub fn ids(&self) -> Vec<RequestId> {
        self.lock().keys().cloned().collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<RequestId, PendingCall>> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner())
    }
}
