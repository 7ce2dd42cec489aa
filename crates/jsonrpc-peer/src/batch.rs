use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::message::RpcMessage;

/// Emission sink that buffers outgoing messages while a batch scope is open.
///
/// Scopes nest; the buffer keeps collecting until the outermost guard drops,
/// and the collected messages stay available through `drain` afterwards.
#[derive(Debug, Default)]
pub struct BatchSink {
    depth: AtomicUsize,
    buffer: Mutex<Vec<RpcMessage>>,
}

impl BatchSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a batch scope. Buffering stops when the returned guard drops,
    /// whichever way the scope is exited.
    pub fn enter(&self) -> BatchScope<'_> {
        self.depth.fetch_add(1, Ordering::SeqCst);
        BatchScope { sink: self }
    }

    pub fn is_active(&self) -> bool {
        self.depth.load(Ordering::SeqCst) > 0
    }

    /// Buffer `message` if a scope is active, otherwise hand it back.
    pub fn capture(&self, message: RpcMessage) -> Option<RpcMessage> {
        if !self.is_active() {
            return Some(message);
        }
        self.lock().push(message);
        None
    }

    /// Buffer a whole set of messages if a scope is active, otherwise hand
    /// them back.
    pub fn capture_all(&self, messages: Vec<RpcMessage>) -> Option<Vec<RpcMessage>> {
        if !self.is_active() {
            return Some(messages);
        }
        self.lock().extend(messages);
        None
    }

    /// Number of buffered messages.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Take everything buffered so far.
    pub fn drain(&self) -> Vec<RpcMessage> {
        std::mem::take(&mut *self.lock())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<RpcMessage>> {
        self.buffer.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Guard for one open batch scope.
#[derive(Debug)]
pub struct BatchScope<'a> {
    sink: &'a BatchSink,
}

impl Drop for BatchScope<'_> {
    fn drop(&mut self) {
        self.sink.depth.fetch_sub(1, Ordering::SeqCst);
    }
}
