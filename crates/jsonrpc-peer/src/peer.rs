use std::collections::{HashMap, HashSet};
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex};

use serde_json::Value;
use tracing::{debug, warn};

use crate::batch::{BatchScope, BatchSink};
use crate::error::{ErrorObject, JsonRpcError, JsonRpcErrorCode, RpcError};
use crate::message::{Classified, RpcMessage, RpcOutput, classify};
use crate::notification::JsonRpcNotification;
use crate::pending::{ErrorCallback, PendingCalls, ResultCallback};
use crate::registry::TypeRegistry;
use crate::request::{JsonRpcRequest, RequestParams};
use crate::response::JsonRpcResponse;
use crate::schema::Schema;
use crate::types::{IdGenerator, RequestId};

/// Server-role handler for one method. Invoked synchronously with the
/// validated params; the returned value is checked against the method's
/// registered result schema before it goes on the wire. Returning
/// `Err(ErrorObject)` sends the handler's own code/message/data back.
pub type HandlerFn = dyn FnMut(Option<RequestParams>) -> Result<Value, ErrorObject> + Send;

type SharedHandler = Arc<Mutex<Box<HandlerFn>>>;

/// Configuration for an [`RpcPeer`]: the closed method set, per-method
/// param/result schemas, and server-role handlers.
#[derive(Default)]
pub struct RpcPeerBuilder {
    name: Option<String>,
    methods: HashSet<String>,
    params: HashMap<String, Schema>,
    results: HashMap<String, Schema>,
    handlers: HashMap<String, SharedHandler>,
}

impl RpcPeerBuilder {
    /// Optional peer name, folded into generated request ids.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Add one recognized method.
    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.methods.insert(method.into());
        self
    }

    /// Add a set of recognized methods.
    pub fn methods<I, S>(mut self, methods: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.methods.extend(methods.into_iter().map(Into::into));
        self
    }

    /// Expected params shape for `method`. Methods without one take
    /// "no parameters".
    pub fn params(mut self, method: impl Into<String>, schema: Schema) -> Self {
        self.params.insert(method.into(), schema);
        self
    }

    /// Expected result shape for `method`. Methods without one are
    /// unconstrained.
    pub fn result(mut self, method: impl Into<String>, schema: Schema) -> Self {
        self.results.insert(method.into(), schema);
        self
    }

    /// Server-role handler for `method`. Methods without a handler are
    /// client-only.
    pub fn handler<F>(mut self, method: impl Into<String>, handler: F) -> Self
    where
        F: FnMut(Option<RequestParams>) -> Result<Value, ErrorObject> + Send + 'static,
    {
        self.handlers.insert(
            method.into(),
            Arc::new(Mutex::new(Box::new(handler) as Box<HandlerFn>)),
        );
        self
    }

    /// Build the peer. Fails if a schema or handler references a method
    /// outside the method set.
    pub fn build(self) -> Result<RpcPeer, RpcError> {
        for method in self
            .params
            .keys()
            .chain(self.results.keys())
            .chain(self.handlers.keys())
        {
            if !self.methods.contains(method) {
                return Err(RpcError::UnknownMethod(method.clone()));
            }
        }
        Ok(RpcPeer {
            registry: TypeRegistry::new(self.methods, self.params, self.results),
            pending: PendingCalls::new(),
            id_gen: IdGenerator::new(self.name.as_deref()),
            handlers: self.handlers,
            sink: BatchSink::new(),
        })
    }
}

/// A JSON-RPC 2.0 peer acting as both requester and responder over an
/// external transport.
///
/// All state (the type registry, pending-call table, and id generator) is
/// owned by the instance; peers never share anything through process-global
/// state, so any number can coexist.
///
/// The transport hands inbound payloads to one of the `parse*` entry points
/// and sends whatever they return. Outgoing traffic is built with
/// [`create_request`](Self::create_request) and friends.
pub struct RpcPeer {
    registry: TypeRegistry,
    pending: PendingCalls,
    id_gen: IdGenerator,
    handlers: HashMap<String, SharedHandler>,
    sink: BatchSink,
}

impl fmt::Debug for RpcPeer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RpcPeer")
            .field("registry", &self.registry)
            .field("pending", &self.pending)
            .field("handlers", &self.handlers.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl RpcPeer {
    pub fn builder() -> RpcPeerBuilder {
        RpcPeerBuilder::default()
    }

    // -----------------------------------------------------------------
    // Client role: outgoing construction
    // -----------------------------------------------------------------

    /// Create a request with a generated id and bind its callbacks.
    ///
    /// `on_result` fires exactly once when the matching response arrives;
    /// `on_error` (when given) fires instead if the reply is an error.
    /// Returns `Ok(None)` when an open batch scope captured the message.
    pub fn create_request<F>(
        &self,
        method: &str,
        params: Option<RequestParams>,
        on_result: F,
        on_error: Option<ErrorCallback>,
    ) -> Result<Option<JsonRpcRequest>, RpcError>
    where
        F: FnOnce(Value) + Send + 'static,
    {
        self.request_inner(None, method, params, Box::new(on_result), on_error)
    }

    /// Create a request with a caller-supplied id, for protocols that need
    /// deterministic ids. Fails with `DuplicateId` while the id is pending.
    pub fn create_request_with_id<F>(
        &self,
        id: RequestId,
        method: &str,
        params: Option<RequestParams>,
        on_result: F,
        on_error: Option<ErrorCallback>,
    ) -> Result<Option<JsonRpcRequest>, RpcError>
    where
        F: FnOnce(Value) + Send + 'static,
    {
        self.request_inner(Some(id), method, params, Box::new(on_result), on_error)
    }

    fn request_inner(
        &self,
        id: Option<RequestId>,
        method: &str,
        params: Option<RequestParams>,
        on_result: ResultCallback,
        on_error: Option<ErrorCallback>,
    ) -> Result<Option<JsonRpcRequest>, RpcError> {
        if !self.registry.contains(method) {
            return Err(RpcError::UnknownMethod(method.to_string()));
        }
        self.registry
            .validate_params(method, params.as_ref())
            .map_err(|source| RpcError::InvalidParams {
                method: method.to_string(),
                source,
            })?;

        let id = id.unwrap_or_else(|| self.id_gen.next_id());
        self.pending
            .register(id.clone(), method.to_string(), on_result, on_error)?;
        self.registry.set_pending(id.clone(), method.to_string());

        let request = JsonRpcRequest::new(id, method.to_string(), params);
        debug!(method = %method, id = %request.id, "request created");

        Ok(match self.sink.capture(RpcMessage::Request(request)) {
            Some(RpcMessage::Request(request)) => Some(request),
            _ => None,
        })
    }

    /// Create a notification. No reply is ever expected, so nothing enters
    /// the pending-call table. Returns `Ok(None)` when an open batch scope
    /// captured the message.
    pub fn create_notification(
        &self,
        method: &str,
        params: Option<RequestParams>,
    ) -> Result<Option<JsonRpcNotification>, RpcError> {
        if !self.registry.contains(method) {
            return Err(RpcError::UnknownMethod(method.to_string()));
        }
        self.registry
            .validate_params(method, params.as_ref())
            .map_err(|source| RpcError::InvalidParams {
                method: method.to_string(),
                source,
            })?;

        let notification = JsonRpcNotification::new(method.to_string(), params);
        Ok(match self.sink.capture(RpcMessage::Notification(notification)) {
            Some(RpcMessage::Notification(notification)) => Some(notification),
            _ => None,
        })
    }

    /// Create a response for a request this peer is serving out-of-band,
    /// validating `result` against the method's registered schema. The
    /// server promised that schema; violating it is a construction error.
    pub fn create_response(
        &self,
        method: &str,
        id: RequestId,
        result: Value,
    ) -> Result<Option<JsonRpcResponse>, RpcError> {
        if !self.registry.contains(method) {
            return Err(RpcError::UnknownMethod(method.to_string()));
        }
        self.registry
            .validate_result(method, &result)
            .map_err(|source| RpcError::ResultMismatch {
                method: method.to_string(),
                source,
            })?;

        let response = JsonRpcResponse::new(id, result);
        Ok(match self.sink.capture(RpcMessage::Response(response)) {
            Some(RpcMessage::Response(response)) => Some(response),
            _ => None,
        })
    }

    // -----------------------------------------------------------------
    // Pending-call inspection
    // -----------------------------------------------------------------

    /// Number of requests still awaiting a reply.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Ids of requests still awaiting a reply.
    pub fn pending_ids(&self) -> Vec<RequestId> {
        self.pending.ids()
    }

    /// Abandon an outstanding request. Its callbacks will never run.
    pub fn cancel(&self, id: &RequestId) -> bool {
        self.registry.clear_pending(id);
        self.pending.cancel(id)
    }

    /// Replace the recognized method set. Handlers and schemas for removed
    /// methods are dropped; fails while outstanding requests still reference
    /// a method being removed.
    pub fn update_methods(&mut self, methods: HashSet<String>) -> Result<(), RpcError> {
        self.registry.update_methods(methods)?;
        let registry = &self.registry;
        self.handlers.retain(|method, _| registry.contains(method));
        Ok(())
    }

    // -----------------------------------------------------------------
    // Batching
    // -----------------------------------------------------------------

    /// Open a batch scope: until the returned guard drops, every message
    /// built or produced by this peer is buffered instead of returned.
    /// Release is guaranteed on every exit path, including unwinding.
    pub fn batch(&self) -> BatchScope<'_> {
        self.sink.enter()
    }

    /// Number of messages buffered by batch scopes so far.
    pub fn bulk_size(&self) -> usize {
        self.sink.len()
    }

    /// Drain the buffered messages. A single collected message is released
    /// individually; more than one comes back as a batch. `None` if nothing
    /// was buffered.
    pub fn take_batch(&self) -> Option<RpcOutput> {
        let mut messages = self.sink.drain();
        match messages.len() {
            0 => None,
            1 => messages.pop().map(RpcOutput::Single),
            _ => Some(RpcOutput::Batch(messages)),
        }
    }

    /// Drain the buffered messages, framed as a batch even for a single
    /// message.
    pub fn take_batch_forced(&self) -> Option<RpcOutput> {
        RpcOutput::batch(self.sink.drain()).ok()
    }

    // -----------------------------------------------------------------
    // Server role + correlation: inbound dispatch
    // -----------------------------------------------------------------

    /// Parse and dispatch one inbound JSON text payload.
    ///
    /// Returns the message (or batch) to send back, if any. Never panics and
    /// never returns an error: every wire-level failure is converted into an
    /// Error reply or reported and dropped.
    pub fn parse(&self, data: &str) -> Option<RpcOutput> {
        match serde_json::from_str::<Value>(data) {
            Ok(value) => self.parse_value(value),
            Err(err) => {
                warn!(error = %err, "inbound payload is not valid JSON");
                self.emit_single(RpcMessage::Error(JsonRpcError::parse_error(Some(
                    Value::String(err.to_string()),
                ))))
            }
        }
    }

    /// Parse and dispatch one inbound byte payload.
    pub fn parse_bytes(&self, data: &[u8]) -> Option<RpcOutput> {
        match std::str::from_utf8(data) {
            Ok(text) => self.parse(text),
            Err(err) => {
                warn!(error = %err, "inbound payload is not valid UTF-8");
                self.emit_single(RpcMessage::Error(JsonRpcError::parse_error(Some(
                    Value::String(err.to_string()),
                ))))
            }
        }
    }

    /// Dispatch an already-decoded JSON value (object or array).
    ///
    /// Array input is processed entry by entry (a partially invalid batch
    /// still processes its valid entries) and is always answered with array
    /// output when any reply exists, even for a single entry.
    pub fn parse_value(&self, value: Value) -> Option<RpcOutput> {
        match value {
            Value::Array(entries) => {
                if entries.is_empty() {
                    return self
                        .emit_single(RpcMessage::Error(JsonRpcError::invalid_request(None)));
                }
                let replies: Vec<RpcMessage> = entries
                    .into_iter()
                    .filter_map(|entry| self.dispatch_value(entry))
                    .collect();
                if replies.is_empty() {
                    return None;
                }
                self.sink.capture_all(replies).map(RpcOutput::Batch)
            }
            other => {
                let reply = self.dispatch_value(other)?;
                self.emit_single(reply)
            }
        }
    }

    fn emit_single(&self, message: RpcMessage) -> Option<RpcOutput> {
        self.sink.capture(message).map(RpcOutput::Single)
    }

    /// Classify and dispatch one entry, yielding at most one reply.
    fn dispatch_value(&self, value: Value) -> Option<RpcMessage> {
        match classify(value) {
            Classified::Reject(error) => Some(RpcMessage::Error(error)),
            Classified::Drop(report) => {
                debug!(code = report.code, message = %report.message, "dropping malformed notification");
                None
            }
            Classified::Message(RpcMessage::Request(request)) => {
                Some(self.handle_request(request))
            }
            Classified::Message(RpcMessage::Notification(notification)) => {
                self.handle_notification(notification);
                None
            }
            Classified::Message(RpcMessage::Response(response)) => {
                self.handle_response(response);
                None
            }
            Classified::Message(RpcMessage::Error(error)) => {
                self.handle_error(error);
                None
            }
        }
    }

    /// A request always owes a reply: every failure path below produces an
    /// Error addressed back to the caller.
    fn handle_request(&self, request: JsonRpcRequest) -> RpcMessage {
        let JsonRpcRequest {
            id, method, params, ..
        } = request;

        if !self.registry.contains(&method) {
            return RpcMessage::Error(JsonRpcError::method_not_found(id, &method));
        }
        if let Err(err) = self.registry.validate_params(&method, params.as_ref()) {
            return RpcMessage::Error(JsonRpcError::invalid_params(id, &err.to_string()));
        }
        let Some(handler) = self.handlers.get(&method).cloned() else {
            warn!(method = %method, id = %id, "request for method with no registered handler");
            return RpcMessage::Error(JsonRpcError::method_not_found(id, &method));
        };

        let outcome = {
            let mut guard = handler.lock().unwrap_or_else(|e| e.into_inner());
            catch_unwind(AssertUnwindSafe(|| (*guard)(params)))
        };

        match outcome {
            Ok(Ok(result)) => match self.registry.validate_result(&method, &result) {
                Ok(()) => RpcMessage::Response(JsonRpcResponse::new(id, result)),
                Err(err) => {
                    warn!(method = %method, error = %err, "handler result does not fit its registered schema");
                    RpcMessage::Error(JsonRpcError::internal_error(
                        Some(id),
                        Some(format!("result for method '{}': {}", method, err)),
                    ))
                }
            },
            Ok(Err(error)) => RpcMessage::Error(JsonRpcError::new(Some(id), error)),
            Err(panic) => {
                let detail = panic_message(panic);
                warn!(method = %method, detail = %detail, "handler panicked");
                RpcMessage::Error(JsonRpcError::new(
                    Some(id),
                    ErrorObject::new(
                        JsonRpcErrorCode::InternalError,
                        None,
                        Some(Value::String(detail)),
                    ),
                ))
            }
        }
    }

    /// Notifications never produce wire output; failures are only reported.
    fn handle_notification(&self, notification: JsonRpcNotification) {
        let JsonRpcNotification { method, params, .. } = notification;

        if !self.registry.contains(&method) {
            debug!(method = %method, "dropping notification for unknown method");
            return;
        }
        if let Err(err) = self.registry.validate_params(&method, params.as_ref()) {
            debug!(method = %method, error = %err, "dropping notification with invalid params");
            return;
        }
        let Some(handler) = self.handlers.get(&method).cloned() else {
            debug!(method = %method, "no handler for notification");
            return;
        };

        let outcome = {
            let mut guard = handler.lock().unwrap_or_else(|e| e.into_inner());
            catch_unwind(AssertUnwindSafe(|| (*guard)(params)))
        };

        match outcome {
            Ok(Ok(_)) => {}
            Ok(Err(error)) => {
                debug!(method = %method, code = error.code, "notification handler reported an error")
            }
            Err(panic) => {
                warn!(method = %method, detail = %panic_message(panic), "notification handler panicked")
            }
        }
    }

    fn handle_response(&self, response: JsonRpcResponse) {
        let JsonRpcResponse { id, result, .. } = response;

        let Some(call) = self.pending.resolve(&id) else {
            warn!(id = %id, "received response with unknown id");
            return;
        };
        let method = self
            .registry
            .resolve_pending(&id)
            .unwrap_or_else(|| call.method.clone());

        match self.registry.validate_result(&method, &result) {
            Ok(()) => (call.on_result)(result),
            Err(err) => {
                // Delivery policy: a result violating the registered schema
                // is rejected, not handed to the success callback.
                warn!(id = %id, method = %method, error = %err, "rejecting response whose result does not fit the registered schema");
                if let Some(on_error) = call.on_error {
                    on_error(ErrorObject::internal_error(Some(format!(
                        "result for method '{}': {}",
                        method, err
                    ))));
                }
            }
        }
    }

    fn handle_error(&self, error: JsonRpcError) {
        let JsonRpcError {
            id, error: object, ..
        } = error;

        let Some(id) = id else {
            warn!(code = object.code, message = %object.message, "received error reply with null id");
            return;
        };
        let Some(call) = self.pending.resolve(&id) else {
            warn!(id = %id, code = object.code, "received error reply with unknown id");
            return;
        };
        self.registry.clear_pending(&id);

        match call.on_error {
            Some(on_error) => on_error(object),
            None => {
                warn!(id = %id, method = %call.method, code = object.code, message = %object.message, "unhandled error reply")
            }
        }
    }
}

fn panic_message(panic: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked".to_string()
    }
}
