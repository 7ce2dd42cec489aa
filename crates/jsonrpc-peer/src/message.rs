use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{ErrorObject, JsonRpcError, RpcError};
use crate::notification::JsonRpcNotification;
use crate::request::JsonRpcRequest;
use crate::response::JsonRpcResponse;
use crate::types::RequestId;

/// Any single JSON-RPC wire message.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RpcMessage {
    Request(JsonRpcRequest),
    Notification(JsonRpcNotification),
    Response(JsonRpcResponse),
    Error(JsonRpcError),
}

impl RpcMessage {
    /// Get the method name, for requests and notifications.
    pub fn method(&self) -> Option<&str> {
        match self {
            RpcMessage::Request(req) => Some(&req.method),
            RpcMessage::Notification(notif) => Some(&notif.method),
            _ => None,
        }
    }

    /// Get the correlation id, when the message carries one.
    pub fn id(&self) -> Option<&RequestId> {
        match self {
            RpcMessage::Request(req) => Some(&req.id),
            RpcMessage::Notification(_) => None,
            RpcMessage::Response(resp) => Some(&resp.id),
            RpcMessage::Error(err) => err.id.as_ref(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, RpcMessage::Error(_))
    }
}

impl From<JsonRpcRequest> for RpcMessage {
    fn from(request: JsonRpcRequest) -> Self {
        RpcMessage::Request(request)
    }
}

impl From<JsonRpcNotification> for RpcMessage {
    fn from(notification: JsonRpcNotification) -> Self {
        RpcMessage::Notification(notification)
    }
}

impl From<JsonRpcResponse> for RpcMessage {
    fn from(response: JsonRpcResponse) -> Self {
        RpcMessage::Response(response)
    }
}

impl From<JsonRpcError> for RpcMessage {
    fn from(error: JsonRpcError) -> Self {
        RpcMessage::Error(error)
    }
}

/// Outcome of classifying one inbound JSON value.
#[derive(Debug)]
pub enum Classified {
    /// A well-formed message.
    Message(RpcMessage),
    /// Malformed input that merits an error reply.
    Reject(JsonRpcError),
    /// Malformed notification; the protocol forbids answering it, so the
    /// would-be error is carried for internal reporting only.
    Drop(ErrorObject),
}

/// Classify a decoded JSON value into a message variant.
///
/// Canonical classification order, evaluated on the object's keys:
/// `method` + `id` is a Request, `method` alone is a Notification, `result`
/// is a Response, `error` is an Error reply, anything else is an invalid
/// request. Hybrids such as an object carrying both `method` and `result`
/// take the first matching branch and are then rejected by the closed-object
/// decode.
pub fn classify(value: Value) -> Classified {
    let obj = match &value {
        Value::Object(map) => map,
        _ => return Classified::Reject(JsonRpcError::invalid_request(None)),
    };

    if obj.contains_key("method") {
        if obj.contains_key("id") {
            classify_request(value)
        } else {
            classify_notification(value)
        }
    } else if obj.contains_key("result") {
        let id = extract_id(obj);
        match serde_json::from_value::<JsonRpcResponse>(value) {
            Ok(response) => Classified::Message(RpcMessage::Response(response)),
            Err(_) => Classified::Reject(JsonRpcError::invalid_request(id)),
        }
    } else if obj.contains_key("error") {
        let id = extract_id(obj);
        match serde_json::from_value::<JsonRpcError>(value) {
            Ok(error) => Classified::Message(RpcMessage::Error(error)),
            Err(_) => Classified::Reject(JsonRpcError::invalid_request(id)),
        }
    } else {
        Classified::Reject(JsonRpcError::invalid_request(extract_id(obj)))
    }
}

fn classify_request(value: Value) -> Classified {
    // Shape already checked; failures below are field-level.
    let obj = value.as_object().cloned().unwrap_or_default();
    match serde_json::from_value::<JsonRpcRequest>(value) {
        Ok(request) => Classified::Message(RpcMessage::Request(request)),
        Err(_) => {
            let id = extract_id(&obj);
            if let Some(reject) = unstructured_params(&obj) {
                match id {
                    Some(id) => Classified::Reject(JsonRpcError::new(Some(id), reject)),
                    None => Classified::Reject(JsonRpcError::invalid_request(None)),
                }
            } else {
                Classified::Reject(JsonRpcError::invalid_request(id))
            }
        }
    }
}

fn classify_notification(value: Value) -> Classified {
    let obj = value.as_object().cloned().unwrap_or_default();
    match serde_json::from_value::<JsonRpcNotification>(value) {
        Ok(notification) => Classified::Message(RpcMessage::Notification(notification)),
        Err(_) => match unstructured_params(&obj) {
            Some(reject) => Classified::Drop(reject),
            None => Classified::Drop(ErrorObject::invalid_request(None)),
        },
    }
}

/// Scalar `params` decode as a params-level failure, not a shape failure.
fn unstructured_params(obj: &Map<String, Value>) -> Option<ErrorObject> {
    match obj.get("params") {
        Some(params) if !params.is_array() && !params.is_object() && !params.is_null() => Some(
            ErrorObject::invalid_params("params must be an array or an object"),
        ),
        _ => None,
    }
}

/// Pull a usable correlation id out of a malformed object, for error replies.
fn extract_id(obj: &Map<String, Value>) -> Option<RequestId> {
    match obj.get("id") {
        Some(Value::String(s)) => Some(RequestId::String(s.clone())),
        Some(Value::Number(n)) => n.as_i64().map(RequestId::Number),
        _ => None,
    }
}

/// Zero-or-more serialized-ready outgoing messages.
///
/// Array input always yields `Batch` output, even for a single reply; object
/// input yields `Single`. Callers must not assume input and output
/// cardinality match.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RpcOutput {
    Single(RpcMessage),
    Batch(Vec<RpcMessage>),
}

impl RpcOutput {
    /// Assemble a batch; a batch of zero messages is not representable.
    pub fn batch(messages: Vec<RpcMessage>) -> Result<Self, RpcError> {
        if messages.is_empty() {
            return Err(RpcError::EmptyBatch);
        }
        Ok(RpcOutput::Batch(messages))
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Number of messages carried.
    pub fn len(&self) -> usize {
        match self {
            RpcOutput::Single(_) => 1,
            RpcOutput::Batch(messages) => messages.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
