//! # JSON-RPC 2.0 Peer
//!
//! A pure, transport-agnostic JSON-RPC 2.0 message layer for a peer that
//! acts as client and server at the same time. This crate provides message
//! construction, classification, schema enforcement, and request/response
//! correlation without any transport-specific code.
//!
//! ## Features
//! - Full JSON-RPC 2.0 message compliance, including batches
//! - Transport agnostic (works with sockets, serial lines, queues, etc.)
//! - Per-method param/result schemas enforced on both roles
//! - Pending-request correlation with per-call callbacks
//! - Scoped batching of outgoing traffic
//!
//! ```
//! use jsonrpc_peer::{RpcPeer, Schema};
//! use serde_json::json;
//!
//! let peer = RpcPeer::builder()
//!     .method("ping")
//!     .result("ping", Schema::String)
//!     .handler("ping", |_| Ok(json!("pong")))
//!     .build()
//!     .unwrap();
//!
//! let reply = peer.parse(r#"{"jsonrpc":"2.0","method":"ping","id":1}"#).unwrap();
//! assert_eq!(reply.to_json().unwrap(), r#"{"jsonrpc":"2.0","id":1,"result":"pong"}"#);
//! ```

pub mod batch;
pub mod error;
pub mod message;
pub mod notification;
pub mod peer;
pub mod pending;
pub mod registry;
pub mod request;
pub mod response;
pub mod schema;
pub mod types;

// Re-export main types
pub use batch::{BatchScope, BatchSink};
pub use error::{ErrorObject, JsonRpcError, JsonRpcErrorCode, RpcError};
pub use message::{Classified, RpcMessage, RpcOutput, classify};
pub use notification::JsonRpcNotification;
pub use peer::{HandlerFn, RpcPeer, RpcPeerBuilder};
pub use pending::{ErrorCallback, PendingCall, PendingCalls, ResultCallback};
pub use registry::TypeRegistry;
pub use request::{JsonRpcRequest, RequestParams};
pub use response::JsonRpcResponse;
pub use schema::{Schema, SchemaError};
pub use types::{IdGenerator, JsonRpcVersion, RequestId};

/// JSON-RPC 2.0 version constant
pub const JSONRPC_VERSION: &str = "2.0";

/// Standard JSON-RPC 2.0 error codes
pub mod error_codes {
    pub const PARSE_ERROR: i64 = -32700;
    pub const INVALID_REQUEST: i64 = -32600;
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const INTERNAL_ERROR: i64 = -32603;

    // Server error range: -32099 to -32000
    pub const SERVER_ERROR_START: i64 = -32099;
    pub const SERVER_ERROR_END: i64 = -32000;
}
