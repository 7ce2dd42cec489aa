//! Server-role dispatch tests: classification, validation, handler
//! invocation, and the error taxonomy on the wire.

use jsonrpc_peer::{ErrorObject, RequestParams, RpcMessage, RpcOutput, RpcPeer, Schema};
use serde_json::{Value, json};

fn sum(params: Option<RequestParams>) -> Result<Value, ErrorObject> {
    let items = match params {
        Some(RequestParams::Array(items)) => items,
        _ => return Err(ErrorObject::invalid_params("expected a list of numbers")),
    };
    if items.iter().all(|v| v.as_i64().is_some()) {
        Ok(json!(items.iter().filter_map(Value::as_i64).sum::<i64>()))
    } else {
        Ok(json!(items.iter().filter_map(Value::as_f64).sum::<f64>()))
    }
}

fn server() -> RpcPeer {
    RpcPeer::builder()
        .name("server")
        .methods(["add", "sub", "ping", "crash", "tweet", "error"])
        .params("add", Schema::list(Schema::Number))
        .params("sub", Schema::list(Schema::Number))
        .params("tweet", Schema::Any)
        .params("error", Schema::Any)
        .result("add", Schema::Number)
        .result("sub", Schema::Number)
        .result("ping", Schema::String)
        .result("crash", Schema::Integer)
        .handler("add", sum)
        .handler("sub", |params| {
            let items = match params {
                Some(RequestParams::Array(items)) => items,
                _ => return Err(ErrorObject::invalid_params("expected a list of numbers")),
            };
            let mut numbers = items.iter().filter_map(Value::as_i64);
            let first = numbers.next().unwrap_or(0);
            Ok(json!(numbers.fold(first, |acc, n| acc - n)))
        })
        .handler("ping", |_| Ok(json!("pong")))
        .handler("crash", |_| panic!("unsupported operand"))
        .handler("tweet", |_| Ok(Value::Null))
        .handler("error", |_| {
            Err(ErrorObject::server_error(-32000, "Internal server error.", None))
        })
        .build()
        .unwrap()
}

fn error_code(output: &RpcOutput) -> i64 {
    match output {
        RpcOutput::Single(RpcMessage::Error(err)) => err.error.code,
        other => panic!("expected a single error, got {:?}", other),
    }
}

#[test]
fn request_happy_flow() {
    let peer = server();

    let output = peer
        .parse(r#"{"jsonrpc":"2.0","method":"add","id":"s1","params":[1,2,3]}"#)
        .unwrap();
    assert_eq!(
        output.to_json().unwrap(),
        r#"{"jsonrpc":"2.0","id":"s1","result":6}"#
    );

    let output = peer
        .parse(r#"{"jsonrpc":"2.0","method":"sub","id":"s2","params":[10,2,3]}"#)
        .unwrap();
    assert_eq!(
        output.to_json().unwrap(),
        r#"{"jsonrpc":"2.0","id":"s2","result":5}"#
    );

    let output = peer
        .parse(r#"{"jsonrpc":"2.0","method":"ping","id":"s1122"}"#)
        .unwrap();
    assert_eq!(
        output.to_json().unwrap(),
        r#"{"jsonrpc":"2.0","id":"s1122","result":"pong"}"#
    );
}

#[test]
fn malformed_json_is_parse_error_with_null_id() {
    let peer = server();

    for raw in [r#"{"jsonrpc": "2.0", "method""#, ""] {
        let output = peer.parse(raw).unwrap();
        match &output {
            RpcOutput::Single(RpcMessage::Error(err)) => {
                assert_eq!(err.error.code, -32700);
                assert_eq!(err.id, None);
                assert!(err.error.data.is_some());
            }
            other => panic!("expected parse error, got {:?}", other),
        }
    }
}

#[test]
fn invalid_utf8_bytes_are_a_parse_error() {
    let peer = server();
    let output = peer.parse_bytes(&[0xff, 0xfe, 0x7b]).unwrap();
    assert_eq!(error_code(&output), -32700);
}

#[test]
fn bytes_input_dispatches_like_text() {
    let peer = server();
    let output = peer
        .parse_bytes(br#"{"jsonrpc":"2.0","method":"ping","id":1}"#)
        .unwrap();
    assert_eq!(
        output.to_json().unwrap(),
        r#"{"jsonrpc":"2.0","id":1,"result":"pong"}"#
    );
}

#[test]
fn empty_array_is_invalid_request() {
    let peer = server();
    let output = peer.parse("[]").unwrap();
    assert_eq!(error_code(&output), -32600);
}

#[test]
fn unclassifiable_object_is_invalid_request() {
    let peer = server();
    let output = peer.parse(r#"{"foo":"boo"}"#).unwrap();
    match &output {
        RpcOutput::Single(RpcMessage::Error(err)) => {
            assert_eq!(err.error.code, -32600);
            assert_eq!(err.id, None);
        }
        other => panic!("expected invalid request, got {:?}", other),
    }
}

#[test]
fn unknown_method() {
    let peer = server();

    // request: MethodNotFound with the id echoed
    let output = peer
        .parse(r#"{"jsonrpc":"2.0","method":"NOWHERE!","id":"1q"}"#)
        .unwrap();
    match &output {
        RpcOutput::Single(RpcMessage::Error(err)) => {
            assert_eq!(err.error.code, -32601);
            assert_eq!(err.id.as_ref().and_then(|id| id.as_str()), Some("1q"));
        }
        other => panic!("expected method not found, got {:?}", other),
    }

    // notification: silently dropped
    assert!(peer.parse(r#"{"jsonrpc":"2.0","method":"NOWHERE!"}"#).is_none());
}

#[test]
fn invalid_params() {
    let peer = server();

    // wrong shape, missing entirely, and scalar params all map to -32602
    for raw in [
        r#"{"jsonrpc":"2.0","method":"add","id":"-32s1","params":"NOP!"}"#,
        r#"{"jsonrpc":"2.0","method":"add","id":"s102"}"#,
        r#"{"jsonrpc":"2.0","method":"add","id":"s103","params":[1,"two"]}"#,
    ] {
        let output = peer.parse(raw).unwrap();
        assert_eq!(error_code(&output), -32602);
    }

    // the same failures on notifications produce nothing
    for raw in [
        r#"{"jsonrpc":"2.0","method":"add","params":"NOP!"}"#,
        r#"{"jsonrpc":"2.0","method":"add"}"#,
    ] {
        assert!(peer.parse(raw).is_none());
    }
}

#[test]
fn handler_panic_is_internal_error_for_requests_only() {
    let peer = server();

    let output = peer
        .parse(r#"{"jsonrpc":"2.0","method":"crash","id":"12342"}"#)
        .unwrap();
    match &output {
        RpcOutput::Single(RpcMessage::Error(err)) => {
            assert_eq!(err.error.code, -32603);
            assert_eq!(err.id.as_ref().and_then(|id| id.as_str()), Some("12342"));
            assert_eq!(err.error.data, Some(json!("unsupported operand")));
        }
        other => panic!("expected internal error, got {:?}", other),
    }

    // a crashing notification handler is reported, not answered
    assert!(peer.parse(r#"{"jsonrpc":"2.0","method":"crash"}"#).is_none());
}

#[test]
fn handler_error_carries_application_code() {
    let peer = server();
    let output = peer
        .parse(r#"{"jsonrpc":"2.0","method":"error","id":"12342","params":null}"#)
        .unwrap();
    match &output {
        RpcOutput::Single(RpcMessage::Error(err)) => {
            assert_eq!(err.error.code, -32000);
            assert_eq!(err.error.message, "Internal server error.");
        }
        other => panic!("expected server error, got {:?}", other),
    }
}

#[test]
fn received_error_reply_produces_no_output() {
    let peer = server();

    // whether or not the id is known, an inbound error is consumed
    for raw in [
        r#"{"id":"12342","jsonrpc":"2.0","error":{"code":-32000,"message":"Internal server error."}}"#,
        r#"{"jsonrpc":"2.0","id":null,"error":{"code":-32000,"message":"Internal server error."}}"#,
    ] {
        assert!(peer.parse(raw).is_none());
    }
}

#[test]
fn response_with_unknown_id_produces_no_output() {
    let peer = server();
    assert!(peer.parse(r#"{"jsonrpc":"2.0","id":"ghost","result":6}"#).is_none());
}

#[test]
fn extra_top_level_fields_are_rejected() {
    let peer = server();
    let output = peer
        .parse(r#"{"jsonrpc":"2.0","method":"ping","id":1,"meta":"x"}"#)
        .unwrap();
    assert_eq!(error_code(&output), -32600);
}

#[test]
fn request_and_result_hybrid_is_invalid() {
    let peer = server();
    let output = peer
        .parse(r#"{"jsonrpc":"2.0","method":"ping","id":1,"result":"pong"}"#)
        .unwrap();
    assert_eq!(error_code(&output), -32600);
}
