//! Batch framing tests: array input/output policy and the scoped outgoing
//! accumulator.

use jsonrpc_peer::{
    ErrorObject, RequestParams, RpcError, RpcMessage, RpcOutput, RpcPeer, Schema,
};
use serde_json::{Value, json};

fn peer() -> RpcPeer {
    RpcPeer::builder()
        .methods(["add", "ping"])
        .params("add", Schema::list(Schema::Number))
        .result("add", Schema::Number)
        .result("ping", Schema::String)
        .handler("add", |params| {
            let total: i64 = params
                .and_then(|p| match p {
                    RequestParams::Array(items) => {
                        Some(items.iter().filter_map(Value::as_i64).sum())
                    }
                    RequestParams::Object(_) => None,
                })
                .ok_or_else(|| ErrorObject::invalid_params("expected a list of numbers"))?;
            Ok(json!(total))
        })
        .handler("ping", |_| Ok(json!("pong")))
        .build()
        .unwrap()
}

#[test]
fn batch_of_requests_is_answered_in_order() {
    let peer = peer();
    let output = peer
        .parse(
            r#"[{"jsonrpc":"2.0","method":"add","id":"s1","params":[1,2,3]},
                {"jsonrpc":"2.0","method":"ping","id":"s1122"}]"#,
        )
        .unwrap();

    assert_eq!(
        output.to_json().unwrap(),
        r#"[{"jsonrpc":"2.0","id":"s1","result":6},{"jsonrpc":"2.0","id":"s1122","result":"pong"}]"#
    );
}

#[test]
fn single_element_batch_in_means_single_element_batch_out() {
    let peer = peer();
    let output = peer
        .parse(r#"[{"jsonrpc":"2.0","method":"add","id":"s1","params":[1,2,3]}]"#)
        .unwrap();

    assert_eq!(
        output.to_json().unwrap(),
        r#"[{"jsonrpc":"2.0","id":"s1","result":6}]"#
    );
}

#[test]
fn batch_mixing_request_and_notification_answers_only_the_request() {
    let peer = peer();
    let output = peer
        .parse(
            r#"[{"jsonrpc":"2.0","method":"NOWHERE!","id":"q1"},
                {"jsonrpc":"2.0","method":"NOWHERE!"}]"#,
        )
        .unwrap();

    match &output {
        RpcOutput::Batch(messages) => {
            assert_eq!(messages.len(), 1);
            match &messages[0] {
                RpcMessage::Error(err) => assert_eq!(err.error.code, -32601),
                other => panic!("expected method not found, got {:?}", other),
            }
        }
        other => panic!("expected batch output, got {:?}", other),
    }
}

#[test]
fn partially_invalid_batch_still_processes_valid_entries() {
    let peer = peer();
    let output = peer
        .parse(
            r#"[{"jsonrpc":"2.0","method":"add","id":1,"params":[1,2]},
                {"foo":"boo"},
                {"jsonrpc":"2.0","method":"ping"}]"#,
        )
        .unwrap();

    match &output {
        RpcOutput::Batch(messages) => {
            assert_eq!(messages.len(), 2);
            assert!(matches!(&messages[0], RpcMessage::Response(resp) if resp.result == json!(3)));
            assert!(matches!(&messages[1], RpcMessage::Error(err) if err.error.code == -32600));
        }
        other => panic!("expected batch output, got {:?}", other),
    }
}

#[test]
fn batch_of_notifications_produces_nothing() {
    let peer = peer();
    let output = peer.parse(
        r#"[{"jsonrpc":"2.0","method":"ping"},{"jsonrpc":"2.0","method":"add","params":[1]}]"#,
    );
    assert!(output.is_none());
}

#[test]
fn scope_buffers_outgoing_messages() {
    let peer = peer();
    {
        let _scope = peer.batch();
        assert!(peer.create_request("ping", None, |_| {}, None).unwrap().is_none());
        assert!(
            peer.create_notification("add", Some(RequestParams::Array(vec![json!(1)])))
                .unwrap()
                .is_none()
        );
        assert_eq!(peer.bulk_size(), 2);
    }

    let batch = peer.take_batch().unwrap();
    assert_eq!(batch.len(), 2);
    let raw = batch.to_json().unwrap();
    assert!(raw.starts_with('['));
    assert!(raw.contains("\"method\":\"ping\""));
    assert!(raw.contains("\"method\":\"add\""));

    // drained: nothing left, and new messages pass through again
    assert!(peer.take_batch().is_none());
    assert!(peer.create_notification("ping", None).unwrap().is_some());
}

#[test]
fn scope_captures_parser_replies_too() {
    let peer = peer();
    {
        let _scope = peer.batch();
        // the reply to this request lands in the batch buffer
        assert!(
            peer.parse(r#"{"jsonrpc":"2.0","method":"add","id":7,"params":[2,3]}"#)
                .is_none()
        );
        assert_eq!(peer.bulk_size(), 1);
    }

    // a lone collected message is released unwrapped
    let batch = peer.take_batch().unwrap();
    assert_eq!(
        batch.to_json().unwrap(),
        r#"{"jsonrpc":"2.0","id":7,"result":5}"#
    );
}

#[test]
fn forced_batching_keeps_the_array_frame_for_one_message() {
    let peer = peer();
    {
        let _scope = peer.batch();
        peer.parse(r#"{"jsonrpc":"2.0","method":"add","id":7,"params":[2,3]}"#);
    }

    let batch = peer.take_batch_forced().unwrap();
    assert_eq!(
        batch.to_json().unwrap(),
        r#"[{"jsonrpc":"2.0","id":7,"result":5}]"#
    );
}

#[test]
fn scope_is_released_on_early_return() {
    fn build_and_fail(peer: &RpcPeer) -> Result<(), RpcError> {
        let _scope = peer.batch();
        peer.create_request("ping", None, |_| {}, None)?;
        // unknown method: bails out of the scope through `?`
        peer.create_request("missing", None, |_| {}, None)?;
        Ok(())
    }

    let peer = peer();
    assert!(build_and_fail(&peer).is_err());

    // the guard dropped on the error path; batching is off again
    assert!(peer.create_notification("ping", None).unwrap().is_some());
    // and the messages captured before the failure are still collectable
    assert_eq!(peer.take_batch().unwrap().len(), 1);
}

#[test]
fn nested_scopes_release_outermost_last() {
    let peer = peer();
    let outer = peer.batch();
    {
        let _inner = peer.batch();
        peer.create_notification("ping", None).unwrap();
    }
    assert!(peer.create_notification("ping", None).unwrap().is_none());
    drop(outer);

    assert!(peer.create_notification("ping", None).unwrap().is_some());
    assert_eq!(peer.take_batch().unwrap().len(), 2);
}
