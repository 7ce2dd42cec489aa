//! Simple Calculator JSON-RPC Example
//!
//! This example demonstrates a peer serving calculator operations
//! (add, subtract) with schema-validated params while also issuing its own
//! request and receiving the reply back over the same parse path.

use jsonrpc_peer::{ErrorObject, RequestParams, RpcPeer, Schema};
use serde_json::{Value, json};

fn numbers(params: Option<RequestParams>) -> Result<Vec<f64>, ErrorObject> {
    match params {
        Some(RequestParams::Array(items)) => {
            Ok(items.iter().filter_map(Value::as_f64).collect())
        }
        _ => Err(ErrorObject::invalid_params("expected a list of numbers")),
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "debug".into()),
        )
        .init();

    let peer = RpcPeer::builder()
        .name("calculator")
        .methods(["add", "subtract"])
        .params("add", Schema::list(Schema::Number))
        .params("subtract", Schema::list(Schema::Number))
        .result("add", Schema::Number)
        .result("subtract", Schema::Number)
        .handler("add", |params| {
            let numbers = numbers(params)?;
            Ok(json!(numbers.iter().sum::<f64>()))
        })
        .handler("subtract", |params| {
            let numbers = numbers(params)?;
            let mut numbers = numbers.into_iter();
            let first = numbers.next().unwrap_or(0.0);
            Ok(json!(numbers.fold(first, |acc, n| acc - n)))
        })
        .build()
        .expect("builder configuration is static");

    // Server role: answer payloads arriving from the transport.
    let inbound = [
        r#"{"jsonrpc":"2.0","method":"add","id":1,"params":[1,2,3]}"#,
        r#"{"jsonrpc":"2.0","method":"subtract","id":2,"params":[10,4]}"#,
        r#"[{"jsonrpc":"2.0","method":"add","id":3,"params":[5,5]},
            {"jsonrpc":"2.0","method":"add","params":[0]}]"#,
        r#"{"jsonrpc":"2.0","method":"divide","id":4}"#,
    ];
    for payload in inbound {
        println!("<- {payload}");
        match peer.parse(payload) {
            Some(reply) => println!("-> {}", reply.to_json().expect("replies serialize")),
            None => println!("-> (no reply)"),
        }
    }

    // Client role: issue a request and feed the reply back in.
    let request = peer
        .create_request(
            "add",
            Some(RequestParams::Array(vec![json!(20), json!(22)])),
            |result| println!("add returned {result}"),
            None,
        )
        .expect("add is registered")
        .expect("no batch scope is open");

    let wire = serde_json::to_string(&request).expect("requests serialize");
    println!("<- (loopback) {wire}");
    if let Some(reply) = peer.parse(&wire) {
        peer.parse(&reply.to_json().expect("replies serialize"));
    }
}
