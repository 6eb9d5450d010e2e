//! Property-based tests for request id echo.

use std::sync::Arc;
use std::time::Duration;

use proptest::prelude::*;
use serde_json::{Value, json};

use mcp_gatekeeper::auth::{AuthMode, Identity};
use mcp_gatekeeper::config::Config;
use mcp_gatekeeper::protocol::{DispatchOutcome, Dispatcher, SessionStore};
use mcp_gatekeeper::tools::ToolSet;

fn dispatcher() -> Dispatcher {
    let sessions = SessionStore::new(Duration::from_secs(60), 100);
    Dispatcher::new(&Config::new("prop", "0.0.0"), Arc::new(ToolSet::new()), sessions)
}

fn identity() -> Option<Arc<Identity>> {
    Some(Arc::new(Identity::new("prop-user", AuthMode::Pat, "t")))
}

/// Generate a valid JSON-RPC id: an integer or a string.
fn arb_id() -> impl Strategy<Value = Value> {
    prop_oneof![
        any::<i64>().prop_map(Value::from),
        any::<u64>().prop_map(Value::from),
        "[A-Za-z0-9 _\\-]{0,32}".prop_map(Value::from),
    ]
}

fn run<F: std::future::Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(future)
}

proptest! {
    /// The response id serializes to exactly the bytes of the request id.
    #[test]
    fn id_echoed_byte_identical(id in arb_id(), known in any::<bool>()) {
        let method = if known { "ping" } else { "no/such/method" };
        let request = json!({"jsonrpc": "2.0", "id": id.clone(), "method": method});
        let body = serde_json::to_vec(&request).unwrap();

        let result = run(dispatcher().dispatch(&body, None, identity()));
        let DispatchOutcome::Single(response) = result.outcome else {
            panic!("expected a single response");
        };

        let echoed = serde_json::to_string(&response.id).unwrap();
        prop_assert_eq!(echoed, serde_json::to_string(&id).unwrap());
    }

    /// Batch responses follow input order and skip notifications.
    #[test]
    fn batch_order_follows_input(
        ids in proptest::collection::vec(proptest::option::of(arb_id()), 1..20)
    ) {
        let batch: Vec<Value> = ids
            .iter()
            .map(|id| match id {
                Some(id) => json!({"jsonrpc": "2.0", "id": id, "method": "ping"}),
                None => json!({"jsonrpc": "2.0", "method": "notifications/initialized"}),
            })
            .collect();

        let result = run(dispatcher().dispatch_value(Value::Array(batch), None, identity()));
        let expected: Vec<Value> = ids.into_iter().flatten().collect();

        match result.outcome {
            DispatchOutcome::NoContent => prop_assert!(expected.is_empty()),
            DispatchOutcome::Batch(responses) => {
                let got: Vec<Value> =
                    responses.iter().map(|r| serde_json::to_value(&r.id).unwrap()).collect();
                prop_assert_eq!(got, expected);
            }
            DispatchOutcome::Single(_) => {
                prop_assert!(false, "batch answered with a single response");
            }
        }
    }
}
