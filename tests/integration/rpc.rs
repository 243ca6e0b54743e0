//! RPC over the shared bus: round trips, failures, and isolation.

use crate::common::{init_tracing, within};
use hypha_bus::{Broker, BusClient};
use hypha_rpc::{CallError, CallOptions, HandlerError, Responder, RpcClient};
use serde_json::{json, Value};
use tokio::time::Duration;

#[tokio::test]
async fn test_round_trip_object() {
    init_tracing();
    let broker = Broker::new();
    let responder = Responder::new(BusClient::connect_local(&broker));
    let rpc = RpcClient::new(BusClient::connect_local(&broker));

    responder
        .bind("identity", |payload| async move {
            Ok(json!({ "echo": payload }))
        })
        .await
        .unwrap();

    let payload = json!({"nested": {"list": [1, 2, 3], "flag": true}, "text": "åäö"});
    let result = within("round trip", rpc.call("identity", Some(&payload)))
        .await
        .unwrap();

    assert_eq!(result, json!({ "echo": payload }));
}

#[tokio::test]
async fn test_round_trip_primitive() {
    init_tracing();
    let broker = Broker::new();
    let responder = Responder::new(BusClient::connect_local(&broker));
    let rpc = RpcClient::new(BusClient::connect_local(&broker));

    responder
        .bind("answer", |_| async move { Ok(json!(42)) })
        .await
        .unwrap();

    let result = within("primitive call", rpc.call("answer", None))
        .await
        .unwrap();
    assert_eq!(result, json!(42));
}

#[tokio::test]
async fn test_error_propagation() {
    init_tracing();
    let broker = Broker::new();
    let responder = Responder::new(BusClient::connect_local(&broker));
    let rpc = RpcClient::new(BusClient::connect_local(&broker));

    responder
        .bind("explode", |_| async move {
            Err::<Value, _>(HandlerError::msg("boom"))
        })
        .await
        .unwrap();

    let err = within("error call", rpc.call("explode", None))
        .await
        .unwrap_err();
    match err {
        CallError::Remote { message, .. } => assert_eq!(message, "boom"),
        other => panic!("expected remote error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_no_cross_talk_between_concurrent_calls() {
    init_tracing();
    let broker = Broker::new();
    let responder = Responder::new(BusClient::connect_local(&broker));
    let rpc = RpcClient::new(BusClient::connect_local(&broker));

    // The handler answers slow requests last, so responses arrive in the
    // reverse order of the requests.
    responder
        .bind("echo", |payload| async move {
            let payload = payload.unwrap_or(Value::Null);
            let delay = payload["delay_ms"].as_u64().unwrap_or(0);
            tokio::time::sleep(Duration::from_millis(delay)).await;
            Ok(json!({"n": payload["n"]}))
        })
        .await
        .unwrap();

    let slow_rpc = rpc.clone();
    let slow = tokio::spawn(async move {
        slow_rpc
            .call("echo", Some(&json!({"n": 1, "delay_ms": 150})))
            .await
    });
    let fast_rpc = rpc.clone();
    let fast = tokio::spawn(async move {
        fast_rpc
            .call("echo", Some(&json!({"n": 2, "delay_ms": 0})))
            .await
    });

    let fast_result = within("fast call", fast).await.unwrap().unwrap();
    let slow_result = within("slow call", slow).await.unwrap().unwrap();

    assert_eq!(fast_result, json!({"n": 2}));
    assert_eq!(slow_result, json!({"n": 1}));
}

#[tokio::test]
async fn test_end_to_end_light_scenario() {
    init_tracing();
    let broker = Broker::new();

    // Process A binds the procedure
    let process_a = Responder::new(BusClient::connect_local(&broker));
    process_a
        .bind("light", |payload| async move {
            let action = payload
                .as_ref()
                .and_then(|p| p["action"].as_str())
                .unwrap_or_default()
                .to_string();
            match action.as_str() {
                "on" => Ok(json!({"status": "On"})),
                _ => Err(HandlerError::msg("gpio fault")),
            }
        })
        .await
        .unwrap();

    // Process B calls it
    let process_b = RpcClient::new(BusClient::connect_local(&broker));

    let result = within(
        "light on",
        process_b.call("light", Some(&json!({"action": "on"}))),
    )
    .await
    .unwrap();
    assert_eq!(result, json!({"status": "On"}));

    let err = within(
        "light fault",
        process_b.call("light", Some(&json!({"action": "off"}))),
    )
    .await
    .unwrap_err();
    assert_eq!(err.to_string(), "gpio fault");
}

#[tokio::test]
async fn test_validation_issues_reach_the_caller() {
    use hypha_protocol::Issue;

    init_tracing();
    let broker = Broker::new();
    let responder = Responder::new(BusClient::connect_local(&broker));
    let rpc = RpcClient::new(BusClient::connect_local(&broker));

    responder
        .bind("focus", |payload| async move {
            let payload = payload.unwrap_or(Value::Null);
            if payload["distance"].as_f64().is_none() {
                return Err(HandlerError::Validation(vec![Issue::new(
                    "distance",
                    "must be a number",
                )]));
            }
            Ok(json!({"moved": true}))
        })
        .await
        .unwrap();

    let err = within("validation call", rpc.call("focus", Some(&json!({}))))
        .await
        .unwrap_err();

    assert!(err.is_validation());
    match err {
        CallError::Remote { issues, .. } => {
            let issues = issues.unwrap();
            assert_eq!(issues[0].path, "distance");
        }
        other => panic!("expected validation error, got {:?}", other),
    }

    let ok = within(
        "valid call",
        rpc.call("focus", Some(&json!({"distance": 1.5}))),
    )
    .await
    .unwrap();
    assert_eq!(ok, json!({"moved": true}));
}

#[tokio::test]
async fn test_unanswered_call_times_out_when_asked() {
    init_tracing();
    let broker = Broker::new();
    let rpc = RpcClient::new(BusClient::connect_local(&broker));

    // Nothing is bound to this topic; without options the call would wait
    // forever, which is the configured-in default.
    let err = rpc
        .call_with(
            "nobody/home",
            None,
            CallOptions::timeout(Duration::from_millis(100)),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, CallError::Timeout(_)));
}

#[tokio::test]
async fn test_many_concurrent_calls_all_resolve() {
    init_tracing();
    let broker = Broker::new();
    let responder = Responder::new(BusClient::connect_local(&broker));
    let rpc = RpcClient::new(BusClient::connect_local(&broker));

    responder
        .bind("double", |payload| async move {
            let n = payload.unwrap_or(Value::Null)["n"].as_i64().unwrap_or(0);
            Ok(json!(n * 2))
        })
        .await
        .unwrap();

    let mut handles = Vec::new();
    for n in 0..20i64 {
        let rpc = rpc.clone();
        handles.push(tokio::spawn(async move {
            let result = rpc.call("double", Some(&json!({"n": n}))).await?;
            Ok::<_, CallError>((n, result))
        }));
    }

    for handle in handles {
        let (n, result) = within("concurrent call", handle).await.unwrap().unwrap();
        assert_eq!(result, json!(n * 2));
    }
}
