//! Watch liveness and broker-side retention across clients.

use crate::common::{init_tracing, within};
use hypha_bus::{Broker, BusClient};
use hypha_protocol::{Properties, PublishOptions};
use hypha_rpc::{publish_status, watch};
use serde_json::json;
use tokio::time::{timeout, Duration};

#[tokio::test]
async fn test_watch_sees_only_future_messages() {
    init_tracing();
    let broker = Broker::new();
    let consumer = BusClient::connect_local(&broker);
    let producer = BusClient::connect_local(&broker);

    producer
        .publish(
            "imager/frames",
            Some(&json!({"frame": 0})),
            Properties::default(),
            PublishOptions::at_least_once(),
        )
        .await
        .unwrap();

    let mut frames = watch(&consumer, "imager/frames").await.unwrap();

    for i in 1..=3 {
        producer
            .publish(
                "imager/frames",
                Some(&json!({"frame": i})),
                Properties::default(),
                PublishOptions::at_least_once(),
            )
            .await
            .unwrap();
    }

    // Frame 0 predates the watch and is not replayed
    for i in 1..=3 {
        let value = within("watched frame", frames.recv()).await.unwrap();
        assert_eq!(value, json!({"frame": i}));
    }
}

#[tokio::test]
async fn test_status_retention_across_clients() {
    init_tracing();
    let broker = Broker::new();
    let driver = BusClient::connect_local(&broker);

    publish_status(&driver, "pump", &json!({"running": true, "flow": 2.5}))
        .await
        .unwrap();

    // A UI process that starts later still sees the current state
    let ui = BusClient::connect_local(&broker);
    let mut status = watch(&ui, "status/pump").await.unwrap();

    let value = within("retained status", status.recv()).await.unwrap();
    assert_eq!(value, json!({"running": true, "flow": 2.5}));

    // And subsequent updates flow live
    publish_status(&driver, "pump", &json!({"running": false, "flow": 0.0}))
        .await
        .unwrap();
    let value = within("status update", status.recv()).await.unwrap();
    assert_eq!(value["running"], json!(false));
}

#[tokio::test]
async fn test_unsubscribed_watch_goes_quiet() {
    init_tracing();
    let broker = Broker::new();
    let consumer = BusClient::connect_local(&broker);
    let producer = BusClient::connect_local(&broker);

    let watcher = watch(&consumer, "ticks").await.unwrap();
    watcher.unsubscribe().await.unwrap();

    producer
        .publish(
            "ticks",
            Some(&json!(1)),
            Properties::default(),
            PublishOptions::at_least_once(),
        )
        .await
        .unwrap();

    // The client dropped its broker-side interest, so nothing arrives on a
    // fresh stream either.
    let mut messages = consumer.messages();
    let nothing = timeout(Duration::from_millis(100), messages.recv()).await;
    assert!(nothing.is_err());
}

#[tokio::test]
async fn test_two_watchers_one_topic_both_live() {
    init_tracing();
    let broker = Broker::new();
    let consumer = BusClient::connect_local(&broker);
    let producer = BusClient::connect_local(&broker);

    let mut first = watch(&consumer, "status/light").await.unwrap();
    let mut second = watch(&consumer, "status/light").await.unwrap();

    producer
        .publish(
            "status/light",
            Some(&json!("on")),
            Properties::default(),
            PublishOptions::at_least_once(),
        )
        .await
        .unwrap();

    assert_eq!(within("first watcher", first.recv()).await.unwrap(), json!("on"));
    assert_eq!(within("second watcher", second.recv()).await.unwrap(), json!("on"));
}
