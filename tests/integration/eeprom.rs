//! The identity EEPROM behind a bound procedure: many callers over the bus,
//! one physical read.

use crate::common::{init_tracing, within};
use hypha_bus::{Broker, BusClient};
use hypha_eeprom::{Eeprom, MemoryCodec, NoopWriteProtect};
use hypha_rpc::{HandlerError, Responder, RpcClient};
use serde_json::json;
use std::sync::Arc;
use tokio::time::Duration;

#[tokio::test]
async fn test_concurrent_bus_reads_hit_device_once() {
    init_tracing();
    let broker = Broker::new();

    let codec = MemoryCodec::new(json!({"serial": "ps-0042", "hat_rev": 3}))
        .with_read_delay(Duration::from_millis(200));
    let eeprom = Arc::new(Eeprom::new(codec, NoopWriteProtect));

    let responder = Responder::new(BusClient::connect_local(&broker));
    let bound = Arc::clone(&eeprom);
    responder
        .bind("eeprom/read", move |_| {
            let eeprom = Arc::clone(&bound);
            async move {
                eeprom
                    .read()
                    .await
                    .map_err(|e| HandlerError::msg(e.to_string()))
            }
        })
        .await
        .unwrap();

    let rpc = RpcClient::new(BusClient::connect_local(&broker));

    let mut calls = Vec::new();
    for _ in 0..5 {
        let rpc = rpc.clone();
        calls.push(tokio::spawn(
            async move { rpc.call("eeprom/read", None).await },
        ));
    }

    for call in calls {
        let record = within("eeprom call", call).await.unwrap().unwrap();
        assert_eq!(record["serial"], json!("ps-0042"));
    }

    // Five bus calls, one physical access
    assert_eq!(eeprom.codec().read_count(), 1);
}

#[tokio::test]
async fn test_device_failure_propagates_over_the_bus() {
    init_tracing();
    let broker = Broker::new();

    let codec = MemoryCodec::new(json!({})).with_read_error("i2c timeout");
    let eeprom = Arc::new(Eeprom::new(codec, NoopWriteProtect));

    let responder = Responder::new(BusClient::connect_local(&broker));
    responder
        .bind("eeprom/read", move |_| {
            let eeprom = Arc::clone(&eeprom);
            async move {
                eeprom
                    .read()
                    .await
                    .map_err(|e| HandlerError::msg(e.to_string()))
            }
        })
        .await
        .unwrap();

    let rpc = RpcClient::new(BusClient::connect_local(&broker));
    let err = within("failing eeprom call", rpc.call("eeprom/read", None))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("i2c timeout"));
}

#[tokio::test]
async fn test_write_then_read_roundtrip_over_the_bus() {
    init_tracing();
    let broker = Broker::new();

    let eeprom = Arc::new(Eeprom::new(
        MemoryCodec::new(json!({})),
        NoopWriteProtect,
    ));

    let responder = Responder::new(BusClient::connect_local(&broker));
    let read_side = Arc::clone(&eeprom);
    responder
        .bind("eeprom/read", move |_| {
            let eeprom = Arc::clone(&read_side);
            async move {
                eeprom
                    .read()
                    .await
                    .map_err(|e| HandlerError::msg(e.to_string()))
            }
        })
        .await
        .unwrap();

    let write_side = Arc::clone(&eeprom);
    responder
        .bind("eeprom/write", move |payload| {
            let eeprom = Arc::clone(&write_side);
            async move {
                let record = payload.ok_or_else(|| HandlerError::msg("missing record"))?;
                eeprom
                    .write(&record)
                    .await
                    .map_err(|e| HandlerError::msg(e.to_string()))?;
                Ok(json!(null))
            }
        })
        .await
        .unwrap();

    let rpc = RpcClient::new(BusClient::connect_local(&broker));

    let record = json!({"serial": "ps-0099", "custom_data": {"owner": "lab-3"}});
    within("eeprom write", rpc.call("eeprom/write", Some(&record)))
        .await
        .unwrap();

    let read_back = within("eeprom read back", rpc.call("eeprom/read", None))
        .await
        .unwrap();
    assert_eq!(read_back, record);
}
