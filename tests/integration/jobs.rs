//! Job-signal correlation against the unit manager, alone and composed
//! with the bus.

use crate::common::{init_tracing, within};
use hypha_bus::{Broker, BusClient};
use hypha_rpc::{HandlerError, Responder, RpcClient};
use hypha_units::{
    InMemoryUnitManager, JobError, JobHandle, JobMonitor, JobRemoved, ServiceController,
    UnitManager, JOB_RESULT_DONE,
};
use serde_json::json;
use std::sync::Arc;
use tokio::time::{sleep, Duration};

#[tokio::test]
async fn test_unrelated_jobs_never_cross() {
    init_tracing();
    let manager = InMemoryUnitManager::new();
    let monitor = Arc::new(JobMonitor::new(manager.job_signals()));

    let ours = JobHandle::new("/job/100");
    let waiting = {
        let monitor = Arc::clone(&monitor);
        let ours = ours.clone();
        tokio::spawn(async move { monitor.await_job(&ours).await })
    };

    sleep(Duration::from_millis(20)).await;

    // A storm of other owners' jobs finishing, some failing
    for id in 0..10u32 {
        manager.emit(JobRemoved {
            job_id: id,
            handle: JobHandle::new(format!("/job/{}", id)),
            unit: format!("other-{}.service", id),
            result: if id % 2 == 0 {
                JOB_RESULT_DONE.to_string()
            } else {
                "failed".to_string()
            },
        });
    }

    sleep(Duration::from_millis(50)).await;
    assert!(!waiting.is_finished());

    manager.emit(JobRemoved {
        job_id: 100,
        handle: ours,
        unit: "pump.service".to_string(),
        result: JOB_RESULT_DONE.to_string(),
    });

    let outcome = within("our job", waiting).await.unwrap();
    assert!(outcome.is_ok());
}

#[tokio::test]
async fn test_service_restart_procedure_over_the_bus() {
    init_tracing();
    let broker = Broker::new();

    // The backend binds a procedure that restarts units on request
    let manager = InMemoryUnitManager::new();
    manager.set_outcome("camera.service", "dependency");
    let controller = Arc::new(ServiceController::new(manager.clone()));

    let responder = Responder::new(BusClient::connect_local(&broker));
    let bound_controller = Arc::clone(&controller);
    responder
        .bind("system/restart", move |payload| {
            let controller = Arc::clone(&bound_controller);
            async move {
                let name = payload
                    .as_ref()
                    .and_then(|p| p["service"].as_str())
                    .ok_or_else(|| HandlerError::msg("missing service name"))?
                    .to_string();
                controller
                    .restart(&name)
                    .await
                    .map_err(|e| HandlerError::msg(e.to_string()))?;
                Ok(json!({"restarted": name}))
            }
        })
        .await
        .unwrap();

    // A UI asks for a restart over the bus
    let rpc = RpcClient::new(BusClient::connect_local(&broker));

    let result = within(
        "restart over bus",
        rpc.call("system/restart", Some(&json!({"service": "segmenter"}))),
    )
    .await
    .unwrap();
    assert_eq!(result, json!({"restarted": "segmenter"}));
    assert!(manager
        .started_jobs()
        .iter()
        .any(|(_, unit)| unit == "segmenter.service"));

    // A unit whose job fails turns into an error envelope for the caller
    let err = within(
        "failing restart",
        rpc.call("system/restart", Some(&json!({"service": "camera"}))),
    )
    .await
    .unwrap_err();
    assert!(err.to_string().contains("dependency"));
}

#[tokio::test]
async fn test_rapid_sequential_jobs_correlate() {
    init_tracing();
    let manager = InMemoryUnitManager::new();
    let controller = ServiceController::new(manager.clone());

    // Handles are reused-looking ("/job/N" increments) and completions are
    // instant; every run must still pair with its own signal.
    for _ in 0..20 {
        within("sequential restart", controller.restart("pump"))
            .await
            .unwrap();
    }
    assert_eq!(manager.started_jobs().len(), 20);
}

#[tokio::test]
async fn test_monitor_run_with_trait_object() {
    init_tracing();
    let manager = InMemoryUnitManager::new();
    let monitor = JobMonitor::new(manager.job_signals());

    // The monitor works against the trait, not the concrete manager
    let dynamic: &dyn UnitManager = &manager;
    let outcome: Result<(), JobError> = within(
        "dyn manager job",
        monitor.run(
            dynamic,
            hypha_units::JobKind::Start,
            "pump.service",
            hypha_units::JobMode::Replace,
        ),
    )
    .await;
    assert!(outcome.is_ok());
}

#[tokio::test]
async fn test_failed_job_error_is_descriptive() {
    init_tracing();
    let manager = InMemoryUnitManager::new();
    manager.set_outcome("gps.service", "timeout");
    let controller = ServiceController::new(manager);

    let err = within("failing start", controller.start("gps"))
        .await
        .unwrap_err();

    let message = err.to_string();
    assert!(message.contains("gps.service"));
    assert!(message.contains("timeout"));
}
