use crate::manager::{normalize_unit_name, JobKind, JobMode, UnitManager};
use crate::monitor::{JobError, JobMonitor};
use std::sync::Arc;

/// Start/stop/restart/enable system services and wait for the outcome
///
/// Bare names are qualified as services; each call resolves only when the
/// manager's job actually finished, successfully or not.
pub struct ServiceController<M: UnitManager> {
    manager: Arc<M>,
    monitor: JobMonitor,
}

impl<M: UnitManager> ServiceController<M> {
    pub fn new(manager: M) -> Self {
        let manager = Arc::new(manager);
        let monitor = JobMonitor::new(manager.job_signals());
        Self { manager, monitor }
    }

    pub async fn start(&self, name: &str) -> Result<(), JobError> {
        self.run(JobKind::Start, name).await
    }

    pub async fn stop(&self, name: &str) -> Result<(), JobError> {
        self.run(JobKind::Stop, name).await
    }

    pub async fn restart(&self, name: &str) -> Result<(), JobError> {
        self.run(JobKind::Restart, name).await
    }

    pub async fn enable(&self, name: &str) -> Result<(), JobError> {
        self.run(JobKind::Enable, name).await
    }

    async fn run(&self, kind: JobKind, name: &str) -> Result<(), JobError> {
        let unit = normalize_unit_name(name);
        self.monitor
            .run(&*self.manager, kind, &unit, JobMode::Replace)
            .await
    }
}
