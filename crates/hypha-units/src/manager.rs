use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tokio::sync::broadcast;

/// Result code carried by a job-removed signal when the job succeeded
pub const JOB_RESULT_DONE: &str = "done";

/// Opaque identity of one queued job
///
/// Only unique among concurrently outstanding jobs of one manager, not
/// across manager restarts; it is purely a filter key against the signal
/// broadcast.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobHandle(String);

impl JobHandle {
    pub fn new(handle: impl Into<String>) -> Self {
        Self(handle.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What the job should do to its unit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    Start,
    Stop,
    Restart,
    Enable,
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobKind::Start => "start",
            JobKind::Stop => "stop",
            JobKind::Restart => "restart",
            JobKind::Enable => "enable",
        };
        f.write_str(name)
    }
}

/// How the job interacts with jobs already queued for the unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JobMode {
    /// Replace any conflicting queued job
    #[default]
    Replace,

    /// Fail if a conflicting job is queued
    Fail,
}

impl JobMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobMode::Replace => "replace",
            JobMode::Fail => "fail",
        }
    }
}

/// One job-removed broadcast signal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRemoved {
    pub job_id: u32,
    pub handle: JobHandle,
    pub unit: String,
    /// "done" on success; any other code is a failure
    pub result: String,
}

impl JobRemoved {
    pub fn succeeded(&self) -> bool {
        self.result == JOB_RESULT_DONE
    }
}

#[derive(Error, Debug)]
pub enum UnitError {
    #[error("unit manager call failed: {0}")]
    Call(String),

    #[error("unit manager is gone")]
    Disconnected,
}

/// The system-management bus that owns unit jobs
///
/// `start_job` queues work and returns immediately with a handle; completion
/// arrives later as a broadcast signal on the channel behind
/// `job_signals()`. That channel is shared by every job the manager owns,
/// so consumers must filter by handle.
#[async_trait]
pub trait UnitManager: Send + Sync {
    async fn start_job(
        &self,
        kind: JobKind,
        unit: &str,
        mode: JobMode,
    ) -> Result<JobHandle, UnitError>;

    /// Subscribe to the job-removed broadcast
    fn job_signals(&self) -> broadcast::Receiver<JobRemoved>;
}

/// Qualify a bare unit name as a service
pub fn normalize_unit_name(name: &str) -> String {
    if name.ends_with(".service") {
        return name.to_string();
    }
    format!("{}.service", name)
}
