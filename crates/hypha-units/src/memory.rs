//! An in-process unit manager for simulation and tests.

use crate::manager::{
    JobHandle, JobKind, JobMode, JobRemoved, UnitError, UnitManager, JOB_RESULT_DONE,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;

/// A unit manager whose jobs complete in-process
///
/// Job outcomes are scriptable per unit and default to success. With no
/// completion delay, the job-removed signal fires the instant the job is
/// queued, which is the fast-job case the correlator has to survive.
#[derive(Clone)]
pub struct InMemoryUnitManager {
    inner: Arc<Inner>,
}

struct Inner {
    signals: broadcast::Sender<JobRemoved>,
    next_job: AtomicU32,
    outcomes: Mutex<HashMap<String, String>>,
    started: Mutex<Vec<(JobKind, String)>>,
    completion_delay: Mutex<Duration>,
}

impl InMemoryUnitManager {
    pub fn new() -> Self {
        let (signals, _) = broadcast::channel(64);
        Self {
            inner: Arc::new(Inner {
                signals,
                next_job: AtomicU32::new(0),
                outcomes: Mutex::new(HashMap::new()),
                started: Mutex::new(Vec::new()),
                completion_delay: Mutex::new(Duration::ZERO),
            }),
        }
    }

    /// Delay between queuing a job and emitting its completion signal
    pub fn with_completion_delay(self, delay: Duration) -> Self {
        *lock(&self.inner.completion_delay) = delay;
        self
    }

    /// Script the result code for a unit's jobs ("done" is the default)
    pub fn set_outcome(&self, unit: &str, result: &str) {
        lock(&self.inner.outcomes).insert(unit.to_string(), result.to_string());
    }

    /// Jobs queued so far, in order
    pub fn started_jobs(&self) -> Vec<(JobKind, String)> {
        lock(&self.inner.started).clone()
    }

    /// Inject a raw signal, e.g. for a job owned by somebody else
    pub fn emit(&self, signal: JobRemoved) {
        let _ = self.inner.signals.send(signal);
    }
}

impl Default for InMemoryUnitManager {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UnitManager for InMemoryUnitManager {
    async fn start_job(
        &self,
        kind: JobKind,
        unit: &str,
        _mode: JobMode,
    ) -> Result<JobHandle, UnitError> {
        let id = self.inner.next_job.fetch_add(1, Ordering::SeqCst) + 1;
        let handle = JobHandle::new(format!("/job/{}", id));

        lock(&self.inner.started).push((kind, unit.to_string()));

        let result = lock(&self.inner.outcomes)
            .get(unit)
            .cloned()
            .unwrap_or_else(|| JOB_RESULT_DONE.to_string());

        let signal = JobRemoved {
            job_id: id,
            handle: handle.clone(),
            unit: unit.to_string(),
            result,
        };
        let signals = self.inner.signals.clone();
        let delay = *lock(&self.inner.completion_delay);
        tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            // Nobody listening is fine; the signal is broadcast regardless
            let _ = signals.send(signal);
        });

        Ok(handle)
    }

    fn job_signals(&self) -> broadcast::Receiver<JobRemoved> {
        self.inner.signals.subscribe()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
