use crate::manager::{JobHandle, JobKind, JobMode, JobRemoved, UnitError, UnitManager};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{broadcast, oneshot, Mutex};
use tokio::task::JoinHandle;

#[derive(Error, Debug)]
pub enum JobError {
    /// The job finished with a non-success result code
    #[error("job {job_id} for {unit} finished with result \"{result}\"")]
    Failed {
        job_id: u32,
        unit: String,
        result: String,
    },

    #[error("signal channel closed before the job finished")]
    SignalLost,

    #[error(transparent)]
    Unit(#[from] UnitError),
}

/// Correlates job-removed broadcast signals with the futures awaiting them
///
/// The signal subscription is established once, here, at construction, not
/// per call. A fast job can complete before its caller gets around to
/// listening; with a persistent subscription the signal parks in the channel
/// until the monitor task consumes it, and [`JobMonitor::run`] keeps the
/// waiter table locked across the job-starting call so delivery cannot
/// happen before registration.
pub struct JobMonitor {
    waiters: Arc<Mutex<WaiterTable>>,
    _task: TaskGuard,
}

type WaiterTable = HashMap<JobHandle, Vec<oneshot::Sender<JobRemoved>>>;

struct TaskGuard(JoinHandle<()>);

impl Drop for TaskGuard {
    fn drop(&mut self) {
        self.0.abort();
    }
}

impl JobMonitor {
    pub fn new(mut signals: broadcast::Receiver<JobRemoved>) -> Self {
        let waiters: Arc<Mutex<WaiterTable>> = Arc::new(Mutex::new(HashMap::new()));

        let table = Arc::clone(&waiters);
        let task = tokio::spawn(async move {
            loop {
                match signals.recv().await {
                    Ok(signal) => {
                        let mut waiters = table.lock().await;
                        // Signals for jobs nobody is waiting on belong to
                        // other owners; they pass through without effect.
                        let Some(interested) = waiters.remove(&signal.handle) else {
                            continue;
                        };
                        drop(waiters);

                        tracing::debug!(
                            job = signal.job_id,
                            unit = %signal.unit,
                            result = %signal.result,
                            "job finished"
                        );
                        for waiter in interested {
                            let _ = waiter.send(signal.clone());
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!("job monitor lagged by {} signals", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        // Dropping the queued waiters resolves every pending
                        // await with SignalLost instead of hanging it.
                        table.lock().await.clear();
                        break;
                    }
                }
            }
        });

        Self {
            waiters,
            _task: TaskGuard(task),
        }
    }

    /// Start a job and wait for its completion signal
    ///
    /// The waiter table stays locked from before the start call until the
    /// handle is registered, so a completion signal that fires immediately
    /// is delivered after registration, never lost.
    pub async fn run<M>(
        &self,
        manager: &M,
        kind: JobKind,
        unit: &str,
        mode: JobMode,
    ) -> Result<(), JobError>
    where
        M: UnitManager + ?Sized,
    {
        let mut waiters = self.waiters.lock().await;
        let handle = manager.start_job(kind, unit, mode).await?;
        tracing::debug!(%kind, unit, job = %handle, "unit job queued");

        let (waiter, completion) = oneshot::channel();
        waiters.entry(handle).or_default().push(waiter);
        drop(waiters);

        settle(completion.await)
    }

    /// Wait for a job whose handle was obtained elsewhere
    ///
    /// Registration happens at call time; use [`JobMonitor::run`] when the
    /// job is also started here, which closes the fast-completion window.
    pub async fn await_job(&self, handle: &JobHandle) -> Result<(), JobError> {
        let (waiter, completion) = oneshot::channel();
        self.waiters
            .lock()
            .await
            .entry(handle.clone())
            .or_default()
            .push(waiter);

        settle(completion.await)
    }
}

fn settle(completion: Result<JobRemoved, oneshot::error::RecvError>) -> Result<(), JobError> {
    let signal = completion.map_err(|_| JobError::SignalLost)?;
    if signal.succeeded() {
        return Ok(());
    }
    Err(JobError::Failed {
        job_id: signal.job_id,
        unit: signal.unit,
        result: signal.result,
    })
}
