//! Single-flight execution: at most one concurrent run of an exclusive
//! operation, with every contemporaneous caller receiving that run's
//! outcome.
//!
//! This is stricter than mutual exclusion. A mutex would let N callers
//! perform N serialized accesses; single-flight performs one access and
//! hands its result to all N, which is what an exclusive physical resource
//! (a serial bus register, an EEPROM) needs when redundant re-reads are
//! wasteful or unsafe.

use std::future::Future;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::oneshot;

/// Error delivered to waiters of a single-flight run
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FlightError<E> {
    /// The one underlying operation failed; every waiter sees this
    #[error("operation failed: {0}")]
    Operation(E),

    /// The operation died without settling (e.g. it panicked)
    #[error("operation abandoned before settling")]
    Abandoned,
}

/// Coalesces concurrent callers onto one in-flight operation
///
/// Cheap to clone; clones share the in-flight state.
pub struct SingleFlight<T, E> {
    state: Arc<Mutex<Flight<T, E>>>,
}

struct Flight<T, E> {
    running: bool,
    waiters: Vec<oneshot::Sender<Result<T, FlightError<E>>>>,
}

impl<T, E> Clone for SingleFlight<T, E> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<T, E> Default for SingleFlight<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T, E> SingleFlight<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(Flight {
                running: false,
                waiters: Vec::new(),
            })),
        }
    }

    /// Run `op`, or join the run already in flight
    ///
    /// If no operation is running, `op` starts immediately on a detached
    /// task; otherwise `op` is never called and the caller waits for the
    /// in-flight run. Every caller enqueued before settlement receives the
    /// exact outcome of the one run that happened, success or failure. A
    /// caller arriving after settlement triggers a fresh run.
    pub async fn run<F, Fut>(&self, op: F) -> Result<T, FlightError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();

        let leader = {
            let mut flight = lock(&self.state);
            flight.waiters.push(tx);
            if flight.running {
                false
            } else {
                flight.running = true;
                true
            }
        };

        if leader {
            // The operation runs detached so cancellation of the leader's
            // own future cannot strand the other waiters.
            let future = op();
            let state = Arc::clone(&self.state);
            tokio::spawn(async move {
                let mut guard = AbandonGuard {
                    state: Arc::clone(&state),
                    armed: true,
                };
                let outcome = future.await;
                guard.armed = false;
                settle(&state, outcome);
            });
        }

        rx.await.unwrap_or(Err(FlightError::Abandoned))
    }

    /// Whether an operation is currently in flight
    pub fn is_running(&self) -> bool {
        lock(&self.state).running
    }
}

fn lock<T, E>(state: &Mutex<Flight<T, E>>) -> std::sync::MutexGuard<'_, Flight<T, E>> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Deliver the one outcome to every waiter enqueued so far and clear state
fn settle<T, E>(state: &Mutex<Flight<T, E>>, outcome: Result<T, E>)
where
    T: Clone,
    E: Clone,
{
    let waiters = {
        let mut flight = lock(state);
        flight.running = false;
        std::mem::take(&mut flight.waiters)
    };

    for waiter in waiters {
        let delivered = match &outcome {
            Ok(value) => Ok(value.clone()),
            Err(e) => Err(FlightError::Operation(e.clone())),
        };
        // A waiter that gave up is fine to skip
        let _ = waiter.send(delivered);
    }
}

/// Clears in-flight state if the operation dies without settling
///
/// Dropping the queued senders wakes every waiter with `Abandoned`, so a
/// panicking operation cannot wedge the serializer permanently.
struct AbandonGuard<T, E> {
    state: Arc<Mutex<Flight<T, E>>>,
    armed: bool,
}

impl<T, E> Drop for AbandonGuard<T, E> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut flight = lock(&self.state);
        flight.running = false;
        flight.waiters.clear();
    }
}
