//! Client side of the system-management bus that owns service units.
//!
//! Starting, stopping, or restarting a unit queues a job and returns a
//! handle; the job's outcome arrives later as a broadcast job-removed
//! signal. The [`JobMonitor`] turns that broadcast into per-job futures,
//! ignoring signals for jobs it does not own. Its signal subscription is
//! persistent, established at construction: a job can finish faster than
//! its caller starts listening, and a per-call subscription would lose that
//! signal.

pub mod controller;
pub mod manager;
pub mod memory;
pub mod monitor;

pub use controller::ServiceController;
pub use manager::{
    normalize_unit_name, JobHandle, JobKind, JobMode, JobRemoved, UnitError, UnitManager,
    JOB_RESULT_DONE,
};
pub use memory::InMemoryUnitManager;
pub use monitor::{JobError, JobMonitor};
