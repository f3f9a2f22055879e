//! Ingestion job orchestration.
//!
//! - [`classify`]: maps a run [`Fault`] onto the closed error taxonomy
//! - [`JobRunner`]: one attempt, from ledger record to notification
//! - [`Scheduler`]: fixed-cadence, single-flight driver for a job
//! - [`WindowPolicy`]: picks the time window each attempt targets

pub mod classify;
pub mod job_runner;
pub mod scheduler;
pub mod window;

pub use classify::{classify, Fault};
pub use job_runner::{IngestJob, JobRunner};
pub use scheduler::{Scheduler, SchedulerError, SchedulerOptions, SchedulerState, SchedulerStats};
pub use window::WindowPolicy;
