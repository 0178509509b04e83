//! Background job scheduling and execution.
//!
//! Jobs run on fixed intervals in blocking tasks and stop together through
//! a shared cancellation token.

mod context;
mod job;
pub mod jobs;
mod scheduler;

pub use context::JobContext;
pub use job::{BackgroundJob, JobError};
pub use scheduler::JobScheduler;
