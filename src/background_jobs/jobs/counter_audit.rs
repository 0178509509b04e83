//! Counter reconciliation background job.
//!
//! `likes_count`, `followers_count` and `following_count` are maintained
//! transactionally with their source tables, so drift indicates a bug or
//! manual database edits. The job recounts, reports, and never repairs.

use crate::background_jobs::{
    context::JobContext,
    job::{BackgroundJob, JobError},
};
use crate::server::metrics;
use std::time::Duration;
use tracing::{info, warn};

pub struct CounterAuditJob {
    interval: Duration,
}

impl CounterAuditJob {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

impl BackgroundJob for CounterAuditJob {
    fn id(&self) -> &'static str {
        "counter_audit"
    }

    fn name(&self) -> &'static str {
        "Counter Audit"
    }

    fn description(&self) -> &'static str {
        "Recount denormalized like and follow counters and report drift"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    fn execute(&self, ctx: &JobContext) -> Result<(), JobError> {
        if ctx.is_cancelled() {
            return Err(JobError::Cancelled);
        }

        let mut drifts = ctx
            .store
            .like_counter_drift()
            .map_err(|e| JobError::ExecutionFailed(e.to_string()))?;
        drifts.extend(
            ctx.store
                .follow_counter_drift()
                .map_err(|e| JobError::ExecutionFailed(e.to_string()))?,
        );

        metrics::set_counter_drift(drifts.len());
        if drifts.is_empty() {
            info!("Counter audit: no drift");
        } else {
            for drift in &drifts {
                warn!(
                    "Counter drift on row {}: {} stored {} but counted {}",
                    drift.row_id, drift.counter, drift.stored, drift.actual
                );
            }
        }
        Ok(())
    }
}
