//! Expiration sweep background job.
//!
//! Expiry is enforced at read time by comparing `expires_at` against the
//! request clock, so nothing needs to change in the database when a vlog
//! crosses its boundary. This job only observes: it counts active and
//! expired vlogs and publishes them as gauges.

use crate::background_jobs::{
    context::JobContext,
    job::{BackgroundJob, JobError},
};
use crate::lifecycle::now_unix;
use crate::server::metrics;
use std::time::Duration;
use tracing::info;

pub struct ExpirationSweepJob {
    interval: Duration,
}

impl ExpirationSweepJob {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

impl BackgroundJob for ExpirationSweepJob {
    fn id(&self) -> &'static str {
        "expiration_sweep"
    }

    fn name(&self) -> &'static str {
        "Expiration Sweep"
    }

    fn description(&self) -> &'static str {
        "Count active and expired vlogs and publish gauges"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    fn execute(&self, ctx: &JobContext) -> Result<(), JobError> {
        if ctx.is_cancelled() {
            return Err(JobError::Cancelled);
        }

        let now = now_unix();
        let active = ctx
            .store
            .count_active(now)
            .map_err(|e| JobError::ExecutionFailed(e.to_string()))?;
        let expired = ctx
            .store
            .count_expired(now)
            .map_err(|e| JobError::ExecutionFailed(e.to_string()))?;

        metrics::set_vlog_counts(active, expired);
        info!("Expiration sweep: {} active, {} expired", active, expired);
        Ok(())
    }
}
