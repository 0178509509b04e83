use super::context::JobContext;
use super::job::BackgroundJob;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Runs registered jobs on their intervals until shutdown.
pub struct JobScheduler {
    jobs: Vec<Arc<dyn BackgroundJob>>,
    job_context: JobContext,
    shutdown_token: CancellationToken,
}

impl JobScheduler {
    pub fn new(job_context: JobContext, shutdown_token: CancellationToken) -> Self {
        Self {
            jobs: Vec::new(),
            job_context,
            shutdown_token,
        }
    }

    pub fn register_job(&mut self, job: Arc<dyn BackgroundJob>) {
        info!("Registering job: {} - {}", job.id(), job.description());
        self.jobs.push(job);
    }

    pub fn job_count(&self) -> usize {
        self.jobs.len()
    }

    /// Spawns one task per registered job. Each job runs immediately and
    /// then on its interval until the shutdown token fires.
    pub fn start(self) -> Vec<JoinHandle<()>> {
        info!("Starting job scheduler with {} registered jobs", self.jobs.len());
        self.jobs
            .into_iter()
            .map(|job| {
                let ctx = self.job_context.clone();
                let shutdown = self.shutdown_token.clone();
                tokio::spawn(run_job_loop(job, ctx, shutdown))
            })
            .collect()
    }
}

async fn run_job_loop(job: Arc<dyn BackgroundJob>, ctx: JobContext, shutdown: CancellationToken) {
    let interval = job.interval();
    info!("Job {} scheduled every {:?}", job.id(), interval);

    loop {
        let blocking_job = job.clone();
        let blocking_ctx = ctx.clone();
        let result =
            tokio::task::spawn_blocking(move || blocking_job.execute(&blocking_ctx)).await;

        match result {
            Ok(Ok(())) => {
                let next_run = chrono::Utc::now()
                    + chrono::Duration::from_std(interval).unwrap_or_default();
                debug!("Job {} completed, next run at {}", job.id(), next_run.to_rfc3339());
            }
            Ok(Err(err)) => error!("Job {} failed: {}", job.id(), err),
            Err(err) => error!("Job {} panicked: {}", job.id(), err),
        }

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = shutdown.cancelled() => {
                info!("Job {} stopping on shutdown", job.id());
                break;
            }
        }
    }
}
