use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use tokio_util::sync::CancellationToken;
use vlog72_server::background_jobs::{
    jobs::{CounterAuditJob, ExpirationSweepJob},
    JobContext, JobScheduler,
};
use vlog72_server::server::{config::ServerConfig, metrics};
use vlog72_server::{run_server, RequestsLoggingLevel, SqliteStore};

fn parse_path(s: &str) -> Result<PathBuf> {
    let path_buf = PathBuf::from(s);
    let original_path = match path_buf.canonicalize() {
        Ok(path) => path,
        Err(msg) => {
            if msg.kind() == std::io::ErrorKind::NotFound {
                path_buf
            } else {
                return Err(msg).with_context(|| format!("Error resolving path: {}", s));
            }
        }
    };
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(original_path))
}

#[derive(Parser, Debug)]
struct CliArgs {
    /// Path to the SQLite database file.
    #[clap(value_parser = parse_path)]
    pub db_path: PathBuf,

    /// The port to listen on.
    #[clap(short, long, default_value_t = 3001)]
    pub port: u16,

    /// The port for the metrics server (Prometheus scraping).
    #[clap(long, default_value_t = 9091)]
    pub metrics_port: u16,

    /// The level of logging to perform on each request.
    #[clap(long, default_value = "path")]
    pub logging_level: RequestsLoggingLevel,

    /// Interval in minutes between expiration sweep runs.
    #[clap(long, default_value_t = 60)]
    pub sweep_interval_minutes: u64,

    /// Interval in hours between counter audit runs.
    #[clap(long, default_value_t = 24)]
    pub audit_interval_hours: u64,

    /// Path to the frontend directory to be statically served.
    #[clap(long)]
    pub frontend_dir_path: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .context("Failed to initialize tracing")?;

    info!("Opening SQLite database at {:?}...", cli_args.db_path);
    let store = Arc::new(SqliteStore::new(&cli_args.db_path)?);

    info!("Initializing metrics...");
    metrics::init_metrics();

    let shutdown_token = CancellationToken::new();
    let job_context = JobContext::new(shutdown_token.clone(), store.clone());
    let mut scheduler = JobScheduler::new(job_context, shutdown_token.clone());
    scheduler.register_job(Arc::new(ExpirationSweepJob::new(Duration::from_secs(
        cli_args.sweep_interval_minutes * 60,
    ))));
    scheduler.register_job(Arc::new(CounterAuditJob::new(Duration::from_secs(
        cli_args.audit_interval_hours * 60 * 60,
    ))));
    let job_handles = scheduler.start();

    let config = ServerConfig {
        requests_logging_level: cli_args.logging_level,
        port: cli_args.port,
        metrics_port: cli_args.metrics_port,
        frontend_dir_path: cli_args.frontend_dir_path,
    };

    let result = run_server(config, store).await;

    shutdown_token.cancel();
    for handle in job_handles {
        let _ = handle.await;
    }

    result
}
