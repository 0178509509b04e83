use axum::{http::StatusCode, response::IntoResponse, routing::get, Router};
use lazy_static::lazy_static;
use prometheus::{
    CounterVec, Encoder, Gauge, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder,
};
use std::time::Duration;

/// Metric name prefix for all Vlog72 metrics
const PREFIX: &str = "vlog72";

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    pub static ref HTTP_REQUESTS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_http_requests_total"), "Total number of HTTP requests"),
        &["method", "path", "status"]
    ).expect("Failed to create http_requests_total metric");

    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            format!("{PREFIX}_http_request_duration_seconds"),
            "HTTP request duration in seconds"
        )
        .buckets(vec![0.001, 0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0]),
        &["method", "path"]
    ).expect("Failed to create http_request_duration_seconds metric");

    pub static ref AUTH_LOGIN_ATTEMPTS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_auth_login_attempts_total"), "Total login attempts"),
        &["status"]
    ).expect("Failed to create auth_login_attempts_total metric");

    pub static ref VLOGS_ACTIVE: Gauge = Gauge::new(
        format!("{PREFIX}_vlogs_active"),
        "Vlogs currently inside their 72 hour window"
    ).expect("Failed to create vlogs_active metric");

    pub static ref VLOGS_EXPIRED: Gauge = Gauge::new(
        format!("{PREFIX}_vlogs_expired"),
        "Vlogs past their 72 hour window"
    ).expect("Failed to create vlogs_expired metric");

    pub static ref COUNTER_DRIFT: Gauge = Gauge::new(
        format!("{PREFIX}_counter_drift"),
        "Denormalized counters disagreeing with their source table"
    ).expect("Failed to create counter_drift metric");
}

/// Registers all metrics with the Prometheus registry. Safe to call more
/// than once.
pub fn init_metrics() {
    let _ = REGISTRY.register(Box::new(HTTP_REQUESTS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(HTTP_REQUEST_DURATION_SECONDS.clone()));
    let _ = REGISTRY.register(Box::new(AUTH_LOGIN_ATTEMPTS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(VLOGS_ACTIVE.clone()));
    let _ = REGISTRY.register(Box::new(VLOGS_EXPIRED.clone()));
    let _ = REGISTRY.register(Box::new(COUNTER_DRIFT.clone()));

    tracing::info!("Metrics system initialized");
}

pub fn record_http_request(method: &str, path: &str, status: u16, duration: Duration) {
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[method, path, &status.to_string()])
        .inc();

    HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&[method, path])
        .observe(duration.as_secs_f64());
}

pub fn record_login_attempt(status: &str) {
    AUTH_LOGIN_ATTEMPTS_TOTAL.with_label_values(&[status]).inc();
}

/// Updated by the expiration sweep job.
pub fn set_vlog_counts(active: usize, expired: usize) {
    VLOGS_ACTIVE.set(active as f64);
    VLOGS_EXPIRED.set(expired as f64);
}

/// Updated by the counter audit job.
pub fn set_counter_drift(drifted: usize) {
    COUNTER_DRIFT.set(drifted as f64);
}

/// Handler for the /metrics endpoint
pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = vec![];
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => {
            let response = String::from_utf8(buffer).unwrap_or_else(|_| String::from(""));
            (StatusCode::OK, response)
        }
        Err(e) => {
            tracing::error!("Failed to encode metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to encode metrics: {}", e),
            )
        }
    }
}

pub fn make_metrics_router() -> Router {
    Router::new().route("/metrics", get(metrics_handler))
}
