use axum::{http::StatusCode, response::IntoResponse};
use lazy_static::lazy_static;
use prometheus::{
    Counter, CounterVec, Encoder, Gauge, Histogram, HistogramOpts, HistogramVec, Opts, Registry,
    TextEncoder,
};
use std::time::Duration;

/// Metric name prefix for all humanizer metrics
const PREFIX: &str = "humanizer";

lazy_static! {
    // Global Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    // HTTP Request Metrics
    pub static ref HTTP_REQUESTS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_http_requests_total"), "Total number of HTTP requests"),
        &["method", "path", "status"]
    ).expect("Failed to create http_requests_total metric");

    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            format!("{PREFIX}_http_request_duration_seconds"),
            "HTTP request duration in seconds"
        )
        .buckets(vec![0.001, 0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 60.0]),
        &["method", "path"]
    ).expect("Failed to create http_request_duration_seconds metric");

    // Authentication Metrics
    pub static ref AUTH_LOGIN_ATTEMPTS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_auth_login_attempts_total"), "Total login attempts"),
        &["status"]
    ).expect("Failed to create auth_login_attempts_total metric");

    pub static ref AUTH_LOGIN_DURATION_SECONDS: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            format!("{PREFIX}_auth_login_duration_seconds"),
            "Login request duration in seconds"
        )
        .buckets(vec![0.1, 0.5, 1.0, 2.0, 5.0, 10.0])
    ).expect("Failed to create auth_login_duration_seconds metric");

    // Enhancement Metrics
    pub static ref ENHANCEMENT_JOBS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_enhancement_jobs_total"), "Enhancement jobs by mode and outcome"),
        &["mode", "outcome"]
    ).expect("Failed to create enhancement_jobs_total metric");

    pub static ref ENHANCEMENT_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            format!("{PREFIX}_enhancement_duration_seconds"),
            "Time spent producing an enhanced file"
        )
        .buckets(vec![0.01, 0.1, 0.5, 1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0]),
        &["mode"]
    ).expect("Failed to create enhancement_duration_seconds metric");

    pub static ref ENGINE_AVAILABLE: Gauge = Gauge::new(
        format!("{PREFIX}_engine_available"),
        "1 if the audio engine passed its last capability probe, 0 otherwise"
    ).expect("Failed to create engine_available metric");

    pub static ref UPLOAD_BYTES_TOTAL: Counter = Counter::new(
        format!("{PREFIX}_upload_bytes_total"),
        "Total bytes received as enhancement uploads"
    ).expect("Failed to create upload_bytes_total metric");

    // Credits Metrics
    pub static ref CREDITS_CONSUMED_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_credits_consumed_total"), "Free credits consumed"),
        &["mode"]
    ).expect("Failed to create credits_consumed_total metric");

    pub static ref CREDITS_REJECTIONS_TOTAL: Counter = Counter::new(
        format!("{PREFIX}_credits_rejections_total"),
        "Enhancement requests refused for lack of credits"
    ).expect("Failed to create credits_rejections_total metric");

    // Temp files
    pub static ref TEMP_FILE_CLEANUP_FAILURES_TOTAL: Counter = Counter::new(
        format!("{PREFIX}_temp_file_cleanup_failures_total"),
        "Temporary files that could not be deleted"
    ).expect("Failed to create temp_file_cleanup_failures_total metric");

    // Error Metrics
    pub static ref ERRORS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_errors_total"), "Total errors by type and endpoint"),
        &["error_type", "endpoint"]
    ).expect("Failed to create errors_total metric");

    pub static ref PROCESS_MEMORY_BYTES: Gauge = Gauge::new(
        format!("{PREFIX}_process_memory_bytes"),
        "Process memory usage in bytes"
    ).expect("Failed to create process_memory_bytes metric");
}

/// Initialize all metrics and register them with the Prometheus registry
pub fn init_metrics() {
    // Register all metrics - ignore errors if already registered (for tests)
    let _ = REGISTRY.register(Box::new(HTTP_REQUESTS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(HTTP_REQUEST_DURATION_SECONDS.clone()));
    let _ = REGISTRY.register(Box::new(AUTH_LOGIN_ATTEMPTS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(AUTH_LOGIN_DURATION_SECONDS.clone()));
    let _ = REGISTRY.register(Box::new(ENHANCEMENT_JOBS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(ENHANCEMENT_DURATION_SECONDS.clone()));
    let _ = REGISTRY.register(Box::new(ENGINE_AVAILABLE.clone()));
    let _ = REGISTRY.register(Box::new(UPLOAD_BYTES_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(CREDITS_CONSUMED_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(CREDITS_REJECTIONS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(TEMP_FILE_CLEANUP_FAILURES_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(ERRORS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(PROCESS_MEMORY_BYTES.clone()));

    tracing::info!("Metrics system initialized successfully");
}

/// Record an HTTP request
pub fn record_http_request(method: &str, path: &str, status: u16, duration: Duration) {
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[method, path, &status.to_string()])
        .inc();

    HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&[method, path])
        .observe(duration.as_secs_f64());
}

/// Record a login attempt
pub fn record_login_attempt(status: &str, duration: Duration) {
    AUTH_LOGIN_ATTEMPTS_TOTAL.with_label_values(&[status]).inc();

    AUTH_LOGIN_DURATION_SECONDS.observe(duration.as_secs_f64());
}

/// Record a finished enhancement job. `outcome` is "success" or "failure".
pub fn record_enhancement_job(mode: &str, outcome: &str, duration: Duration) {
    ENHANCEMENT_JOBS_TOTAL
        .with_label_values(&[mode, outcome])
        .inc();

    ENHANCEMENT_DURATION_SECONDS
        .with_label_values(&[mode])
        .observe(duration.as_secs_f64());
}

pub fn set_engine_available(available: bool) {
    ENGINE_AVAILABLE.set(if available { 1.0 } else { 0.0 });
}

pub fn record_upload_bytes(bytes: u64) {
    UPLOAD_BYTES_TOTAL.inc_by(bytes as f64);
}

pub fn record_credit_consumed(mode: &str) {
    CREDITS_CONSUMED_TOTAL.with_label_values(&[mode]).inc();
}

pub fn record_credits_rejection() {
    CREDITS_REJECTIONS_TOTAL.inc();
}

pub fn record_cleanup_failure() {
    TEMP_FILE_CLEANUP_FAILURES_TOTAL.inc();
}

/// Record an error
pub fn record_error(error_type: &str, endpoint: &str) {
    ERRORS_TOTAL
        .with_label_values(&[error_type, endpoint])
        .inc();
}

/// Collapses request paths into a bounded set of labels.
pub fn categorize_endpoint(path: &str) -> &'static str {
    match path {
        "/" => "home",
        "/v1/health" => "health",
        "/v1/enhance" => "enhance",
        p if p.starts_with("/v1/auth/") => "auth",
        p if p.starts_with("/v1/user/") => "user",
        _ => "other",
    }
}

/// Update process memory usage
pub fn update_memory_usage() {
    #[cfg(target_os = "linux")]
    {
        if let Ok(status) = std::fs::read_to_string("/proc/self/status") {
            for line in status.lines() {
                if line.starts_with("VmRSS:") {
                    // RSS is reported in kB
                    if let Some(kb_str) = line.split_whitespace().nth(1) {
                        if let Ok(kb) = kb_str.parse::<f64>() {
                            PROCESS_MEMORY_BYTES.set(kb * 1024.0);
                            return;
                        }
                    }
                }
            }
        }
    }
}

/// Handler for the /metrics endpoint
pub async fn metrics_handler() -> impl IntoResponse {
    update_memory_usage();

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
