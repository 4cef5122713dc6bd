//! Metrics collection for the media pipeline using Prometheus
//!
//! Tracks every stage of a request:
//! - Retrieval attempts by tier and outcome
//! - Delivery attempts and retries
//! - End-to-end pipeline duration and delivered artifact sizes

use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_histogram, register_histogram_vec, CounterVec, Encoder, Histogram, HistogramVec,
    TextEncoder,
};

lazy_static! {
    /// Retrieval attempts
    /// Labels: tier (720p/lowest/...), outcome (success/quota_exceeded/source_unavailable/transient)
    pub static ref RETRIEVAL_ATTEMPTS_TOTAL: CounterVec = register_counter_vec!(
        "mediadrop_retrieval_attempts_total",
        "Total number of retrieval attempts by tier and outcome",
        &["tier", "outcome"]
    )
    .unwrap();

    /// Upload attempts
    /// Labels: outcome (delivered/transient/permanent/too_large)
    pub static ref DELIVERY_ATTEMPTS_TOTAL: CounterVec = register_counter_vec!(
        "mediadrop_delivery_attempts_total",
        "Total number of upload attempts by outcome",
        &["outcome"]
    )
    .unwrap();

    /// Retries performed by the generic retry helper
    /// Labels: attempt number
    pub static ref TASK_RETRIES_TOTAL: CounterVec = register_counter_vec!(
        "mediadrop_task_retries_total",
        "Total number of retried operations",
        &["attempt"]
    )
    .unwrap();

    /// End-to-end request duration
    /// Labels: outcome (delivered/ladder_exhausted/delivery_failed/...)
    pub static ref PIPELINE_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "mediadrop_pipeline_duration_seconds",
        "Time spent on a media request from probe to delivery",
        &["outcome"],
        vec![1.0, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0, 600.0, 900.0]
    )
    .unwrap();

    /// Size of delivered artifacts
    pub static ref ARTIFACT_SIZE_BYTES: Histogram = register_histogram!(
        "mediadrop_artifact_size_bytes",
        "Measured size of delivered artifacts",
        vec![
            1_048_576.0,
            5_242_880.0,
            10_485_760.0,
            20_971_520.0,
            31_457_280.0,
            52_428_800.0,
            524_288_000.0,
            2_147_483_648.0
        ]
    )
    .unwrap();

    /// Errors by category
    /// Labels: error_type, operation
    pub static ref ERRORS_TOTAL: CounterVec = register_counter_vec!(
        "mediadrop_errors_total",
        "Total number of errors by type and operation",
        &["error_type", "operation"]
    )
    .unwrap();
}

/// Forces registration of every metric so they show up before first use.
pub fn init_metrics() {
    lazy_static::initialize(&RETRIEVAL_ATTEMPTS_TOTAL);
    lazy_static::initialize(&DELIVERY_ATTEMPTS_TOTAL);
    lazy_static::initialize(&TASK_RETRIES_TOTAL);
    lazy_static::initialize(&PIPELINE_DURATION_SECONDS);
    lazy_static::initialize(&ARTIFACT_SIZE_BYTES);
    lazy_static::initialize(&ERRORS_TOTAL);
    log::info!("Metrics registry initialized");
}

pub fn record_attempt(tier: &str, outcome: &str) {
    RETRIEVAL_ATTEMPTS_TOTAL.with_label_values(&[tier, outcome]).inc();
}

pub fn record_delivery_attempt(outcome: &str) {
    DELIVERY_ATTEMPTS_TOTAL.with_label_values(&[outcome]).inc();
}

pub fn record_error(error_type: &str, operation: &str) {
    ERRORS_TOTAL.with_label_values(&[error_type, operation]).inc();
}

pub fn record_pipeline(outcome: &str, seconds: f64) {
    PIPELINE_DURATION_SECONDS.with_label_values(&[outcome]).observe(seconds);
}

pub fn record_artifact_size(bytes: u64) {
    ARTIFACT_SIZE_BYTES.observe(bytes as f64);
}

/// Renders the default registry in the Prometheus text exposition format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        log::error!("Failed to encode metrics: {}", e);
        return String::new();
    }
    String::from_utf8_lossy(&buffer).into_owned()
}
