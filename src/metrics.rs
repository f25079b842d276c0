//! Production metrics with Prometheus
//!
//! Operational metrics for monitoring and alerting: request rates and
//! latencies, per-tier retrieval outcomes, breaker state, pending-write
//! backlog, snapshot rebuilds.
//!
//! NOTE: action ids and flows are intentionally absent from metric labels to
//! prevent high-cardinality explosion.

use lazy_static::lazy_static;
use prometheus::{
    Histogram, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry,
};

lazy_static! {
    /// Global metrics registry
    pub static ref METRICS_REGISTRY: Registry = Registry::new();

    // =========================================================================
    // Request metrics
    // =========================================================================

    /// HTTP request duration in seconds
    pub static ref HTTP_REQUEST_DURATION: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "prashna_http_request_duration_seconds",
            "HTTP request duration in seconds"
        )
        .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]),
        &["method", "endpoint", "status"]
    ).unwrap();

    /// Total HTTP requests
    pub static ref HTTP_REQUESTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("prashna_http_requests_total", "Total HTTP requests"),
        &["method", "endpoint", "status"]
    ).unwrap();

    // =========================================================================
    // Retrieval metrics
    // =========================================================================

    /// Questionnaire retrievals by serving tier and outcome
    pub static ref RETRIEVAL_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new(
            "prashna_retrieval_total",
            "Questionnaire retrievals by serving tier"
        ),
        &["tier", "result"]
    ).unwrap();

    /// End-to-end retrieval duration across all tiers
    pub static ref RETRIEVAL_DURATION: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "prashna_retrieval_duration_seconds",
            "Questionnaire retrieval duration across all tiers"
        )
        .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0])
    ).unwrap();

    /// Primary-store failures observed by the breaker
    pub static ref PRIMARY_FAILURES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new(
            "prashna_primary_failures_total",
            "Primary store failures by kind"
        ),
        &["kind"]
    ).unwrap();

    // =========================================================================
    // Breaker metrics
    // =========================================================================

    /// Breaker state: 0 = CLOSED, 1 = HALF_OPEN, 2 = OPEN
    pub static ref BREAKER_STATE: IntGauge = IntGauge::new(
        "prashna_breaker_state",
        "Circuit breaker state (0=CLOSED, 1=HALF_OPEN, 2=OPEN)"
    ).unwrap();

    /// Breaker state transitions by target state
    pub static ref BREAKER_TRANSITIONS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new(
            "prashna_breaker_transitions_total",
            "Circuit breaker transitions by target state"
        ),
        &["to"]
    ).unwrap();

    // =========================================================================
    // Write-queue metrics
    // =========================================================================

    /// Writes currently queued for replay
    pub static ref PENDING_WRITES: IntGauge = IntGauge::new(
        "prashna_pending_writes",
        "Writes queued during primary outage awaiting replay"
    ).unwrap();

    /// Queued writes replayed by outcome
    pub static ref PENDING_REPLAYED_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new(
            "prashna_pending_replayed_total",
            "Queued writes replayed after recovery"
        ),
        &["result"]
    ).unwrap();

    // =========================================================================
    // Cache / snapshot metrics
    // =========================================================================

    /// Cache-tier operations by op and outcome
    pub static ref CACHE_OPS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("prashna_cache_ops_total", "Cache tier operations"),
        &["op", "result"]
    ).unwrap();

    /// Snapshot rebuilds by outcome
    pub static ref SNAPSHOT_REBUILDS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new(
            "prashna_snapshot_rebuilds_total",
            "Dataset snapshot rebuilds"
        ),
        &["result"]
    ).unwrap();
}

/// Register all metrics with the registry. Call once at startup.
pub fn register_metrics() -> Result<(), prometheus::Error> {
    METRICS_REGISTRY.register(Box::new(HTTP_REQUEST_DURATION.clone()))?;
    METRICS_REGISTRY.register(Box::new(HTTP_REQUESTS_TOTAL.clone()))?;
    METRICS_REGISTRY.register(Box::new(RETRIEVAL_TOTAL.clone()))?;
    METRICS_REGISTRY.register(Box::new(RETRIEVAL_DURATION.clone()))?;
    METRICS_REGISTRY.register(Box::new(PRIMARY_FAILURES_TOTAL.clone()))?;
    METRICS_REGISTRY.register(Box::new(BREAKER_STATE.clone()))?;
    METRICS_REGISTRY.register(Box::new(BREAKER_TRANSITIONS_TOTAL.clone()))?;
    METRICS_REGISTRY.register(Box::new(PENDING_WRITES.clone()))?;
    METRICS_REGISTRY.register(Box::new(PENDING_REPLAYED_TOTAL.clone()))?;
    METRICS_REGISTRY.register(Box::new(CACHE_OPS_TOTAL.clone()))?;
    METRICS_REGISTRY.register(Box::new(SNAPSHOT_REBUILDS_TOTAL.clone()))?;
    Ok(())
}

/// Render the registry in the Prometheus text exposition format.
pub fn gather() -> String {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();
    let families = METRICS_REGISTRY.gather();
    let mut buf = Vec::new();
    if let Err(e) = encoder.encode(&families, &mut buf) {
        tracing::error!("metrics encoding failed: {}", e);
        return String::new();
    }
    String::from_utf8(buf).unwrap_or_default()
}
