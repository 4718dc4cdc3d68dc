//! Metrics and observability utilities
//!
//! Prometheus metrics for provider fan-out, cache tiers and synthesis,
//! with latency histograms sized for upstream clinical APIs.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit};
use std::time::Instant;

/// Metrics prefix for all Clinsight metrics
pub const METRICS_PREFIX: &str = "clinsight";

/// Histogram buckets for request latency (in seconds)
pub const LATENCY_BUCKETS: &[f64] = &[
    0.005, // 5ms
    0.010, // 10ms
    0.025, // 25ms
    0.050, // 50ms
    0.100, // 100ms
    0.250, // 250ms
    0.500, // 500ms
    1.000, // 1s
    2.500, // 2.5s
    5.000, // 5s
    10.00, // 10s
    15.00, // 15s, default overall deadline
];

/// Buckets for single provider fetches (upstream APIs are slow)
pub const PROVIDER_BUCKETS: &[f64] = &[
    0.050, // 50ms
    0.100, // 100ms
    0.250, // 250ms
    0.500, // 500ms
    1.000, // 1s
    2.000, // 2s
    5.000, // 5s
    10.00, // 10s
];

/// Register all metric descriptions
pub fn register_metrics() {
    // Request metrics
    describe_counter!(
        format!("{}_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total number of HTTP requests"
    );

    describe_histogram!(
        format!("{}_request_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "HTTP request latency in seconds"
    );

    // Provider metrics
    describe_counter!(
        format!("{}_provider_fetches_total", METRICS_PREFIX),
        Unit::Count,
        "Provider fetches by outcome"
    );

    describe_histogram!(
        format!("{}_provider_fetch_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Provider fetch latency in seconds"
    );

    describe_gauge!(
        format!("{}_provider_online", METRICS_PREFIX),
        Unit::Count,
        "1 when the provider answered its last health check"
    );

    // Engine metrics
    describe_counter!(
        format!("{}_engine_runs_total", METRICS_PREFIX),
        Unit::Count,
        "Engine invocations"
    );

    describe_histogram!(
        format!("{}_synthesis_confidence", METRICS_PREFIX),
        Unit::Count,
        "Distribution of synthesis confidence scores"
    );

    // Cache metrics
    describe_counter!(
        format!("{}_cache_hits_total", METRICS_PREFIX),
        Unit::Count,
        "Total cache hits"
    );

    describe_counter!(
        format!("{}_cache_misses_total", METRICS_PREFIX),
        Unit::Count,
        "Total cache misses"
    );

    tracing::info!("Metrics registered");
}

/// Helper to record request metrics
pub struct RequestMetrics {
    start: Instant,
    endpoint: String,
    method: String,
}

impl RequestMetrics {
    /// Start tracking a request
    pub fn start(method: &str, endpoint: &str) -> Self {
        Self {
            start: Instant::now(),
            endpoint: endpoint.to_string(),
            method: method.to_string(),
        }
    }

    /// Record request completion
    pub fn finish(self, status: u16) {
        let duration = self.start.elapsed().as_secs_f64();

        counter!(
            format!("{}_requests_total", METRICS_PREFIX),
            "method" => self.method.clone(),
            "endpoint" => self.endpoint.clone(),
            "status" => status.to_string()
        )
        .increment(1);

        histogram!(
            format!("{}_request_duration_seconds", METRICS_PREFIX),
            "method" => self.method,
            "endpoint" => self.endpoint
        )
        .record(duration);
    }
}

/// Record one provider fetch; `outcome` is "ok", "cached" or a degraded reason
pub fn record_provider_fetch(provider: &str, outcome: &str, duration_secs: f64) {
    counter!(
        format!("{}_provider_fetches_total", METRICS_PREFIX),
        "provider" => provider.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);

    histogram!(
        format!("{}_provider_fetch_duration_seconds", METRICS_PREFIX),
        "provider" => provider.to_string()
    )
    .record(duration_secs);
}

/// Record the result of a provider health check
pub fn record_provider_health(provider: &str, online: bool) {
    gauge!(
        format!("{}_provider_online", METRICS_PREFIX),
        "provider" => provider.to_string()
    )
    .set(if online { 1.0 } else { 0.0 });
}

/// Record an engine run
pub fn record_engine(engine: &str, cached: bool) {
    counter!(
        format!("{}_engine_runs_total", METRICS_PREFIX),
        "engine" => engine.to_string(),
        "cached" => cached.to_string()
    )
    .increment(1);
}

pub fn record_synthesis(confidence: f64) {
    histogram!(format!("{}_synthesis_confidence", METRICS_PREFIX)).record(confidence);
}

/// Helper to record cache metrics
pub fn record_cache(hit: bool, tier: &str) {
    if hit {
        counter!(
            format!("{}_cache_hits_total", METRICS_PREFIX),
            "tier" => tier.to_string()
        )
        .increment(1);
    } else {
        counter!(
            format!("{}_cache_misses_total", METRICS_PREFIX),
            "tier" => tier.to_string()
        )
        .increment(1);
    }
}
