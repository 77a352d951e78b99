use metrics::{describe_counter, describe_gauge, describe_histogram, Unit};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Histogram bucket boundaries for latency metrics (seconds).
const LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

/// Thin handle around the global metrics recorder.
///
/// After `Metrics::install()` the `metrics` crate macros (`counter!`,
/// `gauge!`, `histogram!`) can be used anywhere in the codebase. The
/// `PrometheusHandle` is retained solely for rendering `/metrics`.
#[derive(Clone)]
pub struct Metrics {
    handle: PrometheusHandle,
}

impl Metrics {
    /// Install the global Prometheus recorder and register metric
    /// descriptions. Must be called **once** at startup before any
    /// `counter!` / `gauge!` / `histogram!` calls.
    pub fn install() -> Self {
        let handle = PrometheusBuilder::new()
            .set_buckets_for_metric(
                metrics_exporter_prometheus::Matcher::Suffix("_duration_seconds".to_string()),
                LATENCY_BUCKETS,
            )
            .expect("valid matcher")
            .install_recorder()
            .expect("failed to install metrics recorder");

        // --- Describe all metrics (adds HELP / TYPE lines) ---

        // request path
        describe_counter!(
            "limiter_http_requests_total",
            Unit::Count,
            "Total HTTP requests processed"
        );
        describe_histogram!(
            "limiter_http_request_duration_seconds",
            Unit::Seconds,
            "Request duration from the client's perspective"
        );

        // decisions
        describe_counter!(
            "limiter_decisions_total",
            Unit::Count,
            "Rate-limit decisions by endpoint, tier, region and outcome"
        );
        describe_counter!(
            "limiter_cache_hits_total",
            Unit::Count,
            "Decisions served from the local allow cache"
        );

        // degradation ladder
        describe_counter!(
            "limiter_store_errors_total",
            Unit::Count,
            "Shared-store operation failures by operation"
        );
        describe_counter!(
            "limiter_fallback_total",
            Unit::Count,
            "Decisions routed through the non-atomic fallback evaluator"
        );
        describe_counter!(
            "limiter_fail_open_total",
            Unit::Count,
            "Decisions resolved by failing open"
        );

        // audit & config
        describe_counter!(
            "limiter_audit_events_total",
            Unit::Count,
            "Audit events appended, by type"
        );
        describe_gauge!(
            "limiter_policies_total",
            Unit::Count,
            "Number of rate-limit policies currently loaded"
        );

        // connections
        describe_gauge!(
            "limiter_connections_active",
            Unit::Count,
            "Number of active downstream connections"
        );
        describe_counter!(
            "limiter_connections_total",
            Unit::Count,
            "Total connections accepted"
        );

        Self { handle }
    }

    /// Render all metrics in Prometheus text exposition format.
    pub fn render(&self) -> String {
        self.handle.render()
    }
}
