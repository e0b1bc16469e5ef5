//! Prometheus metrics exposition
//!
//! Service-level series recorded here:
//!
//! - `bff_requests_total` (counter): labels `status`, `method`
//! - `bff_request_duration_seconds` (histogram): label `status`
//!
//! The gateway crate adds `gateway_calls_total` and
//! `gateway_call_duration_seconds` through the same recorder.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use axum::body::Body;
use axum::extract::State;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::Response;
use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder, PrometheusHandle};

/// Bucket boundaries from 5ms up to the longest configurable API timeout range.
const DURATION_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0,
];

/// Counters behind `/health`.
#[derive(Debug, Clone)]
pub struct ServiceMetrics {
    pub requests_total: Arc<AtomicU64>,
    /// Responses with a 5xx status
    pub errors_total: Arc<AtomicU64>,
    pub in_flight: Arc<AtomicU64>,
    pub started_at: Instant,
}

impl ServiceMetrics {
    pub fn new() -> Self {
        Self {
            requests_total: Arc::new(AtomicU64::new(0)),
            errors_total: Arc::new(AtomicU64::new(0)),
            in_flight: Arc::new(AtomicU64::new(0)),
            started_at: Instant::now(),
        }
    }
}

fn builder() -> Result<PrometheusBuilder, BuildError> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full("bff_request_duration_seconds".to_string()),
            DURATION_BUCKETS,
        )?
        .set_buckets_for_metric(
            Matcher::Full("gateway_call_duration_seconds".to_string()),
            DURATION_BUCKETS,
        )
}

/// Install the global Prometheus recorder and return a handle for `/metrics`.
///
/// Duration series render as histograms (`_bucket` lines) instead of the
/// exporter's default summaries.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    builder()?.install_recorder()
}

/// Record a completed request with status code and HTTP method labels.
pub fn record_request(status: u16, method: &str, duration_secs: f64) {
    let status_str = status.to_string();
    metrics::counter!("bff_requests_total", "status" => status_str.clone(), "method" => method.to_string())
        .increment(1);
    metrics::histogram!("bff_request_duration_seconds", "status" => status_str)
        .record(duration_secs);
}

/// Middleware counting every request into `ServiceMetrics` and Prometheus.
pub async fn track_requests(
    State(service): State<ServiceMetrics>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let method = request.method().to_string();
    let started = Instant::now();
    service.requests_total.fetch_add(1, Ordering::Relaxed);
    service.in_flight.fetch_add(1, Ordering::Relaxed);

    let response = next.run(request).await;

    service.in_flight.fetch_sub(1, Ordering::Relaxed);
    let status = response.status();
    if status.is_server_error() {
        service.errors_total.fetch_add(1, Ordering::Relaxed);
    }
    record_request(status.as_u16(), &method, started.elapsed().as_secs_f64());
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use metrics_exporter_prometheus::PrometheusRecorder;

    #[test]
    fn record_request_without_recorder_is_a_noop() {
        record_request(200, "GET", 0.05);
    }

    fn isolated_recorder() -> (PrometheusRecorder, PrometheusHandle) {
        let recorder = builder().unwrap().build_recorder();
        let handle = recorder.handle();
        (recorder, handle)
    }

    #[test]
    fn record_request_renders_counter_and_histogram() {
        let (recorder, handle) = isolated_recorder();
        let _guard = metrics::set_default_local_recorder(&recorder);

        record_request(303, "POST", 0.042);
        record_request(502, "GET", 1.5);

        let output = handle.render();
        assert!(output.contains("bff_requests_total"), "got: {output}");
        assert!(output.contains("status=\"303\""));
        assert!(output.contains("method=\"POST\""));
        assert!(output.contains("status=\"502\""));
        assert!(output.contains("bff_request_duration_seconds_bucket"));
        assert!(output.contains("le=\"0.005\""));
        assert!(output.contains("le=\"60\""));
    }

    #[test]
    fn gateway_durations_render_as_histogram() {
        let (recorder, handle) = isolated_recorder();
        let _guard = metrics::set_default_local_recorder(&recorder);

        api_gateway::metrics::record_call(
            api_gateway::Method::Get,
            &Ok(api_gateway::Outcome::Success(None)),
            std::time::Duration::from_millis(20),
        );

        let output = handle.render();
        assert!(
            output.contains("gateway_call_duration_seconds_bucket"),
            "got: {output}"
        );
        assert!(output.contains("outcome=\"success\""));
    }
}
