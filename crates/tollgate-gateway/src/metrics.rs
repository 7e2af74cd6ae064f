//! Prometheus metrics for the gateway.
use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, Encoder, HistogramVec, TextEncoder,
};
use std::time::Duration;
use tracing::error;

lazy_static! {
    /// Requests answered, by how they were served
    pub static ref REQUESTS_TOTAL: CounterVec = register_counter_vec!(
        "tollgate_requests_total",
        "Total number of requests answered by the gateway",
        &["mode", "method", "status"]  // mode: proxy|mock|static_mock
    )
    .unwrap();

    pub static ref UPSTREAM_REQUEST_DURATION_MS: HistogramVec = register_histogram_vec!(
        "tollgate_upstream_request_duration_ms",
        "Duration of upstream calls, redirects included",
        &["method", "outcome"],  // outcome: status code or "error"
        vec![1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0]
    )
    .unwrap();

    pub static ref VALIDATION_FINDINGS_TOTAL: CounterVec = register_counter_vec!(
        "tollgate_validation_findings_total",
        "Contract validation findings",
        &["phase", "type"]  // phase: request|response
    )
    .unwrap();

    pub static ref STATIC_MOCK_HITS_TOTAL: CounterVec = register_counter_vec!(
        "tollgate_static_mock_hits_total",
        "Requests answered from static mock definitions",
        &["method"]
    )
    .unwrap();

    pub static ref MOCK_RESPONSES_TOTAL: CounterVec = register_counter_vec!(
        "tollgate_mock_responses_total",
        "Contract mock responses, by status and whether generation failed",
        &["status", "failed"]
    )
    .unwrap();
}

/// All registered metrics in Prometheus text format.
pub fn collect_metrics() -> String {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        error!(error = %e, "Failed to encode metrics");
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

pub fn record_request(mode: &str, method: &str, status: u16) {
    REQUESTS_TOTAL
        .with_label_values(&[mode, method, &status.to_string()])
        .inc();
}

pub fn record_upstream_duration(method: &str, outcome: &str, elapsed: Duration) {
    UPSTREAM_REQUEST_DURATION_MS
        .with_label_values(&[method, outcome])
        .observe(elapsed.as_secs_f64() * 1000.0);
}

pub fn record_validation_finding(phase: &str, validation_type: &str) {
    VALIDATION_FINDINGS_TOTAL
        .with_label_values(&[phase, validation_type])
        .inc();
}

pub fn record_static_mock_hit(method: &str) {
    STATIC_MOCK_HITS_TOTAL.with_label_values(&[method]).inc();
}

pub fn record_mock_response(status: u16, failed: bool) {
    MOCK_RESPONSES_TOTAL
        .with_label_values(&[&status.to_string(), if failed { "true" } else { "false" }])
        .inc();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recorded_metrics_are_collected() {
        record_request("proxy", "GET", 200);
        record_upstream_duration("GET", "200", Duration::from_millis(12));
        record_validation_finding("request", "parameter");
        record_static_mock_hit("POST");
        record_mock_response(404, true);

        let text = collect_metrics();
        assert!(text.contains("tollgate_requests_total"));
        assert!(text.contains("mode=\"proxy\""));
        assert!(text.contains("tollgate_upstream_request_duration_ms_bucket"));
        assert!(text.contains("tollgate_validation_findings_total"));
        assert!(text.contains("tollgate_static_mock_hits_total"));
        assert!(text.contains("tollgate_mock_responses_total"));
    }
}
