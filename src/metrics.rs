//! The Metrics Sink: append-only counters/histograms drained by an
//! out-of-process scraper. `metrics` + `metrics-exporter-prometheus` (already
//! in the teacher's dependency list) give us exactly that shape - the
//! `metrics::counter!`/`histogram!` calls are the "enqueue," the rendered
//! `/metrics` text body is the drain point. The core never reads these back.

use axum::{http::StatusCode, response::IntoResponse};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

pub struct MetricsRecorder {
    handle: PrometheusHandle,
}

impl MetricsRecorder {
    pub fn new() -> Self {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .expect("failed to install Prometheus recorder");

        metrics::describe_counter!(
            "incoming_call_total",
            "Total number of incoming-call requests, labeled by result"
        );
        metrics::describe_counter!(
            "push_notification_sent_total",
            "Total number of call push notifications accepted by a transport"
        );
        metrics::describe_counter!(
            "push_notification_failed_total",
            "Total number of failed push dispatch attempts, labeled by reason"
        );
        metrics::describe_histogram!(
            "incoming_call_roundtrip_seconds",
            "Round trip between push dispatch and the device's call-response"
        );
        metrics::describe_counter!(
            "http_requests_total",
            "Total number of HTTP requests"
        );
        metrics::describe_histogram!(
            "http_request_duration_seconds",
            "HTTP request duration in seconds"
        );

        Self { handle }
    }

    pub fn handle(&self) -> &PrometheusHandle {
        &self.handle
    }
}

impl Default for MetricsRecorder {
    fn default() -> Self {
        Self::new()
    }
}

pub async fn metrics_handler(handle: axum::extract::State<PrometheusHandle>) -> impl IntoResponse {
    (StatusCode::OK, handle.render())
}

/// Middleware to track aggregate HTTP request metrics.
pub async fn track_request_metrics(
    req: axum::extract::Request,
    next: axum::middleware::Next,
) -> impl IntoResponse {
    let start = std::time::Instant::now();
    let response = next.run(req).await;
    let duration = start.elapsed();

    metrics::counter!("http_requests_total", 1);
    metrics::histogram!("http_request_duration_seconds", duration.as_secs_f64());

    response
}

/// The `incoming-call-failed` metric, labeled with the same reason strings
/// the original middleware used: `"no sip_user_id"`,
/// `"Device not available"`, `"Unable to get response from phone"`.
pub fn record_incoming_call_failed(reason: &'static str) {
    metrics::counter!("incoming_call_total", 1, "result" => "failed", "reason" => reason);
}

pub fn record_incoming_call_succeeded() {
    metrics::counter!("incoming_call_total", 1, "result" => "succeeded");
}

pub fn record_roundtrip(seconds: f64) {
    metrics::histogram!("incoming_call_roundtrip_seconds", seconds);
}
