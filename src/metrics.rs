use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Install the Prometheus recorder
///
/// Fails if a global recorder is already installed.
pub fn init_metrics() -> anyhow::Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("Failed to install Prometheus recorder: {}", e))?;

    init_metric_descriptions();

    Ok(handle)
}

/// Describe all metrics (safe to call more than once)
fn init_metric_descriptions() {
    describe_counter!(
        "http_requests_logged_total",
        "Total number of requests recorded by the request logger"
    );
    describe_histogram!(
        "http_request_duration_seconds",
        "Request duration in seconds as seen by the request logger"
    );
    describe_counter!(
        "log_persist_failures_total",
        "Log entries that a sink failed to persist"
    );
    describe_counter!(
        "log_entries_dropped_total",
        "Log entries dropped because a sink queue was full or closed"
    );
    describe_gauge!("flexylog_info", "Service version information");

    gauge!("flexylog_info", "version" => env!("CARGO_PKG_VERSION")).set(1.0);
}

/// Record a logged request
pub fn record_request_logged(method: &str, status: u16, duration: Duration) {
    counter!(
        "http_requests_logged_total",
        "method" => method.to_string(),
        "status" => status.to_string(),
    )
    .increment(1);

    histogram!(
        "http_request_duration_seconds",
        "method" => method.to_string(),
    )
    .record(duration.as_secs_f64());
}

pub fn record_persist_failure(sink: &'static str, count: usize) {
    counter!("log_persist_failures_total", "sink" => sink).increment(count as u64);
}

pub fn record_entry_dropped(sink: &'static str) {
    counter!("log_entries_dropped_total", "sink" => sink).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_metrics() {
        init_metric_descriptions();

        record_request_logged("GET", 200, Duration::from_millis(12));
        record_persist_failure("store", 3);
        record_entry_dropped("file");

        // no recorder installed: calls are no-ops and must not panic
    }

    #[test]
    fn test_recorder_renders_request_counter() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();

        ::metrics::with_local_recorder(&recorder, || {
            record_request_logged("POST", 201, Duration::from_millis(5));
        });

        let rendered = handle.render();
        assert!(rendered.contains("http_requests_logged_total"));
        assert!(rendered.contains("method=\"POST\""));
        assert!(rendered.contains("status=\"201\""));
    }
}
