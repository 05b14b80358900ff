//! HTTP and database metrics for the Session Service.
//!
//! - `parley_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! - `method`: HTTP verbs
//! - `endpoint`: route templates; session and user ids are replaced
//! - `status`: success, error, timeout
//! - `operation`: bounded by the repository code

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Install the Prometheus recorder and return the handle for `/metrics`.
///
/// # Errors
///
/// Returns error if the recorder cannot be installed (e.g., already installed).
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Prefix("parley_http_request".to_string()),
            &[
                0.005, 0.010, 0.025, 0.050, 0.100, 0.150, 0.200, 0.300, 0.500, 1.000, 2.000,
            ],
        )
        .map_err(|e| format!("Failed to set HTTP request buckets: {e}"))?
        .set_buckets_for_metric(
            Matcher::Prefix("parley_db_query".to_string()),
            &[
                0.001, 0.002, 0.005, 0.010, 0.020, 0.050, 0.100, 0.250, 0.500, 1.000,
            ],
        )
        .map_err(|e| format!("Failed to set DB query buckets: {e}"))?
        .set_buckets_for_metric(
            Matcher::Prefix("parley_recording_upload".to_string()),
            &[0.050, 0.100, 0.250, 0.500, 1.000, 2.500, 5.000, 10.000, 30.000],
        )
        .map_err(|e| format!("Failed to set upload buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus recorder: {e}"))
}

/// Metric: `parley_http_request_duration_seconds`, `parley_http_requests_total`
pub fn record_http_request(method: &str, endpoint: &str, status_code: u16, duration: Duration) {
    let normalized_endpoint = normalize_endpoint(endpoint);
    let status = categorize_status_code(status_code);

    histogram!("parley_http_request_duration_seconds",
        "method" => method.to_string(),
        "endpoint" => normalized_endpoint,
        "status" => status
    )
    .record(duration.as_secs_f64());

    counter!("parley_http_requests_total",
        "method" => method.to_string(),
        "endpoint" => normalized_endpoint,
        "status_code" => status_code.to_string()
    )
    .increment(1);
}

/// Metric: `parley_db_query_duration_seconds`, `parley_db_queries_total`
pub fn record_db_query(operation: &'static str, success: bool, duration: Duration) {
    let status = if success { "success" } else { "error" };
    histogram!("parley_db_query_duration_seconds", "operation" => operation)
        .record(duration.as_secs_f64());
    counter!("parley_db_queries_total", "operation" => operation, "status" => status)
        .increment(1);
}

fn categorize_status_code(status_code: u16) -> &'static str {
    match status_code {
        200..=299 => "success",
        408 | 504 => "timeout",
        _ => "error",
    }
}

/// Map a request path onto its route template.
fn normalize_endpoint(path: &str) -> &'static str {
    match path {
        "/health" => "/health",
        "/ready" => "/ready",
        "/metrics" => "/metrics",
        _ => normalize_session_endpoint(path),
    }
}

fn normalize_session_endpoint(path: &str) -> &'static str {
    let Some(rest) = path.strip_prefix("/api/v1/sessions/") else {
        return "/other";
    };
    let parts: Vec<&str> = rest.split('/').collect();
    match parts.as_slice() {
        [_, "join"] => "/api/v1/sessions/{id}/join",
        [_, "pending"] => "/api/v1/sessions/{id}/pending",
        [_, "messages"] => "/api/v1/sessions/{id}/messages",
        [_, "recordings"] => "/api/v1/sessions/{id}/recordings",
        [_, "participants", "me"] => "/api/v1/sessions/{id}/participants/me",
        [_, "participants", _, "decision"] => {
            "/api/v1/sessions/{id}/participants/{user}/decision"
        }
        _ => "/other",
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use metrics_util::debugging::{DebugValue, DebuggingRecorder};
    use metrics_util::MetricKind;

    #[test]
    fn test_static_endpoints() {
        assert_eq!(normalize_endpoint("/health"), "/health");
        assert_eq!(normalize_endpoint("/ready"), "/ready");
        assert_eq!(normalize_endpoint("/metrics"), "/metrics");
    }

    #[test]
    fn test_session_endpoints_drop_ids() {
        assert_eq!(
            normalize_endpoint("/api/v1/sessions/room-42/join"),
            "/api/v1/sessions/{id}/join"
        );
        assert_eq!(
            normalize_endpoint("/api/v1/sessions/room-42/participants/alice/decision"),
            "/api/v1/sessions/{id}/participants/{user}/decision"
        );
        assert_eq!(
            normalize_endpoint("/api/v1/sessions/room-42/participants/me"),
            "/api/v1/sessions/{id}/participants/me"
        );
    }

    #[test]
    fn test_unknown_paths_collapse() {
        assert_eq!(normalize_endpoint("/api/v1/sessions/room-42"), "/other");
        assert_eq!(normalize_endpoint("/wp-admin"), "/other");
        assert_eq!(
            normalize_endpoint("/api/v1/sessions/a/b/c/d/e"),
            "/other"
        );
    }

    #[test]
    fn test_status_categories() {
        assert_eq!(categorize_status_code(204), "success");
        assert_eq!(categorize_status_code(504), "timeout");
        assert_eq!(categorize_status_code(403), "error");
    }

    #[test]
    fn test_recording_does_not_panic_without_recorder() {
        record_http_request("GET", "/health", 200, Duration::from_millis(3));
        record_db_query("get_session", true, Duration::from_millis(1));
    }

    #[test]
    fn test_http_request_labels_use_route_template() {
        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();

        metrics::with_local_recorder(&recorder, || {
            record_http_request(
                "POST",
                "/api/v1/sessions/room-42/join",
                200,
                Duration::from_millis(12),
            );
        });

        let snapshot = snapshotter.snapshot().into_vec();
        let (key, _, _, value) = snapshot
            .iter()
            .find(|(key, _, _, _)| {
                key.kind() == MetricKind::Counter
                    && key.key().name() == "parley_http_requests_total"
            })
            .expect("request counter recorded");
        let labels: Vec<(String, String)> = key
            .key()
            .labels()
            .map(|l| (l.key().to_string(), l.value().to_string()))
            .collect();
        assert!(labels.contains(&(
            "endpoint".to_string(),
            "/api/v1/sessions/{id}/join".to_string()
        )));
        assert!(labels.contains(&("status_code".to_string(), "200".to_string())));
        assert!(matches!(value, DebugValue::Counter(1)));
    }

    #[test]
    fn test_db_query_counts_failures() {
        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();

        metrics::with_local_recorder(&recorder, || {
            record_db_query("insert_pending", true, Duration::from_millis(2));
            record_db_query("insert_pending", false, Duration::from_millis(5));
        });

        let snapshot = snapshotter.snapshot().into_vec();
        let errors: u64 = snapshot
            .iter()
            .filter(|(key, _, _, _)| {
                key.key().name() == "parley_db_queries_total"
                    && key
                        .key()
                        .labels()
                        .any(|l| l.key() == "status" && l.value() == "error")
            })
            .map(|(_, _, _, value)| match value {
                DebugValue::Counter(v) => *v,
                _ => 0,
            })
            .sum();
        assert_eq!(errors, 1);
        assert!(snapshot
            .iter()
            .any(|(key, _, _, _)| key.key().name() == "parley_db_query_duration_seconds"));
    }
}
