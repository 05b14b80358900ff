//! Metric definitions for session coordination.
//!
//! Uses the `metrics` facade only; whichever recorder the host process
//! installs (the service installs Prometheus) receives the values.
//!
//! - `parley_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels never carry session, user or connection ids:
//! - `status`: participant status (3 values)
//! - `verdict`: approved, denied
//! - `applied`: true, false
//! - `topic`: admission, signal, chat, other
//! - `event`: link lifecycle events (4 values)
//! - `role`: polite, impolite

use metrics::{counter, histogram};
use std::time::Duration;

// ============================================================================
// Admission
// ============================================================================

/// Metric: `parley_admission_requests_total`
/// Labels: `status` (resulting participant status)
pub fn record_join_request(status: &'static str) {
    counter!("parley_admission_requests_total", "status" => status).increment(1);
}

/// Metric: `parley_admission_decisions_total`
/// Labels: `verdict`, `applied`
///
/// `applied = false` counts decisions that hit an already-resolved record.
pub fn record_decision(verdict: &'static str, applied: bool) {
    counter!(
        "parley_admission_decisions_total",
        "verdict" => verdict,
        "applied" => if applied { "true" } else { "false" }
    )
    .increment(1);
}

// ============================================================================
// Bus
// ============================================================================

/// Metric: `parley_bus_resubscribes_total`
/// Labels: `topic`
pub fn record_resubscribe(topic: &'static str) {
    counter!("parley_bus_resubscribes_total", "topic" => topic).increment(1);
}

/// Metric: `parley_bus_duplicates_dropped_total`
/// Labels: `topic`
pub fn record_duplicate_dropped(topic: &'static str) {
    counter!("parley_bus_duplicates_dropped_total", "topic" => topic).increment(1);
}

/// Metric: `parley_bus_publish_failures_total`
/// Labels: `topic`
pub fn record_publish_failure(topic: &'static str) {
    counter!("parley_bus_publish_failures_total", "topic" => topic).increment(1);
}

// ============================================================================
// Mesh
// ============================================================================

/// Metric: `parley_mesh_link_events_total`
/// Labels: `event` (discovered, negotiating, connected, failed, closed)
pub fn record_link_event(event: &'static str) {
    counter!("parley_mesh_link_events_total", "event" => event).increment(1);
}

/// Metric: `parley_mesh_ice_restarts_total`
pub fn record_ice_restart() {
    counter!("parley_mesh_ice_restarts_total").increment(1);
}

/// Metric: `parley_mesh_glare_total`
/// Labels: `role` (which side of the collision this client was)
pub fn record_glare(role: &'static str) {
    counter!("parley_mesh_glare_total", "role" => role).increment(1);
}

// ============================================================================
// Recording
// ============================================================================

/// Metric: `parley_recording_upload_duration_seconds`, `parley_recording_uploads_total`
/// Labels: `status` (success, error)
pub fn record_upload(status: &'static str, duration: Duration) {
    histogram!("parley_recording_upload_duration_seconds", "status" => status)
        .record(duration.as_secs_f64());
    counter!("parley_recording_uploads_total", "status" => status).increment(1);
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use metrics_util::debugging::{DebugValue, DebuggingRecorder};

    fn counter_value(
        snapshot: &[(
            metrics_util::CompositeKey,
            Option<metrics::Unit>,
            Option<metrics::SharedString>,
            DebugValue,
        )],
        name: &str,
    ) -> u64 {
        snapshot
            .iter()
            .filter(|(key, _, _, _)| key.key().name() == name)
            .map(|(_, _, _, value)| match value {
                DebugValue::Counter(v) => *v,
                _ => 0,
            })
            .sum()
    }

    #[test]
    fn test_admission_counters_are_recorded() {
        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();

        metrics::with_local_recorder(&recorder, || {
            record_join_request("pending");
            record_join_request("approved");
            record_decision("approved", true);
            record_decision("denied", false);
        });

        let snapshot = snapshotter.snapshot().into_vec();
        assert_eq!(
            counter_value(&snapshot, "parley_admission_requests_total"),
            2
        );
        assert_eq!(
            counter_value(&snapshot, "parley_admission_decisions_total"),
            2
        );
    }

    #[test]
    fn test_all_recorders_run_without_installed_recorder() {
        record_resubscribe("signal");
        record_duplicate_dropped("chat");
        record_publish_failure("admission");
        record_link_event("connected");
        record_ice_restart();
        record_glare("polite");
        record_upload("success", Duration::from_millis(120));
    }

    #[test]
    fn test_upload_records_histogram_and_counter() {
        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();

        metrics::with_local_recorder(&recorder, || {
            record_upload("error", Duration::from_millis(40));
        });

        let snapshot = snapshotter.snapshot().into_vec();
        let names: Vec<String> = snapshot
            .iter()
            .map(|(key, _, _, _)| key.key().name().to_string())
            .collect();
        assert!(names.contains(&"parley_recording_uploads_total".to_string()));
        assert!(names.contains(&"parley_recording_upload_duration_seconds".to_string()));
    }
}
