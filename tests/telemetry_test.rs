//! Integration tests for telemetry initialization and span helpers.

use taskclaim::model::{Status, TaskId, UserId};

#[test]
fn telemetry_initializes_without_endpoint() {
    // The global subscriber can only be set once per process; a second
    // init returning Err is acceptable here.
    let config = taskclaim::telemetry::TelemetryConfig {
        endpoint: None,
        service_name: "taskclaim-test".to_string(),
        log_level: "debug".to_string(),
    };
    let _guard = taskclaim::telemetry::init_telemetry(config);
}

#[test]
fn claim_span_records_result_and_transition() {
    let span = taskclaim::telemetry::task::start_claim_span(TaskId::new(), UserId::new());
    taskclaim::telemetry::task::record_state_transition(
        &span,
        Status::Unassigned,
        Status::InProgress,
    );
    taskclaim::telemetry::task::record_claim_result(&span, "claimed");
}

#[test]
fn metric_instruments_build_without_a_provider() {
    taskclaim::telemetry::metrics::claims().add(1, &[]);
    taskclaim::telemetry::metrics::claim_duration_ms().record(1.5, &[]);
    taskclaim::telemetry::metrics::tasks_created().add(1, &[]);
    taskclaim::telemetry::metrics::task_mutations().add(1, &[]);
}
