//! Metric instrument factories for taskclaim.
//!
//! Uses the OTel Meter API with the globally-registered `MeterProvider`.
//! All instruments are created lazily from the `"taskclaim"` meter.

use opentelemetry::metrics::{Counter, Histogram, Meter};

/// Returns the shared meter for taskclaim instruments.
fn meter() -> Meter {
    opentelemetry::global::meter("taskclaim")
}

/// Counter: claim attempts.
/// Labels: `result` ("claimed" | "already_claimed" | "not_found" | "transient" | "error").
pub fn claims() -> Counter<u64> {
    meter()
        .u64_counter("taskclaim.claims")
        .with_description("Number of task claim attempts")
        .build()
}

/// Histogram: claim latency in milliseconds, lock wait included.
/// Labels: `result`.
pub fn claim_duration_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("taskclaim.claim.duration_ms")
        .with_description("Task claim duration in milliseconds")
        .with_unit("ms")
        .build()
}

/// Counter: tasks created.
pub fn tasks_created() -> Counter<u64> {
    meter()
        .u64_counter("taskclaim.tasks.created")
        .with_description("Number of tasks created")
        .build()
}

/// Counter: edits and deletes.
/// Labels: `operation` ("update" | "delete").
pub fn task_mutations() -> Counter<u64> {
    meter()
        .u64_counter("taskclaim.tasks.mutations")
        .with_description("Number of task edits and deletions")
        .build()
}
