//! Task span helpers.
//!
//! Spans for claim attempts and the state transitions they cause.

use tracing::Span;

use crate::model::{Status, TaskId, UserId};

/// Start a span for a claim attempt.
///
/// The `claim.result` field is declared empty and filled in by
/// [`record_claim_result`] once the attempt settles.
pub fn start_claim_span(task_id: TaskId, claimant: UserId) -> Span {
    tracing::info_span!(
        "task.claim",
        "task.id" = %task_id,
        "task.claimant" = %claimant,
        "claim.result" = tracing::field::Empty,
    )
}

/// Record how a claim attempt ended.
pub fn record_claim_result(span: &Span, result: &str) {
    span.record("claim.result", result);
}

/// Record a state transition event on the given span.
pub fn record_state_transition(span: &Span, from: Status, to: Status) {
    span.in_scope(|| {
        tracing::info!(from = %from, to = %to, "state_transition");
    });
}
