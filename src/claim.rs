//! Exclusive task claiming.
//!
//! [`ClaimCoordinator::claim`] moves a task from `Unassigned` to `InProgress`
//! with the claimant as owner. Concurrent claims on one task are serialized
//! by the store's row lock: lock, read, decide, write, commit. The loser of
//! any race reads the winner's committed owner and gets
//! [`Error::AlreadyClaimed`]. Claims on different tasks lock different rows
//! and never wait on each other.
//!
//! The coordinator keeps no state between calls and never retries. A
//! transient failure (lock timeout, deadlock, lost connection) goes back to
//! the caller. If the returned future is dropped mid-claim the open
//! transaction is dropped with it, which rolls back and releases the lock.

use std::sync::Arc;
use std::time::Instant;

use opentelemetry::KeyValue;
use tracing::{Instrument, debug, info, warn};

use crate::error::{Error, Result};
use crate::model::{Status, Task, TaskId, UserId};
use crate::store::TaskStore;
use crate::telemetry::metrics;
use crate::telemetry::task::{record_claim_result, record_state_transition, start_claim_span};

/// Validate a state transition, returning an error if disallowed.
fn validate_transition(from: Status, to: Status) -> Result<()> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(Error::InvalidTransition { from, to })
    }
}

/// The only writer of a task's owner and status together.
#[derive(Clone)]
pub struct ClaimCoordinator {
    store: Arc<dyn TaskStore>,
}

impl ClaimCoordinator {
    pub fn new(store: Arc<dyn TaskStore>) -> Self {
        Self { store }
    }

    /// Claim `task_id` for `claimant`.
    ///
    /// The claimant is trusted: authentication and permission checks happen
    /// before this is called.
    ///
    /// # Errors
    ///
    /// - `Error::NotFound` if the task does not exist.
    /// - `Error::AlreadyClaimed` if the task already has an owner. Nothing is written.
    /// - `Error::LockTimeout` / `Error::Transient` on store contention or outage.
    pub async fn claim(&self, task_id: TaskId, claimant: UserId) -> Result<Task> {
        let span = start_claim_span(task_id, claimant);
        let started = Instant::now();

        let result = self
            .lock_and_assign(task_id, claimant)
            .instrument(span.clone())
            .await;

        let label = match &result {
            Ok(task) => {
                record_state_transition(&span, Status::Unassigned, task.status);
                info!(parent: &span, task = %task_id, owner = %claimant, "task claimed");
                "claimed"
            }
            Err(Error::AlreadyClaimed { owner, .. }) => {
                info!(parent: &span, task = %task_id, owner = %owner, "claim lost: already claimed");
                "already_claimed"
            }
            Err(Error::NotFound(_)) => {
                debug!(parent: &span, task = %task_id, "claim on missing task");
                "not_found"
            }
            Err(e) if e.is_transient() => {
                warn!(parent: &span, task = %task_id, error = %e, "claim failed transiently");
                "transient"
            }
            Err(e) => {
                warn!(parent: &span, task = %task_id, error = %e, "claim failed");
                "error"
            }
        };
        record_claim_result(&span, label);

        let labels = [KeyValue::new("result", label)];
        metrics::claims().add(1, &labels);
        metrics::claim_duration_ms().record(started.elapsed().as_secs_f64() * 1000.0, &labels);

        result
    }

    async fn lock_and_assign(&self, task_id: TaskId, claimant: UserId) -> Result<Task> {
        let mut tx = self.store.begin().await?;

        // Fresh read under the row lock.
        let current = tx
            .lock_task(task_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("task {task_id}")))?;

        // Returning drops `tx`, which rolls back with zero writes.
        if let Some(owner) = current.owner {
            return Err(Error::AlreadyClaimed {
                task: task_id,
                owner,
            });
        }
        validate_transition(current.status, Status::InProgress)?;

        let claimed = tx.assign_owner(task_id, claimant).await?;
        tx.commit().await?;
        Ok(claimed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NewTask;
    use crate::store::MemoryStore;

    async fn setup() -> (ClaimCoordinator, Arc<MemoryStore>, Task) {
        let store = Arc::new(MemoryStore::new());
        let task = Task::from_new(NewTask::new("Review pull request"), UserId::new());
        store.insert_task(&task).await.unwrap();
        let coordinator = ClaimCoordinator::new(store.clone());
        (coordinator, store, task)
    }

    #[tokio::test]
    async fn claim_sets_owner_and_status() {
        let (coordinator, store, task) = setup().await;
        let alice = UserId::new();

        let claimed = coordinator.claim(task.id, alice).await.unwrap();
        assert_eq!(claimed.owner, Some(alice));
        assert_eq!(claimed.status, Status::InProgress);

        let stored = store.get_task(task.id).await.unwrap();
        assert_eq!(stored, claimed);
    }

    #[tokio::test]
    async fn second_claim_reports_winner() {
        let (coordinator, _, task) = setup().await;
        let alice = UserId::new();
        coordinator.claim(task.id, alice).await.unwrap();

        let err = coordinator.claim(task.id, UserId::new()).await.unwrap_err();
        match err {
            Error::AlreadyClaimed { task: id, owner } => {
                assert_eq!(id, task.id);
                assert_eq!(owner, alice);
            }
            other => panic!("expected AlreadyClaimed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn same_claimant_retry_is_rejected_too() {
        let (coordinator, _, task) = setup().await;
        let alice = UserId::new();
        coordinator.claim(task.id, alice).await.unwrap();
        assert!(matches!(
            coordinator.claim(task.id, alice).await,
            Err(Error::AlreadyClaimed { .. })
        ));
    }

    #[test]
    fn validate_transition_rejects_backwards_moves() {
        assert!(validate_transition(Status::Unassigned, Status::InProgress).is_ok());
        assert!(matches!(
            validate_transition(Status::Done, Status::InProgress),
            Err(Error::InvalidTransition {
                from: Status::Done,
                to: Status::InProgress
            })
        ));
    }
}
