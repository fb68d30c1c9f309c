//! Task operations for an entry layer.
//!
//! The caller passes an already authenticated user id. This module applies
//! the per-task permission rules (creator or owner may edit, only the
//! creator may delete) and delegates claims to [`ClaimCoordinator`].

use std::sync::Arc;

use opentelemetry::KeyValue;
use tracing::info;

use crate::claim::ClaimCoordinator;
use crate::error::{Error, Result};
use crate::model::{NewTask, Task, TaskBoard, TaskFilter, TaskId, TaskPatch, UserId};
use crate::store::TaskStore;
use crate::telemetry::metrics;

/// Task operations over a shared store.
#[derive(Clone)]
pub struct TaskService {
    store: Arc<dyn TaskStore>,
    claims: ClaimCoordinator,
}

impl TaskService {
    pub fn new(store: Arc<dyn TaskStore>) -> Self {
        let claims = ClaimCoordinator::new(Arc::clone(&store));
        Self { store, claims }
    }

    /// Create an unassigned task owned by nobody.
    pub async fn create_task(&self, creator: UserId, new: NewTask) -> Result<Task> {
        let task = Task::from_new(new.validated()?, creator);
        self.store.insert_task(&task).await?;

        metrics::tasks_created().add(1, &[]);
        info!(task = %task.id, creator = %creator, "task created");
        Ok(task)
    }

    pub async fn get_task(&self, id: TaskId) -> Result<Task> {
        self.store.get_task(id).await
    }

    pub async fn list_tasks(&self, filter: &TaskFilter) -> Result<Vec<Task>> {
        self.store.list_tasks(filter).await
    }

    pub async fn board(&self) -> Result<TaskBoard> {
        self.store.board().await
    }

    /// Edit title and/or description. `actor` must be the creator or owner.
    pub async fn update_task(&self, actor: UserId, id: TaskId, patch: TaskPatch) -> Result<Task> {
        let patch = patch.validated()?;
        let task = self.store.get_task(id).await?;
        if !task.is_creator_or_owner(actor) {
            return Err(Error::Forbidden(format!(
                "only the creator or owner may edit task {id}"
            )));
        }

        let updated = self.store.update_details(id, &patch).await?;
        metrics::task_mutations().add(1, &[KeyValue::new("operation", "update")]);
        info!(task = %id, actor = %actor, "task updated");
        Ok(updated)
    }

    /// Delete a task. `actor` must be the creator.
    pub async fn delete_task(&self, actor: UserId, id: TaskId) -> Result<()> {
        let task = self.store.get_task(id).await?;
        if task.creator != actor {
            return Err(Error::Forbidden(format!(
                "only the creator may delete task {id}"
            )));
        }

        self.store.delete_task(id).await?;
        metrics::task_mutations().add(1, &[KeyValue::new("operation", "delete")]);
        info!(task = %id, actor = %actor, "task deleted");
        Ok(())
    }

    /// Claim an unassigned task for `claimant`.
    pub async fn claim_task(&self, claimant: UserId, id: TaskId) -> Result<Task> {
        self.claims.claim(id, claimant).await
    }
}
