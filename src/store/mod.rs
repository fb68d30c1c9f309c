//! Persistence seam for tasks.
//!
//! Two backends implement it: [`crate::db::Db`] (Postgres, `SELECT ... FOR
//! UPDATE`) and [`memory::MemoryStore`] (per-row async mutexes). Both give
//! the same guarantee: a row lock taken through [`TaskTx::lock_task`] is
//! scoped to that one task and held until the transaction commits or is
//! dropped.

pub mod memory;

use async_trait::async_trait;

use crate::error::Result;
use crate::model::{Task, TaskBoard, TaskFilter, TaskId, TaskPatch, UserId};

pub use memory::MemoryStore;

/// Durable storage of tasks.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Insert a new task. The id must not exist yet.
    async fn insert_task(&self, task: &Task) -> Result<()>;

    /// Get a task by ID.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFound` if no task has this id.
    async fn get_task(&self, id: TaskId) -> Result<Task>;

    /// List tasks matching `filter`, oldest first.
    async fn list_tasks(&self, filter: &TaskFilter) -> Result<Vec<Task>>;

    /// Count tasks per status.
    async fn board(&self) -> Result<TaskBoard>;

    /// Apply a validated patch to title/description under the row lock.
    async fn update_details(&self, id: TaskId, patch: &TaskPatch) -> Result<Task>;

    /// Delete a task under the row lock.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFound` if no task has this id.
    async fn delete_task(&self, id: TaskId) -> Result<()>;

    /// Open a transaction.
    async fn begin(&self) -> Result<Box<dyn TaskTx>>;
}

/// An open transaction. Dropping it without [`TaskTx::commit`] rolls back
/// every staged write and releases every lock it holds.
#[async_trait]
pub trait TaskTx: Send {
    /// Lock the task's row for the rest of the transaction and return its
    /// current state, or `None` if it does not exist.
    ///
    /// Blocks while another transaction holds the same row. The read happens
    /// after the lock is granted, so it always observes the previous holder's
    /// committed write.
    ///
    /// # Errors
    ///
    /// Returns `Error::LockTimeout` if the lock is not granted in time.
    async fn lock_task(&mut self, id: TaskId) -> Result<Option<Task>>;

    /// Set `owner` and move the task to `InProgress`. The row must already be
    /// locked by this transaction.
    async fn assign_owner(&mut self, id: TaskId, owner: UserId) -> Result<Task>;

    /// Make staged writes durable and release locks.
    async fn commit(self: Box<Self>) -> Result<()>;
}
