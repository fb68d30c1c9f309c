//! In-memory implementation of [`TaskStore`].
//!
//! Each row keeps its committed task apart from its row lock. A
//! `tokio::sync::Mutex<()>` plays the part of the row lock and only
//! transactions and writers take it. Plain reads go to the committed copy
//! and never wait on a lock holder, as with MVCC reads in Postgres. The
//! outer map lock is only held long enough to look up or insert a row
//! handle, never across an await, so claims on different tasks never wait
//! on each other.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::{TaskStore, TaskTx};
use crate::error::{Error, Result};
use crate::model::{Status, Task, TaskBoard, TaskFilter, TaskId, TaskPatch, UserId};

type Rows = Arc<RwLock<HashMap<TaskId, Arc<Row>>>>;

struct Row {
    lock: Arc<Mutex<()>>,
    committed: RwLock<Task>,
}

impl Row {
    fn new(task: Task) -> Self {
        Self {
            lock: Arc::new(Mutex::new(())),
            committed: RwLock::new(task),
        }
    }

    fn read(&self) -> Result<Task> {
        self.committed
            .read()
            .map(|task| task.clone())
            .map_err(|e| Error::Other(format!("lock error: {e}")))
    }
}

/// A held row lock. Writes through it replace the committed task.
struct RowGuard {
    row: Arc<Row>,
    _lock: OwnedMutexGuard<()>,
}

impl RowGuard {
    fn read(&self) -> Result<Task> {
        self.row.read()
    }

    fn write(&self, task: Task) -> Result<()> {
        let mut committed = self
            .row
            .committed
            .write()
            .map_err(|e| Error::Other(format!("lock error: {e}")))?;
        *committed = task;
        Ok(())
    }
}

/// Thread-safe in-memory task store for tests and local runs.
#[derive(Clone)]
pub struct MemoryStore {
    rows: Rows,
    lock_timeout: Duration,
}

impl MemoryStore {
    /// Create an empty store with a 5 second lock timeout.
    pub fn new() -> Self {
        Self::with_lock_timeout(Duration::from_secs(5))
    }

    pub fn with_lock_timeout(lock_timeout: Duration) -> Self {
        Self {
            rows: Arc::new(RwLock::new(HashMap::new())),
            lock_timeout,
        }
    }

    fn row(&self, id: TaskId) -> Result<Option<Arc<Row>>> {
        row_handle(&self.rows, id)
    }

    /// Lock a row or give up after the timeout.
    async fn lock_row(&self, id: TaskId) -> Result<Option<RowGuard>> {
        lock_row(&self.rows, id, self.lock_timeout).await
    }

    fn snapshot(&self) -> Result<Vec<Task>> {
        let rows = self
            .rows
            .read()
            .map_err(|e| Error::Other(format!("lock error: {e}")))?;
        rows.values().map(|row| row.read()).collect()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn row_handle(rows: &Rows, id: TaskId) -> Result<Option<Arc<Row>>> {
    let rows = rows
        .read()
        .map_err(|e| Error::Other(format!("lock error: {e}")))?;
    Ok(rows.get(&id).cloned())
}

async fn lock_row(rows: &Rows, id: TaskId, lock_timeout: Duration) -> Result<Option<RowGuard>> {
    let Some(row) = row_handle(rows, id)? else {
        return Ok(None);
    };
    let lock = tokio::time::timeout(lock_timeout, Arc::clone(&row.lock).lock_owned())
        .await
        .map_err(|_| Error::LockTimeout(id))?;

    // Deleted while we waited: the handle is orphaned.
    if row_handle(rows, id)?.is_none() {
        return Ok(None);
    }
    Ok(Some(RowGuard { row, _lock: lock }))
}

#[async_trait]
impl TaskStore for MemoryStore {
    async fn insert_task(&self, task: &Task) -> Result<()> {
        task.check_invariants()?;
        let mut rows = self
            .rows
            .write()
            .map_err(|e| Error::Other(format!("lock error: {e}")))?;
        if rows.contains_key(&task.id) {
            return Err(Error::Validation(format!("task {} already exists", task.id)));
        }
        rows.insert(task.id, Arc::new(Row::new(task.clone())));
        Ok(())
    }

    async fn get_task(&self, id: TaskId) -> Result<Task> {
        self.row(id)?
            .ok_or_else(|| Error::NotFound(format!("task {id}")))?
            .read()
    }

    async fn list_tasks(&self, filter: &TaskFilter) -> Result<Vec<Task>> {
        let mut tasks: Vec<Task> = self
            .snapshot()?
            .into_iter()
            .filter(|task| filter.matches(task))
            .collect();
        tasks.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        tasks.truncate(filter.effective_limit() as usize);
        Ok(tasks)
    }

    async fn board(&self) -> Result<TaskBoard> {
        let mut board = TaskBoard::default();
        for task in self.snapshot()? {
            board.add(task.status, 1);
        }
        Ok(board)
    }

    async fn update_details(&self, id: TaskId, patch: &TaskPatch) -> Result<Task> {
        let guard = self
            .lock_row(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("task {id}")))?;
        let mut task = guard.read()?;
        patch.apply(&mut task);
        guard.write(task.clone())?;
        Ok(task)
    }

    async fn delete_task(&self, id: TaskId) -> Result<()> {
        let guard = self
            .lock_row(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("task {id}")))?;
        let mut rows = self
            .rows
            .write()
            .map_err(|e| Error::Other(format!("lock error: {e}")))?;
        rows.remove(&id);
        drop(guard);
        Ok(())
    }

    async fn begin(&self) -> Result<Box<dyn TaskTx>> {
        Ok(Box::new(MemoryTx {
            rows: Arc::clone(&self.rows),
            lock_timeout: self.lock_timeout,
            locked: HashMap::new(),
            staged: HashMap::new(),
        }))
    }
}

/// Transaction over [`MemoryStore`]: holds row guards and staged writes.
struct MemoryTx {
    rows: Rows,
    lock_timeout: Duration,
    locked: HashMap<TaskId, RowGuard>,
    staged: HashMap<TaskId, Task>,
}

#[async_trait]
impl TaskTx for MemoryTx {
    async fn lock_task(&mut self, id: TaskId) -> Result<Option<Task>> {
        if let Some(staged) = self.staged.get(&id) {
            return Ok(Some(staged.clone()));
        }
        if let Some(guard) = self.locked.get(&id) {
            return guard.read().map(Some);
        }
        let Some(guard) = lock_row(&self.rows, id, self.lock_timeout).await? else {
            return Ok(None);
        };
        let task = guard.read()?;
        self.locked.insert(id, guard);
        Ok(Some(task))
    }

    async fn assign_owner(&mut self, id: TaskId, owner: UserId) -> Result<Task> {
        let current = match self.staged.get(&id) {
            Some(staged) => staged.clone(),
            None => self
                .locked
                .get(&id)
                .ok_or_else(|| Error::Other(format!("task {id} is not locked by this transaction")))?
                .read()?,
        };

        let mut updated = current;
        updated.owner = Some(owner);
        updated.status = Status::InProgress;
        updated.updated_at = Utc::now();
        updated.check_invariants()?;

        self.staged.insert(id, updated.clone());
        Ok(updated)
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let MemoryTx { locked, staged, .. } = *self;
        for (id, task) in staged {
            if let Some(guard) = locked.get(&id) {
                guard.write(task)?;
            }
        }
        // Guards drop here, releasing the row locks.
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NewTask;

    fn task() -> Task {
        Task::from_new(NewTask::new("Index the archive"), UserId::new())
    }

    #[tokio::test]
    async fn dropped_transaction_discards_staged_write() {
        let store = MemoryStore::new();
        let t = task();
        store.insert_task(&t).await.unwrap();

        {
            let mut tx = store.begin().await.unwrap();
            tx.lock_task(t.id).await.unwrap().unwrap();
            tx.assign_owner(t.id, UserId::new()).await.unwrap();
            // dropped without commit
        }

        let after = store.get_task(t.id).await.unwrap();
        assert_eq!(after, t);
    }

    #[tokio::test]
    async fn committed_write_is_visible() {
        let store = MemoryStore::new();
        let t = task();
        store.insert_task(&t).await.unwrap();
        let owner = UserId::new();

        let mut tx = store.begin().await.unwrap();
        tx.lock_task(t.id).await.unwrap().unwrap();
        tx.assign_owner(t.id, owner).await.unwrap();
        tx.commit().await.unwrap();

        let after = store.get_task(t.id).await.unwrap();
        assert_eq!(after.owner, Some(owner));
        assert_eq!(after.status, Status::InProgress);
    }

    #[tokio::test]
    async fn assign_without_lock_is_refused() {
        let store = MemoryStore::new();
        let t = task();
        store.insert_task(&t).await.unwrap();

        let mut tx = store.begin().await.unwrap();
        assert!(tx.assign_owner(t.id, UserId::new()).await.is_err());
    }

    #[tokio::test]
    async fn lock_on_missing_task_returns_none() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        assert!(tx.lock_task(TaskId::new()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn held_lock_times_out_second_locker() {
        let store = MemoryStore::with_lock_timeout(Duration::from_millis(50));
        let t = task();
        store.insert_task(&t).await.unwrap();

        let mut holder = store.begin().await.unwrap();
        holder.lock_task(t.id).await.unwrap();

        let mut waiter = store.begin().await.unwrap();
        let err = waiter.lock_task(t.id).await.unwrap_err();
        assert!(matches!(err, Error::LockTimeout(id) if id == t.id));
    }

    #[tokio::test]
    async fn reads_see_committed_state_while_row_is_locked() {
        let store = MemoryStore::with_lock_timeout(Duration::from_millis(50));
        let t = task();
        store.insert_task(&t).await.unwrap();
        let owner = UserId::new();

        let mut holder = store.begin().await.unwrap();
        holder.lock_task(t.id).await.unwrap().unwrap();
        holder.assign_owner(t.id, owner).await.unwrap();

        let limit = Duration::from_millis(500);
        let seen = tokio::time::timeout(limit, store.get_task(t.id))
            .await
            .expect("get_task waited on the row lock")
            .unwrap();
        assert_eq!(seen, t, "staged write must not be visible before commit");

        let listed = tokio::time::timeout(limit, store.list_tasks(&TaskFilter::default()))
            .await
            .expect("list_tasks waited on the row lock")
            .unwrap();
        assert_eq!(listed, vec![t.clone()]);

        let board = tokio::time::timeout(limit, store.board())
            .await
            .expect("board waited on the row lock")
            .unwrap();
        assert_eq!(board.unassigned, 1);

        holder.commit().await.unwrap();
        let after = store.get_task(t.id).await.unwrap();
        assert_eq!(after.owner, Some(owner));
        assert_eq!(store.board().await.unwrap().in_progress, 1);
    }

    #[tokio::test]
    async fn update_waits_for_row_lock_and_keeps_claim() {
        let store = MemoryStore::with_lock_timeout(Duration::from_millis(50));
        let t = task();
        store.insert_task(&t).await.unwrap();
        let owner = UserId::new();

        let mut holder = store.begin().await.unwrap();
        holder.lock_task(t.id).await.unwrap().unwrap();
        holder.assign_owner(t.id, owner).await.unwrap();

        let patch = TaskPatch {
            title: Some("Reindex the archive".into()),
            description: None,
        };
        let err = store.update_details(t.id, &patch).await.unwrap_err();
        assert!(matches!(err, Error::LockTimeout(id) if id == t.id));
        let err = store.delete_task(t.id).await.unwrap_err();
        assert!(matches!(err, Error::LockTimeout(id) if id == t.id));

        holder.commit().await.unwrap();
        let edited = store.update_details(t.id, &patch).await.unwrap();
        assert_eq!(edited.title, "Reindex the archive");
        assert_eq!(edited.owner, Some(owner));
        assert_eq!(edited.status, Status::InProgress);
    }

    #[tokio::test]
    async fn duplicate_insert_is_rejected() {
        let store = MemoryStore::new();
        let t = task();
        store.insert_task(&t).await.unwrap();
        assert!(store.insert_task(&t).await.is_err());
    }

    #[tokio::test]
    async fn delete_removes_row() {
        let store = MemoryStore::new();
        let t = task();
        store.insert_task(&t).await.unwrap();
        store.delete_task(t.id).await.unwrap();
        assert!(matches!(
            store.get_task(t.id).await,
            Err(Error::NotFound(_))
        ));
        assert!(matches!(
            store.delete_task(t.id).await,
            Err(Error::NotFound(_))
        ));
    }
}
