//! Task rows in Postgres: the [`TaskStore`] implementation.
//!
//! Claims serialize on `SELECT ... FOR UPDATE`, which locks exactly one row.
//! Every locking transaction sets a local `lock_timeout` so a stuck holder
//! surfaces as `Error::LockTimeout` instead of an unbounded wait.

use async_trait::async_trait;
use sqlx::{Postgres, Transaction};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::model::{Status, Task, TaskBoard, TaskFilter, TaskId, TaskPatch, UserId};
use crate::store::{TaskStore, TaskTx};

const PG_UNIQUE_VIOLATION: &str = "23505";
const PG_FOREIGN_KEY_VIOLATION: &str = "23503";

impl super::Db {
    /// Begin a transaction whose lock waits are bounded by the configured timeout.
    async fn begin_bounded(&self) -> Result<Transaction<'static, Postgres>> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| Error::from_sqlx(e, None))?;
        sqlx::query("SELECT set_config('lock_timeout', $1, true)")
            // 0 would mean no timeout at all.
            .bind(format!("{}ms", self.lock_timeout.as_millis().max(1)))
            .execute(&mut *tx)
            .await
            .map_err(|e| Error::from_sqlx(e, None))?;
        Ok(tx)
    }

    /// Ids of tasks whose id starts with `prefix`, lowest first, at most `limit`.
    pub async fn task_ids_with_prefix(&self, prefix: &str, limit: i64) -> Result<Vec<TaskId>> {
        let prefix = id_prefix(prefix)?;
        let ids: Vec<(Uuid,)> = sqlx::query_as(
            "SELECT id FROM tasks WHERE id::text LIKE $1 || '%' ORDER BY id LIMIT $2",
        )
        .bind(prefix)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Error::from_sqlx(e, None))?;

        Ok(ids.into_iter().map(|(id,)| TaskId(id)).collect())
    }
}

/// Normalize a task id prefix to the lowercase form `id::text` produces.
/// Only hex digits and dashes are accepted, which also keeps `LIKE`
/// wildcards out of the pattern.
fn id_prefix(prefix: &str) -> Result<String> {
    let prefix = prefix.trim().to_ascii_lowercase();
    if prefix.is_empty() || !prefix.chars().all(|c| c.is_ascii_hexdigit() || c == '-') {
        return Err(Error::Validation(format!(
            "invalid task id prefix '{prefix}'"
        )));
    }
    Ok(prefix)
}

#[async_trait]
impl TaskStore for super::Db {
    async fn insert_task(&self, task: &Task) -> Result<()> {
        task.check_invariants()?;
        sqlx::query(
            "INSERT INTO tasks (id, title, description, status, owner_id, creator_id, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(task.id.0)
        .bind(&task.title)
        .bind(&task.description)
        .bind(task.status.as_str())
        .bind(task.owner.map(|o| o.0))
        .bind(task.creator.0)
        .bind(task.created_at)
        .bind(task.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match constraint_code(&e).as_deref() {
            Some(PG_UNIQUE_VIOLATION) => {
                Error::Validation(format!("task {} already exists", task.id))
            }
            Some(PG_FOREIGN_KEY_VIOLATION) => {
                Error::Validation(format!("unknown creator {}", task.creator))
            }
            _ => Error::from_sqlx(e, Some(task.id)),
        })?;
        Ok(())
    }

    async fn get_task(&self, id: TaskId) -> Result<Task> {
        let row: Option<TaskRow> = sqlx::query_as(
            "SELECT id, title, description, status, owner_id, creator_id, created_at, updated_at
             FROM tasks WHERE id = $1",
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| Error::from_sqlx(e, Some(id)))?;

        row.ok_or_else(|| Error::NotFound(format!("task {id}")))?
            .try_into_task()
    }

    async fn list_tasks(&self, filter: &TaskFilter) -> Result<Vec<Task>> {
        let rows: Vec<TaskRow> = sqlx::query_as(
            "SELECT id, title, description, status, owner_id, creator_id, created_at, updated_at
             FROM tasks
             WHERE ($1::text IS NULL OR status = $1)
               AND ($2::uuid IS NULL OR owner_id = $2)
               AND ($3::date IS NULL OR (created_at AT TIME ZONE 'UTC')::date = $3)
             ORDER BY created_at ASC, id ASC
             LIMIT $4",
        )
        .bind(filter.status.map(Status::as_str))
        .bind(filter.owner.map(|o| o.0))
        .bind(filter.created_on)
        .bind(filter.effective_limit())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Error::from_sqlx(e, None))?;

        rows.into_iter().map(TaskRow::try_into_task).collect()
    }

    async fn board(&self) -> Result<TaskBoard> {
        let counts: Vec<(String, i64)> =
            sqlx::query_as("SELECT status, COUNT(*) FROM tasks GROUP BY status")
                .fetch_all(&self.pool)
                .await
                .map_err(|e| Error::from_sqlx(e, None))?;

        let mut board = TaskBoard::default();
        for (status, n) in counts {
            board.add(status.parse()?, n as u64);
        }
        Ok(board)
    }

    async fn update_details(&self, id: TaskId, patch: &TaskPatch) -> Result<Task> {
        let mut tx = self.begin_bounded().await?;
        let row: Option<TaskRow> = sqlx::query_as(
            "UPDATE tasks
             SET title = COALESCE($1, title), description = COALESCE($2, description), updated_at = now()
             WHERE id = $3
             RETURNING id, title, description, status, owner_id, creator_id, created_at, updated_at",
        )
        .bind(patch.title.as_deref())
        .bind(patch.description.as_deref())
        .bind(id.0)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| Error::from_sqlx(e, Some(id)))?;

        let task = row
            .ok_or_else(|| Error::NotFound(format!("task {id}")))?
            .try_into_task()?;
        tx.commit().await.map_err(|e| Error::from_sqlx(e, Some(id)))?;
        Ok(task)
    }

    async fn delete_task(&self, id: TaskId) -> Result<()> {
        let mut tx = self.begin_bounded().await?;
        let rows_affected = sqlx::query("DELETE FROM tasks WHERE id = $1")
            .bind(id.0)
            .execute(&mut *tx)
            .await
            .map_err(|e| Error::from_sqlx(e, Some(id)))?
            .rows_affected();

        if rows_affected == 0 {
            return Err(Error::NotFound(format!("task {id}")));
        }
        tx.commit().await.map_err(|e| Error::from_sqlx(e, Some(id)))?;
        Ok(())
    }

    async fn begin(&self) -> Result<Box<dyn TaskTx>> {
        let tx = self.begin_bounded().await?;
        Ok(Box::new(PgTaskTx { tx }))
    }
}

/// A Postgres transaction. sqlx rolls it back when dropped uncommitted.
struct PgTaskTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl TaskTx for PgTaskTx {
    async fn lock_task(&mut self, id: TaskId) -> Result<Option<Task>> {
        let row: Option<TaskRow> = sqlx::query_as(
            "SELECT id, title, description, status, owner_id, creator_id, created_at, updated_at
             FROM tasks WHERE id = $1
             FOR UPDATE",
        )
        .bind(id.0)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| Error::from_sqlx(e, Some(id)))?;

        row.map(TaskRow::try_into_task).transpose()
    }

    async fn assign_owner(&mut self, id: TaskId, owner: UserId) -> Result<Task> {
        let row: TaskRow = sqlx::query_as(
            "UPDATE tasks SET owner_id = $1, status = 'in_progress', updated_at = now()
             WHERE id = $2
             RETURNING id, title, description, status, owner_id, creator_id, created_at, updated_at",
        )
        .bind(owner.0)
        .bind(id.0)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| match constraint_code(&e).as_deref() {
            Some(PG_FOREIGN_KEY_VIOLATION) => Error::Validation(format!("unknown user {owner}")),
            _ => Error::from_sqlx(e, Some(id)),
        })?;

        row.try_into_task()
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx
            .commit()
            .await
            .map_err(|e| Error::from_sqlx(e, None))
    }
}

fn constraint_code(err: &sqlx::Error) -> Option<String> {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().map(|c| c.into_owned()),
        _ => None,
    }
}

/// Internal row type for sqlx::FromRow.
#[derive(sqlx::FromRow)]
struct TaskRow {
    id: Uuid,
    title: String,
    description: String,
    status: String,
    owner_id: Option<Uuid>,
    creator_id: Uuid,
    created_at: chrono::DateTime<chrono::Utc>,
    updated_at: chrono::DateTime<chrono::Utc>,
}

impl TaskRow {
    fn try_into_task(self) -> Result<Task> {
        let task = Task {
            id: TaskId(self.id),
            title: self.title,
            description: self.description,
            status: self.status.parse()?,
            owner: self.owner_id.map(UserId),
            creator: UserId(self.creator_id),
            created_at: self.created_at,
            updated_at: self.updated_at,
        };
        task.check_invariants()?;
        Ok(task)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_prefix_is_lowercased() {
        assert_eq!(id_prefix(" 3F2A-9 ").unwrap(), "3f2a-9");
    }

    #[test]
    fn id_prefix_rejects_wildcards_and_blanks() {
        for bad in ["", "  ", "3f%", "ab_c", "xyz"] {
            assert!(
                matches!(id_prefix(bad), Err(Error::Validation(_))),
                "{bad:?} accepted"
            );
        }
    }
}
