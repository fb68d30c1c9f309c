//! Error types for taskclaim.

use thiserror::Error;

use crate::model::{Status, TaskId, UserId};

/// SQLSTATE for `lock_not_available`, raised when `lock_timeout` expires.
const PG_LOCK_NOT_AVAILABLE: &str = "55P03";
/// SQLSTATE for `deadlock_detected`.
const PG_DEADLOCK_DETECTED: &str = "40P01";
/// SQLSTATE for `serialization_failure`.
const PG_SERIALIZATION_FAILURE: &str = "40001";

#[derive(Debug, Error)]
pub enum Error {
    #[error("not found: {0}")]
    NotFound(String),

    /// Someone else already owns the task. Expected under contention.
    #[error("task {task} is already claimed by {owner}")]
    AlreadyClaimed { task: TaskId, owner: UserId },

    #[error("invalid state transition: {from} -> {to}")]
    InvalidTransition { from: Status, to: Status },

    #[error("invalid input: {0}")]
    Validation(String),

    #[error("missing or unknown API token")]
    Unauthorized,

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("timed out waiting for the lock on task {0}")]
    LockTimeout(TaskId),

    #[error("transient storage failure: {0}")]
    Transient(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration failed: {0}")]
    Migration(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Classify a sqlx error raised while working on `task`.
    ///
    /// Lock timeouts, deadlocks, serialization failures and lost connections
    /// are transient; everything else stays a plain database error.
    pub fn from_sqlx(err: sqlx::Error, task: Option<TaskId>) -> Self {
        if let sqlx::Error::Database(ref db_err) = err {
            match db_err.code().as_deref() {
                Some(PG_LOCK_NOT_AVAILABLE) => {
                    return match task {
                        Some(id) => Error::LockTimeout(id),
                        None => Error::Transient(db_err.message().to_string()),
                    };
                }
                Some(PG_DEADLOCK_DETECTED) | Some(PG_SERIALIZATION_FAILURE) => {
                    return Error::Transient(db_err.message().to_string());
                }
                _ => {}
            }
        }
        match err {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                Error::Transient(err.to_string())
            }
            other => Error::Database(other),
        }
    }

    /// Retryable by the caller (with backoff). Never retried internally.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::LockTimeout(_) | Error::Transient(_))
    }

    /// Lost a race or hit a state conflict; a client outcome, not a fault.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            Error::AlreadyClaimed { .. } | Error::InvalidTransition { .. }
        )
    }

    /// HTTP status an entry layer should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            Error::Validation(_) => 400,
            Error::Unauthorized => 401,
            Error::Forbidden(_) => 403,
            Error::NotFound(_) => 404,
            Error::AlreadyClaimed { .. } | Error::InvalidTransition { .. } => 409,
            Error::LockTimeout(_) | Error::Transient(_) => 503,
            Error::Database(_) | Error::Migration(_) | Error::Config(_) | Error::Other(_) => 500,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
