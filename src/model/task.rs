//! Tasks and their lifecycle.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::account::UserId;
use crate::error::{Error, Result};

/// Longest title accepted on create or edit, in characters.
pub const MAX_TITLE_CHARS: usize = 200;

// ---------------------------------------------------------------------------
// Task
// ---------------------------------------------------------------------------

/// A claimable unit of work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Unique identifier. Never reused.
    pub id: TaskId,

    pub title: String,
    pub description: String,

    /// Current lifecycle state.
    pub status: Status,

    /// Whoever claimed the task. `None` exactly while `status` is `Unassigned`.
    pub owner: Option<UserId>,

    /// Whoever created the task. Set once, never changes.
    pub creator: UserId,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// Build a fresh, unassigned task from a validated request.
    pub(crate) fn from_new(new: NewTask, creator: UserId) -> Self {
        let now = Utc::now();
        Self {
            id: TaskId::new(),
            title: new.title,
            description: new.description,
            status: Status::Unassigned,
            owner: None,
            creator,
            created_at: now,
            updated_at: now,
        }
    }

    /// Check the owner/status pairing.
    pub fn check_invariants(&self) -> Result<()> {
        if self.owner.is_some() == self.status.is_claimed() {
            Ok(())
        } else {
            Err(Error::Other(format!(
                "task {} has status {} but owner {:?}",
                self.id, self.status, self.owner
            )))
        }
    }

    /// True if `user` created or owns this task.
    pub fn is_creator_or_owner(&self, user: UserId) -> bool {
        self.creator == user || self.owner == Some(user)
    }
}

/// Newtype for task IDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskId(pub Uuid);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for TaskId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Uuid::parse_str(s)
            .map(TaskId)
            .map_err(|e| Error::Validation(format!("invalid task id '{s}': {e}")))
    }
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Lifecycle state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// Nobody owns it yet. Initial state.
    Unassigned,
    /// Claimed and being worked on.
    InProgress,
    Done,
    Archived,
}

impl Status {
    pub const ALL: [Status; 4] = [
        Status::Unassigned,
        Status::InProgress,
        Status::Done,
        Status::Archived,
    ];

    /// Can transition from self to `to`?
    ///
    /// Only the claim transition is driven from here; completing and
    /// archiving belong to other flows.
    pub fn can_transition_to(self, to: Status) -> bool {
        matches!((self, to), (Status::Unassigned, Status::InProgress))
    }

    /// Every state past `Unassigned` carries an owner.
    pub fn is_claimed(self) -> bool {
        !matches!(self, Status::Unassigned)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Status::Unassigned => "unassigned",
            Status::InProgress => "in_progress",
            Status::Done => "done",
            Status::Archived => "archived",
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

impl std::str::FromStr for Status {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "unassigned" => Ok(Status::Unassigned),
            "in_progress" => Ok(Status::InProgress),
            "done" => Ok(Status::Done),
            "archived" => Ok(Status::Archived),
            _ => Err(Error::Validation(format!("unknown status: {s}"))),
        }
    }
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// Builder for creating new tasks.
#[derive(Debug, Clone)]
pub struct NewTask {
    pub(crate) title: String,
    pub(crate) description: String,
}

impl NewTask {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: String::new(),
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Trim and check the title.
    pub(crate) fn validated(mut self) -> Result<Self> {
        self.title = validate_title(&self.title)?;
        Ok(self)
    }
}

/// Edit to a task's free-form text. Ownership and status are not editable here.
#[derive(Debug, Clone, Default)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub description: Option<String>,
}

impl TaskPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.description.is_none()
    }

    pub(crate) fn validated(mut self) -> Result<Self> {
        if self.is_empty() {
            return Err(Error::Validation("nothing to update".to_string()));
        }
        if let Some(ref title) = self.title {
            self.title = Some(validate_title(title)?);
        }
        Ok(self)
    }

    /// Apply to a task in place, bumping `updated_at`.
    pub(crate) fn apply(&self, task: &mut Task) {
        if let Some(ref title) = self.title {
            task.title = title.clone();
        }
        if let Some(ref description) = self.description {
            task.description = description.clone();
        }
        task.updated_at = Utc::now();
    }
}

fn validate_title(title: &str) -> Result<String> {
    let title = title.trim();
    if title.is_empty() {
        return Err(Error::Validation("title must not be empty".to_string()));
    }
    if title.chars().count() > MAX_TITLE_CHARS {
        return Err(Error::Validation(format!(
            "title must be at most {MAX_TITLE_CHARS} characters"
        )));
    }
    Ok(title.to_string())
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

/// Filter for listing tasks. All set fields must match.
#[derive(Debug, Clone)]
pub struct TaskFilter {
    pub status: Option<Status>,
    pub owner: Option<UserId>,
    /// UTC calendar date of `created_at`.
    pub created_on: Option<NaiveDate>,
    pub limit: i64,
}

impl Default for TaskFilter {
    fn default() -> Self {
        Self {
            status: None,
            owner: None,
            created_on: None,
            limit: 50,
        }
    }
}

impl TaskFilter {
    pub fn status(mut self, status: Status) -> Self {
        self.status = Some(status);
        self
    }

    pub fn owner(mut self, owner: UserId) -> Self {
        self.owner = Some(owner);
        self
    }

    pub fn created_on(mut self, date: NaiveDate) -> Self {
        self.created_on = Some(date);
        self
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = limit;
        self
    }

    /// Limit clamped to 1..=500.
    pub fn effective_limit(&self) -> i64 {
        self.limit.clamp(1, 500)
    }

    pub fn matches(&self, task: &Task) -> bool {
        self.status.is_none_or(|s| task.status == s)
            && self.owner.is_none_or(|o| task.owner == Some(o))
            && self
                .created_on
                .is_none_or(|d| task.created_at.date_naive() == d)
    }
}

/// Number of tasks in each status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskBoard {
    pub unassigned: u64,
    pub in_progress: u64,
    pub done: u64,
    pub archived: u64,
}

impl TaskBoard {
    pub fn add(&mut self, status: Status, n: u64) {
        match status {
            Status::Unassigned => self.unassigned += n,
            Status::InProgress => self.in_progress += n,
            Status::Done => self.done += n,
            Status::Archived => self.archived += n,
        }
    }

    pub fn get(&self, status: Status) -> u64 {
        match status {
            Status::Unassigned => self.unassigned,
            Status::InProgress => self.in_progress,
            Status::Done => self.done,
            Status::Archived => self.archived,
        }
    }

    pub fn total(&self) -> u64 {
        self.unassigned + self.in_progress + self.done + self.archived
    }
}
