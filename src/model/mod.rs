//! Core data model.
//!
//! A task is something that needs doing. It has a creator, an optional
//! owner (whoever claimed it), and a lifecycle status.

pub mod account;
pub mod task;

pub use account::{ApiToken, User, UserId};
pub use task::{NewTask, Status, Task, TaskBoard, TaskFilter, TaskId, TaskPatch};
