//! # taskclaim
//!
//! Postgres-backed task tracker core.
//!
//! Tasks are created unassigned and claimed exclusively: under any number of
//! concurrent claimants exactly one becomes the owner, enforced by a row
//! lock in the store ([`claim::ClaimCoordinator`]). Around that sit task
//! CRUD ([`service::TaskService`]), API-token accounts ([`db`]), and
//! OpenTelemetry observability ([`telemetry`]).

pub mod claim;
pub mod config;
pub mod db;
pub mod error;
pub mod model;
pub mod service;
pub mod store;
pub mod telemetry;
