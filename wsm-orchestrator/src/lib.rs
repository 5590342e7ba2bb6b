//! Workspace clone orchestration
//!
//! This crate duplicates a workspace (folder hierarchy, cloud contexts,
//! policies and every cloneable resource) into a new destination workspace.
//! Each clone runs as a durable flight whose progress is journaled step by
//! step, so it survives crashes and tolerates per-resource failures.

pub mod clone;
pub mod config;
pub mod db;
pub mod error;
pub mod flight;
pub mod model;
pub mod services;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use clone::{register_clone_flights, WorkspaceCloneService};
pub use config::CloneConfig;
pub use db::SqliteJournal;
pub use error::{CollaboratorError, ExecutorError, OrchestratorError, Result, StepError};
pub use flight::{FlightRegistry, LocalFlightEngine, MemoryJournal, OperationExecutor};
