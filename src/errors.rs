// src/errors.rs

//! Crate-wide error aliases and helpers.

use std::sync::{Mutex, MutexGuard, PoisonError};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum JobctlError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid job: {0}")]
    InvalidJob(String),

    #[error("Job '{name}' is already registered as {id}")]
    AlreadyRegistered { name: String, id: String },

    #[error("Job control for group '{group}' cannot be started from state {state}")]
    AlreadyStarted { group: String, state: String },

    #[error("Cycle detected in job graph: {0}")]
    DagCycle(String),

    #[error("Scheduler tick aborted: {0}")]
    TickAborted(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, JobctlError>;

/// Lock a mutex, recovering the data if a previous holder panicked.
///
/// A panic inside a tick is already reported as a fatal scheduler error; the
/// guarded job and bucket data stay consistent because every critical section
/// writes whole values.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
