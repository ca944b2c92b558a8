// src/engine/tick.rs

//! Result type for a single scheduler tick.

use crate::job::JobId;

/// Structured result of one tick (running pass, waiting pass, ready pass).
///
/// This is useful for tests that want to manually step the registry and make
/// assertions about what changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Jobs handed to their execution during the ready pass.
    pub submitted: Vec<JobId>,
    /// Jobs whose execution finished successfully during the running pass.
    pub succeeded: Vec<JobId>,
    /// Jobs that became `FAILED` or `DEPENDENT_FAILED` during this tick.
    pub failed: Vec<JobId>,
}

impl TickReport {
    /// True if the tick changed no job's outcome and submitted nothing.
    pub fn is_quiet(&self) -> bool {
        self.submitted.is_empty() && self.succeeded.is_empty() && self.failed.is_empty()
    }
}
