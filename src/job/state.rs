// src/job/state.rs

//! Lifecycle states of a single job.

use std::fmt;

/// State of a job.
///
/// ```text
/// WAITING ──► READY ──► RUNNING ──► SUCCESS
///    │          │          │
///    │          └──────────┴──────► FAILED
///    └────────────────────────────► DEPENDENT_FAILED
/// ```
///
/// `READY → FAILED` happens only when submission itself errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobState {
    /// Registered, waiting for its dependencies.
    Waiting,
    /// All dependencies succeeded; will be submitted on the next ready pass.
    Ready,
    /// Submitted to its execution backend.
    Running,
    Success,
    Failed,
    /// A dependency failed (directly or transitively); this job never ran.
    DependentFailed,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobState::Success | JobState::Failed | JobState::DependentFailed
        )
    }

    /// True for the two failure outcomes.
    pub fn is_failure(self) -> bool {
        matches!(self, JobState::Failed | JobState::DependentFailed)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobState::Waiting => "WAITING",
            JobState::Ready => "READY",
            JobState::Running => "RUNNING",
            JobState::Success => "SUCCESS",
            JobState::Failed => "FAILED",
            JobState::DependentFailed => "DEPENDENT_FAILED",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states() {
        assert!(!JobState::Waiting.is_terminal());
        assert!(!JobState::Ready.is_terminal());
        assert!(!JobState::Running.is_terminal());
        assert!(JobState::Success.is_terminal());
        assert!(JobState::Failed.is_terminal());
        assert!(JobState::DependentFailed.is_terminal());
        assert!(!JobState::Success.is_failure());
    }

    #[test]
    fn display_uses_upper_snake_case() {
        assert_eq!(JobState::DependentFailed.to_string(), "DEPENDENT_FAILED");
        assert_eq!(JobState::Waiting.to_string(), "WAITING");
    }
}
