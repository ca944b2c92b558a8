// src/exec/mod.rs

//! Execution layer: the adapter contract every job kind implements.
//!
//! The registry and scheduler loop never talk to a process or a filesystem
//! directly. They drive a job's [`ExecutionKind`] through three calls:
//!
//! - `submit`: start the work. `Ok` moves the job to `RUNNING`, `Err` moves it
//!   to `FAILED` with the error text as its message. Must not wait for the
//!   work to finish.
//! - `poll_completion`: only called while the job is `RUNNING`. Non-blocking;
//!   reports [`Completion::Running`], [`Completion::Succeeded`] or
//!   [`Completion::Failed`]. Failures of the *work* are reported through
//!   `Completion::Failed`; an `Err` means the adapter itself broke and is
//!   treated as fatal for the scheduler loop.
//! - `kill`: best-effort cancellation; a no-op is fine for kinds whose running
//!   phase is instantaneous.
//!
//! Kinds:
//! - [`command`]: external processes (the compute job kind), which can report
//!   counters consumed by value links.
//! - [`fs_action`]: filesystem rename / delete / copy, including "optional"
//!   variants that treat a missing path as success.
//! - `Custom`: any caller-provided [`JobAdapter`].

pub mod command;
pub mod fs_action;

use std::collections::BTreeMap;
use std::fmt::Debug;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;

use crate::fs::FileSystem;

pub use command::{CommandJob, CommandSpec};
pub use fs_action::{FsAction, FsOp};

/// A job's configuration: ordered string keys to string values.
///
/// Value links write resolved metrics into it right before submission;
/// command jobs export it as environment variables.
pub type JobConf = BTreeMap<String, String>;

/// Result of polling a running execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    Running,
    Succeeded,
    Failed(String),
}

/// The capability set every execution kind provides.
pub trait JobAdapter: Send + Debug {
    /// Begin execution. See the module docs for the state mapping.
    fn submit(&mut self, conf: &JobConf) -> Result<()>;

    /// Non-blocking completion check.
    fn poll_completion(&mut self) -> Result<Completion>;

    /// Best-effort cancellation of an in-flight execution.
    fn kill(&mut self) -> Result<()>;

    /// Value of a metric reported by this execution.
    ///
    /// Metrics behave like counters: one that was never reported reads as
    /// zero. Kinds that report nothing keep this default.
    fn metric(&self, _group: &str, _name: &str) -> Result<i64> {
        Ok(0)
    }

    /// One-line human readable description (used in job listings).
    fn describe(&self) -> String;
}

/// What a job actually does, as an exhaustively matchable variant.
#[derive(Debug)]
pub enum ExecutionKind {
    Command(CommandJob),
    Fs(FsAction),
    Custom(Box<dyn JobAdapter>),
}

impl ExecutionKind {
    /// Command job; missing `inputs` are created on `fs`.
    pub fn command(fs: Arc<dyn FileSystem>, spec: CommandSpec) -> Self {
        ExecutionKind::Command(CommandJob::new(spec, fs))
    }

    pub fn rename(fs: Arc<dyn FileSystem>, from: impl Into<PathBuf>, to: impl Into<PathBuf>) -> Self {
        let op = FsOp::Rename {
            from: from.into(),
            to: to.into(),
        };
        ExecutionKind::Fs(FsAction::new(fs, op, false))
    }

    /// Rename that succeeds when the source does not exist.
    pub fn optional_rename(
        fs: Arc<dyn FileSystem>,
        from: impl Into<PathBuf>,
        to: impl Into<PathBuf>,
    ) -> Self {
        let op = FsOp::Rename {
            from: from.into(),
            to: to.into(),
        };
        ExecutionKind::Fs(FsAction::new(fs, op, true))
    }

    pub fn delete(fs: Arc<dyn FileSystem>, path: impl Into<PathBuf>, recursive: bool) -> Self {
        let op = FsOp::Delete {
            path: path.into(),
            recursive,
        };
        ExecutionKind::Fs(FsAction::new(fs, op, false))
    }

    /// Delete that succeeds when the path does not exist.
    pub fn optional_delete(fs: Arc<dyn FileSystem>, path: impl Into<PathBuf>, recursive: bool) -> Self {
        let op = FsOp::Delete {
            path: path.into(),
            recursive,
        };
        ExecutionKind::Fs(FsAction::new(fs, op, true))
    }

    pub fn copy(fs: Arc<dyn FileSystem>, from: impl Into<PathBuf>, to: impl Into<PathBuf>) -> Self {
        let op = FsOp::Copy {
            from: from.into(),
            to: to.into(),
        };
        ExecutionKind::Fs(FsAction::new(fs, op, false))
    }

    pub fn custom(adapter: impl JobAdapter + 'static) -> Self {
        ExecutionKind::Custom(Box::new(adapter))
    }

    /// Static sanity checks run when a job is constructed.
    pub(crate) fn validate(&self) -> std::result::Result<(), String> {
        match self {
            ExecutionKind::Command(job) => job.spec().validate(),
            ExecutionKind::Fs(action) => action.op().validate(),
            ExecutionKind::Custom(_) => Ok(()),
        }
    }
}

impl JobAdapter for ExecutionKind {
    fn submit(&mut self, conf: &JobConf) -> Result<()> {
        match self {
            ExecutionKind::Command(job) => job.submit(conf),
            ExecutionKind::Fs(action) => action.submit(conf),
            ExecutionKind::Custom(adapter) => adapter.submit(conf),
        }
    }

    fn poll_completion(&mut self) -> Result<Completion> {
        match self {
            ExecutionKind::Command(job) => job.poll_completion(),
            ExecutionKind::Fs(action) => action.poll_completion(),
            ExecutionKind::Custom(adapter) => adapter.poll_completion(),
        }
    }

    fn kill(&mut self) -> Result<()> {
        match self {
            ExecutionKind::Command(job) => job.kill(),
            ExecutionKind::Fs(action) => action.kill(),
            ExecutionKind::Custom(adapter) => adapter.kill(),
        }
    }

    fn metric(&self, group: &str, name: &str) -> Result<i64> {
        match self {
            ExecutionKind::Command(job) => job.metric(group, name),
            ExecutionKind::Fs(action) => action.metric(group, name),
            ExecutionKind::Custom(adapter) => adapter.metric(group, name),
        }
    }

    fn describe(&self) -> String {
        match self {
            ExecutionKind::Command(job) => job.describe(),
            ExecutionKind::Fs(action) => action.describe(),
            ExecutionKind::Custom(adapter) => adapter.describe(),
        }
    }
}
