// src/exec/fs_action.rs

//! Filesystem job kinds: rename, delete and copy.
//!
//! These have no real running phase. Submission only flips the job to
//! `RUNNING`; the operation itself runs synchronously the first time the
//! scheduler polls the job, which resolves it to `SUCCESS` or `FAILED` in
//! that same poll.

use std::fmt;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::exec::{Completion, JobAdapter, JobConf};
use crate::fs::FileSystem;

/// The filesystem operation a job performs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FsOp {
    Rename { from: PathBuf, to: PathBuf },
    Delete { path: PathBuf, recursive: bool },
    Copy { from: PathBuf, to: PathBuf },
}

impl FsOp {
    pub(crate) fn validate(&self) -> std::result::Result<(), String> {
        match self {
            FsOp::Rename { from, to } | FsOp::Copy { from, to } => {
                if from.as_os_str().is_empty() || to.as_os_str().is_empty() {
                    return Err(format!("{self}: paths must not be empty"));
                }
                if from == to {
                    return Err(format!("{self}: source and destination are the same"));
                }
                Ok(())
            }
            FsOp::Delete { path, .. } => {
                if path.as_os_str().is_empty() {
                    return Err("delete: path must not be empty".to_string());
                }
                Ok(())
            }
        }
    }

    fn run(&self, fs: &dyn FileSystem) -> io::Result<()> {
        match self {
            FsOp::Rename { from, to } => fs.rename(from, to),
            FsOp::Delete { path, recursive } => fs.remove(path, *recursive),
            FsOp::Copy { from, to } => fs.copy(from, to),
        }
    }
}

impl fmt::Display for FsOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FsOp::Rename { from, to } => write!(f, "rename {} to {}", from.display(), to.display()),
            FsOp::Delete { path, recursive: true } => {
                write!(f, "delete {} recursively", path.display())
            }
            FsOp::Delete { path, recursive: false } => write!(f, "delete {}", path.display()),
            FsOp::Copy { from, to } => write!(f, "copy {} to {}", from.display(), to.display()),
        }
    }
}

/// A filesystem operation wrapped in the adapter contract.
#[derive(Debug)]
pub struct FsAction {
    fs: Arc<dyn FileSystem>,
    op: FsOp,
    /// Treat a missing path as success.
    optional: bool,
    submitted: bool,
}

impl FsAction {
    pub fn new(fs: Arc<dyn FileSystem>, op: FsOp, optional: bool) -> Self {
        Self {
            fs,
            op,
            optional,
            submitted: false,
        }
    }

    pub fn op(&self) -> &FsOp {
        &self.op
    }

    pub fn is_optional(&self) -> bool {
        self.optional
    }
}

impl JobAdapter for FsAction {
    fn submit(&mut self, _conf: &JobConf) -> Result<()> {
        self.submitted = true;
        debug!(op = %self.op, "filesystem action submitted");
        Ok(())
    }

    fn poll_completion(&mut self) -> Result<Completion> {
        if !self.submitted {
            anyhow::bail!("{} polled before submission", self.op);
        }

        info!(op = %self.op, "executing filesystem action");
        match self.op.run(self.fs.as_ref()) {
            Ok(()) => Ok(Completion::Succeeded),
            Err(err) if self.optional && err.kind() == io::ErrorKind::NotFound => {
                debug!(op = %self.op, error = %err, "optional action target missing; treating as success");
                Ok(Completion::Succeeded)
            }
            Err(err) => {
                warn!(op = %self.op, error = %err, "filesystem action failed");
                Ok(Completion::Failed(format!("{} failed: {err}", self.op)))
            }
        }
    }

    fn kill(&mut self) -> Result<()> {
        // Nothing to cancel: the action either already ran or has not started.
        Ok(())
    }

    fn describe(&self) -> String {
        if self.optional {
            format!("{} (optional)", self.op)
        } else {
            self.op.to_string()
        }
    }
}
