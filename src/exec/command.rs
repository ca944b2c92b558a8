// src/exec/command.rs

//! External process job kind.
//!
//! A command job runs a shell command as a child process. The job's
//! configuration is exported to the process as environment variables, which
//! is how values pulled through value links reach the command.
//!
//! The process reports counters on stdout with lines of the form
//!
//! ```text
//! metric <group> <name> <value>
//! ```
//!
//! Each such line adds `value` to the counter `(group, name)`. Every other
//! stdout / stderr line is logged at debug level.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{Arc, LazyLock, Mutex};

use anyhow::{Context, Result, bail};
use regex::Regex;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::errors::lock;
use crate::exec::{Completion, JobAdapter, JobConf};
use crate::fs::FileSystem;

static METRIC_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^metric\s+(?P<group>\S+)\s+(?P<name>\S+)\s+(?P<value>-?\d+)\s*$")
        .expect("metric line pattern is a valid regex")
});

type Counters = Arc<Mutex<HashMap<(String, String), i64>>>;

/// Static description of a command job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    /// Shell command line (`sh -c`, or `cmd /C` on Windows).
    pub cmd: String,
    /// Input directories of the command.
    pub inputs: Vec<PathBuf>,
    /// Create missing `inputs` directories right before launching.
    pub create_missing_inputs: bool,
}

impl CommandSpec {
    pub fn new(cmd: impl Into<String>) -> Self {
        Self {
            cmd: cmd.into(),
            inputs: Vec::new(),
            create_missing_inputs: false,
        }
    }

    pub(crate) fn validate(&self) -> std::result::Result<(), String> {
        if self.cmd.trim().is_empty() {
            return Err("command must not be empty".to_string());
        }
        Ok(())
    }
}

#[derive(Debug)]
struct RunningProcess {
    child: Child,
    stdout_reader: JoinHandle<()>,
    stderr_reader: Option<JoinHandle<()>>,
    last_stderr: Arc<Mutex<Option<String>>>,
    exited: bool,
}

/// A command wrapped in the adapter contract.
///
/// Dropping a `CommandJob` leaves its process running; only [`kill`]
/// cancels it.
///
/// [`kill`]: JobAdapter::kill
#[derive(Debug)]
pub struct CommandJob {
    spec: CommandSpec,
    /// Used to create missing input directories.
    fs: Arc<dyn FileSystem>,
    counters: Counters,
    process: Option<RunningProcess>,
}

impl CommandJob {
    pub fn new(spec: CommandSpec, fs: Arc<dyn FileSystem>) -> Self {
        Self {
            spec,
            fs,
            counters: Arc::new(Mutex::new(HashMap::new())),
            process: None,
        }
    }

    pub fn spec(&self) -> &CommandSpec {
        &self.spec
    }

    fn prepare_inputs(&self) {
        if !self.spec.create_missing_inputs {
            return;
        }
        for input in &self.spec.inputs {
            if self.fs.exists(input) {
                continue;
            }
            match self.fs.create_dir_all(input) {
                Ok(()) => debug!(path = %input.display(), "created missing input directory"),
                Err(e) => debug!(
                    path = %input.display(),
                    error = %e,
                    "could not create input directory; continuing"
                ),
            }
        }
    }
}

fn shell_command(cmd_line: &str) -> Command {
    if cfg!(windows) {
        let mut c = Command::new("cmd");
        c.arg("/C").arg(cmd_line);
        c
    } else {
        let mut c = Command::new("sh");
        c.arg("-c").arg(cmd_line);
        c
    }
}

fn parse_metric_line(line: &str) -> Option<(String, String, i64)> {
    let caps = METRIC_LINE.captures(line.trim_end())?;
    let value = caps["value"].parse::<i64>().ok()?;
    Some((caps["group"].to_string(), caps["name"].to_string(), value))
}

/// Next newline-terminated line, decoded lossily. `None` at end of stream.
///
/// Invalid UTF-8 must not stop the reader: closing the pipe early would kill
/// the child with SIGPIPE.
async fn next_line<R>(reader: &mut R, buf: &mut Vec<u8>) -> std::io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    buf.clear();
    if reader.read_until(b'\n', buf).await? == 0 {
        return Ok(None);
    }
    let line = String::from_utf8_lossy(buf);
    Ok(Some(line.trim_end_matches(['\n', '\r']).to_string()))
}

async fn read_stdout(stdout: ChildStdout, counters: Counters, cmd: String) {
    let mut reader = BufReader::new(stdout);
    let mut buf = Vec::new();
    loop {
        match next_line(&mut reader, &mut buf).await {
            Ok(Some(line)) => match parse_metric_line(&line) {
                Some((group, name, value)) => {
                    let mut counters = lock(&counters);
                    *counters.entry((group, name)).or_insert(0) += value;
                }
                None => debug!(cmd = %cmd, "stdout: {}", line),
            },
            Ok(None) => break,
            Err(e) => {
                warn!(cmd = %cmd, error = %e, "failed reading command stdout");
                break;
            }
        }
    }
}

async fn read_stderr(stderr: ChildStderr, last: Arc<Mutex<Option<String>>>, cmd: String) {
    let mut reader = BufReader::new(stderr);
    let mut buf = Vec::new();
    loop {
        match next_line(&mut reader, &mut buf).await {
            Ok(Some(line)) => {
                debug!(cmd = %cmd, "stderr: {}", line);
                if !line.trim().is_empty() {
                    *lock(&last) = Some(line);
                }
            }
            Ok(None) => break,
            Err(e) => {
                warn!(cmd = %cmd, error = %e, "failed reading command stderr");
                break;
            }
        }
    }
}

impl JobAdapter for CommandJob {
    fn submit(&mut self, conf: &JobConf) -> Result<()> {
        if self.process.is_some() {
            bail!("`{}` was already submitted", self.spec.cmd);
        }
        let runtime = tokio::runtime::Handle::try_current()
            .context("command jobs must be submitted from within a Tokio runtime")?;

        self.prepare_inputs();

        let mut cmd = shell_command(&self.spec.cmd);
        cmd.envs(conf.iter())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = cmd
            .spawn()
            .with_context(|| format!("spawning process for `{}`", self.spec.cmd))?;

        info!(cmd = %self.spec.cmd, pid = child.id(), "command started");

        let stdout = child
            .stdout
            .take()
            .context("child stdout was not captured")?;
        let stdout_reader = runtime.spawn(read_stdout(
            stdout,
            Arc::clone(&self.counters),
            self.spec.cmd.clone(),
        ));

        let last_stderr = Arc::new(Mutex::new(None));
        let stderr_reader = child.stderr.take().map(|stderr| {
            runtime.spawn(read_stderr(
                stderr,
                Arc::clone(&last_stderr),
                self.spec.cmd.clone(),
            ))
        });

        self.process = Some(RunningProcess {
            child,
            stdout_reader,
            stderr_reader,
            last_stderr,
            exited: false,
        });
        Ok(())
    }

    fn poll_completion(&mut self) -> Result<Completion> {
        let Some(process) = self.process.as_mut() else {
            bail!("`{}` polled before submission", self.spec.cmd);
        };

        match process.child.try_wait() {
            Ok(Some(status)) => {
                process.exited = true;
                // Counters must be complete before dependents can read them.
                let stderr_done = process
                    .stderr_reader
                    .as_ref()
                    .is_none_or(JoinHandle::is_finished);
                if !process.stdout_reader.is_finished() || !stderr_done {
                    return Ok(Completion::Running);
                }
                if status.success() {
                    info!(cmd = %self.spec.cmd, "command finished successfully");
                    return Ok(Completion::Succeeded);
                }
                let mut message = format!("`{}` exited with {status}", self.spec.cmd);
                if let Some(line) = lock(&process.last_stderr).as_deref() {
                    message.push_str(": ");
                    message.push_str(line);
                }
                warn!(cmd = %self.spec.cmd, %status, "command failed");
                Ok(Completion::Failed(message))
            }
            Ok(None) => Ok(Completion::Running),
            Err(err) => {
                warn!(cmd = %self.spec.cmd, error = %err, "could not query command status; killing it");
                if let Err(kill_err) = process.child.start_kill() {
                    debug!(cmd = %self.spec.cmd, error = %kill_err, "kill after status error failed");
                }
                Ok(Completion::Failed(format!(
                    "checking status of `{}`: {err}",
                    self.spec.cmd
                )))
            }
        }
    }

    fn kill(&mut self) -> Result<()> {
        match self.process.as_mut() {
            Some(process) if !process.exited => {
                info!(cmd = %self.spec.cmd, "killing command");
                process
                    .child
                    .start_kill()
                    .with_context(|| format!("killing `{}`", self.spec.cmd))
            }
            _ => Ok(()),
        }
    }

    fn metric(&self, group: &str, name: &str) -> Result<i64> {
        if self.process.is_none() {
            bail!(
                "`{}` has not been submitted; metric {group}/{name} is unavailable",
                self.spec.cmd
            );
        }
        let counters = lock(&self.counters);
        Ok(counters
            .get(&(group.to_string(), name.to_string()))
            .copied()
            .unwrap_or(0))
    }

    fn describe(&self) -> String {
        format!("command `{}`", self.spec.cmd)
    }
}
