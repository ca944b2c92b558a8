// src/engine/control.rs

//! The scheduler loop and its thread-state control.
//!
//! A [`JobControl`] owns a [`JobRegistry`] and drives it from one background
//! tokio task. Every poll interval the task runs one registry tick on a
//! blocking worker. Callers steer it with `suspend` / `resume` / `stop`;
//! these requests are observed at tick boundaries.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::config::{JobFile, build_jobs};
use crate::engine::registry::{Bucket, JobRegistry};
use crate::errors::{JobctlError, Result, lock};
use crate::fs::FileSystem;
use crate::job::{Job, JobId};

/// Tick interval used unless configured otherwise.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(5000);

/// Interval used by [`JobControl::wait_for_completion`].
pub const DEFAULT_WAIT_INTERVAL: Duration = Duration::from_millis(1000);

/// State of the scheduler loop itself (not of any job).
///
/// `READY → RUNNING ⇄ SUSPENDED → STOPPING → STOPPED`; a fatal tick error
/// jumps straight to `STOPPED`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
    /// Constructed, loop not started yet.
    Ready,
    Running,
    Suspended,
    /// Stop requested; the loop exits at the next tick boundary.
    Stopping,
    Stopped,
}

impl fmt::Display for ThreadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ThreadState::Ready => "READY",
            ThreadState::Running => "RUNNING",
            ThreadState::Suspended => "SUSPENDED",
            ThreadState::Stopping => "STOPPING",
            ThreadState::Stopped => "STOPPED",
        };
        f.write_str(s)
    }
}

#[derive(Debug)]
struct Shared {
    registry: JobRegistry,
    thread_state: Mutex<ThreadState>,
    poll_interval: Mutex<Duration>,
    /// Wakes an idle loop when a control request arrives.
    wake: Notify,
    fatal: Mutex<Option<String>>,
    ticks: AtomicU64,
}

impl Shared {
    fn thread_state(&self) -> ThreadState {
        *lock(&self.thread_state)
    }

    fn poll_interval(&self) -> Duration {
        *lock(&self.poll_interval)
    }

    /// Sleep for one poll interval, or less if woken.
    async fn idle(&self) {
        let interval = self.poll_interval();
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = self.wake.notified() => {}
        }
    }

    fn fail(&self, message: String) {
        error!(group = %self.registry.group(), error = %message, "tick failed; stopping job control");
        *lock(&self.fatal) = Some(message);
        *lock(&self.thread_state) = ThreadState::Stopped;
    }
}

/// Handle to a group of jobs and the loop that drives them.
///
/// Cheap to clone; all clones share the same registry and loop.
#[derive(Debug, Clone)]
pub struct JobControl {
    shared: Arc<Shared>,
}

impl JobControl {
    pub fn new(group: impl Into<String>) -> Self {
        Self {
            shared: Arc::new(Shared {
                registry: JobRegistry::new(group),
                thread_state: Mutex::new(ThreadState::Ready),
                poll_interval: Mutex::new(DEFAULT_POLL_INTERVAL),
                wake: Notify::new(),
                fatal: Mutex::new(None),
                ticks: AtomicU64::new(0),
            }),
        }
    }

    /// Build, wire and register every job of a validated job file.
    ///
    /// The group name and poll interval come from the file's `[group]`
    /// section; filesystem jobs act on `fs`.
    pub fn from_config(file: &JobFile, fs: Arc<dyn FileSystem>) -> Result<JobControl> {
        let control = JobControl::new(file.group().name.clone());
        control.set_poll_interval(file.group().poll_interval());
        let jobs = build_jobs(file, fs)?;
        control.add_jobs(&jobs)?;
        Ok(control)
    }

    /// Change the tick interval. Takes effect from the next idle period.
    pub fn set_poll_interval(&self, interval: Duration) {
        *lock(&self.shared.poll_interval) = interval.max(Duration::from_millis(1));
    }

    pub fn poll_interval(&self) -> Duration {
        self.shared.poll_interval()
    }

    pub fn registry(&self) -> &JobRegistry {
        &self.shared.registry
    }

    pub fn group(&self) -> &str {
        self.shared.registry.group()
    }

    pub fn add_job(&self, job: &Arc<Job>) -> Result<JobId> {
        self.shared.registry.register(job)
    }

    pub fn add_jobs<'a>(&self, jobs: impl IntoIterator<Item = &'a Arc<Job>>) -> Result<Vec<JobId>> {
        self.shared.registry.register_all(jobs)
    }

    pub fn waiting_jobs(&self) -> Vec<Arc<Job>> {
        self.shared.registry.snapshot(Bucket::Waiting)
    }

    pub fn ready_jobs(&self) -> Vec<Arc<Job>> {
        self.shared.registry.snapshot(Bucket::Ready)
    }

    pub fn running_jobs(&self) -> Vec<Arc<Job>> {
        self.shared.registry.snapshot(Bucket::Running)
    }

    pub fn successful_jobs(&self) -> Vec<Arc<Job>> {
        self.shared.registry.snapshot(Bucket::Succeeded)
    }

    /// Jobs in `FAILED` or `DEPENDENT_FAILED`.
    pub fn failed_jobs(&self) -> Vec<Arc<Job>> {
        self.shared.registry.snapshot(Bucket::Failed)
    }

    pub fn all_finished(&self) -> bool {
        self.shared.registry.all_finished()
    }

    pub fn thread_state(&self) -> ThreadState {
        self.shared.thread_state()
    }

    /// Error that stopped the loop, if any.
    pub fn fatal_error(&self) -> Option<String> {
        lock(&self.shared.fatal).clone()
    }

    /// Number of ticks completed so far.
    pub fn ticks(&self) -> u64 {
        self.shared.ticks.load(Ordering::SeqCst)
    }

    /// Spawn the scheduler loop on the current tokio runtime.
    ///
    /// Only a control in `READY` can be started.
    pub fn start(&self) -> Result<JoinHandle<()>> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| anyhow::anyhow!("job control needs a Tokio runtime: {e}"))?;

        {
            let mut state = lock(&self.shared.thread_state);
            if *state != ThreadState::Ready {
                return Err(JobctlError::AlreadyStarted {
                    group: self.group().to_string(),
                    state: state.to_string(),
                });
            }
            *state = ThreadState::Running;
        }

        let shared = Arc::clone(&self.shared);
        Ok(runtime.spawn(run_loop(shared)))
    }

    /// `RUNNING → SUSPENDED`; ignored in any other state.
    pub fn suspend(&self) {
        let mut state = lock(&self.shared.thread_state);
        if *state == ThreadState::Running {
            *state = ThreadState::Suspended;
            debug!(group = %self.group(), "job control suspended");
        }
    }

    /// `SUSPENDED → RUNNING`; ignored in any other state.
    pub fn resume(&self) {
        let mut state = lock(&self.shared.thread_state);
        if *state == ThreadState::Suspended {
            *state = ThreadState::Running;
            debug!(group = %self.group(), "job control resumed");
            self.shared.wake.notify_one();
        }
    }

    /// Ask the loop to stop after the current tick.
    ///
    /// A control that was never started goes straight to `STOPPED`. Running
    /// jobs are left alone.
    pub fn stop(&self) {
        let mut state = lock(&self.shared.thread_state);
        match *state {
            ThreadState::Ready => *state = ThreadState::Stopped,
            ThreadState::Running | ThreadState::Suspended => {
                *state = ThreadState::Stopping;
                self.shared.wake.notify_one();
            }
            ThreadState::Stopping | ThreadState::Stopped => {}
        }
        let now = *state;
        debug!(group = %self.group(), state = %now, "stop requested");
    }

    /// Run every registered job to completion with the default 1 s interval.
    pub async fn wait_for_completion(&self) -> Result<()> {
        self.wait_for_completion_every(DEFAULT_WAIT_INTERVAL).await
    }

    /// Start the loop with `interval` as its tick interval, wait until the
    /// waiting, ready and running buckets are empty, then stop it.
    ///
    /// If the loop stops on a fatal error while jobs are unfinished, this
    /// never returns; wrap it in a timeout and consult
    /// [`fatal_error`](Self::fatal_error) if that matters.
    pub async fn wait_for_completion_every(&self, interval: Duration) -> Result<()> {
        self.set_poll_interval(interval);
        let handle = self.start()?;

        while !self.all_finished() {
            tokio::time::sleep(interval).await;
        }

        self.stop();
        handle
            .await
            .map_err(|e| JobctlError::TickAborted(format!("scheduler loop task: {e}")))?;
        Ok(())
    }
}

async fn run_loop(shared: Arc<Shared>) {
    let group = shared.registry.group().to_string();
    info!(%group, interval_ms = shared.poll_interval().as_millis() as u64, "job control started");

    loop {
        match shared.thread_state() {
            ThreadState::Running => {}
            ThreadState::Suspended => {
                shared.idle().await;
                continue;
            }
            ThreadState::Ready | ThreadState::Stopping | ThreadState::Stopped => break,
        }

        let worker = Arc::clone(&shared);
        match tokio::task::spawn_blocking(move || worker.registry.tick()).await {
            Ok(Ok(report)) => {
                let n = shared.ticks.fetch_add(1, Ordering::SeqCst) + 1;
                if !report.is_quiet() {
                    debug!(
                        %group,
                        tick = n,
                        submitted = ?report.submitted,
                        succeeded = ?report.succeeded,
                        failed = ?report.failed,
                        "tick"
                    );
                }
            }
            Ok(Err(e)) => {
                shared.fail(format!("{e:#}"));
                break;
            }
            Err(join_err) => {
                shared.fail(format!("tick panicked: {join_err}"));
                break;
            }
        }

        match shared.thread_state() {
            ThreadState::Running | ThreadState::Suspended => shared.idle().await,
            _ => break,
        }
    }

    *lock(&shared.thread_state) = ThreadState::Stopped;
    info!(%group, ticks = shared.ticks.load(Ordering::SeqCst), "job control stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stop_before_start_goes_straight_to_stopped() {
        let control = JobControl::new("g");
        assert_eq!(control.thread_state(), ThreadState::Ready);

        control.stop();
        assert_eq!(control.thread_state(), ThreadState::Stopped);

        control.stop();
        assert_eq!(control.thread_state(), ThreadState::Stopped);
    }

    #[test]
    fn suspend_and_resume_only_act_on_matching_states() {
        let control = JobControl::new("g");
        control.suspend();
        assert_eq!(control.thread_state(), ThreadState::Ready);
        control.resume();
        assert_eq!(control.thread_state(), ThreadState::Ready);
    }

    #[test]
    fn start_needs_a_runtime() {
        let control = JobControl::new("g");
        assert!(control.start().is_err());
        assert_eq!(control.thread_state(), ThreadState::Ready);
    }

    #[tokio::test]
    async fn start_twice_is_rejected() {
        let control = JobControl::new("g");
        control.set_poll_interval(Duration::from_millis(5));
        let handle = control.start().unwrap();

        let err = control.start().unwrap_err();
        assert!(matches!(err, JobctlError::AlreadyStarted { .. }));

        control.stop();
        handle.await.unwrap();
        assert_eq!(control.thread_state(), ThreadState::Stopped);
    }

    #[tokio::test]
    async fn empty_group_completes_immediately() {
        let control = JobControl::new("g");
        control
            .wait_for_completion_every(Duration::from_millis(5))
            .await
            .unwrap();
        assert_eq!(control.thread_state(), ThreadState::Stopped);
        assert!(control.fatal_error().is_none());
    }

    #[test]
    fn default_interval() {
        let control = JobControl::new("g");
        assert_eq!(control.poll_interval(), Duration::from_millis(5000));
    }
}
