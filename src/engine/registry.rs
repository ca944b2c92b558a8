// src/engine/registry.rs

//! Group registry: id assignment plus five state buckets.
//!
//! Bucket membership is a materialized view of each job's state. It is
//! brought up to date by the passes of [`JobRegistry::tick`] (or explicitly
//! through [`JobRegistry::move_if_state_changed`]). Moving a job locks both
//! buckets in index order, so a reader never sees the job in zero or two
//! buckets.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use tracing::{debug, info, trace};

use crate::engine::tick::TickReport;
use crate::errors::{JobctlError, Result, lock};
use crate::job::{Job, JobId, JobState};

/// State category a job is filed under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bucket {
    Waiting,
    Ready,
    Running,
    Succeeded,
    /// Both `FAILED` and `DEPENDENT_FAILED`.
    Failed,
}

impl Bucket {
    pub const ALL: [Bucket; 5] = [
        Bucket::Waiting,
        Bucket::Ready,
        Bucket::Running,
        Bucket::Succeeded,
        Bucket::Failed,
    ];

    pub fn for_state(state: JobState) -> Bucket {
        match state {
            JobState::Waiting => Bucket::Waiting,
            JobState::Ready => Bucket::Ready,
            JobState::Running => Bucket::Running,
            JobState::Success => Bucket::Succeeded,
            JobState::Failed | JobState::DependentFailed => Bucket::Failed,
        }
    }

    fn index(self) -> usize {
        match self {
            Bucket::Waiting => 0,
            Bucket::Ready => 1,
            Bucket::Running => 2,
            Bucket::Succeeded => 3,
            Bucket::Failed => 4,
        }
    }
}

impl fmt::Display for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Bucket::Waiting => "waiting",
            Bucket::Ready => "ready",
            Bucket::Running => "running",
            Bucket::Succeeded => "succeeded",
            Bucket::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Keyed by registration sequence so snapshots come back in registration
/// order.
type JobMap = BTreeMap<u64, Arc<Job>>;

#[derive(Debug)]
pub struct JobRegistry {
    group: String,
    next_seq: Mutex<u64>,
    buckets: [Mutex<JobMap>; 5],
}

impl JobRegistry {
    pub fn new(group: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            next_seq: Mutex::new(0),
            buckets: Default::default(),
        }
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    /// Assign the next id (`group + n`), reset the job to `WAITING` and file
    /// it in the waiting bucket.
    pub fn register(&self, job: &Arc<Job>) -> Result<JobId> {
        let mut next = lock(&self.next_seq);
        let seq = *next;
        let id = format!("{}{}", self.group, seq);

        job.assign_id(seq, id.clone())
            .map_err(|_| JobctlError::AlreadyRegistered {
                name: job.name().to_string(),
                id: job.id().unwrap_or_default().to_string(),
            })?;
        *next += 1;

        lock(&self.buckets[Bucket::Waiting.index()]).insert(seq, Arc::clone(job));
        info!(group = %self.group, job = %job.name(), %id, "job registered");
        Ok(id)
    }

    /// Register jobs in order, stopping at the first failure.
    pub fn register_all<'a>(
        &self,
        jobs: impl IntoIterator<Item = &'a Arc<Job>>,
    ) -> Result<Vec<JobId>> {
        jobs.into_iter().map(|job| self.register(job)).collect()
    }

    /// Point-in-time copy of one bucket.
    pub fn snapshot(&self, bucket: Bucket) -> Vec<Arc<Job>> {
        lock(&self.buckets[bucket.index()]).values().cloned().collect()
    }

    pub fn len(&self, bucket: Bucket) -> usize {
        lock(&self.buckets[bucket.index()]).len()
    }

    /// Look a registered job up by id.
    pub fn find(&self, id: &str) -> Option<Arc<Job>> {
        Bucket::ALL.iter().find_map(|bucket| {
            lock(&self.buckets[bucket.index()])
                .values()
                .find(|job| job.id() == Some(id))
                .cloned()
        })
    }

    /// Waiting, ready and running are all empty.
    pub fn all_finished(&self) -> bool {
        let waiting = lock(&self.buckets[Bucket::Waiting.index()]);
        let ready = lock(&self.buckets[Bucket::Ready.index()]);
        let running = lock(&self.buckets[Bucket::Running.index()]);
        waiting.is_empty() && ready.is_empty() && running.is_empty()
    }

    /// File `job` under the bucket matching its current state.
    ///
    /// Returns `true` if the job moved. Jobs not registered here are ignored.
    pub fn move_if_state_changed(&self, job: &Arc<Job>) -> bool {
        let target = Bucket::for_state(job.state());
        let Some(seq) = job.seq() else {
            return false;
        };
        let source = Bucket::ALL.into_iter().find(|bucket| {
            *bucket != target
                && lock(&self.buckets[bucket.index()])
                    .get(&seq)
                    .is_some_and(|filed| Arc::ptr_eq(filed, job))
        });
        match source {
            Some(from) => self.relocate(job, from, target),
            None => false,
        }
    }

    fn relocate(&self, job: &Arc<Job>, from: Bucket, to: Bucket) -> bool {
        if from == to {
            return false;
        }
        let Some(seq) = job.seq() else {
            return false;
        };

        let (low, high) = if from.index() < to.index() {
            (from, to)
        } else {
            (to, from)
        };
        let mut low_map = lock(&self.buckets[low.index()]);
        let mut high_map = lock(&self.buckets[high.index()]);
        let (src, dst) = if low == from {
            (&mut *low_map, &mut *high_map)
        } else {
            (&mut *high_map, &mut *low_map)
        };

        match src.get(&seq) {
            Some(filed) if Arc::ptr_eq(filed, job) => {}
            _ => return false,
        }
        src.remove(&seq);
        dst.insert(seq, Arc::clone(job));
        debug!(job = %job.name(), id = job.id().unwrap_or_default(), %from, %to, "moved job");
        true
    }

    /// One scheduler tick.
    ///
    /// 1. Running pass: re-check every running job.
    /// 2. Waiting pass: re-check every waiting job.
    /// 3. Ready pass: submit every ready job.
    ///
    /// The ready pass only submits jobs that were filed as ready when the
    /// tick began, so a job promoted by this tick's waiting pass is
    /// submitted on the next tick.
    ///
    /// An error means an execution's poll broke. The passes stop there;
    /// state changes already made are kept.
    pub fn tick(&self) -> anyhow::Result<TickReport> {
        let mut report = TickReport::default();
        let ready = self.snapshot(Bucket::Ready);

        for job in self.snapshot(Bucket::Running) {
            let state = job.check_state()?;
            match state {
                JobState::Success => report.succeeded.push(job_id(&job)),
                JobState::Failed => report.failed.push(job_id(&job)),
                _ => {}
            }
            self.relocate(&job, Bucket::Running, Bucket::for_state(state));
        }

        for job in self.snapshot(Bucket::Waiting) {
            let state = job.check_state()?;
            if state == JobState::DependentFailed {
                report.failed.push(job_id(&job));
            }
            self.relocate(&job, Bucket::Waiting, Bucket::for_state(state));
        }

        for job in ready {
            let state = job.submit();
            match state {
                JobState::Running => report.submitted.push(job_id(&job)),
                JobState::Failed => report.failed.push(job_id(&job)),
                _ => {}
            }
            self.relocate(&job, Bucket::Ready, Bucket::for_state(state));
        }

        trace!(group = %self.group, ?report, "tick complete");
        Ok(report)
    }
}

fn job_id(job: &Job) -> JobId {
    job.id().unwrap_or_default().to_string()
}
