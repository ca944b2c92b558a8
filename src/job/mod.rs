// src/job/mod.rs

//! A single controlled job: its state, dependencies, value links and the
//! execution kind it wraps.
//!
//! Jobs are shared as `Arc<Job>` between the registry, the jobs that depend
//! on them and the caller. All mutable fields live behind the job's own
//! mutex; `check_state` holds it while it walks the dependencies, so locks
//! are always taken along dependency edges (never against them).

pub mod link;
pub mod state;

use std::collections::HashSet;
use std::fmt;
use std::ptr;
use std::sync::{Arc, Mutex, OnceLock};

use anyhow::Context;
use tracing::{debug, info, warn};

use crate::errors::{JobctlError, Result, lock};
use crate::exec::{Completion, ExecutionKind, JobAdapter, JobConf};

pub use link::ValueLink;
pub use state::JobState;

/// Registry-assigned identifier (`group + n`).
pub type JobId = String;

const INITIAL_MESSAGE: &str = "just initialized";

/// Held while an edge is checked and inserted, so two concurrent
/// `add_dependency` calls cannot each pass the cycle check and close a cycle.
static WIRING: Mutex<()> = Mutex::new(());
const UNASSIGNED: &str = "unassigned";

/// Everything needed to construct a job.
#[derive(Debug)]
pub struct JobSpec {
    pub name: String,
    pub kind: ExecutionKind,
    /// Initial configuration; value links add to it at submission.
    pub conf: JobConf,
}

impl JobSpec {
    pub fn new(name: impl Into<String>, kind: ExecutionKind) -> Self {
        Self {
            name: name.into(),
            kind,
            conf: JobConf::new(),
        }
    }

    pub fn with_conf(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.conf.insert(key.into(), value.into());
        self
    }
}

struct JobInner {
    state: JobState,
    message: String,
    dependencies: Vec<Arc<Job>>,
    links: Vec<ValueLink>,
    conf: JobConf,
    kind: ExecutionKind,
}

#[derive(Debug)]
struct Registration {
    seq: u64,
    id: JobId,
}

pub struct Job {
    name: String,
    registration: OnceLock<Registration>,
    inner: Mutex<JobInner>,
}

impl Job {
    /// Build a job in state `WAITING` with no id.
    pub fn new(spec: JobSpec) -> Result<Arc<Job>> {
        let JobSpec { name, kind, conf } = spec;
        if name.trim().is_empty() {
            return Err(JobctlError::InvalidJob("job name must not be empty".into()));
        }
        kind.validate()
            .map_err(|e| JobctlError::InvalidJob(format!("job '{name}': {e}")))?;

        Ok(Arc::new(Job {
            name,
            registration: OnceLock::new(),
            inner: Mutex::new(JobInner {
                state: JobState::Waiting,
                message: INITIAL_MESSAGE.to_string(),
                dependencies: Vec::new(),
                links: Vec::new(),
                conf,
                kind,
            }),
        }))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Id assigned at registration, `None` before that.
    pub fn id(&self) -> Option<&str> {
        self.registration.get().map(|r| r.id.as_str())
    }

    /// Registration order within the owning registry.
    pub(crate) fn seq(&self) -> Option<u64> {
        self.registration.get().map(|r| r.seq)
    }

    fn id_or_unassigned(&self) -> &str {
        self.id().unwrap_or(UNASSIGNED)
    }

    pub fn state(&self) -> JobState {
        lock(&self.inner).state
    }

    pub fn message(&self) -> String {
        lock(&self.inner).message.clone()
    }

    pub fn set_message(&self, message: impl Into<String>) {
        lock(&self.inner).message = message.into();
    }

    pub fn dependencies(&self) -> Vec<Arc<Job>> {
        lock(&self.inner).dependencies.clone()
    }

    pub fn links(&self) -> Vec<ValueLink> {
        lock(&self.inner).links.clone()
    }

    pub fn conf(&self) -> JobConf {
        lock(&self.inner).conf.clone()
    }

    pub fn conf_value(&self, key: &str) -> Option<String> {
        lock(&self.inner).conf.get(key).cloned()
    }

    pub fn describe(&self) -> String {
        lock(&self.inner).kind.describe()
    }

    pub fn is_completed(&self) -> bool {
        self.state().is_terminal()
    }

    pub fn is_ready(&self) -> bool {
        self.state() == JobState::Ready
    }

    /// Declare that this job must wait for `dependency`.
    ///
    /// Returns `false` (and changes nothing) if this job is no longer
    /// `WAITING`, or if the edge would close a cycle.
    pub fn add_dependency(&self, dependency: &Arc<Job>) -> bool {
        let _wiring = lock(&WIRING);
        if ptr::eq(self, dependency.as_ref()) {
            warn!(job = %self.name, "rejected self-dependency");
            return false;
        }
        if dependency.depends_on(self) {
            warn!(
                job = %self.name,
                dependency = %dependency.name,
                "rejected dependency that would create a cycle"
            );
            return false;
        }

        let mut inner = lock(&self.inner);
        if inner.state != JobState::Waiting {
            warn!(
                job = %self.name,
                state = %inner.state,
                dependency = %dependency.name,
                "dependencies can only be added while WAITING"
            );
            return false;
        }
        inner.dependencies.push(Arc::clone(dependency));
        debug!(job = %self.name, dependency = %dependency.name, "dependency added");
        true
    }

    /// Pull metric `(group, name)` from `producer` into `conf[key]` right
    /// before this job is submitted.
    ///
    /// This does not add `producer` as a dependency. Returns `false` if this
    /// job is no longer `WAITING` or `producer` is this job.
    pub fn require_metric(
        &self,
        producer: &Arc<Job>,
        group: impl Into<String>,
        name: impl Into<String>,
        key: impl Into<String>,
    ) -> bool {
        if ptr::eq(self, producer.as_ref()) {
            warn!(job = %self.name, "rejected value link to itself");
            return false;
        }
        let mut inner = lock(&self.inner);
        if inner.state != JobState::Waiting {
            warn!(
                job = %self.name,
                state = %inner.state,
                "value links can only be added while WAITING"
            );
            return false;
        }
        let link = ValueLink::new(Arc::clone(producer), group.into(), name.into(), key.into());
        debug!(
            job = %self.name,
            producer = %producer.name,
            group = link.group(),
            metric = link.name(),
            key = link.key(),
            "value link added"
        );
        inner.links.push(link);
        true
    }

    /// Re-evaluate this job's state.
    ///
    /// A running job polls its execution. A waiting job walks its
    /// dependencies in declaration order, re-checking each one, and stops at
    /// the first dependency that is unfinished or failed. Errors come only
    /// from execution polls and are fatal to the scheduler loop.
    pub fn check_state(&self) -> anyhow::Result<JobState> {
        let mut inner = lock(&self.inner);

        if inner.state == JobState::Running {
            let completion = inner
                .kind
                .poll_completion()
                .with_context(|| format!("polling job '{}' ({})", self.name, self.id_or_unassigned()))?;
            match completion {
                Completion::Running => {}
                Completion::Succeeded => {
                    inner.state = JobState::Success;
                    info!(job = %self.name, id = self.id_or_unassigned(), "job succeeded");
                }
                Completion::Failed(message) => {
                    warn!(job = %self.name, id = self.id_or_unassigned(), %message, "job failed");
                    inner.state = JobState::Failed;
                    inner.message = message;
                }
            }
        }

        if inner.state != JobState::Waiting {
            return Ok(inner.state);
        }

        if inner.dependencies.is_empty() {
            inner.state = JobState::Ready;
            debug!(job = %self.name, "no dependencies; READY");
            return Ok(inner.state);
        }

        let count = inner.dependencies.len();
        for i in 0..count {
            let dependency = Arc::clone(&inner.dependencies[i]);
            match dependency.check_state()? {
                JobState::Waiting | JobState::Ready | JobState::Running => break,
                JobState::Failed | JobState::DependentFailed => {
                    inner.state = JobState::DependentFailed;
                    inner.message = format!(
                        "depending job {i} with jobID {} failed. {}",
                        dependency.id_or_unassigned(),
                        dependency.message()
                    );
                    warn!(
                        job = %self.name,
                        dependency = %dependency.name,
                        "dependency failed; DEPENDENT_FAILED"
                    );
                    break;
                }
                JobState::Success => {
                    if i == count - 1 {
                        inner.state = JobState::Ready;
                        debug!(job = %self.name, "all dependencies succeeded; READY");
                    }
                }
            }
        }

        Ok(inner.state)
    }

    /// Best-effort cancellation of the wrapped execution. Does not change
    /// the job's state.
    pub fn kill(&self) -> anyhow::Result<()> {
        let mut inner = lock(&self.inner);
        inner
            .kind
            .kill()
            .with_context(|| format!("killing job '{}'", self.name))
    }

    /// Read a metric reported by this job's execution.
    pub fn metric(&self, group: &str, name: &str) -> anyhow::Result<i64> {
        lock(&self.inner).kind.metric(group, name)
    }

    /// Resolve value links and hand the job to its execution.
    ///
    /// Only acts on a `READY` job; ends in `RUNNING` or `FAILED`. The job's
    /// lock is released while links are resolved so that producer locks are
    /// never taken while holding the consumer's.
    pub(crate) fn submit(&self) -> JobState {
        let links = {
            let inner = lock(&self.inner);
            if inner.state != JobState::Ready {
                return inner.state;
            }
            inner.links.clone()
        };

        let mut resolved = Vec::with_capacity(links.len());
        let mut failure = None;
        for link in &links {
            match link.resolve() {
                Ok(value) => resolved.push((link.key().to_string(), value.to_string())),
                Err(e) => {
                    failure = Some(format!(
                        "resolving metric {}/{} from job '{}': {e:#}",
                        link.group(),
                        link.name(),
                        link.producer().name()
                    ));
                    break;
                }
            }
        }

        let mut inner = lock(&self.inner);
        if inner.state != JobState::Ready {
            return inner.state;
        }
        if let Some(message) = failure {
            warn!(job = %self.name, %message, "submission failed");
            inner.state = JobState::Failed;
            inner.message = message;
            return inner.state;
        }

        let JobInner { kind, conf, state, message, .. } = &mut *inner;
        conf.extend(resolved);
        match kind.submit(conf) {
            Ok(()) => {
                *state = JobState::Running;
                info!(job = %self.name, id = self.id_or_unassigned(), "job submitted");
            }
            Err(e) => {
                *state = JobState::Failed;
                *message = format!("{e:#}");
                warn!(job = %self.name, error = %message, "submission failed");
            }
        }
        *state
    }

    /// Assign the registry id and put the job (back) into `WAITING`.
    ///
    /// Fails with the rejected id if the job was registered before.
    pub(crate) fn assign_id(&self, seq: u64, id: JobId) -> std::result::Result<(), JobId> {
        self.registration
            .set(Registration { seq, id })
            .map_err(|rejected| rejected.id)?;
        lock(&self.inner).state = JobState::Waiting;
        Ok(())
    }

    /// Whether `target` is reachable from this job through dependency edges
    /// (including this job itself).
    fn depends_on(&self, target: &Job) -> bool {
        if ptr::eq(self, target) {
            return true;
        }
        let mut visited: HashSet<*const Job> = HashSet::new();
        let mut stack = self.dependencies();
        while let Some(job) = stack.pop() {
            if ptr::eq(job.as_ref(), target) {
                return true;
            }
            if visited.insert(Arc::as_ptr(&job)) {
                stack.extend(job.dependencies());
            }
        }
        false
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = lock(&self.inner);
        let deps: Vec<&str> = inner.dependencies.iter().map(|d| d.name()).collect();
        f.debug_struct("Job")
            .field("name", &self.name)
            .field("id", &self.id())
            .field("state", &inner.state)
            .field("message", &inner.message)
            .field("dependencies", &deps)
            .field("links", &inner.links.len())
            .finish()
    }
}

impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = lock(&self.inner);
        writeln!(f, "job name:\t{}", self.name)?;
        writeln!(f, "job id:\t{}", self.id_or_unassigned())?;
        writeln!(f, "job state:\t{}", inner.state)?;
        writeln!(f, "job kind:\t{}", inner.kind.describe())?;
        writeln!(f, "job message:\t{}", inner.message)?;
        if inner.dependencies.is_empty() {
            writeln!(f, "job has no dependencies")?;
        } else {
            writeln!(f, "job has {} dependencies:", inner.dependencies.len())?;
            for (i, dep) in inner.dependencies.iter().enumerate() {
                writeln!(f, "\tdependency {i}:\t{}", dep.name())?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[derive(Debug, Clone)]
    struct Stub {
        outcome: Arc<Mutex<Completion>>,
        submit_error: Option<String>,
        metrics: HashMap<(String, String), i64>,
        seen_conf: Arc<Mutex<Option<JobConf>>>,
    }

    impl Stub {
        fn new() -> Self {
            Self {
                outcome: Arc::new(Mutex::new(Completion::Running)),
                submit_error: None,
                metrics: HashMap::new(),
                seen_conf: Arc::new(Mutex::new(None)),
            }
        }

        fn finish(&self, completion: Completion) {
            *self.outcome.lock().unwrap() = completion;
        }
    }

    impl JobAdapter for Stub {
        fn submit(&mut self, conf: &JobConf) -> anyhow::Result<()> {
            *self.seen_conf.lock().unwrap() = Some(conf.clone());
            match &self.submit_error {
                Some(e) => anyhow::bail!("{e}"),
                None => Ok(()),
            }
        }

        fn poll_completion(&mut self) -> anyhow::Result<Completion> {
            Ok(self.outcome.lock().unwrap().clone())
        }

        fn kill(&mut self) -> anyhow::Result<()> {
            Ok(())
        }

        fn metric(&self, group: &str, name: &str) -> anyhow::Result<i64> {
            Ok(self
                .metrics
                .get(&(group.to_string(), name.to_string()))
                .copied()
                .unwrap_or(0))
        }

        fn describe(&self) -> String {
            "stub".to_string()
        }
    }

    fn job_with(name: &str, stub: &Stub) -> Arc<Job> {
        Job::new(JobSpec::new(name, ExecutionKind::custom(stub.clone()))).unwrap()
    }

    fn job(name: &str) -> (Arc<Job>, Stub) {
        let stub = Stub::new();
        (job_with(name, &stub), stub)
    }

    /// Drive a dependency-free job to a terminal state.
    fn finish(job: &Job, stub: &Stub, completion: Completion) -> JobState {
        assert_eq!(job.check_state().unwrap(), JobState::Ready);
        assert_eq!(job.submit(), JobState::Running);
        stub.finish(completion);
        job.check_state().unwrap()
    }

    #[test]
    fn new_job_is_waiting_without_id() {
        let (a, _) = job("a");
        assert_eq!(a.state(), JobState::Waiting);
        assert_eq!(a.id(), None);
        assert_eq!(a.message(), "just initialized");
    }

    #[test]
    fn empty_name_is_rejected() {
        let err = Job::new(JobSpec::new("  ", ExecutionKind::custom(Stub::new()))).unwrap_err();
        assert!(matches!(err, JobctlError::InvalidJob(_)));
    }

    #[test]
    fn zero_dependencies_become_ready_on_first_check() {
        let (a, _) = job("a");
        assert_eq!(a.check_state().unwrap(), JobState::Ready);
        assert!(a.is_ready());
    }

    #[test]
    fn running_job_resolves_through_poll() {
        let (a, stub) = job("a");
        assert_eq!(finish(&a, &stub, Completion::Succeeded), JobState::Success);
        assert!(a.is_completed());

        let (b, stub) = job("b");
        assert_eq!(finish(&b, &stub, Completion::Failed("exit 1".into())), JobState::Failed);
        assert_eq!(b.message(), "exit 1");
    }

    #[test]
    fn dependent_failed_is_terminal_and_idempotent() {
        let (a, a_stub) = job("a");
        let (b, _) = job("b");
        assert!(b.add_dependency(&a));
        finish(&a, &a_stub, Completion::Failed("boom".into()));

        assert_eq!(b.check_state().unwrap(), JobState::DependentFailed);
        let msg = b.message();
        assert_eq!(msg, "depending job 0 with jobID unassigned failed. boom");

        assert_eq!(b.check_state().unwrap(), JobState::DependentFailed);
        assert_eq!(b.message(), msg);
    }

    #[test]
    fn first_failing_dependency_is_reported() {
        let (ok, ok_stub) = job("ok");
        let (bad1, s1) = job("bad1");
        let (bad2, s2) = job("bad2");
        let (c, _) = job("c");
        for dep in [&ok, &bad1, &bad2] {
            assert!(c.add_dependency(dep));
        }
        finish(&ok, &ok_stub, Completion::Succeeded);
        finish(&bad1, &s1, Completion::Failed("first".into()));
        finish(&bad2, &s2, Completion::Failed("second".into()));

        assert_eq!(c.check_state().unwrap(), JobState::DependentFailed);
        assert!(c.message().starts_with("depending job 1 "));
        assert!(c.message().ends_with("first"));
    }

    #[test]
    fn late_mutations_are_rejected() {
        let (a, _) = job("a");
        let (b, _) = job("b");
        a.check_state().unwrap();

        assert!(!a.add_dependency(&b));
        assert!(!a.require_metric(&b, "g", "n", "k"));
        assert!(a.dependencies().is_empty());
        assert!(a.links().is_empty());
    }

    #[test]
    fn cycles_and_self_edges_are_rejected() {
        let (a, _) = job("a");
        let (b, _) = job("b");
        let (c, _) = job("c");
        assert!(b.add_dependency(&a));
        assert!(c.add_dependency(&b));

        assert!(!a.add_dependency(&a));
        assert!(!a.add_dependency(&c));
        assert!(!a.require_metric(&a, "g", "n", "k"));
        assert!(a.dependencies().is_empty());
    }

    #[test]
    fn concurrent_opposite_edges_never_form_a_cycle() {
        use std::sync::Barrier;
        use std::thread;

        for _ in 0..200 {
            let (a, _) = job("a");
            let (b, _) = job("b");
            let barrier = Arc::new(Barrier::new(2));

            let spawn = |from: &Arc<Job>, to: &Arc<Job>| {
                let (from, to, barrier) = (Arc::clone(from), Arc::clone(to), Arc::clone(&barrier));
                thread::spawn(move || {
                    barrier.wait();
                    from.add_dependency(&to)
                })
            };
            let ab = spawn(&a, &b);
            let ba = spawn(&b, &a);
            let added = [ab.join().unwrap(), ba.join().unwrap()];

            assert_eq!(added.iter().filter(|ok| **ok).count(), 1);
            assert_eq!(a.dependencies().len() + b.dependencies().len(), 1);
        }
    }

    /// a -> {b, c} -> d, with `first` finishing before the other branch.
    fn diamond_with_branch_finishing_first(first: &str) {
        let (a, a_stub) = job("a");
        let (b, b_stub) = job("b");
        let (c, c_stub) = job("c");
        let (d, _) = job("d");
        assert!(b.add_dependency(&a));
        assert!(c.add_dependency(&a));
        assert!(d.add_dependency(&b));
        assert!(d.add_dependency(&c));

        finish(&a, &a_stub, Completion::Succeeded);

        let (early, early_stub, late, late_stub) = if first == "b" {
            (&b, &b_stub, &c, &c_stub)
        } else {
            (&c, &c_stub, &b, &b_stub)
        };
        finish(early, early_stub, Completion::Succeeded);
        assert_eq!(d.check_state().unwrap(), JobState::Waiting);

        finish(late, late_stub, Completion::Succeeded);
        assert_eq!(d.check_state().unwrap(), JobState::Ready);
    }

    #[test]
    fn diamond_waits_for_both_branches() {
        diamond_with_branch_finishing_first("c");
    }

    #[test]
    fn diamond_waits_for_both_branches_in_either_order() {
        diamond_with_branch_finishing_first("b");
    }

    #[test]
    fn walk_stops_at_first_unfinished_dependency() {
        let (a, a_stub) = job("a");
        let (b, _) = job("b");
        let (c, _) = job("c");
        assert!(c.add_dependency(&a));
        assert!(c.add_dependency(&b));

        assert_eq!(a.check_state().unwrap(), JobState::Ready);
        assert_eq!(a.submit(), JobState::Running);

        // a is still running, so b is never looked at.
        assert_eq!(c.check_state().unwrap(), JobState::Waiting);
        assert_eq!(b.state(), JobState::Waiting);

        a_stub.finish(Completion::Succeeded);
        assert_eq!(c.check_state().unwrap(), JobState::Waiting);
        assert_eq!(b.state(), JobState::Ready);
    }

    #[test]
    fn submit_error_fails_the_job() {
        let mut stub = Stub::new();
        stub.submit_error = Some("no slots".into());
        let a = job_with("a", &stub);

        a.check_state().unwrap();
        assert_eq!(a.submit(), JobState::Failed);
        assert_eq!(a.message(), "no slots");
    }

    #[test]
    fn value_links_write_into_conf_before_submit() {
        let mut producer_stub = Stub::new();
        producer_stub
            .metrics
            .insert(("words".into(), "total".into()), 42);
        let producer = job_with("producer", &producer_stub);

        let consumer_stub = Stub::new();
        let consumer = Job::new(
            JobSpec::new("consumer", ExecutionKind::custom(consumer_stub.clone()))
                .with_conf("LANG", "C"),
        )
        .unwrap();
        assert!(consumer.add_dependency(&producer));
        assert!(consumer.require_metric(&producer, "words", "total", "TOTAL"));
        assert!(consumer.require_metric(&producer, "words", "missing", "MISSING"));

        finish(&producer, &producer_stub, Completion::Succeeded);
        assert_eq!(consumer.check_state().unwrap(), JobState::Ready);
        assert_eq!(consumer.submit(), JobState::Running);

        let seen = consumer_stub.seen_conf.lock().unwrap().clone().unwrap();
        assert_eq!(seen.get("TOTAL").map(String::as_str), Some("42"));
        assert_eq!(seen.get("MISSING").map(String::as_str), Some("0"));
        assert_eq!(seen.get("LANG").map(String::as_str), Some("C"));
        assert_eq!(consumer.conf_value("TOTAL").as_deref(), Some("42"));
    }

    #[test]
    fn assign_id_is_once_only() {
        let (a, _) = job("a");
        a.check_state().unwrap();
        assert!(a.assign_id(0, "g0".into()).is_ok());
        assert_eq!(a.state(), JobState::Waiting);
        assert_eq!(a.assign_id(1, "g1".into()), Err("g1".to_string()));
        assert_eq!(a.id(), Some("g0"));
        assert_eq!(a.seq(), Some(0));
    }

    #[test]
    fn display_lists_dependencies() {
        let (a, _) = job("a");
        let (b, _) = job("b");
        b.add_dependency(&a);
        let text = b.to_string();
        assert!(text.contains("job name:\tb"));
        assert!(text.contains("job id:\tunassigned"));
        assert!(text.contains("dependency 0:\ta"));
    }
}
