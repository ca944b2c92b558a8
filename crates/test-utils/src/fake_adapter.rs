use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use jobctl::exec::{Completion, ExecutionKind, JobAdapter, JobConf};

/// Names of fake jobs in the order they were submitted, shared across fakes.
pub type SubmissionLog = Arc<Mutex<Vec<String>>>;

#[derive(Debug)]
struct FakeState {
    /// Outcome reported once `polls_needed` polls have happened.
    outcome: Completion,
    /// `None` keeps the job running until [`FakeAdapter::finish`].
    polls_needed: Option<usize>,
    submit_error: Option<String>,
    poll_error: Option<String>,
    metrics: HashMap<(String, String), i64>,
    submits: usize,
    polls: usize,
    kills: usize,
    seen_conf: Option<JobConf>,
}

/// A scriptable execution for scheduler tests.
///
/// Clones share state, so keep one clone as a handle and hand another to
/// the job via [`FakeAdapter::kind`].
#[derive(Debug, Clone)]
pub struct FakeAdapter {
    name: String,
    state: Arc<Mutex<FakeState>>,
    log: Option<SubmissionLog>,
}

impl FakeAdapter {
    fn with_script(name: &str, outcome: Completion, polls_needed: Option<usize>) -> Self {
        Self {
            name: name.to_string(),
            state: Arc::new(Mutex::new(FakeState {
                outcome,
                polls_needed,
                submit_error: None,
                poll_error: None,
                metrics: HashMap::new(),
                submits: 0,
                polls: 0,
                kills: 0,
                seen_conf: None,
            })),
            log: None,
        }
    }

    /// Succeeds on the first poll after submission.
    pub fn succeeding(name: &str) -> Self {
        Self::with_script(name, Completion::Succeeded, Some(1))
    }

    /// Fails with `message` on the first poll after submission.
    pub fn failing(name: &str, message: &str) -> Self {
        Self::with_script(name, Completion::Failed(message.to_string()), Some(1))
    }

    /// Stays running until [`finish`](Self::finish) is called.
    pub fn manual(name: &str) -> Self {
        Self::with_script(name, Completion::Running, None)
    }

    /// Report the outcome only on the `n`-th poll.
    pub fn after_polls(self, n: usize) -> Self {
        self.state.lock().unwrap().polls_needed = Some(n);
        self
    }

    pub fn with_metric(self, group: &str, name: &str, value: i64) -> Self {
        self.set_metric(group, name, value);
        self
    }

    pub fn failing_submit(self, message: &str) -> Self {
        self.state.lock().unwrap().submit_error = Some(message.to_string());
        self
    }

    /// Every poll returns an error (a broken adapter, not a failed job).
    pub fn failing_poll(self, message: &str) -> Self {
        self.state.lock().unwrap().poll_error = Some(message.to_string());
        self
    }

    pub fn logging_to(mut self, log: &SubmissionLog) -> Self {
        self.log = Some(Arc::clone(log));
        self
    }

    /// A clone of this fake wrapped as an execution kind.
    pub fn kind(&self) -> ExecutionKind {
        ExecutionKind::custom(self.clone())
    }

    /// Let a manual fake finish on its next poll.
    pub fn finish(&self, outcome: Completion) {
        let mut state = self.state.lock().unwrap();
        state.outcome = outcome;
        state.polls_needed = Some(0);
    }

    pub fn set_metric(&self, group: &str, name: &str, value: i64) {
        self.state
            .lock()
            .unwrap()
            .metrics
            .insert((group.to_string(), name.to_string()), value);
    }

    pub fn submits(&self) -> usize {
        self.state.lock().unwrap().submits
    }

    pub fn polls(&self) -> usize {
        self.state.lock().unwrap().polls
    }

    pub fn kills(&self) -> usize {
        self.state.lock().unwrap().kills
    }

    /// Configuration passed to the last submit.
    pub fn seen_conf(&self) -> Option<JobConf> {
        self.state.lock().unwrap().seen_conf.clone()
    }
}

impl JobAdapter for FakeAdapter {
    fn submit(&mut self, conf: &JobConf) -> anyhow::Result<()> {
        let mut state = self.state.lock().unwrap();
        state.submits += 1;
        state.seen_conf = Some(conf.clone());
        if let Some(message) = &state.submit_error {
            anyhow::bail!("{message}");
        }
        if let Some(log) = &self.log {
            log.lock().unwrap().push(self.name.clone());
        }
        Ok(())
    }

    fn poll_completion(&mut self) -> anyhow::Result<Completion> {
        let mut state = self.state.lock().unwrap();
        state.polls += 1;
        if let Some(message) = &state.poll_error {
            anyhow::bail!("{message}");
        }
        match state.polls_needed {
            Some(n) if state.polls >= n => Ok(state.outcome.clone()),
            _ => Ok(Completion::Running),
        }
    }

    fn kill(&mut self) -> anyhow::Result<()> {
        self.state.lock().unwrap().kills += 1;
        Ok(())
    }

    fn metric(&self, group: &str, name: &str) -> anyhow::Result<i64> {
        let state = self.state.lock().unwrap();
        Ok(state
            .metrics
            .get(&(group.to_string(), name.to_string()))
            .copied()
            .unwrap_or(0))
    }

    fn describe(&self) -> String {
        format!("fake {}", self.name)
    }
}
