#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use jobctl::engine::JobControl;
use jobctl::job::{Job, JobSpec};

pub use jobctl_test_utils::builders;
pub use jobctl_test_utils::{FakeAdapter, SubmissionLog, init_tracing, wait_until, with_timeout};

/// Tick interval used by loop-driven tests.
pub const FAST: Duration = Duration::from_millis(5);

/// A job wrapping a clone of `fake`.
pub fn fake_job(name: &str, fake: &FakeAdapter) -> Arc<Job> {
    Job::new(JobSpec::new(name, fake.kind())).expect("fake job is valid")
}

/// A control with a fast tick interval.
pub fn fast_control(group: &str) -> JobControl {
    let control = JobControl::new(group);
    control.set_poll_interval(FAST);
    control
}

pub fn names(jobs: &[Arc<Job>]) -> Vec<String> {
    jobs.iter().map(|j| j.name().to_string()).collect()
}
