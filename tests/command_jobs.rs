// tests/command_jobs.rs
#![cfg(unix)]

mod common;
use crate::common::builders::{JobConfigBuilder, JobFileBuilder};
use crate::common::{init_tracing, with_timeout};

use std::sync::Arc;
use std::time::Duration;

use jobctl::engine::JobControl;
use jobctl::fs::RealFileSystem;
use jobctl::job::JobState;

#[tokio::test]
async fn counters_flow_from_producer_command_to_consumer_environment() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("total.txt");

    let file = JobFileBuilder::new()
        .group("wc")
        .with_job(
            "count",
            JobConfigBuilder::command(
                "echo 'metric words total 3'; echo 'metric words total 4'; echo done",
            )
            .build(),
        )
        .with_job(
            "report",
            JobConfigBuilder::command(&format!("echo \"$TOTAL $MODE\" > '{}'", out.display()))
                .after("count")
                .conf("MODE", "fast")
                .require("count", "words", "total", "TOTAL")
                .build(),
        )
        .build();

    let control = JobControl::from_config(&file, Arc::new(RealFileSystem)).unwrap();
    with_timeout(control.wait_for_completion_every(Duration::from_millis(10)))
        .await
        .unwrap();

    assert_eq!(control.successful_jobs().len(), 2);
    assert_eq!(std::fs::read_to_string(&out).unwrap().trim(), "7 fast");
}

#[tokio::test]
async fn failing_command_fails_its_dependents() {
    let file = JobFileBuilder::new()
        .with_job("broken", JobConfigBuilder::command("echo 'no input' >&2; exit 4").build())
        .with_job("next", JobConfigBuilder::command("true").after("broken").build())
        .build();

    let control = JobControl::from_config(&file, Arc::new(RealFileSystem)).unwrap();
    with_timeout(control.wait_for_completion_every(Duration::from_millis(10)))
        .await
        .unwrap();

    let failed = control.failed_jobs();
    assert_eq!(failed.len(), 2);
    let broken = failed.iter().find(|j| j.name() == "broken").unwrap();
    assert_eq!(broken.state(), JobState::Failed);
    assert!(broken.message().contains("no input"), "{}", broken.message());
    let next = failed.iter().find(|j| j.name() == "next").unwrap();
    assert_eq!(next.state(), JobState::DependentFailed);
    assert!(next.message().contains("with jobID jobs0 failed."), "{}", next.message());
}
