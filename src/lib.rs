// src/lib.rs

pub mod cli;
pub mod config;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod fs;
pub mod job;
pub mod logging;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::cli::CliArgs;
use crate::config::JobFile;
use crate::config::loader::load_and_validate;
use crate::engine::JobControl;
use crate::fs::{FileSystem, RealFileSystem};
use crate::job::Job;

/// Outcome of a `jobctl` run, as printed at the end.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// `(id, name)` of every successful job.
    pub succeeded: Vec<(String, String)>,
    /// `(id, name, message)` of every failed job.
    pub failed: Vec<(String, String, String)>,
    /// Jobs that never reached a terminal state (interrupted run).
    pub unfinished: Vec<(String, String)>,
    pub interrupted: bool,
}

impl RunSummary {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && self.unfinished.is_empty() && !self.interrupted
    }

    fn collect(control: &JobControl, interrupted: bool) -> Self {
        let entry = |job: &Arc<Job>| (job.id().unwrap_or_default().to_string(), job.name().to_string());
        let mut unfinished: Vec<_> = control.waiting_jobs().iter().map(entry).collect();
        unfinished.extend(control.ready_jobs().iter().map(entry));
        unfinished.extend(control.running_jobs().iter().map(entry));

        Self {
            succeeded: control.successful_jobs().iter().map(entry).collect(),
            failed: control
                .failed_jobs()
                .iter()
                .map(|job| {
                    let (id, name) = entry(job);
                    (id, name, job.message())
                })
                .collect(),
            unfinished,
            interrupted,
        }
    }
}

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - job file loading
/// - job construction and registration
/// - the scheduler loop
/// - Ctrl-C handling
pub async fn run(args: CliArgs) -> Result<RunSummary> {
    let path = PathBuf::from(&args.jobs);
    let file = load_and_validate(&path)?;
    let fs: Arc<dyn FileSystem> = Arc::new(RealFileSystem);

    if args.dry_run {
        print_dry_run(&file, fs)?;
        return Ok(RunSummary::default());
    }

    let control = JobControl::from_config(&file, fs)?;
    let interval = args
        .poll_interval_ms
        .map(Duration::from_millis)
        .unwrap_or_else(|| file.group().poll_interval());

    info!(
        group = %control.group(),
        jobs = file.jobs().len(),
        interval_ms = interval.as_millis() as u64,
        "running job file"
    );

    let interrupted = tokio::select! {
        res = control.wait_for_completion_every(interval) => {
            res?;
            false
        }
        message = fatal_stop(&control, interval) => {
            anyhow::bail!("scheduler stopped: {message}");
        }
        signal = tokio::signal::ctrl_c() => {
            if let Err(e) = signal {
                warn!(error = %e, "failed to listen for Ctrl+C");
            }
            warn!("interrupted; stopping and killing running jobs");
            control.stop();
            kill_running(&control);
            true
        }
    };

    let summary = RunSummary::collect(&control, interrupted);
    print_summary(control.group(), &summary);
    Ok(summary)
}

/// Resolves once the loop has stopped on a fatal error.
async fn fatal_stop(control: &JobControl, interval: Duration) -> String {
    loop {
        if let Some(message) = control.fatal_error() {
            return message;
        }
        tokio::time::sleep(interval).await;
    }
}

fn kill_running(control: &JobControl) {
    for job in control.running_jobs() {
        if let Err(e) = job.kill() {
            warn!(job = %job.name(), error = %format!("{e:#}"), "kill failed");
        }
    }
}

fn print_summary(group: &str, summary: &RunSummary) {
    println!(
        "jobctl: group '{group}': {} succeeded, {} failed{}",
        summary.succeeded.len(),
        summary.failed.len(),
        if summary.interrupted { " (interrupted)" } else { "" }
    );
    for (id, name) in &summary.succeeded {
        println!("  ok      {id:<8} {name}");
    }
    for (id, name, message) in &summary.failed {
        println!("  FAILED  {id:<8} {name}: {message}");
    }
    for (id, name) in &summary.unfinished {
        println!("  -       {id:<8} {name} (not finished)");
    }
}

/// Simple dry-run output: print jobs, dependencies and value links.
fn print_dry_run(file: &JobFile, fs: Arc<dyn FileSystem>) -> Result<()> {
    // Building checks each job without running anything.
    let jobs = crate::config::build_jobs(file, fs)?;

    println!("jobctl dry-run");
    println!("  group.name = {}", file.group().name);
    println!("  group.poll_interval_ms = {}", file.group().poll_interval_ms);
    println!();

    println!("jobs ({}), in dependency order:", jobs.len());
    for job in &jobs {
        println!("  - {}", job.name());
        println!("      does: {}", job.describe());
        let deps = job.dependencies();
        if !deps.is_empty() {
            let names: Vec<_> = deps.iter().map(|d| d.name()).collect();
            println!("      after: {names:?}");
        }
        for link in job.links() {
            println!(
                "      require: {}/{} from {} -> {}",
                link.group(),
                link.name(),
                link.producer().name(),
                link.key()
            );
        }
        let conf = job.conf();
        if !conf.is_empty() {
            println!("      conf: {conf:?}");
        }
    }

    debug!("dry-run complete (no execution)");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_success_requires_everything_finished() {
        let mut summary = RunSummary::default();
        assert!(summary.is_success());

        summary.unfinished.push(("g0".into(), "a".into()));
        assert!(!summary.is_success());

        summary.unfinished.clear();
        summary.failed.push(("g1".into(), "b".into(), "exit 1".into()));
        assert!(!summary.is_success());
    }
}
