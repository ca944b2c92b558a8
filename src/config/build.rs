// src/config/build.rs

//! Turn a validated [`JobFile`] into jobs with their dependencies and value
//! links wired.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::config::model::{JobConfig, JobFile, JobKindConfig};
use crate::errors::{JobctlError, Result};
use crate::exec::{CommandSpec, ExecutionKind, FsAction, FsOp};
use crate::fs::FileSystem;
use crate::job::{Job, JobSpec};

/// Build every job of `file`, dependencies first.
///
/// Dependencies are added in the order of each job's `after` list, value
/// links in the order of its `require` entries. Filesystem jobs act on `fs`.
pub fn build_jobs(file: &JobFile, fs: Arc<dyn FileSystem>) -> Result<Vec<Arc<Job>>> {
    let mut built: HashMap<&str, Arc<Job>> = HashMap::new();
    let mut ordered = Vec::with_capacity(file.order().len());

    for name in file.order() {
        let config = file
            .job(name)
            .ok_or_else(|| JobctlError::ConfigError(format!("job '{name}' missing from file")))?;

        let job = Job::new(job_spec(name, config, Arc::clone(&fs)))?;

        for dep_name in &config.after {
            let dep = lookup(&built, name, dep_name)?;
            if !job.add_dependency(dep) {
                return Err(JobctlError::ConfigError(format!(
                    "job '{name}': could not add dependency '{dep_name}'"
                )));
            }
        }

        // Producers are not necessarily dependencies, so they may come later
        // in the order; links are wired in a second pass.
        built.insert(name.as_str(), Arc::clone(&job));
        ordered.push(job);
    }

    for job in &ordered {
        let Some(config) = file.job(job.name()) else {
            continue;
        };
        for require in &config.require {
            let producer = lookup(&built, job.name(), &require.producer)?;
            if !job.require_metric(producer, &require.group, &require.name, &require.key) {
                return Err(JobctlError::ConfigError(format!(
                    "job '{}': could not link metric {}/{} from '{}'",
                    job.name(),
                    require.group,
                    require.name,
                    require.producer
                )));
            }
        }
    }

    debug!(jobs = ordered.len(), "built jobs from file");
    Ok(ordered)
}

fn lookup<'a>(built: &'a HashMap<&str, Arc<Job>>, job: &str, wanted: &str) -> Result<&'a Arc<Job>> {
    built.get(wanted).ok_or_else(|| {
        JobctlError::ConfigError(format!("job '{job}' refers to unknown job '{wanted}'"))
    })
}

fn job_spec(name: &str, config: &JobConfig, fs: Arc<dyn FileSystem>) -> JobSpec {
    let kind = match &config.kind {
        JobKindConfig::Command {
            cmd,
            inputs,
            create_missing_inputs,
        } => ExecutionKind::command(
            fs,
            CommandSpec {
                cmd: cmd.clone(),
                inputs: inputs.clone(),
                create_missing_inputs: *create_missing_inputs,
            },
        ),
        JobKindConfig::Rename { from, to } => fs_kind(
            fs,
            FsOp::Rename {
                from: from.clone(),
                to: to.clone(),
            },
            config.optional,
        ),
        JobKindConfig::Delete { path, recursive } => fs_kind(
            fs,
            FsOp::Delete {
                path: path.clone(),
                recursive: *recursive,
            },
            config.optional,
        ),
        JobKindConfig::Copy { from, to } => fs_kind(
            fs,
            FsOp::Copy {
                from: from.clone(),
                to: to.clone(),
            },
            config.optional,
        ),
    };

    let mut spec = JobSpec::new(name, kind);
    spec.conf = config.conf.clone();
    spec
}

fn fs_kind(fs: Arc<dyn FileSystem>, op: FsOp, optional: bool) -> ExecutionKind {
    ExecutionKind::Fs(FsAction::new(fs, op, optional))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::loader::parse_str;
    use crate::fs::MockFileSystem;
    use crate::job::JobState;

    fn file(toml: &str) -> JobFile {
        JobFile::try_from(parse_str(toml).unwrap()).unwrap()
    }

    #[test]
    fn wires_dependencies_in_declared_order() {
        let file = file(
            r#"
[job.a]
kind = "delete"
path = "a"

[job.b]
kind = "delete"
path = "b"

[job.c]
kind = "copy"
from = "x"
to = "y"
after = ["b", "a"]
"#,
        );
        let jobs = build_jobs(&file, Arc::new(MockFileSystem::new())).unwrap();

        let c = jobs.iter().find(|j| j.name() == "c").unwrap();
        let deps: Vec<_> = c.dependencies().iter().map(|d| d.name().to_string()).collect();
        assert_eq!(deps, vec!["b", "a"]);
        assert!(jobs.iter().all(|j| j.state() == JobState::Waiting));
        assert_eq!(jobs.last().map(|j| j.name()), Some("c"));
    }

    #[test]
    fn wires_value_links_and_conf() {
        let file = file(
            r#"
[job.scan]
kind = "command"
cmd = "echo 'metric words total 3'"

[job.report]
kind = "command"
cmd = "echo $TOTAL"
after = ["scan"]
conf = { MODE = "fast" }

[[job.report.require]]
producer = "scan"
group = "words"
name = "total"
key = "TOTAL"
"#,
        );
        let jobs = build_jobs(&file, Arc::new(MockFileSystem::new())).unwrap();

        let report = jobs.iter().find(|j| j.name() == "report").unwrap();
        let links = report.links();
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].producer().name(), "scan");
        assert_eq!(links[0].key(), "TOTAL");
        assert_eq!(report.conf_value("MODE").as_deref(), Some("fast"));
    }

    #[test]
    fn optional_flag_reaches_fs_actions() {
        let file = file(
            r#"
[job.tidy]
kind = "rename"
from = "a"
to = "b"
optional = true
"#,
        );
        let jobs = build_jobs(&file, Arc::new(MockFileSystem::new())).unwrap();
        assert_eq!(jobs[0].describe(), "rename a to b (optional)");
    }
}
