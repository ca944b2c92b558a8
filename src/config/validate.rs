// src/config/validate.rs

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use crate::config::model::{JobFile, JobKindConfig, RawJobFile};
use crate::errors::{JobctlError, Result};

impl TryFrom<RawJobFile> for JobFile {
    type Error = JobctlError;

    fn try_from(raw: RawJobFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_job_file(&raw)?;
        let order = dependency_order(&raw)?;
        Ok(JobFile::new_unchecked(raw.group, raw.job, order))
    }
}

fn validate_raw_job_file(file: &RawJobFile) -> Result<()> {
    ensure_has_jobs(file)?;
    validate_group(file)?;
    validate_job_kinds(file)?;
    validate_job_dependencies(file)?;
    validate_value_links(file)?;
    Ok(())
}

fn ensure_has_jobs(file: &RawJobFile) -> Result<()> {
    if file.job.is_empty() {
        return Err(JobctlError::ConfigError(
            "job file must contain at least one [job.<name>] section".to_string(),
        ));
    }
    Ok(())
}

fn validate_group(file: &RawJobFile) -> Result<()> {
    if file.group.name.trim().is_empty() {
        return Err(JobctlError::ConfigError(
            "[group].name must not be empty".to_string(),
        ));
    }
    if file.group.poll_interval_ms == 0 {
        return Err(JobctlError::ConfigError(
            "[group].poll_interval_ms must be >= 1 (got 0)".to_string(),
        ));
    }
    Ok(())
}

fn validate_job_kinds(file: &RawJobFile) -> Result<()> {
    for (name, job) in file.job.iter() {
        match &job.kind {
            JobKindConfig::Command { cmd, .. } => {
                if cmd.trim().is_empty() {
                    return Err(JobctlError::ConfigError(format!(
                        "job '{name}' has an empty `cmd`"
                    )));
                }
                if job.optional {
                    return Err(JobctlError::ConfigError(format!(
                        "job '{name}': `optional` only applies to filesystem jobs"
                    )));
                }
            }
            JobKindConfig::Rename { from, to } | JobKindConfig::Copy { from, to } => {
                if from == to {
                    return Err(JobctlError::ConfigError(format!(
                        "job '{name}': `from` and `to` are the same path"
                    )));
                }
            }
            JobKindConfig::Delete { .. } => {}
        }
    }
    Ok(())
}

fn validate_job_dependencies(file: &RawJobFile) -> Result<()> {
    for (name, job) in file.job.iter() {
        for dep in job.after.iter() {
            if dep == name {
                return Err(JobctlError::ConfigError(format!(
                    "job '{name}' cannot depend on itself in `after`"
                )));
            }
            if !file.job.contains_key(dep) {
                return Err(JobctlError::ConfigError(format!(
                    "job '{name}' has unknown dependency '{dep}' in `after`"
                )));
            }
        }
    }
    Ok(())
}

fn validate_value_links(file: &RawJobFile) -> Result<()> {
    for (name, job) in file.job.iter() {
        for require in job.require.iter() {
            if require.producer == *name {
                return Err(JobctlError::ConfigError(format!(
                    "job '{name}' cannot require a metric from itself"
                )));
            }
            if !file.job.contains_key(&require.producer) {
                return Err(JobctlError::ConfigError(format!(
                    "job '{name}' requires a metric from unknown job '{}'",
                    require.producer
                )));
            }
            if require.key.trim().is_empty() {
                return Err(JobctlError::ConfigError(format!(
                    "job '{name}': `require.key` must not be empty"
                )));
            }
        }
    }
    Ok(())
}

/// Topological order of the jobs; fails on cycles.
fn dependency_order(file: &RawJobFile) -> Result<Vec<String>> {
    // Edge direction: dep -> job. For
    //   [job.B]
    //   after = ["A"]
    // we add edge A -> B.
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();

    for name in file.job.keys() {
        graph.add_node(name.as_str());
    }
    for (name, job) in file.job.iter() {
        for dep in job.after.iter() {
            graph.add_edge(dep.as_str(), name.as_str(), ());
        }
    }

    match toposort(&graph, None) {
        Ok(order) => Ok(order.into_iter().map(str::to_string).collect()),
        Err(cycle) => Err(JobctlError::DagCycle(format!(
            "cycle detected in job graph involving job '{}'",
            cycle.node_id()
        ))),
    }
}
