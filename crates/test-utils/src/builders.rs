#![allow(dead_code)]

use std::collections::BTreeMap;

use jobctl::config::{GroupSection, JobConfig, JobFile, JobKindConfig, RawJobFile, RequireConfig};

/// Builder for `JobFile` to simplify test setup.
pub struct JobFileBuilder {
    file: RawJobFile,
}

impl JobFileBuilder {
    pub fn new() -> Self {
        Self {
            file: RawJobFile {
                group: GroupSection::default(),
                job: BTreeMap::new(),
            },
        }
    }

    pub fn group(mut self, name: &str) -> Self {
        self.file.group.name = name.to_string();
        self
    }

    pub fn poll_interval_ms(mut self, ms: u64) -> Self {
        self.file.group.poll_interval_ms = ms;
        self
    }

    pub fn with_job(mut self, name: &str, job: JobConfig) -> Self {
        self.file.job.insert(name.to_string(), job);
        self
    }

    pub fn build_raw(self) -> RawJobFile {
        self.file
    }

    pub fn build(self) -> JobFile {
        JobFile::try_from(self.file).expect("Failed to build valid job file from builder")
    }
}

impl Default for JobFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `JobConfig`.
pub struct JobConfigBuilder {
    job: JobConfig,
}

impl JobConfigBuilder {
    pub fn command(cmd: &str) -> Self {
        Self::kind(JobKindConfig::Command {
            cmd: cmd.to_string(),
            inputs: Vec::new(),
            create_missing_inputs: false,
        })
    }

    pub fn rename(from: &str, to: &str) -> Self {
        Self::kind(JobKindConfig::Rename {
            from: from.into(),
            to: to.into(),
        })
    }

    pub fn delete(path: &str, recursive: bool) -> Self {
        Self::kind(JobKindConfig::Delete {
            path: path.into(),
            recursive,
        })
    }

    pub fn copy(from: &str, to: &str) -> Self {
        Self::kind(JobKindConfig::Copy {
            from: from.into(),
            to: to.into(),
        })
    }

    fn kind(kind: JobKindConfig) -> Self {
        Self {
            job: JobConfig::new(kind),
        }
    }

    pub fn after(mut self, dep: &str) -> Self {
        self.job.after.push(dep.to_string());
        self
    }

    pub fn optional(mut self) -> Self {
        self.job.optional = true;
        self
    }

    pub fn conf(mut self, key: &str, value: &str) -> Self {
        self.job.conf.insert(key.to_string(), value.to_string());
        self
    }

    pub fn require(mut self, producer: &str, group: &str, name: &str, key: &str) -> Self {
        self.job.require.push(RequireConfig {
            producer: producer.to_string(),
            group: group.to_string(),
            name: name.to_string(),
            key: key.to_string(),
        });
        self
    }

    pub fn build(self) -> JobConfig {
        self.job
    }
}
