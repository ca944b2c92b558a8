// src/config/model.rs

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

/// Job file exactly as read from TOML, before validation.
///
/// ```toml
/// [group]
/// name = "wc"
/// poll_interval_ms = 500
///
/// [job.clean]
/// kind = "delete"
/// path = "out"
/// recursive = true
/// optional = true
///
/// [job.count]
/// kind = "command"
/// cmd = "wc -w in/*"
/// after = ["clean"]
/// ```
///
/// Use [`JobFile::try_from`] (or `load_and_validate`) to get a checked
/// [`JobFile`].
#[derive(Debug, Clone, Deserialize)]
pub struct RawJobFile {
    #[serde(default)]
    pub group: GroupSection,

    /// All jobs from `[job.<name>]`, keyed by job name.
    #[serde(default)]
    pub job: BTreeMap<String, JobConfig>,
}

/// A validated job file.
///
/// Only constructible through `TryFrom<RawJobFile>`, so holding one means the
/// dependency graph is known to be acyclic and every reference resolves.
#[derive(Debug, Clone)]
pub struct JobFile {
    group: GroupSection,
    job: BTreeMap<String, JobConfig>,
    /// Job names, dependencies first.
    order: Vec<String>,
}

impl JobFile {
    pub(crate) fn new_unchecked(
        group: GroupSection,
        job: BTreeMap<String, JobConfig>,
        order: Vec<String>,
    ) -> Self {
        Self { group, job, order }
    }

    pub fn group(&self) -> &GroupSection {
        &self.group
    }

    pub fn jobs(&self) -> &BTreeMap<String, JobConfig> {
        &self.job
    }

    pub fn job(&self, name: &str) -> Option<&JobConfig> {
        self.job.get(name)
    }

    /// Job names in an order where every job comes after its `after` entries.
    pub fn order(&self) -> &[String] {
        &self.order
    }
}

/// `[group]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct GroupSection {
    /// Prefix of the ids minted for this group (`name + n`).
    #[serde(default = "default_group_name")]
    pub name: String,

    /// Tick interval of the scheduler loop.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_group_name() -> String {
    "jobs".to_string()
}

fn default_poll_interval_ms() -> u64 {
    1000
}

impl GroupSection {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for GroupSection {
    fn default() -> Self {
        Self {
            name: default_group_name(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

/// `[job.<name>]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct JobConfig {
    /// What the job does; selected by the `kind` key.
    #[serde(flatten)]
    pub kind: JobKindConfig,

    /// Jobs this one waits for, checked in the order given.
    #[serde(default)]
    pub after: Vec<String>,

    /// Filesystem kinds only: treat a missing path as success.
    #[serde(default)]
    pub optional: bool,

    /// Initial configuration entries.
    #[serde(default)]
    pub conf: BTreeMap<String, String>,

    /// Value links (`[[job.<name>.require]]`).
    #[serde(default)]
    pub require: Vec<RequireConfig>,
}

impl JobConfig {
    pub fn new(kind: JobKindConfig) -> Self {
        Self {
            kind,
            after: Vec::new(),
            optional: false,
            conf: BTreeMap::new(),
            require: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum JobKindConfig {
    Command {
        cmd: String,
        #[serde(default)]
        inputs: Vec<PathBuf>,
        #[serde(default)]
        create_missing_inputs: bool,
    },
    Rename {
        from: PathBuf,
        to: PathBuf,
    },
    Delete {
        path: PathBuf,
        #[serde(default)]
        recursive: bool,
    },
    Copy {
        from: PathBuf,
        to: PathBuf,
    },
}

impl JobKindConfig {
    pub fn name(&self) -> &'static str {
        match self {
            JobKindConfig::Command { .. } => "command",
            JobKindConfig::Rename { .. } => "rename",
            JobKindConfig::Delete { .. } => "delete",
            JobKindConfig::Copy { .. } => "copy",
        }
    }
}

/// One `[[job.<name>.require]]` entry: copy metric `group/name` of
/// `producer` into this job's `conf[key]` before it is submitted.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RequireConfig {
    pub producer: String,
    pub group: String,
    pub name: String,
    pub key: String,
}
