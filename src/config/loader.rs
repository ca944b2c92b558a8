// src/config/loader.rs

use std::fs;
use std::path::Path;

use crate::config::model::{JobFile, RawJobFile};
use crate::errors::Result;

/// Load a job file from a given path and return the raw `RawJobFile`.
///
/// This only performs TOML deserialization; it does **not** perform semantic
/// validation (unknown references, cycles, etc.). Use [`load_and_validate`]
/// for that.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawJobFile> {
    let contents = fs::read_to_string(path.as_ref())?;
    parse_str(&contents)
}

/// Deserialize job file contents already in memory.
pub fn parse_str(contents: &str) -> Result<RawJobFile> {
    let file: RawJobFile = toml::from_str(contents)?;
    Ok(file)
}

/// Load a job file from path and validate it.
///
/// - Reads TOML.
/// - Applies defaults (handled by `serde` default functions).
/// - Checks for:
///   - unknown `after` and `require.producer` references,
///   - dependency cycles,
///   - basic `[group]` sanity.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<JobFile> {
    let raw = load_from_path(path)?;
    JobFile::try_from(raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::model::JobKindConfig;
    use std::path::PathBuf;

    const SAMPLE: &str = r#"
[group]
name = "wc"
poll_interval_ms = 250

[job.clean]
kind = "delete"
path = "out"
recursive = true
optional = true

[job.count]
kind = "command"
cmd = "wc -w in/*"
after = ["clean"]
inputs = ["in"]
create_missing_inputs = true
conf = { LANG = "C" }

[[job.count.require]]
producer = "clean"
group = "fs"
name = "removed"
key = "REMOVED"
"#;

    #[test]
    fn parses_sample_file() {
        let raw = parse_str(SAMPLE).unwrap();
        assert_eq!(raw.group.name, "wc");
        assert_eq!(raw.group.poll_interval_ms, 250);

        let clean = &raw.job["clean"];
        assert!(clean.optional);
        assert_eq!(
            clean.kind,
            JobKindConfig::Delete {
                path: PathBuf::from("out"),
                recursive: true
            }
        );

        let count = &raw.job["count"];
        assert_eq!(count.after, vec!["clean"]);
        assert_eq!(count.conf.get("LANG").map(String::as_str), Some("C"));
        assert_eq!(count.require.len(), 1);
        assert_eq!(count.require[0].key, "REMOVED");
        match &count.kind {
            JobKindConfig::Command {
                inputs,
                create_missing_inputs,
                ..
            } => {
                assert_eq!(inputs, &vec![PathBuf::from("in")]);
                assert!(create_missing_inputs);
            }
            other => panic!("unexpected kind {other:?}"),
        }
    }

    #[test]
    fn group_section_is_optional() {
        let raw = parse_str("[job.a]\nkind = \"command\"\ncmd = \"true\"\n").unwrap();
        assert_eq!(raw.group.name, "jobs");
        assert_eq!(raw.group.poll_interval_ms, 1000);
    }

    #[test]
    fn unknown_kind_is_a_parse_error() {
        let err = parse_str("[job.a]\nkind = \"teleport\"\n").unwrap_err();
        assert!(matches!(err, crate::errors::JobctlError::TomlError(_)));
    }

    #[test]
    fn loads_and_validates_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jobs.toml");
        std::fs::write(&path, SAMPLE).unwrap();

        let file = load_and_validate(&path).unwrap();
        assert_eq!(file.order(), ["clean", "count"]);
    }
}
