// tests/config_validation.rs

mod common;
use crate::common::builders::{JobConfigBuilder, JobFileBuilder};

use std::sync::Arc;

use jobctl::config::{JobFile, load_and_validate};
use jobctl::engine::JobControl;
use jobctl::errors::JobctlError;
use jobctl::fs::MockFileSystem;

#[test]
fn unknown_dependency_is_rejected() {
    let raw = JobFileBuilder::new()
        .with_job("a", JobConfigBuilder::command("true").after("ghost").build())
        .build_raw();

    let err = JobFile::try_from(raw).unwrap_err();
    assert!(matches!(err, JobctlError::ConfigError(ref m) if m.contains("ghost")));
}

#[test]
fn self_dependency_is_rejected() {
    let raw = JobFileBuilder::new()
        .with_job("a", JobConfigBuilder::command("true").after("a").build())
        .build_raw();

    assert!(matches!(JobFile::try_from(raw), Err(JobctlError::ConfigError(_))));
}

#[test]
fn cycle_is_rejected() {
    let raw = JobFileBuilder::new()
        .with_job("a", JobConfigBuilder::command("true").after("c").build())
        .with_job("b", JobConfigBuilder::command("true").after("a").build())
        .with_job("c", JobConfigBuilder::command("true").after("b").build())
        .build_raw();

    assert!(matches!(JobFile::try_from(raw), Err(JobctlError::DagCycle(_))));
}

#[test]
fn self_link_is_rejected() {
    let raw = JobFileBuilder::new()
        .with_job("a", JobConfigBuilder::command("true").require("a", "g", "n", "K").build())
        .build_raw();

    assert!(JobFile::try_from(raw).is_err());
}

#[test]
fn empty_group_name_is_rejected() {
    let raw = JobFileBuilder::new()
        .group("")
        .with_job("a", JobConfigBuilder::command("true").build())
        .build_raw();

    assert!(JobFile::try_from(raw).is_err());
}

#[test]
fn copy_onto_itself_is_rejected() {
    let raw = JobFileBuilder::new()
        .with_job("a", JobConfigBuilder::copy("x", "x").build())
        .build_raw();

    assert!(JobFile::try_from(raw).is_err());
}

#[test]
fn registered_ids_follow_dependency_order() {
    let file = JobFileBuilder::new()
        .group("etl")
        .with_job("load", JobConfigBuilder::delete("l", false).after("transform").build())
        .with_job("extract", JobConfigBuilder::delete("e", false).build())
        .with_job("transform", JobConfigBuilder::delete("t", false).after("extract").build())
        .build();

    let control = JobControl::from_config(&file, Arc::new(MockFileSystem::new())).unwrap();
    let ids: Vec<_> = control
        .waiting_jobs()
        .iter()
        .map(|j| (j.id().unwrap().to_string(), j.name().to_string()))
        .collect();

    assert_eq!(
        ids,
        vec![
            ("etl0".to_string(), "extract".to_string()),
            ("etl1".to_string(), "transform".to_string()),
            ("etl2".to_string(), "load".to_string()),
        ]
    );
}

#[test]
fn missing_file_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = load_and_validate(dir.path().join("nope.toml")).unwrap_err();
    assert!(matches!(err, JobctlError::IoError(_)));
}
