// src/config/mod.rs

//! Job file loading and validation.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a job file from disk (`loader.rs`).
//! - Validate references and acyclicity (`validate.rs`).
//! - Turn a validated file into wired, registered jobs (`build.rs`).

pub mod build;
pub mod loader;
pub mod model;
pub mod validate;

pub use build::build_jobs;
pub use loader::{load_and_validate, load_from_path, parse_str};
pub use model::{GroupSection, JobConfig, JobFile, JobKindConfig, RawJobFile, RequireConfig};
