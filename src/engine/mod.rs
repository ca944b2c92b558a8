// src/engine/mod.rs

//! Scheduling engine.
//!
//! - [`registry`]: id assignment, the five state buckets and the three-pass
//!   tick.
//! - [`control`]: the background loop that ticks a registry periodically,
//!   plus suspend / resume / stop and `wait_for_completion`.
//! - [`tick`]: what a single tick changed.

pub mod control;
pub mod registry;
pub mod tick;

pub use control::{DEFAULT_POLL_INTERVAL, DEFAULT_WAIT_INTERVAL, JobControl, ThreadState};
pub use registry::{Bucket, JobRegistry};
pub use tick::TickReport;
