// src/job/link.rs

//! Value propagation links: "before I submit, copy metric X of job P into my
//! configuration under key K".

use std::sync::Arc;

use anyhow::Result;

use super::Job;

/// A declared pull of a named metric from a producer job.
///
/// The producer is *not* required to be one of the consumer's dependencies,
/// and nothing checks that it has reached `SUCCESS` when the link is
/// resolved. Wiring a dependency edge so the producer finishes first is the
/// caller's job; resolving against an unfinished producer yields whatever its
/// execution reports at that moment (partial counters, zero, or an error that
/// fails the consumer's submission).
#[derive(Debug, Clone)]
pub struct ValueLink {
    producer: Arc<Job>,
    group: String,
    name: String,
    key: String,
}

impl ValueLink {
    pub(crate) fn new(producer: Arc<Job>, group: String, name: String, key: String) -> Self {
        Self {
            producer,
            group,
            name,
            key,
        }
    }

    pub fn producer(&self) -> &Arc<Job> {
        &self.producer
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Configuration key the value is written to.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Read the metric from the producer's execution.
    pub fn resolve(&self) -> Result<i64> {
        self.producer.metric(&self.group, &self.name)
    }
}
