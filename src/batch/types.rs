//! Batch data types
//!
//! Job descriptors, per-job results, pool configuration and the statistics
//! tallied once a batch has finished.

use std::ops::Deref;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::engine::{LAUNCH_FAILURE_EXIT_CODE, LOST_RESULT_EXIT_CODE, TIMEOUT_EXIT_CODE};

/// One executable unit of work.
///
/// The identifier is opaque passthrough data: the executor copies it into the
/// matching [`JobResult`] and never interprets it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobDescriptor {
    /// Caller-supplied identifier, echoed in the result
    pub identifier: String,
    /// Executable name or path
    pub command: String,
    /// Arguments passed to the command verbatim
    pub args: Vec<String>,
}

impl JobDescriptor {
    /// Create a descriptor from its parts
    pub fn new(
        identifier: impl Into<String>,
        command: impl Into<String>,
        args: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            identifier: identifier.into(),
            command: command.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Command line rendered for log messages
    pub fn display_command(&self) -> String {
        if self.args.is_empty() {
            self.command.clone()
        } else {
            format!("{} {}", self.command, self.args.join(" "))
        }
    }
}

/// The validated input batch.
///
/// Read-only once loaded; cloning shares the same backing slice, so worker
/// slots can index into it without synchronization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSet {
    jobs: Arc<[JobDescriptor]>,
}

impl JobSet {
    /// Identifiers in dispatch order
    pub fn identifiers(&self) -> Vec<&str> {
        self.jobs.iter().map(|job| job.identifier.as_str()).collect()
    }
}

impl Default for JobSet {
    fn default() -> Self {
        Self::from(Vec::new())
    }
}

impl Deref for JobSet {
    type Target = [JobDescriptor];

    fn deref(&self) -> &Self::Target {
        &self.jobs
    }
}

impl From<Vec<JobDescriptor>> for JobSet {
    fn from(jobs: Vec<JobDescriptor>) -> Self {
        Self { jobs: jobs.into() }
    }
}

impl FromIterator<JobDescriptor> for JobSet {
    fn from_iter<I: IntoIterator<Item = JobDescriptor>>(iter: I) -> Self {
        Self { jobs: iter.into_iter().collect() }
    }
}

/// Outcome of one job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobResult {
    /// Identifier copied from the descriptor
    pub identifier: String,
    /// Real exit status, or one of the reserved codes in [`crate::engine`]
    pub exit_code: i32,
    /// Captured standard output; absent when the process printed nothing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_body: Option<String>,
}

impl JobResult {
    /// Create a result from its parts
    pub fn new(identifier: impl Into<String>, exit_code: i32, result_body: Option<String>) -> Self {
        Self {
            identifier: identifier.into(),
            exit_code,
            result_body,
        }
    }

    /// Result for a process that could not be started
    pub fn launch_failure(identifier: impl Into<String>, diagnostic: impl Into<String>) -> Self {
        Self::new(identifier, LAUNCH_FAILURE_EXIT_CODE, Some(diagnostic.into()))
    }

    /// Result for a process killed because its deadline expired
    pub fn timed_out(identifier: impl Into<String>, deadline: Duration) -> Self {
        Self::new(
            identifier,
            TIMEOUT_EXIT_CODE,
            Some(format!("timed out after {:.3}s and was killed", deadline.as_secs_f64())),
        )
    }

    /// Placeholder for a descriptor whose slot never reported back
    pub fn lost(identifier: impl Into<String>) -> Self {
        Self::new(
            identifier,
            LOST_RESULT_EXIT_CODE,
            Some("worker slot terminated before reporting a result".to_string()),
        )
    }

    /// Whether the process ran and exited with status 0
    pub fn is_success(&self) -> bool {
        self.exit_code == 0
    }

    /// Result body, treating an absent body as empty
    pub fn body(&self) -> &str {
        self.result_body.as_deref().unwrap_or_default()
    }
}

/// One result per input descriptor, in input order
pub type BatchResult = Vec<JobResult>;

/// Worker pool configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchConfig {
    /// Maximum number of child processes running at once
    pub concurrency_limit: usize,
    /// Optional per-job deadline
    pub timeout: Option<Duration>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            concurrency_limit: default_concurrency_limit(),
            timeout: None,
        }
    }
}

/// Concurrency limit used when none is configured: one slot per logical CPU
pub fn default_concurrency_limit() -> usize {
    num_cpus::get().max(1)
}

/// Progress callback type, called with `(completed, total)`
pub type ProgressCallback = Box<dyn Fn(usize, usize) + Send + Sync>;

/// Batch execution statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchStats {
    /// Jobs in the batch
    pub total_jobs: usize,
    /// Jobs that exited with status 0
    pub succeeded: usize,
    /// Jobs that ran and exited non-zero or were killed by a signal
    pub failed: usize,
    /// Jobs whose command could not be started
    pub launch_failures: usize,
    /// Jobs killed at their deadline
    pub timed_out: usize,
    /// Jobs that never produced a usable outcome
    pub lost: usize,
}

impl BatchStats {
    /// Tally a finished batch
    pub fn from_results(results: &[JobResult]) -> Self {
        let mut stats = Self {
            total_jobs: results.len(),
            ..Default::default()
        };

        for result in results {
            match result.exit_code {
                0 => stats.succeeded += 1,
                LAUNCH_FAILURE_EXIT_CODE => stats.launch_failures += 1,
                TIMEOUT_EXIT_CODE => stats.timed_out += 1,
                LOST_RESULT_EXIT_CODE => stats.lost += 1,
                _ => stats.failed += 1,
            }
        }

        stats
    }
}
