//! Job execution engine
//!
//! This module runs a single job descriptor to completion and turns every
//! outcome, including failures to start, into a [`JobResult`].

use async_trait::async_trait;

use crate::batch::{JobDescriptor, JobResult};

pub mod process_runner;

pub use process_runner::{trim_trailing_newline, ProcessRunner};

/// Exit code reported when the command could not be started at all.
///
/// Negative, so it can never collide with a real process exit status.
pub const LAUNCH_FAILURE_EXIT_CODE: i32 = -1;

/// Exit code reported when a job outlived its deadline and was killed
pub const TIMEOUT_EXIT_CODE: i32 = -2;

/// Exit code reported when a job never produced a usable outcome: its worker
/// slot died, or the process started but its exit status could not be collected
pub const LOST_RESULT_EXIT_CODE: i32 = -3;

/// Runs one job and reports its outcome.
///
/// Implementations must not fail: every error is folded into the returned
/// [`JobResult`] so that one job can never abort its siblings.
#[async_trait]
pub trait JobRunner: Send + Sync {
    /// Execute a job
    async fn run(&self, job: &JobDescriptor) -> JobResult;
}
