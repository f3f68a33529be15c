//! # workerpool
//!
//! A single-shot batch executor: it takes a batch of independent job
//! descriptors, runs each one as an isolated child process with an upper bound
//! on how many run at once, and reports one structured result per job.
//!
//! ## Overview
//!
//! Callers serialize job descriptors as a JSON array, invoke the executor and
//! parse the JSON array it prints as its last line of output. The executor
//! never retries and never drops a job: every descriptor yields exactly one
//! result, in input order, even when its command could not be started.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use workerpool::batch::{BatchExecutor, ResultAggregator};
//! use workerpool::input::decode_jobs;
//!
//! # async fn example() -> workerpool::Result<()> {
//! let jobs = decode_jobs(r#"[
//!     {"identifier": "a", "command": "echo", "args": ["hi"]},
//!     {"identifier": "b", "command": "false", "args": []}
//! ]"#)?;
//!
//! let results = BatchExecutor::new()
//!     .with_concurrency_limit(2)
//!     .execute_batch(jobs)
//!     .await?;
//!
//! println!("{}", ResultAggregator::encode(&results)?);
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`input`]: loading and validating the encoded batch
//! - [`engine`]: running one job as a child process
//! - [`batch`]: the bounded worker pool and result aggregation

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

use std::path::PathBuf;

use thiserror::Error;

/// Result type for workerpool operations
pub type Result<T> = std::result::Result<T, WorkerPoolError>;

/// Fatal errors that abort a whole invocation.
///
/// Per-job failures are never represented here; they are reported as
/// [`batch::JobResult`] values instead.
#[derive(Error, Debug)]
pub enum WorkerPoolError {
    /// Conflicting or missing input source, or an invalid setting
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The input file could not be read
    #[error("Unable to read input file {}: {source}", .path.display())]
    InputRead {
        /// Path that was requested
        path: PathBuf,
        /// Underlying I/O failure
        #[source]
        source: std::io::Error,
    },

    /// The batch encoding is not valid JSON or does not match the schema
    #[error("Malformed batch encoding: {0}")]
    Decode(#[from] serde_json::Error),

    /// The batch decoded but a descriptor failed validation
    #[error("Invalid job descriptor: {0}")]
    Validation(String),

    /// The batch result could not be written
    #[error("Unable to write results: {0}")]
    Output(String),
}

impl WorkerPoolError {
    /// Process exit status for this error category.
    ///
    /// Each category keeps its own code so that scripts can tell them apart.
    pub fn exit_code(&self) -> i32 {
        match self {
            WorkerPoolError::Configuration(_) => exit_codes::CONFIGURATION,
            WorkerPoolError::InputRead { .. } => exit_codes::INPUT_UNREADABLE,
            WorkerPoolError::Decode(_) | WorkerPoolError::Validation(_) => exit_codes::MALFORMED_INPUT,
            WorkerPoolError::Output(_) => exit_codes::OUTPUT_FAILED,
        }
    }
}

/// Exit statuses of the executor process itself
pub mod exit_codes {
    /// The batch was processed, whatever the individual job outcomes
    pub const SUCCESS: i32 = 0;
    /// Invalid or missing input configuration
    pub const CONFIGURATION: i32 = 2;
    /// The input file could not be read
    pub const INPUT_UNREADABLE: i32 = 3;
    /// The batch encoding was malformed or failed validation
    pub const MALFORMED_INPUT: i32 = 4;
    /// The result could not be written to its destination
    pub const OUTPUT_FAILED: i32 = 5;
}

/// Job descriptors, the bounded worker pool and result aggregation
pub mod batch;

/// Child process execution
pub mod engine;

/// Input loading and validation
pub mod input;
