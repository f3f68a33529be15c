//! Input loading
//!
//! A batch arrives either inline, as a single argument holding the whole
//! encoded batch, or as a path to a file holding the same encoding. Exactly one
//! source must be given. Loading reads and validates everything up front; no
//! job runs unless the whole batch is valid.

use std::path::PathBuf;

use tracing::{debug, info};

use crate::batch::JobSet;
use crate::{Result, WorkerPoolError};

pub mod schema;

pub use schema::{decode_jobs, decode_jobs_with, synthetic_identifier, DecodeOptions};

/// Where the encoded batch comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputSource {
    /// The encoded batch itself
    Inline(String),
    /// Path to a file containing the encoded batch
    File(PathBuf),
}

impl InputSource {
    /// Pick the source from the two mutually exclusive options.
    ///
    /// A blank inline payload counts as not given.
    pub fn from_options(inline: Option<String>, file: Option<PathBuf>) -> Result<Self> {
        let inline = inline.filter(|payload| !payload.trim().is_empty());

        match (inline, file) {
            (Some(_), Some(path)) => Err(WorkerPoolError::Configuration(format!(
                "tasks were given both inline and with --infile {}; use only one",
                path.display()
            ))),
            (Some(payload), None) => Ok(InputSource::Inline(payload)),
            (None, Some(path)) => Ok(InputSource::File(path)),
            (None, None) => Err(WorkerPoolError::Configuration(
                "you must provide a JSON list of tasks as the first argument or a file path with --infile".to_string(),
            )),
        }
    }

    /// Raw encoded batch
    pub async fn read(&self) -> Result<String> {
        match self {
            InputSource::Inline(payload) => Ok(payload.clone()),
            InputSource::File(path) => {
                info!(path = %path.display(), "Getting tasks from file");
                tokio::fs::read_to_string(path)
                    .await
                    .map_err(|source| WorkerPoolError::InputRead {
                        path: path.clone(),
                        source,
                    })
            }
        }
    }
}

/// Read and decode a batch from `source`
pub async fn load_jobs(source: &InputSource, options: &DecodeOptions) -> Result<JobSet> {
    let payload = source.read().await?;
    debug!(bytes = payload.len(), "Read encoded batch");
    decode_jobs_with(&payload, options)
}
