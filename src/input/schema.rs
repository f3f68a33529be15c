//! Strict schema for the encoded batch

use std::collections::HashMap;

use serde::Deserialize;
use tracing::debug;

use crate::batch::{JobDescriptor, JobSet};
use crate::{Result, WorkerPoolError};

/// Descriptor exactly as it appears on the wire, before validation
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawJobDescriptor {
    #[serde(default)]
    identifier: Option<String>,
    command: String,
    #[serde(default)]
    args: Option<Vec<String>>,
}

/// Options applied while decoding a batch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodeOptions {
    /// Reject batches in which two descriptors share an identifier
    pub unique_identifiers: bool,
}

/// Decode and validate a batch with default options
pub fn decode_jobs(payload: &str) -> Result<JobSet> {
    decode_jobs_with(payload, &DecodeOptions::default())
}

/// Decode and validate a batch.
///
/// The whole batch is validated before anything is returned, so a single bad
/// descriptor rejects all of them.
pub fn decode_jobs_with(payload: &str, options: &DecodeOptions) -> Result<JobSet> {
    let raw: Vec<RawJobDescriptor> = serde_json::from_str(payload.trim())?;

    let jobs = raw
        .into_iter()
        .enumerate()
        .map(|(index, raw)| validate(index + 1, raw))
        .collect::<Result<Vec<_>>>()?;

    if options.unique_identifiers {
        check_unique(&jobs)?;
    }

    debug!(job_count = jobs.len(), "Decoded batch");
    Ok(JobSet::from(jobs))
}

fn validate(position: usize, raw: RawJobDescriptor) -> Result<JobDescriptor> {
    if raw.command.trim().is_empty() {
        return Err(WorkerPoolError::Validation(format!(
            "job {}: command must not be empty",
            position
        )));
    }

    let identifier = match raw.identifier {
        Some(identifier) if identifier.is_empty() => {
            return Err(WorkerPoolError::Validation(format!(
                "job {}: identifier must not be empty",
                position
            )));
        }
        Some(identifier) => identifier,
        None => synthetic_identifier(position),
    };

    Ok(JobDescriptor {
        identifier,
        command: raw.command,
        args: raw.args.unwrap_or_default(),
    })
}

/// Identifier given to a descriptor that omitted one (1-based position)
pub fn synthetic_identifier(position: usize) -> String {
    format!("job-{}", position)
}

fn check_unique(jobs: &[JobDescriptor]) -> Result<()> {
    let mut seen: HashMap<&str, usize> = HashMap::with_capacity(jobs.len());

    for (index, job) in jobs.iter().enumerate() {
        if let Some(first) = seen.insert(job.identifier.as_str(), index + 1) {
            return Err(WorkerPoolError::Validation(format!(
                "duplicate identifier {:?} at jobs {} and {}",
                job.identifier,
                first,
                index + 1
            )));
        }
    }

    Ok(())
}
