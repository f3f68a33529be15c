//! Result aggregation
//!
//! Results arrive in completion order. The aggregator files each one under the
//! position of the descriptor that produced it and, once every position is
//! filled, hands back the batch in input order.

use tracing::{error, warn};

use crate::batch::{BatchResult, JobResult, JobSet};
use crate::{Result, WorkerPoolError};

/// Collects per-job results into the ordered batch result
#[derive(Debug, Clone)]
pub struct ResultAggregator {
    slots: Vec<Option<JobResult>>,
    received: usize,
}

impl ResultAggregator {
    /// Create an aggregator expecting `expected` results
    pub fn new(expected: usize) -> Self {
        Self {
            slots: vec![None; expected],
            received: 0,
        }
    }

    /// File the result for the descriptor at `index`.
    ///
    /// Returns `true` once every position has a result. Positions are filled
    /// once; identifiers play no part, so duplicate identifiers never merge.
    pub fn record(&mut self, index: usize, result: JobResult) -> bool {
        let expected = self.expected();
        match self.slots.get_mut(index) {
            Some(Some(existing)) => {
                warn!(
                    index = index,
                    job_id = %existing.identifier,
                    "Ignoring second result for the same job"
                );
            }
            Some(slot) => {
                *slot = Some(result);
                self.received += 1;
            }
            None => {
                error!(index = index, expected = expected, "Result for unknown job position");
            }
        }

        self.is_complete()
    }

    /// Number of positions filled so far
    pub fn received(&self) -> usize {
        self.received
    }

    /// Number of results expected
    pub fn expected(&self) -> usize {
        self.slots.len()
    }

    /// Whether every position has a result
    pub fn is_complete(&self) -> bool {
        self.received == self.expected()
    }

    /// Assemble the batch result in input order.
    ///
    /// A position that never received a result still yields one, so the
    /// output always has exactly one entry per descriptor.
    pub fn finish(self, jobs: &JobSet) -> BatchResult {
        if !self.is_complete() {
            error!(
                received = self.received,
                expected = self.expected(),
                "Batch finished with missing results"
            );
        }

        self.slots
            .into_iter()
            .enumerate()
            .map(|(index, slot)| {
                slot.unwrap_or_else(|| {
                    let identifier = jobs
                        .get(index)
                        .map(|job| job.identifier.clone())
                        .unwrap_or_default();
                    JobResult::lost(identifier)
                })
            })
            .collect()
    }

    /// Encode a batch result as a single JSON line
    pub fn encode(results: &[JobResult]) -> Result<String> {
        serde_json::to_string(results).map_err(|e| WorkerPoolError::Output(e.to_string()))
    }

    /// Decode a line produced by [`ResultAggregator::encode`]
    pub fn decode(line: &str) -> Result<BatchResult> {
        Ok(serde_json::from_str(line.trim())?)
    }
}
