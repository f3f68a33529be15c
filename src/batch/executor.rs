//! Bounded worker pool
//!
//! The pool starts `min(concurrency_limit, job_count)` slot tasks. Each slot
//! claims the next pending descriptor from a shared atomic cursor, runs it to
//! completion, reports the result and claims again until the cursor passes the
//! end of the batch. Idle slots pull fresh work instead of waiting on a fixed
//! partition, so uneven job durations balance out.
//!
//! - No lock is held while a child process runs; claiming a job is a single
//!   `fetch_add`.
//! - Results travel over a channel to a single collector, which restores
//!   input order through [`ResultAggregator`].
//! - A failing job, or a runner that panics, never cancels its siblings.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use tokio::sync::mpsc;
use tracing::{debug, error, info, instrument, warn};

use crate::batch::{
    default_concurrency_limit, BatchConfig, BatchResult, BatchStats, JobResult, JobSet,
    ProgressCallback, ResultAggregator,
};
use crate::engine::{JobRunner, ProcessRunner, LOST_RESULT_EXIT_CODE};
use crate::Result;

/// Batch executor running jobs through a bounded set of slots
pub struct BatchExecutor {
    /// Maximum concurrent jobs
    concurrency_limit: usize,
    /// Deadline for individual jobs
    timeout_duration: Option<Duration>,
    /// Runner override; a [`ProcessRunner`] is used when unset
    runner: Option<Arc<dyn JobRunner>>,
    /// Progress callback
    progress_callback: Option<Arc<ProgressCallback>>,
}

impl std::fmt::Debug for BatchExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchExecutor")
            .field("concurrency_limit", &self.concurrency_limit)
            .field("timeout_duration", &self.timeout_duration)
            .field("runner", &self.runner.as_ref().map(|_| "custom"))
            .field("progress_callback", &self.progress_callback.is_some())
            .finish()
    }
}

impl BatchExecutor {
    /// Create a new batch executor with default settings
    pub fn new() -> Self {
        Self {
            concurrency_limit: default_concurrency_limit(),
            timeout_duration: None,
            runner: None,
            progress_callback: None,
        }
    }

    /// Create an executor from a [`BatchConfig`]
    pub fn from_config(config: &BatchConfig) -> Self {
        let executor = Self::new().with_concurrency_limit(config.concurrency_limit);
        match config.timeout {
            Some(timeout) => executor.with_timeout(timeout),
            None => executor,
        }
    }

    /// Set concurrency limit (number of parallel jobs)
    pub fn with_concurrency_limit(mut self, limit: usize) -> Self {
        self.concurrency_limit = limit.max(1);
        self
    }

    /// Set timeout for individual jobs
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_duration = Some(timeout);
        self
    }

    /// Run jobs through `runner` instead of spawning processes
    pub fn with_runner(mut self, runner: Arc<dyn JobRunner>) -> Self {
        self.runner = Some(runner);
        self
    }

    /// Set progress callback, called with `(completed, total)` as jobs finish
    pub fn with_progress_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(usize, usize) + Send + Sync + 'static,
    {
        self.progress_callback = Some(Arc::new(Box::new(callback)));
        self
    }

    /// Configured concurrency limit
    pub fn concurrency_limit(&self) -> usize {
        self.concurrency_limit
    }

    /// Execute every job in the batch and return one result per job, in input
    /// order.
    #[instrument(skip(self, jobs), fields(job_count = jobs.len()))]
    pub async fn execute_batch(&self, jobs: JobSet) -> Result<BatchResult> {
        let batch_start = Instant::now();

        if jobs.is_empty() {
            info!("No jobs to execute in batch");
            return Ok(Vec::new());
        }

        let total_jobs = jobs.len();
        let slot_count = self.concurrency_limit.min(total_jobs);
        info!(
            total_jobs = total_jobs,
            concurrency_limit = self.concurrency_limit,
            slots = slot_count,
            timeout = ?self.timeout_duration,
            "Starting batch execution"
        );

        let runner = self.runner();
        let cursor = Arc::new(AtomicUsize::new(0));
        let completed = Arc::new(AtomicUsize::new(0));
        let (tx, mut rx) = mpsc::unbounded_channel::<(usize, JobResult)>();

        let mut slots = Vec::with_capacity(slot_count);
        for slot in 1..=slot_count {
            let jobs = jobs.clone();
            let runner = Arc::clone(&runner);
            let cursor = Arc::clone(&cursor);
            let completed = Arc::clone(&completed);
            let progress = self.progress_callback.clone();
            let tx = tx.clone();

            slots.push(tokio::spawn(async move {
                loop {
                    let index = cursor.fetch_add(1, Ordering::SeqCst);
                    let Some(job) = jobs.get(index) else {
                        break;
                    };
                    debug!(slot = slot, index = index, job_id = %job.identifier, "Slot claimed job");

                    let result = match AssertUnwindSafe(runner.run(job)).catch_unwind().await {
                        Ok(result) => result,
                        Err(_) => {
                            error!(slot = slot, job_id = %job.identifier, "Runner panicked");
                            JobResult::new(
                                &job.identifier,
                                LOST_RESULT_EXIT_CODE,
                                Some("runner panicked while executing the job".to_string()),
                            )
                        }
                    };

                    let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                    if let Some(ref callback) = progress {
                        callback(done, total_jobs);
                    }

                    if tx.send((index, result)).is_err() {
                        warn!(slot = slot, "Result collector went away");
                        break;
                    }
                }
                debug!(slot = slot, "Slot finished, no pending jobs");
            }));
        }
        // The collector stops once every slot has dropped its sender.
        drop(tx);

        let mut aggregator = ResultAggregator::new(total_jobs);
        while let Some((index, result)) = rx.recv().await {
            aggregator.record(index, result);
        }

        for slot in slots {
            if let Err(e) = slot.await {
                error!("Slot join error: {}", e);
            }
        }

        let results = aggregator.finish(&jobs);
        let stats = BatchStats::from_results(&results);

        info!(
            total_jobs = stats.total_jobs,
            succeeded = stats.succeeded,
            failed = stats.failed,
            launch_failures = stats.launch_failures,
            timed_out = stats.timed_out,
            lost = stats.lost,
            batch_duration_ms = batch_start.elapsed().as_millis() as u64,
            "Batch execution completed"
        );

        if stats.launch_failures > 0 {
            warn!(
                launch_failures = stats.launch_failures,
                "Some jobs could not be started"
            );
        }

        Ok(results)
    }

    fn runner(&self) -> Arc<dyn JobRunner> {
        match &self.runner {
            Some(runner) => Arc::clone(runner),
            None => {
                let runner = ProcessRunner::new();
                match self.timeout_duration {
                    Some(timeout) => Arc::new(runner.with_timeout(timeout)),
                    None => Arc::new(runner),
                }
            }
        }
    }
}

impl Default for BatchExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::JobDescriptor;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Sleeps per job and records how many jobs were in flight at once
    #[derive(Default)]
    struct TrackingRunner {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        started: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl JobRunner for TrackingRunner {
        async fn run(&self, job: &JobDescriptor) -> JobResult {
            self.started.lock().unwrap().push(job.identifier.clone());
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);

            let millis = job.args.first().and_then(|a| a.parse().ok()).unwrap_or(20);
            tokio::time::sleep(Duration::from_millis(millis)).await;

            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            JobResult::new(&job.identifier, 0, Some(job.identifier.clone()))
        }
    }

    struct PanickingRunner;

    #[async_trait]
    impl JobRunner for PanickingRunner {
        async fn run(&self, job: &JobDescriptor) -> JobResult {
            if job.identifier == "boom" {
                panic!("runner failure");
            }
            JobResult::new(&job.identifier, 0, None)
        }
    }

    fn batch(durations: &[u64]) -> JobSet {
        durations
            .iter()
            .enumerate()
            .map(|(i, ms)| JobDescriptor::new(format!("job_{}", i), "sleep", [ms.to_string()]))
            .collect()
    }

    #[test]
    fn test_batch_executor_creation() {
        let executor = BatchExecutor::new();
        assert!(executor.concurrency_limit > 0);
        assert!(executor.timeout_duration.is_none());
    }

    #[test]
    fn test_batch_executor_configuration() {
        let executor = BatchExecutor::new()
            .with_concurrency_limit(4)
            .with_timeout(Duration::from_secs(60));

        assert_eq!(executor.concurrency_limit, 4);
        assert_eq!(executor.timeout_duration, Some(Duration::from_secs(60)));

        assert_eq!(BatchExecutor::new().with_concurrency_limit(0).concurrency_limit(), 1);
    }

    #[test]
    fn test_from_config() {
        let executor = BatchExecutor::from_config(&BatchConfig {
            concurrency_limit: 3,
            timeout: Some(Duration::from_secs(2)),
        });

        assert_eq!(executor.concurrency_limit(), 3);
        assert_eq!(executor.timeout_duration, Some(Duration::from_secs(2)));
    }

    #[tokio::test]
    async fn test_never_exceeds_concurrency_limit() {
        let runner = Arc::new(TrackingRunner::default());
        let executor = BatchExecutor::new()
            .with_concurrency_limit(3)
            .with_runner(runner.clone());

        let results = executor.execute_batch(batch(&[30; 10])).await.unwrap();

        assert_eq!(results.len(), 10);
        assert_eq!(runner.peak.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_limit_one_is_sequential_in_input_order() {
        let runner = Arc::new(TrackingRunner::default());
        let executor = BatchExecutor::new()
            .with_concurrency_limit(1)
            .with_runner(runner.clone());

        executor.execute_batch(batch(&[5, 5, 5, 5])).await.unwrap();

        assert_eq!(runner.peak.load(Ordering::SeqCst), 1);
        assert_eq!(
            *runner.started.lock().unwrap(),
            vec!["job_0", "job_1", "job_2", "job_3"]
        );
    }

    #[tokio::test]
    async fn test_results_follow_input_order_not_completion_order() {
        let executor = BatchExecutor::new()
            .with_concurrency_limit(4)
            .with_runner(Arc::new(TrackingRunner::default()));

        let results = executor.execute_batch(batch(&[80, 10, 40, 1])).await.unwrap();
        let ids: Vec<_> = results.iter().map(|r| r.identifier.as_str()).collect();

        assert_eq!(ids, vec!["job_0", "job_1", "job_2", "job_3"]);
    }

    #[tokio::test]
    async fn test_panicking_runner_is_contained() {
        let executor = BatchExecutor::new()
            .with_concurrency_limit(1)
            .with_runner(Arc::new(PanickingRunner));

        let jobs: JobSet = ["a", "boom", "c"]
            .iter()
            .map(|id| JobDescriptor::new(*id, "true", Vec::<String>::new()))
            .collect();
        let results = executor.execute_batch(jobs).await.unwrap();

        let codes: Vec<_> = results.iter().map(|r| r.exit_code).collect();
        assert_eq!(codes, vec![0, LOST_RESULT_EXIT_CODE, 0]);
        assert_eq!(results[1].identifier, "boom");
    }

    #[tokio::test]
    async fn test_progress_reports_every_job() {
        let updates = Arc::new(Mutex::new(Vec::new()));
        let sink = updates.clone();

        let executor = BatchExecutor::new()
            .with_concurrency_limit(2)
            .with_runner(Arc::new(TrackingRunner::default()))
            .with_progress_callback(move |completed, total| {
                sink.lock().unwrap().push((completed, total));
            });

        executor.execute_batch(batch(&[1, 1, 1, 1, 1])).await.unwrap();

        let mut updates = updates.lock().unwrap().clone();
        updates.sort();
        assert_eq!(updates, (1..=5).map(|n| (n, 5)).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let results = BatchExecutor::new().execute_batch(JobSet::default()).await.unwrap();
        assert!(results.is_empty());
    }
}
