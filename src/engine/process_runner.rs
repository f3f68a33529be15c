//! Child process execution for a single job

use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info, instrument, warn};

use crate::batch::{JobDescriptor, JobResult};
use crate::engine::{JobRunner, LOST_RESULT_EXIT_CODE};

/// Runs a job as a child process.
///
/// The command is spawned directly with its arguments (no shell), inherits the
/// parent's environment and gets a null stdin. Standard output becomes the
/// result body; standard error is only logged.
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner {
    timeout: Option<Duration>,
}

impl ProcessRunner {
    /// Create a runner without a deadline
    pub fn new() -> Self {
        Self::default()
    }

    /// Kill jobs that run longer than `timeout`
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Execute one job to completion
    #[instrument(skip(self, job), fields(job_id = %job.identifier))]
    pub async fn run(&self, job: &JobDescriptor) -> JobResult {
        let start = Instant::now();
        debug!(command = %job.display_command(), "Starting job");

        let child = match Command::new(&job.command)
            .args(&job.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                let diagnostic = format!("failed to start {:?}: {}", job.command, e);
                warn!(error = %e, "Job could not be started");
                return JobResult::launch_failure(&job.identifier, diagnostic);
            }
        };

        // Dropping the wait future on expiry drops the child, and
        // kill_on_drop sends it SIGKILL.
        let waited = match self.timeout {
            Some(deadline) => match tokio::time::timeout(deadline, child.wait_with_output()).await {
                Ok(waited) => waited,
                Err(_) => {
                    warn!(timeout_ms = deadline.as_millis() as u64, "Job timed out, killing it");
                    return JobResult::timed_out(&job.identifier, deadline);
                }
            },
            None => child.wait_with_output().await,
        };

        let output = match waited {
            Ok(output) => output,
            Err(e) => {
                warn!(error = %e, "Lost track of job process");
                return output_lost(job, &e);
            }
        };

        if !output.stderr.is_empty() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            debug!(stderr = %trim_trailing_newline(&stderr), "Job wrote to stderr");
        }

        let exit_code = exit_code_of(output.status);
        let result_body = if output.stdout.is_empty() {
            None
        } else {
            let stdout = String::from_utf8_lossy(&output.stdout);
            Some(trim_trailing_newline(&stdout).to_string())
        };

        info!(
            exit_code = exit_code,
            duration_ms = start.elapsed().as_millis() as u64,
            "Job finished"
        );

        JobResult::new(&job.identifier, exit_code, result_body)
    }
}

#[async_trait]
impl JobRunner for ProcessRunner {
    async fn run(&self, job: &JobDescriptor) -> JobResult {
        ProcessRunner::run(self, job).await
    }
}

/// Result for a job that started but whose exit status could not be collected
fn output_lost(job: &JobDescriptor, error: &std::io::Error) -> JobResult {
    JobResult::new(
        &job.identifier,
        LOST_RESULT_EXIT_CODE,
        Some(format!("failed to collect output of {:?}: {}", job.command, error)),
    )
}

/// Strip exactly one trailing newline (`\n` or `\r\n`)
pub fn trim_trailing_newline(text: &str) -> &str {
    text.strip_suffix("\r\n")
        .or_else(|| text.strip_suffix('\n'))
        .unwrap_or(text)
}

/// Map an exit status to the reported code; signals follow the shell's 128+n
fn exit_code_of(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }

    LOST_RESULT_EXIT_CODE
}
