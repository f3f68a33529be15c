use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use workerpool::batch::{default_concurrency_limit, BatchConfig};
use workerpool::input::{DecodeOptions, InputSource};
use workerpool::Result;

#[derive(Parser, Debug)]
#[command(name = "workerpool")]
#[command(version, about = "Run a set of tasks in parallel and await the results", long_about = None)]
#[command(after_help = "EXAMPLES:
    # Tasks inline, at most 4 running at once
    workerpool -t 4 '[{\"identifier\":\"a\",\"command\":\"echo\",\"args\":[\"hi\"]}]'

    # Tasks from a file, results to a file
    workerpool --infile jobs.json --outfile results.json

    # Kill any task still running after 30 seconds
    workerpool --timeout 30 --infile jobs.json

The result is a JSON array printed as the last line of standard output.
Exit status: 0 batch processed, 2 bad configuration, 3 unreadable input file,
4 malformed tasks, 5 results could not be written.
")]
pub struct Cli {
    /// JSON encoded list of tasks. If omitted then --infile must be used
    #[arg(value_name = "TASKS")]
    pub tasks: Option<String>,

    /// Path to a file containing the task definitions
    #[arg(short, long, value_name = "PATH")]
    pub infile: Option<PathBuf>,

    /// Path to a file which should receive the results instead of stdout
    #[arg(short, long, value_name = "PATH")]
    pub outfile: Option<PathBuf>,

    /// Maximum number of tasks running at once [default: number of CPUs]
    #[arg(
        short = 't',
        long = "max-threads",
        visible_alias = "concurrency-limit",
        value_name = "N",
        env = "WORKERPOOL_MAX_THREADS",
        value_parser = parse_concurrency_limit
    )]
    pub max_threads: Option<usize>,

    /// Kill any task still running after this many seconds
    #[arg(long, value_name = "SECONDS", env = "WORKERPOOL_TIMEOUT", value_parser = parse_timeout)]
    pub timeout: Option<Duration>,

    /// Reject task lists in which two tasks share an identifier
    #[arg(long)]
    pub unique_ids: bool,

    /// Print progress and diagnostics to stderr
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    /// The single input source selected by TASKS / --infile
    pub fn input_source(&self) -> Result<InputSource> {
        InputSource::from_options(self.tasks.clone(), self.infile.clone())
    }

    pub fn decode_options(&self) -> DecodeOptions {
        DecodeOptions {
            unique_identifiers: self.unique_ids,
        }
    }

    pub fn batch_config(&self) -> BatchConfig {
        BatchConfig {
            concurrency_limit: self.max_threads.unwrap_or_else(default_concurrency_limit),
            timeout: self.timeout,
        }
    }
}

fn parse_concurrency_limit(value: &str) -> std::result::Result<usize, String> {
    match value.trim().parse::<usize>() {
        Ok(0) => Err("must be at least 1".to_string()),
        Ok(limit) => Ok(limit),
        Err(e) => Err(e.to_string()),
    }
}

fn parse_timeout(value: &str) -> std::result::Result<Duration, String> {
    let seconds: f64 = value.trim().parse().map_err(|e| format!("{}", e))?;
    if !seconds.is_finite() || seconds <= 0.0 {
        return Err("must be a positive number of seconds".to_string());
    }
    Duration::try_from_secs_f64(seconds).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_inline_tasks_and_limit() {
        let cli = Cli::try_parse_from(["workerpool", "-t", "4", "[]"]).unwrap();

        assert_eq!(cli.tasks.as_deref(), Some("[]"));
        assert_eq!(cli.batch_config().concurrency_limit, 4);
        assert_eq!(cli.input_source().unwrap(), InputSource::Inline("[]".to_string()));
    }

    #[test]
    fn concurrency_limit_alias() {
        let cli = Cli::try_parse_from(["workerpool", "--concurrency-limit", "1", "[]"]).unwrap();
        assert_eq!(cli.max_threads, Some(1));
    }

    #[test]
    fn zero_limit_is_rejected() {
        assert!(Cli::try_parse_from(["workerpool", "-t", "0", "[]"]).is_err());
    }

    #[test]
    fn timeout_accepts_fractions() {
        let cli = Cli::try_parse_from(["workerpool", "--timeout", "0.5", "-i", "jobs.json"]).unwrap();
        assert_eq!(cli.batch_config().timeout, Some(Duration::from_millis(500)));

        assert!(Cli::try_parse_from(["workerpool", "--timeout", "-1", "[]"]).is_err());
    }

    #[test]
    fn timeout_too_large_for_duration_is_rejected() {
        let err = Cli::try_parse_from(["workerpool", "--timeout", "1e30", "[]"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn both_sources_is_a_configuration_error() {
        let cli = Cli::try_parse_from(["workerpool", "-i", "jobs.json", "[]"]).unwrap();
        let err = cli.input_source().unwrap_err();
        assert_eq!(err.exit_code(), workerpool::exit_codes::CONFIGURATION);
    }

    #[test]
    fn unique_ids_flag() {
        let cli = Cli::try_parse_from(["workerpool", "--unique-ids", "[]"]).unwrap();
        assert!(cli.decode_options().unique_identifiers);
    }
}
