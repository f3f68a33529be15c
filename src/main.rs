//! workerpool CLI - run a batch of commands in parallel and print the results

mod cli;
mod logging;

use std::io::Write;
use std::path::Path;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use cli::Cli;
use console::style;
use tracing::info;
use workerpool::batch::{BatchExecutor, ResultAggregator};
use workerpool::input::load_jobs;
use workerpool::WorkerPoolError;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    logging::init_logger(cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("error:").red().bold(), e);
            ExitCode::from(e.exit_code() as u8)
        }
    }
}

async fn run(cli: Cli) -> Result<(), WorkerPoolError> {
    let source = cli.input_source()?;
    let jobs = load_jobs(&source, &cli.decode_options()).await?;

    let config = cli.batch_config();
    info!("max_threads set to {}", config.concurrency_limit);
    info!("{} tasks to process", jobs.len());

    let mut executor = BatchExecutor::from_config(&config);
    if cli.verbose {
        executor = executor.with_progress_callback(|completed, total| {
            info!("{}/{} tasks finished", completed, total);
        });
    }

    let results = executor.execute_batch(jobs).await?;
    let line = ResultAggregator::encode(&results)?;

    write_output(&line, cli.outfile.as_deref())
        .map_err(|e| WorkerPoolError::Output(format!("{:#}", e)))
}

/// Write the result line to `outfile`, or to stdout as its final line
fn write_output(line: &str, outfile: Option<&Path>) -> anyhow::Result<()> {
    match outfile {
        Some(path) => {
            std::fs::write(path, format!("{}\n", line))
                .with_context(|| format!("writing {}", path.display()))?;
            info!(path = %path.display(), "Results written");
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            writeln!(stdout, "{}", line).context("writing to stdout")?;
            stdout.flush().context("flushing stdout")?;
        }
    }
    Ok(())
}
