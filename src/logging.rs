use tracing_subscriber::EnvFilter;

/// Initialize logging to stderr based on the verbose flag.
///
/// Stdout is reserved for the result line. `RUST_LOG` takes precedence.
pub fn init_logger(verbose: bool) {
    let default = if verbose { "workerpool=debug" } else { "error" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
