//! docdb-query CLI entry point
//!
//! Installs logging, then delegates to the CLI module. Errors are printed to stdout as a
//! JSON error object and the process exits non-zero.

use docdb_query::cli;
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = cli::run_cli() {
        if cli::write_error(e.code_str(), e.message()).is_err() {
            eprintln!("{}", e);
        }
        std::process::exit(1);
    }
}
