//! CLI for docdb-query
//!
//! Provides:
//! - run: execute a query against a fixture container, one JSON line per page
//! - plan: print the operator chain a query assembles into

mod args;
mod commands;
mod errors;
mod io;

pub use args::{Cli, Command, PlanArgs, RunArgs, StrategyArg};
pub use commands::{plan, run, run_command};
pub use errors::{CliError, CliErrorCode, CliResult};
pub use io::{page_json, write_error, write_json, write_page};

/// Parses arguments and runs the selected command
pub fn run_cli() -> CliResult<()> {
    let cli = Cli::parse_args();
    run_command(cli.command)
}
