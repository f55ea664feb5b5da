//! CLI argument definitions using clap
//!
//! Commands:
//! - docdb-query run --fixture <path> [--config <path>] [--continuation <token>]
//! - docdb-query plan --fixture <path>

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::config::ExecutionStrategy;

/// Runs cross-partition queries against an in-memory container
#[derive(Parser, Debug)]
#[command(name = "docdb-query")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Execute a query and print one JSON line per page
    Run(RunArgs),

    /// Print the operator chain a query would run through
    Plan(PlanArgs),
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Container fixture (ranges, documents, query plan)
    #[arg(long)]
    pub fixture: PathBuf,

    /// Pipeline configuration file
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Query text sent to partitions
    #[arg(long, default_value = "SELECT * FROM c")]
    pub query: String,

    /// Continuation token from a previous run
    #[arg(long)]
    pub continuation: Option<String>,

    /// Max items per page; overrides the config file
    #[arg(long, allow_negative_numbers = true)]
    pub page_size: Option<i32>,

    /// Stop after this many pages
    #[arg(long)]
    pub max_pages: Option<usize>,

    #[arg(long, value_enum)]
    pub strategy: Option<StrategyArg>,
}

#[derive(Args, Debug, Clone)]
pub struct PlanArgs {
    #[arg(long)]
    pub fixture: PathBuf,

    #[arg(long, default_value = "SELECT * FROM c")]
    pub query: String,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyArg {
    Fallback,
    QueryPlan,
}

impl From<StrategyArg> for ExecutionStrategy {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::Fallback => ExecutionStrategy::Fallback,
            StrategyArg::QueryPlan => ExecutionStrategy::QueryPlan,
        }
    }
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
