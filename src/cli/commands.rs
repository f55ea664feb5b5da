//! CLI command implementations
//!
//! Both commands load a container fixture, wrap it in a [`QueryClient`] and hand the
//! query to the execution context factory. Output goes to stdout, one JSON line at a time.

use std::io::{self, Write};
use std::sync::Arc;

use serde_json::json;

use crate::client::QueryClient;
use crate::config::{ExecutionStrategy, PipelineConfig};
use crate::execution::QueryExecutionContextFactory;
use crate::model::SqlQuerySpec;
use crate::simulator::ContainerFixture;

use super::args::{Command, PlanArgs, RunArgs};
use super::errors::{CliError, CliResult};
use super::io::{write_json, write_page};

/// Runs a parsed command on a fresh runtime
pub fn run_command(command: Command) -> CliResult<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| CliError::io_error(format!("cannot start runtime: {}", e)))?;
    let mut stdout = io::stdout();
    runtime.block_on(async {
        match command {
            Command::Run(args) => run(&args, &mut stdout).await.map(|_| ()),
            Command::Plan(args) => plan(&args, &mut stdout).await,
        }
    })
}

/// Executes the query, writing every page
///
/// Returns the number of pages written.
pub async fn run<W: Write>(args: &RunArgs, out: &mut W) -> CliResult<usize> {
    let config = match &args.config {
        Some(path) => PipelineConfig::load(path)?,
        None => PipelineConfig::default(),
    };
    let fixture = ContainerFixture::load(&args.fixture)?;
    let resource_link = fixture.resource_link.clone();
    let client = QueryClient::from_backend(Arc::new(fixture.into_container())).with_config(&config);

    let mut options = config.feed_options.clone();
    if let Some(size) = args.page_size {
        options = options.with_max_item_count(size);
    }
    if let Some(token) = &args.continuation {
        options = options.with_continuation(token.clone());
    }
    if let Some(strategy) = args.strategy {
        options = options.with_strategy(strategy.into());
    }

    let mut context = QueryExecutionContextFactory::create(
        &client,
        &resource_link,
        SqlQuerySpec::new(args.query.clone()),
        options,
    )
    .await?;

    let mut written = 0;
    while args.max_pages.map_or(true, |max| written < max) {
        let Some(page) = context.next_page().await? else {
            break;
        };
        write_page(out, &page)?;
        written += 1;
    }

    let snapshot = client.metrics.snapshot();
    tracing::info!(
        pages = written,
        items = snapshot.items_emitted,
        pages_fetched = snapshot.pages_fetched,
        splits_absorbed = snapshot.splits_absorbed,
        "query finished"
    );
    Ok(written)
}

/// Prints the operator chain and the plan it came from
pub async fn plan<W: Write>(args: &PlanArgs, out: &mut W) -> CliResult<()> {
    let fixture = ContainerFixture::load(&args.fixture)?;
    let resource_link = fixture.resource_link.clone();
    let container = Arc::new(fixture.into_container());
    let query_plan = container.query_plan();
    let client = QueryClient::from_backend(container);

    let context = QueryExecutionContextFactory::create(
        &client,
        &resource_link,
        SqlQuerySpec::new(args.query.clone()),
        crate::config::FeedOptions::default().with_strategy(ExecutionStrategy::QueryPlan),
    )
    .await?;

    write_json(
        out,
        &json!({
            "operators": context.operators(),
            "queryInfo": query_plan.query_info,
        }),
    )
}
