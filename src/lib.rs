//! docdb-query - Cross-partition document query execution
//!
//! A query fans out to every partition key range it touches, each partition is paged
//! independently, and the partial results are merged and post-processed (ORDER BY,
//! OFFSET, TOP/LIMIT, aggregates) into one resumable stream of pages.
//!
//! Entry point: [`execution::QueryExecutionContextFactory`].

pub mod cli;
pub mod client;
pub mod config;
pub mod continuation;
pub mod error;
pub mod execution;
pub mod model;
pub mod observability;
pub mod routing;
pub mod simulator;
