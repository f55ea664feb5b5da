//! In-memory backend
//!
//! [`InMemoryContainer`] implements every collaborator trait over a set of JSON
//! documents partitioned by an effective partition key. It can split ranges, script
//! per-range responses and failures, and records every page request it serves. The CLI
//! runs queries against it through [`ContainerFixture`].

mod container;
mod fixture;

pub use container::{effective_partition_key, InMemoryContainer, DEFAULT_SERVED_PAGE_SIZE};
pub use fixture::{ContainerFixture, SplitInstruction};
