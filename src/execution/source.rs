use super::component::{ExecutionComponent, PageFuture};
use super::order_by::OrderBySource;
use super::parallel::ParallelSource;

/// The fan-out stage at the bottom of every pipeline
///
/// The merge strategy is chosen once, when the pipeline is assembled.
pub enum PartitionedSource {
    /// Concatenate partitions in range order
    Parallel(ParallelSource),
    /// Merge partitions by order-by values
    OrderBy(OrderBySource),
}

impl PartitionedSource {
    pub fn is_order_by(&self) -> bool {
        matches!(self, PartitionedSource::OrderBy(_))
    }
}

impl ExecutionComponent for PartitionedSource {
    fn next_page(&mut self) -> PageFuture<'_> {
        match self {
            PartitionedSource::Parallel(source) => source.next_page(),
            PartitionedSource::OrderBy(source) => source.next_page(),
        }
    }

    fn operator(&self) -> &'static str {
        match self {
            PartitionedSource::Parallel(source) => source.operator(),
            PartitionedSource::OrderBy(source) => source.operator(),
        }
    }
}

impl From<ParallelSource> for PartitionedSource {
    fn from(source: ParallelSource) -> Self {
        PartitionedSource::Parallel(source)
    }
}

impl From<OrderBySource> for PartitionedSource {
    fn from(source: OrderBySource) -> Self {
        PartitionedSource::OrderBy(source)
    }
}
