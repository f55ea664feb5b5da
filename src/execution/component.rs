use std::future::Future;
use std::pin::Pin;

use crate::error::QueryResult;
use crate::model::FeedResponse;

/// Future returned by [`ExecutionComponent::next_page`]
pub type PageFuture<'a> = Pin<Box<dyn Future<Output = QueryResult<Option<FeedResponse>>> + Send + 'a>>;

/// One stage of a query pipeline
///
/// Stages are pulled: nothing is fetched until the caller asks for the next page, and a
/// caller that stops asking stops all I/O. `Ok(None)` means the stage is exhausted.
pub trait ExecutionComponent: Send {
    fn next_page(&mut self) -> PageFuture<'_>;

    /// Short operator name, used to describe the assembled chain
    fn operator(&self) -> &'static str;

    /// The stage this one wraps, if any
    fn inner(&self) -> Option<&dyn ExecutionComponent> {
        None
    }
}

/// Operator names from the outermost stage inwards
pub fn describe_chain(component: &dyn ExecutionComponent) -> Vec<&'static str> {
    let mut chain = vec![component.operator()];
    let mut current = component.inner();
    while let Some(inner) = current {
        chain.push(inner.operator());
        current = inner.inner();
    }
    chain
}
