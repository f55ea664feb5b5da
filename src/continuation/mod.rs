//! Continuation tokens
//!
//! Every operator that keeps resumable state owns one token shape. Tokens nest: each
//! operator wraps the token of the component beneath it as an opaque string, so the
//! outgoing continuation mirrors the operator chain and resuming rebuilds the same chain.
//!
//! | Token | Owner | Shape |
//! |---|---|---|
//! | [`CompositeContinuationToken`] | parallel source | `{token, range}` |
//! | [`OrderByContinuationToken`] | order-by source | `{compositeToken, orderByItems, rid, skipCount}` |
//! | [`OffsetContinuationToken`] | skip | `{offset, sourceToken}` |
//! | [`TakeContinuationToken`] | top / limit | `{limitCount, sourceToken}` |
//!
//! A token that fails to parse ends the query with a bad-request error.

mod composite;
mod order_by;
mod wrapped;

pub use composite::CompositeContinuationToken;
pub use order_by::{OrderByContinuationToken, OrderByItem};
pub use wrapped::{OffsetContinuationToken, TakeContinuationToken};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{QueryError, QueryResult};

/// Parses a token, returning `None` for anything malformed
pub(crate) fn try_parse_token<T: DeserializeOwned>(token: &str) -> Option<T> {
    serde_json::from_str(token).ok()
}

/// Parses a token, classifying failures as malformed continuations
pub(crate) fn parse_token<T: DeserializeOwned>(kind: &str, token: &str) -> QueryResult<T> {
    serde_json::from_str(token).map_err(|e| {
        QueryError::malformed_continuation(format!("invalid {} token '{}': {}", kind, token, e))
    })
}

pub(crate) fn token_to_json<T: Serialize>(token: &T) -> QueryResult<String> {
    Ok(serde_json::to_string(token)?)
}
