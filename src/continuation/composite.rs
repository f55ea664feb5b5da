use serde::{Deserialize, Serialize};

use crate::error::QueryResult;
use crate::routing::{PartitionKeyRange, Range};

use super::{parse_token, token_to_json, try_parse_token};

/// Resume point of a parallel query
///
/// `range` is the partition to resume; every range sorting before it is exhausted.
/// `token` is that partition's backend continuation, `None` to start it fresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompositeContinuationToken {
    #[serde(default)]
    pub token: Option<String>,
    pub range: Range,
}

impl CompositeContinuationToken {
    pub fn new(token: Option<String>, range: Range) -> Self {
        Self { token, range }
    }

    pub fn for_partition(token: Option<String>, range: &PartitionKeyRange) -> Self {
        Self::new(token, range.to_range())
    }

    pub fn try_parse(token: &str) -> Option<Self> {
        try_parse_token(token)
    }

    pub fn parse(token: &str) -> QueryResult<Self> {
        parse_token("composite continuation", token)
    }

    pub fn to_json(&self) -> QueryResult<String> {
        token_to_json(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::continuation::{OffsetContinuationToken, TakeContinuationToken};
    use proptest::prelude::*;

    #[test]
    fn test_round_trip() {
        let token = CompositeContinuationToken::new(
            Some("+RID:abc#RT:1".into()),
            Range::new("05C1", "0BBA", true, false),
        );
        let json = token.to_json().unwrap();
        assert_eq!(CompositeContinuationToken::parse(&json).unwrap(), token);
    }

    #[test]
    fn test_wire_shape() {
        let token = CompositeContinuationToken::new(None, Range::new("A", "M", true, false));
        let value: serde_json::Value = serde_json::from_str(&token.to_json().unwrap()).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "token": null,
                "range": {"min": "A", "max": "M", "isMinInclusive": true, "isMaxInclusive": false}
            })
        );
    }

    #[test]
    fn test_try_parse_rejects_garbage() {
        assert!(CompositeContinuationToken::try_parse("not json").is_none());
        assert!(CompositeContinuationToken::try_parse(r#"{"token": "t"}"#).is_none());
        assert!(CompositeContinuationToken::try_parse("").is_none());
    }

    #[test]
    fn test_parse_failure_is_malformed_continuation() {
        let err = CompositeContinuationToken::parse("{").unwrap_err();
        assert_eq!(err.code(), crate::error::ErrorCode::MalformedContinuation);
        assert!(err.is_bad_request());
    }

    fn range() -> impl Strategy<Value = Range> {
        ("[0-9A-F]{0,6}", "[0-9A-F]{0,6}", any::<bool>(), any::<bool>())
            .prop_map(|(min, max, min_inc, max_inc)| Range::new(min, max, min_inc, max_inc))
    }

    fn composite() -> impl Strategy<Value = CompositeContinuationToken> {
        (proptest::option::of(any::<String>()), range())
            .prop_map(|(token, range)| CompositeContinuationToken::new(token, range))
    }

    proptest! {
        #[test]
        fn prop_round_trip(token in composite()) {
            let json = token.to_json().unwrap();
            prop_assert_eq!(CompositeContinuationToken::parse(&json).unwrap(), token);
        }

        #[test]
        fn prop_nested_round_trip(token in composite(), offset in any::<u32>(), limit in any::<u32>()) {
            let take = TakeContinuationToken::new(limit, Some(token.to_json().unwrap()));
            let outer = OffsetContinuationToken::new(offset, Some(take.to_json().unwrap()));

            let parsed = OffsetContinuationToken::parse(&outer.to_json().unwrap()).unwrap();
            prop_assert_eq!(parsed.offset, offset);
            let inner = TakeContinuationToken::parse(parsed.source_token.as_deref().unwrap()).unwrap();
            prop_assert_eq!(inner.limit_count, limit);
            let source = inner.source_token.as_deref().unwrap();
            prop_assert_eq!(CompositeContinuationToken::parse(source).unwrap(), token);
        }
    }
}
