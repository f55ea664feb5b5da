use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::QueryResult;

use super::composite::CompositeContinuationToken;
use super::{parse_token, token_to_json, try_parse_token};

/// One order-by value, as `{"item": v}`
///
/// A missing `item` key means the document has no value for the expression, which sorts
/// before `null`. The two are kept distinct.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct OrderByItem {
    #[serde(
        default,
        deserialize_with = "deserialize_present",
        skip_serializing_if = "Option::is_none"
    )]
    pub item: Option<Value>,
}

fn deserialize_present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

impl OrderByItem {
    pub fn new(item: Value) -> Self {
        Self { item: Some(item) }
    }

    pub fn undefined() -> Self {
        Self { item: None }
    }
}

/// Resume point of an order-by query
///
/// Names the partition the last emitted row came from, the backend token of the page that
/// contained it, its order-by values and `_rid`, and how many rows with exactly those
/// values and that `_rid` were already emitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderByContinuationToken {
    pub composite_token: CompositeContinuationToken,
    pub order_by_items: Vec<OrderByItem>,
    pub rid: String,
    #[serde(default)]
    pub skip_count: u32,
}

impl OrderByContinuationToken {
    pub fn try_parse(token: &str) -> Option<Self> {
        try_parse_token(token)
    }

    pub fn parse(token: &str) -> QueryResult<Self> {
        parse_token("order-by continuation", token)
    }

    pub fn to_json(&self) -> QueryResult<String> {
        token_to_json(self)
    }
}
