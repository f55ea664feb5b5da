use serde::{Deserialize, Serialize};

use crate::error::QueryResult;

use super::{parse_token, token_to_json, try_parse_token};

/// Skip state: items still to drop plus the inner component's token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OffsetContinuationToken {
    pub offset: u32,
    #[serde(default)]
    pub source_token: Option<String>,
}

impl OffsetContinuationToken {
    pub fn new(offset: u32, source_token: Option<String>) -> Self {
        Self {
            offset,
            source_token,
        }
    }

    pub fn try_parse(token: &str) -> Option<Self> {
        try_parse_token(token)
    }

    pub fn parse(token: &str) -> QueryResult<Self> {
        parse_token("offset continuation", token)
    }

    pub fn to_json(&self) -> QueryResult<String> {
        token_to_json(self)
    }
}

/// Top/limit state: items still allowed plus the inner component's token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TakeContinuationToken {
    pub limit_count: u32,
    #[serde(default)]
    pub source_token: Option<String>,
}

impl TakeContinuationToken {
    pub fn new(limit_count: u32, source_token: Option<String>) -> Self {
        Self {
            limit_count,
            source_token,
        }
    }

    pub fn try_parse(token: &str) -> Option<Self> {
        try_parse_token(token)
    }

    pub fn parse(token: &str) -> QueryResult<Self> {
        parse_token("take continuation", token)
    }

    pub fn to_json(&self) -> QueryResult<String> {
        token_to_json(self)
    }
}
