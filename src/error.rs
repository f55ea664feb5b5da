//! Query pipeline error types
//!
//! Error codes:
//! - QUERY_BAD_REQUEST (ERROR)
//! - QUERY_MALFORMED_CONTINUATION (ERROR)
//! - QUERY_NO_MATCHING_RANGE (ERROR)
//! - QUERY_UNSUPPORTED_PLAN (ERROR)
//! - QUERY_CONFIGURATION (ERROR)
//! - QUERY_SERVICE_ERROR (ERROR)
//! - QUERY_SERIALIZATION (ERROR)
//! - QUERY_INVARIANT_VIOLATION (FATAL)
//!
//! Partition splits and "cross-partition query not servable" responses arrive as
//! [`QueryError::Service`] values. They are classified here so the producer and the
//! proxy can treat them as control flow; every other service error is passed through.

use std::fmt;

use thiserror::Error;

/// HTTP-like status codes reported by the backend
pub mod status {
    pub const OK: u16 = 200;
    pub const NOT_MODIFIED: u16 = 304;
    pub const BAD_REQUEST: u16 = 400;
    pub const NOT_FOUND: u16 = 404;
    pub const GONE: u16 = 410;
    pub const TOO_MANY_REQUESTS: u16 = 429;
    pub const INTERNAL_SERVER_ERROR: u16 = 500;
}

/// Backend substatus codes the pipeline interprets
pub mod sub_status {
    pub const UNKNOWN: u32 = 0;
    pub const PARTITION_KEY_RANGE_GONE: u32 = 1002;
    pub const CROSS_PARTITION_QUERY_NOT_SERVABLE: u32 = 1004;
    pub const COMPLETING_SPLIT: u32 = 1007;
    pub const COMPLETING_PARTITION_MIGRATION: u32 = 1008;
}

/// Severity levels for query errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// The query failed; the caller may issue a new one
    Error,
    /// A pipeline invariant was broken; indicates a construction bug
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "ERROR"),
            Severity::Fatal => write!(f, "FATAL"),
        }
    }
}

/// Stable error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    BadRequest,
    MalformedContinuation,
    NoMatchingRange,
    UnsupportedQueryPlan,
    Configuration,
    Service,
    Serialization,
    InvariantViolation,
}

impl ErrorCode {
    /// Returns the string code
    pub fn code(&self) -> &'static str {
        match self {
            ErrorCode::BadRequest => "QUERY_BAD_REQUEST",
            ErrorCode::MalformedContinuation => "QUERY_MALFORMED_CONTINUATION",
            ErrorCode::NoMatchingRange => "QUERY_NO_MATCHING_RANGE",
            ErrorCode::UnsupportedQueryPlan => "QUERY_UNSUPPORTED_PLAN",
            ErrorCode::Configuration => "QUERY_CONFIGURATION",
            ErrorCode::Service => "QUERY_SERVICE_ERROR",
            ErrorCode::Serialization => "QUERY_SERIALIZATION",
            ErrorCode::InvariantViolation => "QUERY_INVARIANT_VIOLATION",
        }
    }

    /// Returns the severity level for this code
    pub fn severity(&self) -> Severity {
        match self {
            ErrorCode::InvariantViolation => Severity::Fatal,
            _ => Severity::Error,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// An error response returned by the backend for a single request
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceError {
    pub status_code: u16,
    pub sub_status_code: u32,
    pub message: String,
    /// Extra payload attached by the gateway (the query plan, for 400/1004)
    pub additional_error_info: Option<String>,
}

impl ServiceError {
    pub fn new(status_code: u16, sub_status_code: u32, message: impl Into<String>) -> Self {
        Self {
            status_code,
            sub_status_code,
            message: message.into(),
            additional_error_info: None,
        }
    }

    /// 410/1002: the targeted partition key range no longer exists
    pub fn partition_key_range_gone(range_id: &str) -> Self {
        Self::new(
            status::GONE,
            sub_status::PARTITION_KEY_RANGE_GONE,
            format!("partition key range {} is gone", range_id),
        )
    }

    /// 400/1004 carrying the serialized query plan
    pub fn cross_partition_query_not_servable(query_plan: impl Into<String>) -> Self {
        Self::new(
            status::BAD_REQUEST,
            sub_status::CROSS_PARTITION_QUERY_NOT_SERVABLE,
            "the provided cross partition query can not be directly served by the gateway",
        )
        .with_additional_error_info(query_plan)
    }

    pub fn with_additional_error_info(mut self, info: impl Into<String>) -> Self {
        self.additional_error_info = Some(info.into());
        self
    }

    /// Whether this response signals that the targeted range was split or moved
    pub fn is_partition_split(&self) -> bool {
        self.status_code == status::GONE
            && matches!(
                self.sub_status_code,
                sub_status::PARTITION_KEY_RANGE_GONE
                    | sub_status::COMPLETING_SPLIT
                    | sub_status::COMPLETING_PARTITION_MIGRATION
            )
    }

    pub fn is_cross_partition_query_not_servable(&self) -> bool {
        self.status_code == status::BAD_REQUEST
            && self.sub_status_code == sub_status::CROSS_PARTITION_QUERY_NOT_SERVABLE
    }
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "status {} substatus {}: {}",
            self.status_code, self.sub_status_code, self.message
        )
    }
}

/// Query pipeline error
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// The inbound continuation token could not be parsed
    #[error("Malformed continuation token: {0}")]
    MalformedContinuation(String),

    /// No target range starts where the continuation token says to resume
    #[error("No partition key range matches continuation range starting at '{min}'")]
    NoMatchingRange { min: String },

    #[error("Unsupported query plan: {0}")]
    UnsupportedQueryPlan(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Service error: {0}")]
    Service(ServiceError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invariant violation: {0}")]
    InvariantViolation(String),
}

impl QueryError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    pub fn malformed_continuation(message: impl Into<String>) -> Self {
        Self::MalformedContinuation(message.into())
    }

    pub fn unsupported_query_plan(message: impl Into<String>) -> Self {
        Self::UnsupportedQueryPlan(message.into())
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn invariant(message: impl Into<String>) -> Self {
        Self::InvariantViolation(message.into())
    }

    /// Returns the error code
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::BadRequest(_) => ErrorCode::BadRequest,
            Self::MalformedContinuation(_) => ErrorCode::MalformedContinuation,
            Self::NoMatchingRange { .. } => ErrorCode::NoMatchingRange,
            Self::UnsupportedQueryPlan(_) => ErrorCode::UnsupportedQueryPlan,
            Self::Configuration(_) => ErrorCode::Configuration,
            Self::Service(_) => ErrorCode::Service,
            Self::Serialization(_) => ErrorCode::Serialization,
            Self::InvariantViolation(_) => ErrorCode::InvariantViolation,
        }
    }

    /// Returns the severity level
    pub fn severity(&self) -> Severity {
        self.code().severity()
    }

    /// Returns whether this is a fatal error
    pub fn is_fatal(&self) -> bool {
        self.severity() == Severity::Fatal
    }

    /// HTTP-like status for the error
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Service(e) => e.status_code,
            Self::InvariantViolation(_) => status::INTERNAL_SERVER_ERROR,
            _ => status::BAD_REQUEST,
        }
    }

    /// Client faults that end the query and must not be retried
    pub fn is_bad_request(&self) -> bool {
        self.status_code() == status::BAD_REQUEST
    }

    pub fn is_partition_split(&self) -> bool {
        matches!(self, Self::Service(e) if e.is_partition_split())
    }

    pub fn is_cross_partition_query_not_servable(&self) -> bool {
        matches!(self, Self::Service(e) if e.is_cross_partition_query_not_servable())
    }

    pub fn service_error(&self) -> Option<&ServiceError> {
        match self {
            Self::Service(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ServiceError> for QueryError {
    fn from(e: ServiceError) -> Self {
        Self::Service(e)
    }
}

/// Result type for query operations
pub type QueryResult<T> = Result<T, QueryError>;
