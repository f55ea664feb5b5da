//! CLI-specific error types

use std::fmt;
use std::io;

use crate::error::QueryError;

/// CLI error codes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliErrorCode {
    /// Configuration or fixture file error
    ConfigError,
    /// I/O error (stdout)
    IoError,
    /// The query itself failed
    QueryFailed,
}

impl CliErrorCode {
    /// Get the error code string
    pub fn code(&self) -> &'static str {
        match self {
            Self::ConfigError => "DOCDB_CLI_CONFIG_ERROR",
            Self::IoError => "DOCDB_CLI_IO_ERROR",
            Self::QueryFailed => "DOCDB_CLI_QUERY_FAILED",
        }
    }
}

/// CLI error
#[derive(Debug)]
pub struct CliError {
    code: CliErrorCode,
    message: String,
}

impl CliError {
    pub fn new(code: CliErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::ConfigError, msg)
    }

    pub fn io_error(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::IoError, msg)
    }

    pub fn code(&self) -> &CliErrorCode {
        &self.code
    }

    pub fn code_str(&self) -> &'static str {
        self.code.code()
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code.code(), self.message)
    }
}

impl std::error::Error for CliError {}

impl From<io::Error> for CliError {
    fn from(e: io::Error) -> Self {
        Self::io_error(e.to_string())
    }
}

impl From<serde_json::Error> for CliError {
    fn from(e: serde_json::Error) -> Self {
        Self::io_error(format!("JSON error: {}", e))
    }
}

impl From<QueryError> for CliError {
    fn from(e: QueryError) -> Self {
        match e {
            QueryError::Configuration(msg) => Self::config_error(msg),
            other => Self::new(
                CliErrorCode::QueryFailed,
                format!("{} ({})", other, other.code()),
            ),
        }
    }
}

/// CLI result type
pub type CliResult<T> = Result<T, CliError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_errors_map_to_cli_codes() {
        let err = CliError::from(QueryError::configuration("bad file"));
        assert_eq!(err.code(), &CliErrorCode::ConfigError);

        let err = CliError::from(QueryError::malformed_continuation("not json"));
        assert_eq!(err.code_str(), "DOCDB_CLI_QUERY_FAILED");
        assert!(err.message().contains("QUERY_MALFORMED_CONTINUATION"));
    }
}
