//! Error types for the columnar call-level interface client.

use std::fmt;
use thiserror::Error;

/// Result type alias for client operations.
pub type Result<T> = std::result::Result<T, Error>;

/// A single diagnostic record reported by the driver for a handle.
///
/// Mirrors one `SQLGetDiagRec` record: the five character SQLSTATE, the
/// vendor specific native error code and the vendor message text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// Five character SQLSTATE, e.g. `42S02`.
    pub state: String,
    /// Native (vendor) error code.
    pub native_error: i32,
    /// Diagnostic message text.
    pub message: String,
}

impl Diagnostic {
    /// Create a diagnostic record.
    pub fn new(state: impl Into<String>, native_error: i32, message: impl Into<String>) -> Self {
        Self {
            state: state.into(),
            native_error,
            message: message.into(),
        }
    }

    /// Placeholder used when a call failed but the driver left no records.
    pub(crate) fn missing(operation: &str) -> Self {
        Self::new(
            "HY000",
            0,
            format!("{} failed without a diagnostic record", operation),
        )
    }

    /// True for the "string data, right truncated" warning.
    pub fn is_truncation(&self) -> bool {
        self.state == "01004"
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] ({}) {}", self.state, self.native_error, self.message)
    }
}

/// Error type for client operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Handle allocation or connect failed.
    #[error("Connection failed: {diagnostic}")]
    ConnectionFailed { diagnostic: Diagnostic },

    /// Prepare, execute or fetch returned an error.
    #[error("{operation} failed: {diagnostic}")]
    QueryExecutionFailed {
        operation: &'static str,
        diagnostic: Diagnostic,
    },

    /// Number of supplied parameters does not match the placeholders.
    #[error("Statement expects {expected} parameters, got {actual}")]
    ParameterCountMismatch { expected: usize, actual: usize },

    /// A host value has no SQL type mapping.
    #[error("Parameter {index} has unsupported type {type_name}")]
    UnsupportedParameterType {
        index: usize,
        type_name: &'static str,
    },

    /// Truncated data could not be recovered with a targeted re-fetch.
    #[error("Truncated data in column {column}, row {row}: {diagnostic}")]
    TruncatedData {
        column: u16,
        row: usize,
        diagnostic: Diagnostic,
    },

    /// Buffer size overflowed or the allocation failed.
    #[error("Out of memory allocating {batch_size} elements of {element_len} bytes")]
    OutOfMemory {
        element_len: usize,
        batch_size: usize,
    },

    /// Column type has no native mapping and text fallback is disabled.
    #[error("Unsupported SQL type {sql_type} for column {column}")]
    UnsupportedColumnType { column: String, sql_type: i16 },

    /// Batch size must be at least one row.
    #[error("Invalid batch size: {batch_size}")]
    InvalidBatchSize { batch_size: usize },

    /// Operation is not valid in the current state.
    #[error("Invalid state: {message}")]
    InvalidState { message: String },

    /// The driver rejected a handle.
    #[error("Invalid handle passed to {operation}")]
    InvalidHandle { operation: &'static str },

    /// Raw buffer bytes could not be converted to a value.
    #[error("Type conversion error: {message}")]
    TypeConversion { message: String },

    /// Column index out of bounds.
    #[error("Column index {index} out of bounds (columns: {count})")]
    ColumnIndexOutOfBounds { index: usize, count: usize },

    /// Invalid configuration value.
    #[error("Invalid configuration: {message}")]
    Config { message: String },
}

impl Error {
    /// Create a query execution error.
    pub fn execution(operation: &'static str, diagnostic: Diagnostic) -> Self {
        Self::QueryExecutionFailed {
            operation,
            diagnostic,
        }
    }

    /// Create a type conversion error.
    pub fn type_conversion(message: impl Into<String>) -> Self {
        Self::TypeConversion {
            message: message.into(),
        }
    }

    /// Create an invalid state error.
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// The driver diagnostic attached to this error, if any.
    pub fn diagnostic(&self) -> Option<&Diagnostic> {
        match self {
            Self::ConnectionFailed { diagnostic }
            | Self::QueryExecutionFailed { diagnostic, .. }
            | Self::TruncatedData { diagnostic, .. } => Some(diagnostic),
            _ => None,
        }
    }

    /// True if the error left the connection unusable.
    pub fn is_connection_level(&self) -> bool {
        match self {
            Self::ConnectionFailed { .. } => true,
            // SQLSTATE class 08 is "connection exception"
            Self::QueryExecutionFailed { diagnostic, .. } => diagnostic.state.starts_with("08"),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagnostic_display() {
        let diag = Diagnostic::new("42S02", 208, "Invalid object name 'T'");
        assert_eq!(diag.to_string(), "[42S02] (208) Invalid object name 'T'");
        assert!(!diag.is_truncation());
        assert!(Diagnostic::new("01004", 0, "truncated").is_truncation());
    }

    #[test]
    fn test_connection_level_classification() {
        let err = Error::execution("fetch", Diagnostic::new("08S01", 0, "link failure"));
        assert!(err.is_connection_level());
        let err = Error::execution("fetch", Diagnostic::new("22003", 0, "out of range"));
        assert!(!err.is_connection_level());
        assert_eq!(err.diagnostic().map(|d| d.state.as_str()), Some("22003"));
        assert!(Error::ParameterCountMismatch { expected: 2, actual: 1 }
            .diagnostic()
            .is_none());
    }
}
