//! Error types for MedEase.
//!
//! Defines the main error enum used throughout the application, plus the
//! filter compilation errors raised before any SQL is produced.

use std::fmt;

use thiserror::Error;

use crate::schema::ColumnType;

/// Main error type for MedEase operations.
#[derive(Error, Debug)]
pub enum MedeaseError {
    /// A filter could not be compiled into a predicate.
    #[error("Filter error: {0}")]
    Filter(#[from] FilterError),

    /// Warehouse request failures (bad SQL, permissions, network faults, etc.)
    #[error("Warehouse error: {message}")]
    Warehouse {
        kind: WarehouseErrorKind,
        message: String,
    },

    /// Rejected ad-hoc SQL (not read-only, unparsable, multiple statements).
    #[error("Query error: {0}")]
    Query(String),

    /// SMS gateway errors (invalid number, provider rejection, etc.)
    #[error("SMS error: {0}")]
    Sms(String),

    /// LLM API errors (rate limits, auth, timeouts, etc.)
    #[error("LLM error: {0}")]
    Llm(String),

    /// Configuration errors (invalid config file, missing required fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal application errors (unexpected states, bugs, etc.)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl MedeaseError {
    /// Creates a warehouse error that is worth retrying.
    pub fn transient(msg: impl Into<String>) -> Self {
        Self::Warehouse {
            kind: WarehouseErrorKind::Transient,
            message: msg.into(),
        }
    }

    /// Creates a warehouse error that will fail again if retried.
    pub fn permanent(msg: impl Into<String>) -> Self {
        Self::Warehouse {
            kind: WarehouseErrorKind::Permanent,
            message: msg.into(),
        }
    }

    /// Creates a query error with the given message.
    pub fn query(msg: impl Into<String>) -> Self {
        Self::Query(msg.into())
    }

    /// Creates an SMS error with the given message.
    pub fn sms(msg: impl Into<String>) -> Self {
        Self::Sms(msg.into())
    }

    /// Creates an LLM error with the given message.
    pub fn llm(msg: impl Into<String>) -> Self {
        Self::Llm(msg.into())
    }

    /// Creates a configuration error with the given message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Creates an internal error with the given message.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Returns true if retrying the same operation may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Warehouse {
                kind: WarehouseErrorKind::Transient,
                ..
            }
        )
    }

    /// Returns a short machine-readable error kind (`transient`, `permanent`,
    /// `filter`, ...) for JSON payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Filter(_) => "filter",
            Self::Warehouse { kind, .. } => kind.as_str(),
            Self::Query(_) => "query",
            Self::Sms(_) => "sms",
            Self::Llm(_) => "llm",
            Self::Config(_) => "config",
            Self::Internal(_) => "internal",
        }
    }

    /// Returns the error category as a string for display purposes.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Filter(_) => "Filter Error",
            Self::Warehouse { .. } => "Warehouse Error",
            Self::Query(_) => "Query Error",
            Self::Sms(_) => "SMS Error",
            Self::Llm(_) => "LLM Error",
            Self::Config(_) => "Configuration Error",
            Self::Internal(_) => "Internal Error",
        }
    }
}

/// Whether a warehouse failure is worth retrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarehouseErrorKind {
    /// Timeouts, rate limits, backend hiccups.
    Transient,
    /// Malformed SQL, missing tables, permission errors.
    Permanent,
}

impl WarehouseErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Transient => "transient",
            Self::Permanent => "permanent",
        }
    }
}

impl fmt::Display for WarehouseErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised while turning filter entries into a predicate.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FilterError {
    /// The filter names a column the table schema does not declare.
    #[error("unknown column '{column}' in table {table}")]
    UnknownColumn { table: String, column: String },

    /// The operator is not one of =, !=, <>, <, <=, >, >=, IS, IS NOT.
    #[error("unsupported operator '{operator}' on column '{column}'")]
    UnsupportedOperator { column: String, operator: String },

    /// The value cannot be rendered for the column's declared type.
    #[error("invalid value for column '{column}' ({column_type}): {reason}")]
    InvalidValue {
        column: String,
        column_type: ColumnType,
        reason: String,
    },

    /// NULL used with an ordering operator such as `<`.
    #[error("operator '{operator}' cannot compare column '{column}' with NULL")]
    NullComparison { column: String, operator: String },

    /// The row limit must be at least one.
    #[error("row limit must be at least 1")]
    InvalidLimit,

    /// The filters payload was not a JSON object.
    #[error("filters must be a JSON object mapping column to value or [operator, value]")]
    NotAnObject,
}

/// Result type alias using MedeaseError.
pub type Result<T> = std::result::Result<T, MedeaseError>;
