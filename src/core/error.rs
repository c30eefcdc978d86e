/// DSH Error Module
///
/// This module defines the error type shared by every layer of the crate.
/// Errors are returned, never raised: only the command binaries decide to
/// terminate the process, using the error's category to pick an exit code.
use thiserror::Error;

/// Comprehensive error type for the DSH tools.
///
/// Driver errors are kept verbatim (no retry, no reconnect), wrapped only so
/// callers can match on the engine they came from.
#[derive(Error, Debug)]
pub enum DshError {
    /// Empty or unparseable connection string, unsupported scheme, bad config file
    #[error("Configuration error: {0}")]
    Config(String),

    /// The engine has no such capability (e.g. process listing on SQLite)
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    /// Statement-level failures not reported by a driver error
    #[error("Query error: {0}")]
    Query(String),

    /// A value could not be decoded into a scalar
    #[error("Decode error: {0}")]
    Decode(String),

    /// The output sink cannot accept what was asked of it
    #[error("Output error: {0}")]
    Output(String),

    /// Kill target does not exist on the server
    #[error("Process {0} not found")]
    ProcessNotFound(i64),

    /// Invalid command-line input (bad pid, duration, regex, missing table)
    #[error("Usage error: {0}")]
    Usage(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Postgres error: {0}")]
    Postgres(#[from] postgres::Error),

    #[error("MySQL error: {0}")]
    Mysql(#[from] mysql::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Configuration error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Coarse error classes used by callers to decide what to do with a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Config,
    Unsupported,
    Query,
    Output,
    Io,
    Usage,
}

impl ErrorCategory {
    /// Exit code the command binaries use for this category.
    pub fn exit_code(self) -> i32 {
        match self {
            ErrorCategory::Io => 1,
            ErrorCategory::Usage => 2,
            ErrorCategory::Config => 3,
            ErrorCategory::Unsupported => 4,
            ErrorCategory::Query => 5,
            ErrorCategory::Output => 6,
        }
    }
}

impl DshError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            DshError::Config(_) | DshError::Toml(_) => ErrorCategory::Config,
            DshError::Unsupported(_) => ErrorCategory::Unsupported,
            DshError::Query(_)
            | DshError::Decode(_)
            | DshError::ProcessNotFound(_)
            | DshError::Sqlite(_)
            | DshError::Postgres(_)
            | DshError::Mysql(_) => ErrorCategory::Query,
            DshError::Output(_) | DshError::Json(_) | DshError::Csv(_) => ErrorCategory::Output,
            DshError::Io(_) => ErrorCategory::Io,
            DshError::Usage(_) => ErrorCategory::Usage,
        }
    }

    /// True when the failure means "this engine cannot do that", as opposed to
    /// an empty result or a failed statement.
    pub fn is_unsupported(&self) -> bool {
        matches!(self, DshError::Unsupported(_))
    }
}

/// Type alias for Result to use DshError as the error type.
pub type Result<T> = std::result::Result<T, DshError>;
