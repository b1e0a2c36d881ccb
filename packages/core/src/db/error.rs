//! Storage errors for the libsql subject store
//!
//! Opening a store can fail before any SQL runs (bad path, unwritable
//! directory) or while the schema is created. After that, failures come
//! from individual statements, from batch control statements, or from rows
//! that do not decode into a `Subject`. Each variant keeps the underlying
//! `libsql::Error` as its source where there is one.
//!
//! Tree-level failures (missing subjects, protected anchors, cycles) are
//! `TreeError`s; a `DatabaseError` converts into `TreeError::Database`.

use std::path::PathBuf;
use thiserror::Error;

/// Batch control statement that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchStep {
    Begin,
    Commit,
    Rollback,
}

impl std::fmt::Display for BatchStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            BatchStep::Begin => "begin",
            BatchStep::Commit => "commit",
            BatchStep::Rollback => "roll back",
        })
    }
}

#[derive(Error, Debug)]
pub enum DatabaseError {
    /// The path cannot name a database file (empty, or an existing directory)
    #[error("Invalid database path {path:?}: {reason}")]
    InvalidPath { path: PathBuf, reason: &'static str },

    #[error("Permission denied for database path: {path:?}")]
    PermissionDenied { path: PathBuf },

    #[error("Failed to create directory for database at {path:?}: {source}")]
    DirectoryCreationFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to connect to database at {path:?}: {source}")]
    ConnectionFailed {
        path: PathBuf,
        source: libsql::Error,
    },

    /// Table, index or PRAGMA setup failed while opening the store
    #[error("Failed to initialize schema ({step}): {source}")]
    InitializationFailed {
        step: String,
        source: libsql::Error,
    },

    /// A query or statement failed; `context` names the operation
    #[error("{context}: {source}")]
    SqlExecutionError {
        context: String,
        source: libsql::Error,
    },

    #[error("Failed to {step} batch: {source}")]
    BatchFailed {
        step: BatchStep,
        source: libsql::Error,
    },

    /// Raw libsql failure where the call site adds nothing (row cursors)
    #[error("Database operation failed: {0}")]
    LibsqlError(#[from] libsql::Error),

    #[error("Failed to read column '{column}': {message}")]
    RowConversion { column: String, message: String },
}

impl DatabaseError {
    pub fn invalid_path(path: PathBuf, reason: &'static str) -> Self {
        Self::InvalidPath { path, reason }
    }

    pub fn connection_failed(path: PathBuf, source: libsql::Error) -> Self {
        Self::ConnectionFailed { path, source }
    }

    /// Map a directory creation failure, singling out permission problems
    pub fn directory_creation(path: PathBuf, source: std::io::Error) -> Self {
        if source.kind() == std::io::ErrorKind::PermissionDenied {
            Self::PermissionDenied { path }
        } else {
            Self::DirectoryCreationFailed { path, source }
        }
    }

    pub fn initialization_failed(step: impl Into<String>, source: libsql::Error) -> Self {
        Self::InitializationFailed {
            step: step.into(),
            source,
        }
    }

    pub fn sql_execution(context: impl Into<String>, source: libsql::Error) -> Self {
        Self::SqlExecutionError {
            context: context.into(),
            source,
        }
    }

    pub fn batch(step: BatchStep, source: libsql::Error) -> Self {
        Self::BatchFailed { step, source }
    }

    pub fn row_conversion(column: impl Into<String>, message: impl ToString) -> Self {
        Self::RowConversion {
            column: column.into(),
            message: message.to_string(),
        }
    }
}
