use std::collections::TryReserveError;

use thiserror::Error;

/// Errors returned by the statement classifier and executor.
///
/// `Parse` and `Execution` carry the engine's message verbatim and are
/// ordinary results for the caller to interpret. `Fatal` means the database
/// handle can no longer be trusted; the top-level caller is expected to
/// terminate. `Maintenance` never leaves [`crate::sqlite::Database::checkpoint`].
/// `Io` covers snapshot file access while the handle is still open.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SqlError {
    #[error("{0}")]
    Parse(String),
    #[error("{0}")]
    Execution(String),
    #[error("fatal: {0}")]
    Fatal(String),
    #[error("maintenance: {0}")]
    Maintenance(String),
    #[error("io: {0}")]
    Io(String),
}

impl SqlError {
    /// Returns true when the process should not continue with this handle.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SqlError::Fatal(_))
    }

    /// The message without the kind prefix.
    pub fn message(&self) -> &str {
        match self {
            SqlError::Parse(msg)
            | SqlError::Execution(msg)
            | SqlError::Fatal(msg)
            | SqlError::Maintenance(msg)
            | SqlError::Io(msg) => msg,
        }
    }
}

impl From<TryReserveError> for SqlError {
    fn from(_: TryReserveError) -> Self {
        SqlError::Fatal("out of memory".to_string())
    }
}

/// Framing errors found while reading the wire format back.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("missing length terminator at offset {0}")]
    MissingDot(usize),
    #[error("invalid length prefix at offset {0}")]
    InvalidLength(usize),
    #[error("value at offset {offset} needs {needed} bytes, {available} available")]
    Truncated {
        offset: usize,
        needed: usize,
        available: usize,
    },
    #[error("missing value sentinel at offset {0}")]
    MissingSentinel(usize),
    #[error("expected separator or newline at offset {0}")]
    MissingSeparator(usize),
    #[error("row {row} has {found} fields, header has {expected}")]
    FieldCount {
        row: usize,
        expected: usize,
        found: usize,
    },
    #[error("empty input")]
    Empty,
}

pub type Result<T> = std::result::Result<T, SqlError>;
