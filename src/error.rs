// memreplay (camcorder sidecar cataloguer)
// Copyright (C) 2025 Andrew Nissen

use std::path::PathBuf;
use thiserror::Error;

/// Failures while reading or decoding a `.modd` sidecar file.
#[derive(Error, Debug)]
pub enum ModdError {
    #[error("failed to open sidecar {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed VT entry '{line}': expected 6 colon-delimited fields, found {found}")]
    MalformedVt { line: String, found: usize },

    #[error("invalid VT field {index} in '{line}': {reason}")]
    InvalidVtField {
        line: String,
        index: usize,
        reason: String,
    },
}

/// Failures while hashing the prefix of a video file.
#[derive(Error, Debug)]
pub enum FingerprintError {
    #[error("failed to open video file {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read video file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Error, Debug)]
pub enum CatalogError {
    /// The database was busy or locked while a batch was being written.
    /// The whole batch has been rolled back and may be retried.
    #[error("catalog locked while writing {entry}; batch rolled back: {source}")]
    Busy {
        entry: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("catalog statement failed for {entry}; batch rolled back: {source}")]
    Statement {
        entry: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("failed to prepare catalog directory {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("catalog error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

impl CatalogError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, CatalogError::Busy { .. })
    }
}

pub(crate) fn is_lock_contention(err: &rusqlite::Error) -> bool {
    matches!(
        err.sqlite_error_code(),
        Some(rusqlite::ErrorCode::DatabaseBusy) | Some(rusqlite::ErrorCode::DatabaseLocked)
    )
}

pub(crate) fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err.sqlite_error_code(),
        Some(rusqlite::ErrorCode::ConstraintViolation)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sqlite_failure(code: i32) -> rusqlite::Error {
        rusqlite::Error::SqliteFailure(rusqlite::ffi::Error::new(code), None)
    }

    #[test]
    fn test_busy_and_locked_are_contention() {
        assert!(is_lock_contention(&sqlite_failure(rusqlite::ffi::SQLITE_BUSY)));
        assert!(is_lock_contention(&sqlite_failure(rusqlite::ffi::SQLITE_LOCKED)));
        assert!(!is_lock_contention(&sqlite_failure(
            rusqlite::ffi::SQLITE_CONSTRAINT
        )));
    }

    #[test]
    fn test_constraint_violation_detected() {
        assert!(is_constraint_violation(&sqlite_failure(
            rusqlite::ffi::SQLITE_CONSTRAINT
        )));
        assert!(!is_constraint_violation(&rusqlite::Error::QueryReturnedNoRows));
    }

    #[test]
    fn test_only_busy_is_retryable() {
        let busy = CatalogError::Busy {
            entry: "video".to_string(),
            source: sqlite_failure(rusqlite::ffi::SQLITE_BUSY),
        };
        let other = CatalogError::Sqlite(rusqlite::Error::QueryReturnedNoRows);
        assert!(busy.is_retryable());
        assert!(!other.is_retryable());
    }
}
