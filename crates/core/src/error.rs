//! The error type shared by every jotfile crate.
//!
//! The enum is `Clone` (sources are `Arc`-wrapped) so a single `load`
//! failure can be handed to every operation queued behind it.

use crate::document::Document;
use std::path::PathBuf;
use std::sync::Arc;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// A unique index already links a different record under this value.
    #[error("unique constraint violated on field '{field}'")]
    KeyViolation {
        field: String,
        record: Arc<Document>,
    },

    /// The target primary key has no live record.
    #[error("no record with a matching primary key exists")]
    NotExists { record: Arc<Document> },

    /// `find`/`delete_index` named a field with no index.
    #[error("no index on field '{field}'")]
    NoIndex { field: String },

    /// Another process holds the database's lock file.
    #[error("database is locked: {}", path.display())]
    DatabaseLocked { path: PathBuf },

    /// Key generation exhausted its probe budget.
    #[error("primary key space exhausted")]
    KeySpaceExhausted,

    /// A non-tail journal line failed to decode; the file is corrupt.
    #[error("corrupt journal entry at line {line}: {source}")]
    Corrupt {
        line: usize,
        source: Arc<serde_json::Error>,
    },

    #[error("invalid options: {0}")]
    InvalidOptions(String),

    #[error("JSON error: {0}")]
    Json(Arc<serde_json::Error>),

    #[error("I/O error: {0}")]
    Io(Arc<std::io::Error>),

    /// Infrastructure fault (worker gone, reply dropped).
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(Arc::new(e))
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Json(Arc::new(e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_errors_are_cloneable() {
        let io: Error = std::io::Error::new(std::io::ErrorKind::Other, "disk on fire").into();
        let copy = io.clone();
        assert_eq!(io.to_string(), copy.to_string());
    }

    #[test]
    fn test_display_carries_context() {
        let err = Error::NoIndex {
            field: "tags".into(),
        };
        assert!(err.to_string().contains("tags"));

        let err = Error::DatabaseLocked {
            path: PathBuf::from("/tmp/jot.db"),
        };
        assert!(err.to_string().contains("/tmp/jot.db"));
    }
}
