use thiserror::Error;

use crate::source::Source;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors reported by the index core.
#[derive(Error, Debug)]
pub enum Error {
    /// Writer events arrived out of grammar.
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// A query named a source that was never indexed.
    #[error("unknown source: {0}")]
    UnknownSource(Source),

    /// A query named a def id that does not exist. Callers are expected to
    /// hold ids obtained from index scans; a miss here is a bug.
    #[error("no def with id {0}")]
    NoSuchDef(i64),

    /// A compilation unit overflowed one of its per-unit id bands.
    #[error("unit {unit} exceeds {limit} {band} defs per source file")]
    CapacityExceeded {
        unit: i64,
        band: &'static str,
        limit: u32,
    },

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("operation cancelled")]
    Cancelled,
}

/// Persistence faults.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The store returned logically malformed data (e.g. an index pointed
    /// at a record that failed to decode).
    #[error("corrupt store: {0}")]
    Corrupt(String),

    #[error("store is closed")]
    Closed,
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Error {
        Error::Storage(StorageError::Io(e))
    }
}

impl Error {
    /// Shorthand for a corrupt-store error with context.
    pub fn corrupt(msg: impl Into<String>) -> Error {
        Error::Storage(StorageError::Corrupt(msg.into()))
    }

    /// True if this error should abort the whole session rather than just
    /// the current unit.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Storage(_))
    }
}
