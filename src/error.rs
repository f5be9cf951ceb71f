//! Error types for pleb.

use std::fmt;

use crate::persistence::PersistenceError;

/// Errors that can occur while accumulating signatures, building an index or querying it.
#[derive(Debug)]
pub enum PlebError {
    /// Invalid parameter value.
    InvalidParameter(String),
    /// Two signatures (or a signature and a permutation table) disagree on byte length.
    DimensionMismatch { expected: usize, actual: usize },
    /// Index build requested over an empty key set.
    EmptyIndex,
    /// The same key was supplied twice to an index build.
    DuplicateKey(String),
    /// A key required by the operation has no (built) signature.
    UnknownKey(String),
    /// Update on a signature whose accumulators were discarded after finalization.
    Frozen(String),
    /// Index was loaded without its signature bytes and has not been realigned yet.
    NotAligned,
    /// Signatures attached by a realign are not sorted the way the stored ordering says.
    StaleOrdering { permutation: usize },
    /// Snapshot read/write failure.
    Persistence(PersistenceError),
}

impl fmt::Display for PlebError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlebError::InvalidParameter(msg) => write!(f, "Invalid parameter: {msg}"),
            PlebError::DimensionMismatch { expected, actual } => write!(
                f,
                "Dimension mismatch: expected {expected} signature bytes, got {actual}",
            ),
            PlebError::EmptyIndex => write!(f, "Index is empty"),
            PlebError::DuplicateKey(key) => write!(f, "Duplicate key: {key}"),
            PlebError::UnknownKey(key) => write!(f, "No built signature for key: {key}"),
            PlebError::Frozen(key) => write!(
                f,
                "Signature for {key} is frozen (accumulators were discarded)"
            ),
            PlebError::NotAligned => write!(
                f,
                "Index has no signature data; realign it with an engine first"
            ),
            PlebError::StaleOrdering { permutation } => write!(
                f,
                "Ordering {permutation} does not match the signatures; rebuild the index"
            ),
            PlebError::Persistence(e) => write!(f, "Persistence error: {e}"),
        }
    }
}

impl std::error::Error for PlebError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PlebError::Persistence(e) => Some(e),
            _ => None,
        }
    }
}

impl From<PersistenceError> for PlebError {
    fn from(e: PersistenceError) -> Self {
        PlebError::Persistence(e)
    }
}

pub type Result<T> = std::result::Result<T, PlebError>;
