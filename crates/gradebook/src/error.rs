//! Engine-level error type.
//!
//! Transient remote failures never reach callers; they are absorbed by
//! the mirror fallback. What remains is the server saying no to a payload
//! (surfaced verbatim for correction) and local storage trouble (fatal to
//! the current operation).

use thiserror::Error;

use crate::storage::StorageError;

pub type EngineResult<T> = std::result::Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Validation or business-rule rejection; retrying the same payload
    /// would never succeed, so it is not queued.
    #[error("{0}")]
    Rejected(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}
