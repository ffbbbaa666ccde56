//! Persistence error types

use thiserror::Error;

/// Errors raised by storage backends
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Storage backend error: {0}")]
    Backend(String),
}
