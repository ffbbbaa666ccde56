//! Transport error types

use thiserror::Error;

/// Errors raised by call registration and the live transport
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Call registration failed: {0}")]
    Registration(String),

    #[error("Failed to start call: {0}")]
    StartFailed(String),

    #[error("Failed to stop call: {0}")]
    StopFailed(String),

    #[error("No call in progress")]
    NotConnected,
}
