//! Audio error types

use thiserror::Error;

/// Errors raised by capture backends
#[derive(Debug, Error)]
pub enum AudioError {
    #[error("Microphone permission denied")]
    PermissionDenied,

    #[error("Audio capture not supported on this host")]
    Unsupported,

    #[error("No capture device available")]
    NoDevice,

    #[error("Capture backend error: {0}")]
    Backend(String),
}
