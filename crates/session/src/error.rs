//! Session error types

use thiserror::Error;

use interview_agent_core::CallSessionState;
use interview_agent_persistence::PersistenceError;
use interview_agent_transport::TransportError;

/// Errors surfaced by session operations
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Operation not allowed in state {state:?}")]
    InvalidState { state: CallSessionState },

    #[error("Intake form is incomplete or invalid")]
    IntakeIncomplete,

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}
