//! Session lifecycle state machine

use serde::{Deserialize, Serialize};

/// Lifecycle state of one interview call session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[derive(Default)]
pub enum CallSessionState {
    /// Welcome screen, nothing committed yet
    #[default]
    NotStarted,
    /// Candidate is filling the intake form
    Intake,
    /// Call registered, waiting for the transport to confirm
    Starting,
    /// Live call in progress
    Active,
    /// Agent finished speaking and the candidate has not responded
    SilenceWarning,
    /// Recovery UI is up, timer frozen
    Paused,
    /// Call finished normally
    Ended,
    /// Unrecoverable transport error
    Failed,
}

impl CallSessionState {
    /// Get state display name
    pub fn display_name(&self) -> &'static str {
        match self {
            CallSessionState::NotStarted => "Not Started",
            CallSessionState::Intake => "Intake",
            CallSessionState::Starting => "Starting",
            CallSessionState::Active => "Active",
            CallSessionState::SilenceWarning => "Silence Warning",
            CallSessionState::Paused => "Paused",
            CallSessionState::Ended => "Ended",
            CallSessionState::Failed => "Failed",
        }
    }

    /// Check if this state is terminal
    pub fn is_terminal(&self) -> bool {
        matches!(self, CallSessionState::Ended | CallSessionState::Failed)
    }

    /// Check whether the call is live in this state
    pub fn is_calling(&self) -> bool {
        matches!(
            self,
            CallSessionState::Active | CallSessionState::SilenceWarning | CallSessionState::Paused
        )
    }

    /// Get all valid transitions from this state
    ///
    /// Transitions are strictly forward except the two recovery edges
    /// (`SilenceWarning -> Active`, `Paused -> Active`). A failed call
    /// start also returns `Starting -> Intake` so the candidate can retry.
    pub fn valid_transitions(&self) -> Vec<CallSessionState> {
        match self {
            CallSessionState::NotStarted => vec![
                CallSessionState::Intake,
                CallSessionState::Ended,
            ],
            CallSessionState::Intake => vec![
                CallSessionState::Starting,
                CallSessionState::Ended,
            ],
            CallSessionState::Starting => vec![
                CallSessionState::Active,
                CallSessionState::Intake,
                CallSessionState::Ended,
                CallSessionState::Failed,
            ],
            CallSessionState::Active => vec![
                CallSessionState::SilenceWarning,
                CallSessionState::Paused,
                CallSessionState::Ended,
                CallSessionState::Failed,
            ],
            CallSessionState::SilenceWarning => vec![
                CallSessionState::Active,
                CallSessionState::Paused,
                CallSessionState::Ended,
                CallSessionState::Failed,
            ],
            CallSessionState::Paused => vec![
                CallSessionState::Active,
                CallSessionState::Ended,
                CallSessionState::Failed,
            ],
            CallSessionState::Ended => vec![],
            CallSessionState::Failed => vec![],
        }
    }

    /// Check whether a transition to `to` is allowed
    pub fn can_transition_to(&self, to: CallSessionState) -> bool {
        self.valid_transitions().contains(&to)
    }
}

/// Reason the session ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EndReason {
    /// Transport reported the call finished
    Completed,
    /// Allowed duration was reached
    TimerExpired,
    /// Candidate clicked "End Interview"
    UserEnded,
    /// Candidate already responded or is not on the allow-list
    AlreadyResponded,
    /// Unrecoverable transport error
    TransportError(String),
}

impl EndReason {
    /// Whether this end reason maps to the `Failed` state
    pub fn is_failure(&self) -> bool {
        matches!(self, EndReason::TransportError(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(CallSessionState::Ended.is_terminal());
        assert!(CallSessionState::Failed.is_terminal());
        assert!(!CallSessionState::Active.is_terminal());
        assert!(CallSessionState::Ended.valid_transitions().is_empty());
        assert!(CallSessionState::Failed.valid_transitions().is_empty());
    }

    #[test]
    fn test_recovery_edges() {
        assert!(CallSessionState::SilenceWarning.can_transition_to(CallSessionState::Active));
        assert!(CallSessionState::Paused.can_transition_to(CallSessionState::Active));
    }

    #[test]
    fn test_no_backward_transitions() {
        assert!(!CallSessionState::Active.can_transition_to(CallSessionState::Intake));
        assert!(!CallSessionState::Active.can_transition_to(CallSessionState::Starting));
        assert!(!CallSessionState::Ended.can_transition_to(CallSessionState::Active));
    }

    #[test]
    fn test_failed_start_returns_to_intake() {
        assert!(CallSessionState::Starting.can_transition_to(CallSessionState::Intake));
    }

    #[test]
    fn test_calling_states() {
        assert!(CallSessionState::Active.is_calling());
        assert!(CallSessionState::SilenceWarning.is_calling());
        assert!(CallSessionState::Paused.is_calling());
        assert!(!CallSessionState::Starting.is_calling());
        assert!(!CallSessionState::Ended.is_calling());
    }
}
