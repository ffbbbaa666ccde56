//! Last-utterance transcript snapshot
//!
//! The transport streams the full turn list on every update; the session
//! only ever displays the latest utterance per speaker, so updates
//! overwrite rather than append.

use serde::{Deserialize, Serialize};

/// Who produced an utterance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SpeakerRole {
    /// The AI interviewer
    Agent,
    /// The person being interviewed
    Candidate,
}

/// One utterance from a transport transcript update
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptDelta {
    pub role: SpeakerRole,
    pub content: String,
}

impl TranscriptDelta {
    pub fn new(role: SpeakerRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Latest known utterance per speaker
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TranscriptSnapshot {
    agent: String,
    candidate: String,
}

impl TranscriptSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a batch of deltas; later entries for the same role win
    pub fn apply(&mut self, deltas: &[TranscriptDelta]) {
        for delta in deltas {
            match delta.role {
                SpeakerRole::Agent => self.agent = delta.content.clone(),
                SpeakerRole::Candidate => self.candidate = delta.content.clone(),
            }
        }
    }

    /// Overwrite the agent utterance directly (recovery prompt injection)
    pub fn set_agent(&mut self, content: impl Into<String>) {
        self.agent = content.into();
    }

    pub fn agent(&self) -> &str {
        &self.agent
    }

    pub fn candidate(&self) -> &str {
        &self.candidate
    }

    /// Length of the candidate's latest utterance, used by the
    /// silence-escalation check to decide whether the candidate responded
    pub fn candidate_len(&self) -> usize {
        self.candidate.len()
    }
}
