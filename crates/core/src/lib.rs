//! Core types for the interview call-session engine
//!
//! This crate provides foundational types used across all other crates:
//! - Session lifecycle states and end reasons
//! - Transcript snapshot (last utterance per speaker)
//! - Interview configuration
//! - Candidate profile

pub mod candidate;
pub mod interview;
pub mod state;
pub mod transcript;

pub use candidate::CandidateProfile;
pub use interview::{Interview, Interviewer};
pub use state::{CallSessionState, EndReason};
pub use transcript::{SpeakerRole, TranscriptDelta, TranscriptSnapshot};
