//! Persistence layer
//!
//! Storage seams for interview responses, candidate records, the
//! interviewer directory and post-call analysis. Backends are behind
//! async traits; the in-memory implementations serve tests and local
//! runs and record their calls for assertions.

mod analysis;
mod directory;
mod error;
mod responses;

pub use analysis::{AnalysisClient, CallAnalysis, SimulatedAnalysisClient};
pub use directory::{
    CandidateStore, InMemoryCandidateStore, InMemoryInterviewerStore, InterviewerStore,
};
pub use error::PersistenceError;
pub use responses::{
    InMemoryResponseStore, NewResponse, ResponseRecord, ResponseStore, ResponseUpdate,
};
