//! Candidate records and the interviewer directory

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;
use uuid::Uuid;

use interview_agent_core::{CandidateProfile, Interviewer};

use crate::PersistenceError;

/// Storage for candidate records
#[async_trait]
pub trait CandidateStore: Send + Sync {
    /// Upsert a candidate keyed by email and return the record id
    ///
    /// Candidates without an email always get a fresh record.
    async fn create_or_update_candidate(
        &self,
        profile: &CandidateProfile,
    ) -> Result<String, PersistenceError>;
}

/// Lookup of interviewer personas
#[async_trait]
pub trait InterviewerStore: Send + Sync {
    async fn get_interviewer(&self, id: &str) -> Result<Interviewer, PersistenceError>;
}

/// In-memory candidate store
pub struct InMemoryCandidateStore {
    by_email: Mutex<HashMap<String, String>>,
    profiles: Mutex<HashMap<String, CandidateProfile>>,
}

impl InMemoryCandidateStore {
    pub fn new() -> Self {
        Self {
            by_email: Mutex::new(HashMap::new()),
            profiles: Mutex::new(HashMap::new()),
        }
    }

    /// Stored profile by id, for test assertions
    pub fn profile(&self, id: &str) -> Option<CandidateProfile> {
        self.profiles.lock().get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.profiles.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.lock().is_empty()
    }
}

impl Default for InMemoryCandidateStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CandidateStore for InMemoryCandidateStore {
    async fn create_or_update_candidate(
        &self,
        profile: &CandidateProfile,
    ) -> Result<String, PersistenceError> {
        let id = match &profile.email {
            Some(email) => {
                let mut by_email = self.by_email.lock();
                by_email
                    .entry(email.clone())
                    .or_insert_with(|| Uuid::new_v4().to_string())
                    .clone()
            }
            None => Uuid::new_v4().to_string(),
        };

        debug!(candidate_id = %id, "Candidate upserted");
        self.profiles.lock().insert(id.clone(), profile.clone());
        Ok(id)
    }
}

/// In-memory interviewer directory
pub struct InMemoryInterviewerStore {
    interviewers: Mutex<HashMap<String, Interviewer>>,
}

impl InMemoryInterviewerStore {
    pub fn new() -> Self {
        Self {
            interviewers: Mutex::new(HashMap::new()),
        }
    }

    pub fn add_interviewer(&self, interviewer: Interviewer) {
        self.interviewers
            .lock()
            .insert(interviewer.id.clone(), interviewer);
    }
}

impl Default for InMemoryInterviewerStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl InterviewerStore for InMemoryInterviewerStore {
    async fn get_interviewer(&self, id: &str) -> Result<Interviewer, PersistenceError> {
        self.interviewers
            .lock()
            .get(id)
            .cloned()
            .ok_or_else(|| PersistenceError::NotFound(id.to_string()))
    }
}
