//! Interview response storage
//!
//! A response row is created when the candidate's call is provisioned,
//! keyed by a link token, and updated in place as the session
//! progresses and ends.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::debug;
use uuid::Uuid;

use crate::PersistenceError;

/// Stored response row
#[derive(Debug, Clone)]
pub struct ResponseRecord {
    /// Link token identifying this response
    pub token: String,
    pub interview_id: String,
    /// Provider call id, set before the call starts
    pub call_id: Option<String>,
    pub candidate_id: Option<String>,
    pub email: Option<String>,
    pub name: Option<String>,
    pub is_ended: bool,
    pub tab_switch_count: u32,
    pub duration_seconds: u64,
    /// Post-call analysis payload
    pub details: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// Fields set at creation time
#[derive(Debug, Clone, Default)]
pub struct NewResponse {
    pub call_id: Option<String>,
    pub candidate_id: Option<String>,
    pub email: Option<String>,
    pub name: Option<String>,
}

/// Partial update applied to an existing response
#[derive(Debug, Clone, Default)]
pub struct ResponseUpdate {
    pub call_id: Option<String>,
    pub candidate_id: Option<String>,
    pub email: Option<String>,
    pub name: Option<String>,
    pub is_ended: Option<bool>,
    pub tab_switch_count: Option<u32>,
    pub duration_seconds: Option<u64>,
    pub details: Option<serde_json::Value>,
}

/// Storage for interview responses
#[async_trait]
pub trait ResponseStore: Send + Sync {
    /// Create a response row and return its link token
    async fn create_response(
        &self,
        interview_id: &str,
        fields: NewResponse,
    ) -> Result<String, PersistenceError>;

    /// Apply a partial update to the response behind `token`
    async fn update_response(
        &self,
        token: &str,
        update: ResponseUpdate,
    ) -> Result<(), PersistenceError>;

    /// Fetch the response behind `token`
    async fn get_response(&self, token: &str) -> Result<Option<ResponseRecord>, PersistenceError>;

    /// All candidate emails that already responded to this interview
    async fn get_all_emails(&self, interview_id: &str) -> Result<Vec<String>, PersistenceError>;
}

/// In-memory response store
///
/// Records its operations into an optional shared log so tests can
/// assert ordering against other components.
pub struct InMemoryResponseStore {
    responses: Mutex<HashMap<String, ResponseRecord>>,
    fail_create: AtomicBool,
    op_log: Option<Arc<Mutex<Vec<String>>>>,
}

impl InMemoryResponseStore {
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(HashMap::new()),
            fail_create: AtomicBool::new(false),
            op_log: None,
        }
    }

    pub fn with_op_log(op_log: Arc<Mutex<Vec<String>>>) -> Self {
        let mut store = Self::new();
        store.op_log = Some(op_log);
        store
    }

    /// Make every subsequent `create_response` fail
    pub fn fail_create(&self) {
        self.fail_create.store(true, Ordering::SeqCst);
    }

    /// Seed a pre-existing response, e.g. a prior respondent
    pub fn seed_response(&self, interview_id: &str, email: &str) {
        let token = Uuid::new_v4().to_string();
        self.responses.lock().insert(
            token.clone(),
            ResponseRecord {
                token,
                interview_id: interview_id.to_string(),
                call_id: None,
                candidate_id: None,
                email: Some(email.to_string()),
                name: None,
                is_ended: true,
                tab_switch_count: 0,
                duration_seconds: 0,
                details: None,
                created_at: Utc::now(),
            },
        );
    }

    /// All stored rows, for test assertions
    pub fn all_responses(&self) -> Vec<ResponseRecord> {
        self.responses.lock().values().cloned().collect()
    }

    /// How many updates marked a response ended
    pub fn ended_update_count(&self) -> usize {
        self.op_log
            .as_ref()
            .map(|log| {
                log.lock()
                    .iter()
                    .filter(|op| op.as_str() == "update_response_ended")
                    .count()
            })
            .unwrap_or(0)
    }

    fn log(&self, op: &str) {
        if let Some(log) = &self.op_log {
            log.lock().push(op.to_string());
        }
    }
}

impl Default for InMemoryResponseStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ResponseStore for InMemoryResponseStore {
    async fn create_response(
        &self,
        interview_id: &str,
        fields: NewResponse,
    ) -> Result<String, PersistenceError> {
        self.log("create_response");
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(PersistenceError::Backend(
                "simulated create failure".to_string(),
            ));
        }

        let token = Uuid::new_v4().to_string();
        let record = ResponseRecord {
            token: token.clone(),
            interview_id: interview_id.to_string(),
            call_id: fields.call_id,
            candidate_id: fields.candidate_id,
            email: fields.email,
            name: fields.name,
            is_ended: false,
            tab_switch_count: 0,
            duration_seconds: 0,
            details: None,
            created_at: Utc::now(),
        };
        debug!(token = %token, interview_id, "Response created");
        self.responses.lock().insert(token.clone(), record);
        Ok(token)
    }

    async fn update_response(
        &self,
        token: &str,
        update: ResponseUpdate,
    ) -> Result<(), PersistenceError> {
        if update.is_ended == Some(true) {
            self.log("update_response_ended");
        } else {
            self.log("update_response");
        }

        let mut responses = self.responses.lock();
        let record = responses
            .get_mut(token)
            .ok_or_else(|| PersistenceError::NotFound(token.to_string()))?;

        if let Some(call_id) = update.call_id {
            record.call_id = Some(call_id);
        }
        if let Some(candidate_id) = update.candidate_id {
            record.candidate_id = Some(candidate_id);
        }
        if let Some(email) = update.email {
            record.email = Some(email);
        }
        if let Some(name) = update.name {
            record.name = Some(name);
        }
        if let Some(is_ended) = update.is_ended {
            record.is_ended = is_ended;
        }
        if let Some(count) = update.tab_switch_count {
            record.tab_switch_count = count;
        }
        if let Some(duration) = update.duration_seconds {
            record.duration_seconds = duration;
        }
        if let Some(details) = update.details {
            record.details = Some(details);
        }
        Ok(())
    }

    async fn get_response(&self, token: &str) -> Result<Option<ResponseRecord>, PersistenceError> {
        Ok(self.responses.lock().get(token).cloned())
    }

    async fn get_all_emails(&self, interview_id: &str) -> Result<Vec<String>, PersistenceError> {
        Ok(self
            .responses
            .lock()
            .values()
            .filter(|r| r.interview_id == interview_id)
            .filter_map(|r| r.email.clone())
            .collect())
    }
}
