//! Call registration
//!
//! Before a call starts, the provider is asked to provision it: the
//! interview parameters go up, a call id and access token come back.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use uuid::Uuid;

use crate::TransportError;

/// Interview parameters sent to the provider at registration
#[derive(Debug, Clone)]
pub struct CallContext {
    /// Agent persona to run the interview
    pub agent_id: String,
    /// Allotted interview length in minutes
    pub duration_minutes: u32,
    /// Interview objective given to the agent
    pub objective: String,
    /// Question list given to the agent
    pub questions: String,
    /// Candidate name for the greeting
    pub candidate_name: String,
}

/// Provider handle for a provisioned call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisteredCall {
    pub call_id: String,
    pub access_token: String,
}

/// Provisions calls with the voice provider
#[async_trait]
pub trait CallRegistrar: Send + Sync {
    async fn register_call(&self, context: &CallContext) -> Result<RegisteredCall, TransportError>;
}

/// In-memory registrar for tests and local runs
pub struct SimulatedCallRegistrar {
    fail: AtomicBool,
    registered: Mutex<Vec<CallContext>>,
}

impl SimulatedCallRegistrar {
    pub fn new() -> Self {
        Self {
            fail: AtomicBool::new(false),
            registered: Mutex::new(Vec::new()),
        }
    }

    /// Make every subsequent registration fail
    pub fn fail_registration(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }

    /// Contexts seen so far, for test assertions
    pub fn registered_contexts(&self) -> Vec<CallContext> {
        self.registered.lock().clone()
    }
}

impl Default for SimulatedCallRegistrar {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CallRegistrar for SimulatedCallRegistrar {
    async fn register_call(&self, context: &CallContext) -> Result<RegisteredCall, TransportError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(TransportError::Registration(
                "simulated registration failure".to_string(),
            ));
        }

        self.registered.lock().push(context.clone());
        Ok(RegisteredCall {
            call_id: Uuid::new_v4().to_string(),
            access_token: format!("token-{}", Uuid::new_v4()),
        })
    }
}
