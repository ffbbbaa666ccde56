//! Post-call analysis client
//!
//! The analysis service produces a structured evaluation of the
//! finished call. It may lag behind call end, so callers retry with
//! backoff.

use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;

use crate::PersistenceError;

/// Analysis of a completed call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallAnalysis {
    pub call_id: String,
    pub summary: String,
    pub details: serde_json::Value,
}

#[async_trait]
pub trait AnalysisClient: Send + Sync {
    /// Fetch the analysis for a finished call
    ///
    /// Idempotent; returns `Backend` while the analysis is still being
    /// produced.
    async fn analyze(&self, call_id: &str) -> Result<CallAnalysis, PersistenceError>;
}

/// Analysis client that fails a configured number of times first, to
/// exercise retry paths
pub struct SimulatedAnalysisClient {
    failures_before_success: AtomicU32,
    attempts: AtomicU32,
}

impl SimulatedAnalysisClient {
    pub fn new() -> Self {
        Self {
            failures_before_success: AtomicU32::new(0),
            attempts: AtomicU32::new(0),
        }
    }

    /// Fail the first `n` calls before succeeding
    pub fn fail_first(&self, n: u32) {
        self.failures_before_success.store(n, Ordering::SeqCst);
    }

    /// Total calls made, for test assertions
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl Default for SimulatedAnalysisClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AnalysisClient for SimulatedAnalysisClient {
    async fn analyze(&self, call_id: &str) -> Result<CallAnalysis, PersistenceError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if attempt <= self.failures_before_success.load(Ordering::SeqCst) {
            return Err(PersistenceError::Backend(
                "analysis not ready".to_string(),
            ));
        }

        Ok(CallAnalysis {
            call_id: call_id.to_string(),
            summary: "Simulated analysis".to_string(),
            details: serde_json::json!({ "call_id": call_id }),
        })
    }
}
