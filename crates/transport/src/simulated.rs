//! Simulated voice transport
//!
//! Drives the session controller in tests and local runs. Tests script
//! the provider side with the `emit_*` helpers and can record call
//! ordering through a shared operation log.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::debug;

use interview_agent_core::{SpeakerRole, TranscriptDelta};

use crate::{TransportError, TransportEvent, VoiceTransport};

pub struct SimulatedVoiceTransport {
    event_tx: broadcast::Sender<TransportEvent>,
    connected: AtomicBool,
    fail_start: AtomicBool,
    started_tokens: Mutex<Vec<String>>,
    op_log: Option<Arc<Mutex<Vec<String>>>>,
}

impl SimulatedVoiceTransport {
    pub fn new() -> Self {
        let (event_tx, _) = broadcast::channel(100);
        Self {
            event_tx,
            connected: AtomicBool::new(false),
            fail_start: AtomicBool::new(false),
            started_tokens: Mutex::new(Vec::new()),
            op_log: None,
        }
    }

    /// Record each `start_call` into a log shared with other fakes, so
    /// tests can assert cross-component ordering
    pub fn with_op_log(op_log: Arc<Mutex<Vec<String>>>) -> Self {
        let mut transport = Self::new();
        transport.op_log = Some(op_log);
        transport
    }

    /// Make every subsequent `start_call` fail
    pub fn fail_start(&self) {
        self.fail_start.store(true, Ordering::SeqCst);
    }

    /// Access tokens passed to `start_call`, for test assertions
    pub fn started_tokens(&self) -> Vec<String> {
        self.started_tokens.lock().clone()
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn emit_agent_started_speaking(&self) {
        let _ = self.event_tx.send(TransportEvent::AgentStartedSpeaking);
    }

    pub fn emit_agent_stopped_speaking(&self) {
        let _ = self.event_tx.send(TransportEvent::AgentStoppedSpeaking);
    }

    pub fn emit_transcript(&self, deltas: Vec<TranscriptDelta>) {
        let _ = self.event_tx.send(TransportEvent::TranscriptUpdate(deltas));
    }

    /// Convenience: emit a single candidate utterance
    pub fn emit_candidate_utterance(&self, content: &str) {
        self.emit_transcript(vec![TranscriptDelta::new(SpeakerRole::Candidate, content)]);
    }

    /// Convenience: emit a single agent utterance
    pub fn emit_agent_utterance(&self, content: &str) {
        self.emit_transcript(vec![TranscriptDelta::new(SpeakerRole::Agent, content)]);
    }

    pub fn emit_call_ended(&self) {
        self.connected.store(false, Ordering::SeqCst);
        let _ = self.event_tx.send(TransportEvent::CallEnded);
    }

    pub fn emit_error(&self, message: &str) {
        let _ = self
            .event_tx
            .send(TransportEvent::Error(message.to_string()));
    }
}

impl Default for SimulatedVoiceTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VoiceTransport for SimulatedVoiceTransport {
    async fn start_call(&self, access_token: &str) -> Result<(), TransportError> {
        if let Some(log) = &self.op_log {
            log.lock().push("start_call".to_string());
        }
        if self.fail_start.load(Ordering::SeqCst) {
            return Err(TransportError::StartFailed(
                "simulated start failure".to_string(),
            ));
        }

        self.started_tokens.lock().push(access_token.to_string());
        self.connected.store(true, Ordering::SeqCst);
        debug!("Simulated call started");
        let _ = self.event_tx.send(TransportEvent::CallStarted);
        Ok(())
    }

    async fn stop_call(&self) -> Result<(), TransportError> {
        if self.connected.swap(false, Ordering::SeqCst) {
            let _ = self.event_tx.send(TransportEvent::CallEnded);
        }
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<TransportEvent> {
        self.event_tx.subscribe()
    }
}
