//! Transport traits and events

use async_trait::async_trait;
use tokio::sync::broadcast;

use interview_agent_core::TranscriptDelta;

use crate::TransportError;

/// Events published by the live voice transport
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// The call connected and audio is flowing
    CallStarted,
    /// The provider ended the call
    CallEnded,
    /// The agent began an utterance
    AgentStartedSpeaking,
    /// The agent finished an utterance
    AgentStoppedSpeaking,
    /// New or revised transcript messages
    TranscriptUpdate(Vec<TranscriptDelta>),
    /// Provider-side error
    Error(String),
}

/// A live realtime voice call with the interview agent
#[async_trait]
pub trait VoiceTransport: Send + Sync {
    /// Start the call using the access token from registration
    ///
    /// Resolves once the provider accepts the call; [`TransportEvent::CallStarted`]
    /// follows on the event stream when audio is flowing.
    async fn start_call(&self, access_token: &str) -> Result<(), TransportError>;

    /// Stop the call; safe to call when no call is in progress
    async fn stop_call(&self) -> Result<(), TransportError>;

    /// Subscribe to call events
    fn subscribe(&self) -> broadcast::Receiver<TransportEvent>;
}
