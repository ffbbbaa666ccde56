//! Runs one simulated interview session end to end against the
//! in-memory services, logging the lifecycle as it goes.

use std::sync::Arc;
use std::time::Duration;

use tracing::info;
use tracing_subscriber::EnvFilter;

use interview_agent_audio::{AudioHealthMonitor, SimulatedCaptureBackend};
use interview_agent_config::load_settings;
use interview_agent_core::{Interview, Interviewer};
use interview_agent_intake::Field;
use interview_agent_persistence::{
    InMemoryCandidateStore, InMemoryInterviewerStore, InMemoryResponseStore,
    SimulatedAnalysisClient,
};
use interview_agent_session::{CallSessionController, SessionServices};
use interview_agent_transport::{SimulatedCallRegistrar, SimulatedVoiceTransport};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let settings = load_settings(None)?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.observability.log_level));
    if settings.observability.log_json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    let backend = Arc::new(SimulatedCaptureBackend::new());
    backend.set_level(40);
    let monitor = AudioHealthMonitor::new(
        backend.clone(),
        settings.audio.clone(),
        settings.silence.recovery_prompt.clone(),
    );

    let interviewers = Arc::new(InMemoryInterviewerStore::new());
    interviewers.add_interviewer(Interviewer {
        id: "er-1".to_string(),
        image: String::new(),
        agent_id: "agent-1".to_string(),
    });

    let transport = Arc::new(SimulatedVoiceTransport::new());
    let responses = Arc::new(InMemoryResponseStore::new());
    let services = SessionServices {
        transport: transport.clone(),
        registrar: Arc::new(SimulatedCallRegistrar::new()),
        responses: responses.clone(),
        candidates: Arc::new(InMemoryCandidateStore::new()),
        interviewers,
        analysis: Arc::new(SimulatedAnalysisClient::new()),
    };

    let interview = Interview {
        id: "iv-demo".to_string(),
        name: "Backend Engineer Screen".to_string(),
        objective: "Assess Rust experience".to_string(),
        questions: vec![
            "Tell me about yourself".to_string(),
            "Describe a system you designed".to_string(),
        ],
        time_duration_minutes: 1,
        interviewer_id: "er-1".to_string(),
        is_anonymous: false,
        respondents: None,
    };

    let controller = CallSessionController::new(interview, settings, monitor, services);

    controller.proceed()?;
    let intake = controller.intake();
    intake.set_field(Field::Email, "ada@example.com");
    intake.set_field(Field::FullName, "Ada Lovelace");
    intake.set_field(Field::Phone, "+14155552671");
    intake.set_field(Field::Country, "US");
    intake.set_field(Field::Gender, "female");
    intake.set_field(Field::YearsExperience, "5");
    intake.set_field(Field::Linkedin, "https://linkedin.com/in/ada");

    controller.start_interview().await?;

    transport.emit_agent_utterance("Tell me about yourself.");
    tokio::time::sleep(Duration::from_millis(200)).await;
    transport.emit_candidate_utterance("I have five years of Rust experience.");
    tokio::time::sleep(Duration::from_millis(200)).await;

    controller.end_call().await;

    info!(
        state = ?controller.state(),
        reason = ?controller.end_reason(),
        responses = responses.all_responses().len(),
        "Demo session finished"
    );

    controller.shutdown();
    Ok(())
}
