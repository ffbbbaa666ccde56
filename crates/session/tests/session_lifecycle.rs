//! End-to-end session tests against simulated services

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::broadcast;

use interview_agent_audio::{AudioHealthMonitor, SimulatedCaptureBackend};
use interview_agent_config::Settings;
use interview_agent_core::{CallSessionState, EndReason, Interview, Interviewer};
use interview_agent_intake::Field;
use interview_agent_persistence::{
    InMemoryCandidateStore, InMemoryInterviewerStore, InMemoryResponseStore, ResponseStore,
    SimulatedAnalysisClient,
};
use interview_agent_session::{CallSessionController, SessionEvent, SessionServices};
use interview_agent_transport::{SimulatedCallRegistrar, SimulatedVoiceTransport};

struct Harness {
    controller: Arc<CallSessionController>,
    transport: Arc<SimulatedVoiceTransport>,
    registrar: Arc<SimulatedCallRegistrar>,
    responses: Arc<InMemoryResponseStore>,
    analysis: Arc<SimulatedAnalysisClient>,
    backend: Arc<SimulatedCaptureBackend>,
    monitor: Arc<AudioHealthMonitor>,
    op_log: Arc<Mutex<Vec<String>>>,
}

fn interview() -> Interview {
    Interview {
        id: "iv-1".to_string(),
        name: "Backend Engineer Screen".to_string(),
        objective: "Assess Rust experience".to_string(),
        questions: vec!["Tell me about yourself".to_string()],
        time_duration_minutes: 1,
        interviewer_id: "er-1".to_string(),
        is_anonymous: false,
        respondents: None,
    }
}

fn harness_with(configure: impl FnOnce(&mut Settings, &mut Interview)) -> Harness {
    let op_log = Arc::new(Mutex::new(Vec::new()));

    let transport = Arc::new(SimulatedVoiceTransport::with_op_log(op_log.clone()));
    let registrar = Arc::new(SimulatedCallRegistrar::new());
    let responses = Arc::new(InMemoryResponseStore::with_op_log(op_log.clone()));
    let candidates = Arc::new(InMemoryCandidateStore::new());
    let analysis = Arc::new(SimulatedAnalysisClient::new());

    let interviewers = Arc::new(InMemoryInterviewerStore::new());
    interviewers.add_interviewer(Interviewer {
        id: "er-1".to_string(),
        image: String::new(),
        agent_id: "agent-1".to_string(),
    });

    let backend = Arc::new(SimulatedCaptureBackend::new());
    // Keep the audio path healthy by default; silence tests lower this
    backend.set_level(40);

    let mut settings = Settings::default();
    let mut iv = interview();
    configure(&mut settings, &mut iv);

    let monitor = AudioHealthMonitor::new(
        backend.clone(),
        settings.audio.clone(),
        settings.silence.recovery_prompt.clone(),
    );

    let controller = CallSessionController::new(
        iv,
        settings,
        monitor.clone(),
        SessionServices {
            transport: transport.clone(),
            registrar: registrar.clone(),
            responses: responses.clone(),
            candidates,
            interviewers,
            analysis: analysis.clone(),
        },
    );

    Harness {
        controller,
        transport,
        registrar,
        responses,
        analysis,
        backend,
        monitor,
        op_log,
    }
}

fn harness() -> Harness {
    harness_with(|_, _| {})
}

fn fill_valid_form(controller: &CallSessionController) {
    let intake = controller.intake();
    intake.set_field(Field::Email, "ada@example.com");
    intake.set_field(Field::FullName, "Ada Lovelace");
    intake.set_field(Field::Phone, "+14155552671");
    intake.set_field(Field::Country, "US");
    intake.set_field(Field::Gender, "female");
    intake.set_field(Field::YearsExperience, "5");
    intake.set_field(Field::Linkedin, "https://linkedin.com/in/ada");
}

async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}

/// Step the paused clock in small increments, yielding between steps so
/// chained timers (escalation stages, modal delays) arm at the intended
/// instant instead of after the whole jump
async fn advance(ms: u64) {
    tokio::task::yield_now().await;
    let mut remaining = ms;
    while remaining > 0 {
        let step = remaining.min(50);
        tokio::time::advance(Duration::from_millis(step)).await;
        for _ in 0..3 {
            tokio::task::yield_now().await;
        }
        remaining -= step;
    }
    settle().await;
}

/// Drive the session to `Active`
async fn start_session(h: &Harness) {
    h.controller.proceed().unwrap();
    fill_valid_form(&h.controller);
    h.controller.start_interview().await.unwrap();
    settle().await;
    assert_eq!(h.controller.state(), CallSessionState::Active);
}

fn drain(rx: &mut broadcast::Receiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn count_matching(events: &[SessionEvent], pred: impl Fn(&SessionEvent) -> bool) -> usize {
    events.iter().filter(|e| pred(e)).count()
}

#[tokio::test(start_paused = true)]
async fn test_call_handle_persisted_before_call_starts() {
    let h = harness();
    start_session(&h).await;

    let log = h.op_log.lock().clone();
    let create = log.iter().position(|op| op == "create_response");
    let start = log.iter().position(|op| op == "start_call");
    assert!(create.is_some() && start.is_some());
    assert!(create < start, "call handle must be durable before start_call: {log:?}");

    let record = &h.responses.all_responses()[0];
    assert_eq!(record.call_id, h.controller.call_id());
    assert_eq!(record.email.as_deref(), Some("ada@example.com"));
}

#[tokio::test(start_paused = true)]
async fn test_link_token_updates_existing_row() {
    let h = harness();
    let token = h
        .responses
        .create_response("iv-1", Default::default())
        .await
        .unwrap();
    h.controller.set_link_token(&token);

    start_session(&h).await;

    // No second row was created
    assert_eq!(h.responses.all_responses().len(), 1);
    let record = h.responses.get_response(&token).await.unwrap().unwrap();
    assert_eq!(record.call_id, h.controller.call_id());
}

#[tokio::test(start_paused = true)]
async fn test_duplicate_responder_is_turned_away() {
    let h = harness();
    h.responses.seed_response("iv-1", "ada@example.com");

    h.controller.proceed().unwrap();
    fill_valid_form(&h.controller);
    h.controller.start_interview().await.unwrap();

    assert_eq!(h.controller.state(), CallSessionState::Ended);
    assert_eq!(h.controller.end_reason(), Some(EndReason::AlreadyResponded));
    // No call was provisioned
    assert!(h.registrar.registered_contexts().is_empty());
    assert!(h.transport.started_tokens().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_allow_list_rejects_unknown_candidate() {
    let h = harness_with(|_, iv| {
        iv.respondents = Some(vec!["grace@example.com".to_string()]);
    });

    h.controller.proceed().unwrap();
    fill_valid_form(&h.controller);
    h.controller.start_interview().await.unwrap();

    assert_eq!(h.controller.end_reason(), Some(EndReason::AlreadyResponded));
    assert!(h.registrar.registered_contexts().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_incomplete_form_blocks_start() {
    let h = harness();
    h.controller.proceed().unwrap();
    h.controller.intake().set_field(Field::Email, "ada@example.com");

    assert!(h.controller.start_interview().await.is_err());
    assert_eq!(h.controller.state(), CallSessionState::Intake);
}

#[tokio::test(start_paused = true)]
async fn test_failed_start_returns_to_intake() {
    let h = harness();
    h.transport.fail_start();

    h.controller.proceed().unwrap();
    fill_valid_form(&h.controller);
    let mut rx = h.controller.subscribe();

    assert!(h.controller.start_interview().await.is_err());
    assert_eq!(h.controller.state(), CallSessionState::Intake);

    let events = drain(&mut rx);
    assert_eq!(
        count_matching(&events, |e| matches!(e, SessionEvent::ErrorMessage(_))),
        1
    );
}

#[tokio::test(start_paused = true)]
async fn test_user_end_persists_exactly_once() {
    let h = harness();
    start_session(&h).await;
    h.controller.record_tab_switch();
    h.controller.record_tab_switch();

    h.controller.end_call().await;
    // Transport CallEnded arrives afterwards and must not double-persist
    h.transport.emit_call_ended();
    settle().await;
    h.controller.end_call().await;

    assert_eq!(h.controller.state(), CallSessionState::Ended);
    assert_eq!(h.controller.end_reason(), Some(EndReason::UserEnded));
    assert_eq!(h.responses.ended_update_count(), 1);

    let record = &h.responses.all_responses()[0];
    assert!(record.is_ended);
    assert_eq!(record.tab_switch_count, 2);
}

#[tokio::test(start_paused = true)]
async fn test_transport_end_completes_session() {
    let h = harness();
    start_session(&h).await;

    h.transport.emit_call_ended();
    settle().await;

    assert_eq!(h.controller.state(), CallSessionState::Ended);
    assert_eq!(h.controller.end_reason(), Some(EndReason::Completed));
    assert_eq!(h.responses.ended_update_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_transport_error_fails_session() {
    let h = harness();
    start_session(&h).await;

    h.transport.emit_error("provider connection lost");
    settle().await;

    assert_eq!(h.controller.state(), CallSessionState::Failed);
    assert!(matches!(
        h.controller.end_reason(),
        Some(EndReason::TransportError(_))
    ));
    // The failed call still gets its final persistence
    assert_eq!(h.responses.ended_update_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_silence_escalation_warns_then_pauses() {
    let h = harness();
    start_session(&h).await;
    let mut rx = h.controller.subscribe();

    h.transport.emit_agent_stopped_speaking();
    settle().await;

    // Just under the response timeout: nothing yet
    advance(9_900).await;
    assert_eq!(h.controller.state(), CallSessionState::Active);

    advance(200).await;
    assert_eq!(h.controller.state(), CallSessionState::SilenceWarning);
    // The recovery prompt is injected as the agent's utterance
    assert!(h.controller.agent_utterance().contains("not receiving any audio"));
    assert!(!h.controller.is_timer_paused());

    // Message delay elapses: timer pauses, recovery UI comes up
    advance(2_100).await;
    assert_eq!(h.controller.state(), CallSessionState::Paused);
    assert!(h.controller.is_timer_paused());
    assert!(h.controller.is_recovery_modal_visible());

    let events = drain(&mut rx);
    assert_eq!(
        count_matching(&events, |e| matches!(e, SessionEvent::RecoveryModalShown)),
        1
    );
    assert_eq!(
        count_matching(&events, |e| matches!(e, SessionEvent::TimerPaused)),
        1
    );
}

#[tokio::test(start_paused = true)]
async fn test_candidate_speech_cancels_escalation() {
    let h = harness();
    start_session(&h).await;

    h.transport.emit_agent_stopped_speaking();
    settle().await;
    advance(5_000).await;

    h.transport.emit_candidate_utterance("I can hear you fine.");
    settle().await;
    advance(20_000).await;

    assert_eq!(h.controller.state(), CallSessionState::Active);
    assert!(!h.controller.is_recovery_modal_visible());
}

#[tokio::test(start_paused = true)]
async fn test_agent_speech_cancels_escalation() {
    let h = harness();
    start_session(&h).await;

    h.transport.emit_agent_stopped_speaking();
    settle().await;
    advance(5_000).await;

    h.transport.emit_agent_started_speaking();
    settle().await;
    advance(20_000).await;

    assert_eq!(h.controller.state(), CallSessionState::Active);
}

#[tokio::test(start_paused = true)]
async fn test_response_timeout_is_configurable() {
    let h = harness_with(|settings, _| {
        settings.silence.response_timeout_ms = 5_000;
    });
    start_session(&h).await;

    h.transport.emit_agent_stopped_speaking();
    settle().await;

    advance(4_900).await;
    assert_eq!(h.controller.state(), CallSessionState::Active);

    advance(200).await;
    assert_eq!(h.controller.state(), CallSessionState::SilenceWarning);
}

#[tokio::test(start_paused = true)]
async fn test_dismiss_recovery_resumes_session() {
    let h = harness();
    start_session(&h).await;
    h.transport.emit_agent_stopped_speaking();
    settle().await;
    advance(12_100).await;
    assert_eq!(h.controller.state(), CallSessionState::Paused);

    let elapsed_at_pause = h.controller.elapsed();
    advance(5_000).await;
    // Frozen while paused
    assert_eq!(h.controller.elapsed(), elapsed_at_pause);

    let mut rx = h.controller.subscribe();
    h.controller.dismiss_recovery_modal();
    settle().await;

    assert_eq!(h.controller.state(), CallSessionState::Active);
    assert!(!h.controller.is_timer_paused());
    assert!(!h.controller.is_recovery_modal_visible());
    let events = drain(&mut rx);
    assert_eq!(
        count_matching(&events, |e| matches!(e, SessionEvent::TimerResumed)),
        1
    );

    advance(1_000).await;
    assert!(h.controller.elapsed() > elapsed_at_pause);
}

#[tokio::test(start_paused = true)]
async fn test_timer_expiry_ends_session() {
    let h = harness();
    start_session(&h).await;

    advance(61_000).await;

    assert_eq!(h.controller.state(), CallSessionState::Ended);
    assert_eq!(h.controller.end_reason(), Some(EndReason::TimerExpired));
    assert_eq!(h.controller.remaining(), Duration::ZERO);
    assert_eq!(h.responses.ended_update_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_timer_does_not_run_while_audio_impaired() {
    let h = harness();
    start_session(&h).await;
    advance(1_000).await;
    let elapsed = h.controller.elapsed();

    // Candidate goes silent long enough for the monitor to flip the flag
    h.backend.set_level(0);
    advance(10_100).await;
    let frozen_at = h.controller.elapsed();
    advance(5_000).await;
    assert_eq!(h.controller.elapsed(), frozen_at);
    assert!(frozen_at >= elapsed);

    // Voice returns and the timer picks back up
    h.backend.set_level(40);
    h.controller.dismiss_recovery_modal();
    settle().await;
    advance(1_000).await;
    assert!(h.controller.elapsed() > frozen_at);
}

#[tokio::test(start_paused = true)]
async fn test_analysis_retries_until_available() {
    let h = harness();
    h.analysis.fail_first(2);
    start_session(&h).await;

    h.controller.end_call().await;
    settle().await;

    assert_eq!(h.analysis.attempts(), 3);
    let record = &h.responses.all_responses()[0];
    assert!(record.details.is_some());
}

#[tokio::test(start_paused = true)]
async fn test_analysis_retry_exhaustion_is_silent() {
    let h = harness();
    h.analysis.fail_first(10);
    start_session(&h).await;

    h.controller.end_call().await;
    settle().await;

    assert_eq!(h.analysis.attempts(), 3);
    assert_eq!(h.controller.state(), CallSessionState::Ended);
    let record = &h.responses.all_responses()[0];
    assert!(record.is_ended);
    assert!(record.details.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_transcript_tracks_latest_utterances() {
    let h = harness();
    start_session(&h).await;

    h.transport.emit_agent_utterance("Tell me about yourself.");
    h.transport.emit_candidate_utterance("Sure.");
    settle().await;
    h.transport.emit_candidate_utterance("Sure, I have five years of experience.");
    settle().await;

    assert_eq!(h.controller.agent_utterance(), "Tell me about yourself.");
    assert_eq!(
        h.controller.candidate_utterance(),
        "Sure, I have five years of experience."
    );
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_stops_everything() {
    let h = harness();
    start_session(&h).await;

    h.controller.shutdown();
    let elapsed = h.controller.elapsed();
    advance(10_000).await;

    // Nothing fires after teardown
    assert_eq!(h.controller.elapsed(), elapsed);
    assert_eq!(h.controller.state(), CallSessionState::Active);
    assert_eq!(h.responses.ended_update_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_already_responded_releases_microphone() {
    let h = harness();
    h.responses.seed_response("iv-1", "ada@example.com");

    h.controller.proceed().unwrap();
    settle().await;
    fill_valid_form(&h.controller);
    // Candidate goes silent; a live detector would raise the recovery
    // condition well within the window below
    h.backend.set_level(0);
    h.controller.start_interview().await.unwrap();
    assert_eq!(h.controller.end_reason(), Some(EndReason::AlreadyResponded));

    advance(11_100).await;

    assert_eq!(h.controller.state(), CallSessionState::Ended);
    assert!(!h.controller.is_recovery_modal_visible());
    assert!(h.controller.agent_utterance().is_empty());
    // Detection was torn down, so the silence never registered
    assert!(h.monitor.status().audio_level_detected);
    assert_eq!(h.monitor.status().current_level, 0);
}

#[tokio::test(start_paused = true)]
async fn test_timer_accrues_wall_time_across_skipped_ticks() {
    let h = harness();
    start_session(&h).await;

    // One large jump: the drive interval fires once, but the full span
    // must still be accrued
    tokio::time::advance(Duration::from_millis(5_000)).await;
    settle().await;

    assert!(h.controller.elapsed() >= Duration::from_millis(4_900));
}

#[tokio::test(start_paused = true)]
async fn test_dropping_last_handle_tears_down() {
    let h = harness();
    start_session(&h).await;

    let weak = Arc::downgrade(&h.controller);
    drop(h.controller);
    settle().await;

    // The background loops hold no strong reference
    assert!(weak.upgrade().is_none());
    advance(61_000).await;
    assert_eq!(h.responses.ended_update_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_anonymous_interview_skips_email_and_guard() {
    let h = harness_with(|_, iv| {
        iv.is_anonymous = true;
    });

    h.controller.proceed().unwrap();
    fill_valid_form(&h.controller);
    h.controller.intake().set_field(Field::Email, "");
    h.controller.start_interview().await.unwrap();
    settle().await;

    assert_eq!(h.controller.state(), CallSessionState::Active);
    assert_eq!(h.registrar.registered_contexts().len(), 1);
}
