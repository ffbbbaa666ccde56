//! Call session controller
//!
//! One controller instance owns one candidate's interview session from
//! intake to post-call persistence. External collaborators come in
//! through [`SessionServices`]; everything observable goes out on a
//! broadcast event stream.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use interview_agent_audio::{AudioEvent, AudioHealthMonitor, AudioHealthStatus};
use interview_agent_config::Settings;
use interview_agent_core::{
    CallSessionState, CandidateProfile, EndReason, Interview, TranscriptSnapshot,
};
use interview_agent_intake::CandidateIntake;
use interview_agent_persistence::{
    AnalysisClient, CandidateStore, InterviewerStore, NewResponse, ResponseStore, ResponseUpdate,
};
use interview_agent_transport::{
    CallContext, CallRegistrar, TransportEvent, VoiceTransport,
};

use crate::{SessionError, SessionTimer};

/// External collaborators consumed by the controller
pub struct SessionServices {
    pub transport: Arc<dyn VoiceTransport>,
    pub registrar: Arc<dyn CallRegistrar>,
    pub responses: Arc<dyn ResponseStore>,
    pub candidates: Arc<dyn CandidateStore>,
    pub interviewers: Arc<dyn InterviewerStore>,
    pub analysis: Arc<dyn AnalysisClient>,
}

/// Events published by the controller
#[derive(Debug, Clone)]
pub enum SessionEvent {
    StateChanged(CallSessionState),
    TranscriptUpdated,
    /// User-visible error, e.g. a failed call start
    ErrorMessage(String),
    TimerPaused,
    TimerResumed,
    RecoveryModalShown,
    RecoveryModalDismissed,
    SessionEnded(EndReason),
}

/// Orchestrates one interview call session
pub struct CallSessionController {
    /// Self-reference for spawning owned tasks from `&self`
    weak: Weak<Self>,
    interview: Interview,
    settings: Settings,
    intake: CandidateIntake,
    monitor: Arc<AudioHealthMonitor>,
    services: SessionServices,

    state: Mutex<CallSessionState>,
    transcript: Mutex<TranscriptSnapshot>,
    timer: Mutex<SessionTimer>,
    end_reason: Mutex<Option<EndReason>>,
    call_id: Mutex<Option<String>>,
    /// Link token of the response row; preset when the candidate came
    /// through a personal link
    response_token: Mutex<Option<String>>,
    tab_switches: AtomicU32,
    recovery_modal_visible: AtomicBool,
    /// One-shot latch around the end-of-call side effects
    finished: AtomicBool,

    event_tx: broadcast::Sender<SessionEvent>,
    cancel: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    escalation: Mutex<Option<JoinHandle<()>>>,
}

impl CallSessionController {
    pub fn new(
        interview: Interview,
        settings: Settings,
        monitor: Arc<AudioHealthMonitor>,
        services: SessionServices,
    ) -> Arc<Self> {
        let (event_tx, _) = broadcast::channel(100);
        let intake = CandidateIntake::new(Duration::from_millis(settings.intake.debounce_ms));
        let timer = SessionTimer::new(Duration::from_secs(interview.allowed_duration_seconds()));

        let controller = Arc::new_cyclic(|weak| Self {
            weak: weak.clone(),
            interview,
            settings,
            intake,
            monitor,
            services,
            state: Mutex::new(CallSessionState::NotStarted),
            transcript: Mutex::new(TranscriptSnapshot::new()),
            timer: Mutex::new(timer),
            end_reason: Mutex::new(None),
            call_id: Mutex::new(None),
            response_token: Mutex::new(None),
            tab_switches: AtomicU32::new(0),
            recovery_modal_visible: AtomicBool::new(false),
            finished: AtomicBool::new(false),
            event_tx,
            cancel: CancellationToken::new(),
            tasks: Mutex::new(Vec::new()),
            escalation: Mutex::new(None),
        });

        controller.spawn_loops();
        controller
    }

    /// The loops hold the controller only through a `Weak` per
    /// iteration, so dropping the last external handle tears the
    /// session down even without an explicit `shutdown()`
    fn spawn_loops(&self) {
        let mut tasks = self.tasks.lock();

        tasks.push(tokio::spawn(Self::transport_loop(
            self.weak.clone(),
            self.cancel.clone(),
            self.services.transport.subscribe(),
        )));

        tasks.push(tokio::spawn(Self::audio_loop(
            self.weak.clone(),
            self.cancel.clone(),
            self.monitor.subscribe(),
        )));

        tasks.push(tokio::spawn(Self::timer_loop(
            self.weak.clone(),
            self.cancel.clone(),
            Duration::from_millis(self.settings.timer.tick_interval_ms),
        )));
    }

    /// Set the link token the candidate arrived with, so the existing
    /// response row is updated instead of creating a new one
    pub fn set_link_token(&self, token: impl Into<String>) {
        *self.response_token.lock() = Some(token.into());
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.event_tx.subscribe()
    }

    /// The intake form collecting candidate fields
    pub fn intake(&self) -> &CandidateIntake {
        &self.intake
    }

    pub fn state(&self) -> CallSessionState {
        *self.state.lock()
    }

    pub fn agent_utterance(&self) -> String {
        self.transcript.lock().agent().to_string()
    }

    pub fn candidate_utterance(&self) -> String {
        self.transcript.lock().candidate().to_string()
    }

    pub fn is_recovery_modal_visible(&self) -> bool {
        self.recovery_modal_visible.load(Ordering::SeqCst)
    }

    pub fn is_timer_paused(&self) -> bool {
        self.timer.lock().is_paused()
    }

    pub fn elapsed(&self) -> Duration {
        self.timer.lock().elapsed()
    }

    pub fn remaining(&self) -> Duration {
        self.timer.lock().remaining()
    }

    pub fn call_id(&self) -> Option<String> {
        self.call_id.lock().clone()
    }

    pub fn end_reason(&self) -> Option<EndReason> {
        self.end_reason.lock().clone()
    }

    pub fn tab_switch_count(&self) -> u32 {
        self.tab_switches.load(Ordering::SeqCst)
    }

    /// Move from the welcome screen to the intake form and kick off the
    /// pre-call audio checks
    pub fn proceed(&self) -> Result<(), SessionError> {
        let state = self.state();
        if state != CallSessionState::NotStarted {
            return Err(SessionError::InvalidState { state });
        }
        self.set_state(CallSessionState::Intake);

        self.monitor.set_call_active(false);
        self.spawn_checks();
        Ok(())
    }

    /// Run the audio checks in a task that dies with the session, so a
    /// slow check cannot restart detection after a terminal state
    fn spawn_checks(&self) {
        let monitor = Arc::clone(&self.monitor);
        let cancel = self.cancel.clone();
        self.tasks.lock().push(tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = monitor.perform_checks() => {}
            }
        }));
    }

    /// Submit the intake form and start the call
    ///
    /// Submitting is not a separate step: every field is re-validated
    /// synchronously here, then a complete form rolls straight into the
    /// duplicate-respondent guard and the start sequence.
    ///
    /// The provider call handle is persisted before `start_call` so a
    /// crash mid-start never leaves an untracked call. Failures after
    /// the guard return the session to `Intake` with a user-visible
    /// error event.
    pub async fn start_interview(&self) -> Result<(), SessionError> {
        let state = self.state();
        if state != CallSessionState::Intake {
            return Err(SessionError::InvalidState { state });
        }

        self.intake.validate_all();
        if !self.intake.is_form_valid(self.interview.is_anonymous) {
            return Err(SessionError::IntakeIncomplete);
        }
        let profile = self.intake.profile();

        self.set_state(CallSessionState::Starting);

        if let Some(email) = &profile.email {
            if self.is_duplicate_or_disallowed(email).await {
                info!(interview_id = %self.interview.id, "Candidate already responded or not allowed");
                self.end_without_call(EndReason::AlreadyResponded);
                return Ok(());
            }
        }

        match self.run_start_sequence(&profile).await {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!(error = %e, "Call start failed, returning to intake");
                self.set_state(CallSessionState::Intake);
                let _ = self.event_tx.send(SessionEvent::ErrorMessage(
                    "The interview could not be started. Please try again.".to_string(),
                ));
                Err(e)
            }
        }
    }

    async fn is_duplicate_or_disallowed(&self, email: &str) -> bool {
        let duplicate = match self
            .services
            .responses
            .get_all_emails(&self.interview.id)
            .await
        {
            Ok(emails) => emails.iter().any(|e| e.eq_ignore_ascii_case(email)),
            Err(e) => {
                warn!(error = %e, "Duplicate-responder check failed, allowing candidate");
                false
            }
        };

        let allowed = self
            .interview
            .respondents
            .as_ref()
            .map(|list| list.iter().any(|e| e.eq_ignore_ascii_case(email)))
            .unwrap_or(true);

        duplicate || !allowed
    }

    async fn run_start_sequence(&self, profile: &CandidateProfile) -> Result<(), SessionError> {
        let candidate_id = self
            .services
            .candidates
            .create_or_update_candidate(profile)
            .await?;

        let interviewer = self
            .services
            .interviewers
            .get_interviewer(&self.interview.interviewer_id)
            .await?;

        let context = CallContext {
            agent_id: interviewer.agent_id,
            duration_minutes: self.interview.time_duration_minutes,
            objective: self.interview.objective.clone(),
            questions: self.interview.questions_joined(),
            candidate_name: profile.full_name.clone(),
        };
        let registered = self.services.registrar.register_call(&context).await?;
        info!(call_id = %registered.call_id, "Call registered");

        // The call handle must be durable before audio starts flowing
        let token = self.response_token.lock().clone();
        match token {
            Some(token) => {
                self.services
                    .responses
                    .update_response(
                        &token,
                        ResponseUpdate {
                            call_id: Some(registered.call_id.clone()),
                            candidate_id: Some(candidate_id),
                            email: profile.email.clone(),
                            name: Some(profile.full_name.clone()),
                            ..Default::default()
                        },
                    )
                    .await?;
            }
            None => {
                let token = self
                    .services
                    .responses
                    .create_response(
                        &self.interview.id,
                        NewResponse {
                            call_id: Some(registered.call_id.clone()),
                            candidate_id: Some(candidate_id),
                            email: profile.email.clone(),
                            name: Some(profile.full_name.clone()),
                        },
                    )
                    .await?;
                *self.response_token.lock() = Some(token);
            }
        }
        *self.call_id.lock() = Some(registered.call_id);

        self.services
            .transport
            .start_call(&registered.access_token)
            .await?;
        Ok(())
    }

    /// End the call at the candidate's request
    pub async fn end_call(&self) {
        self.finish(EndReason::UserEnded).await;
    }

    /// Dismiss the recovery UI: clear the audio condition, resume the
    /// timer and return to `Active`
    pub fn dismiss_recovery_modal(&self) {
        if self.recovery_modal_visible.swap(false, Ordering::SeqCst) {
            let _ = self.event_tx.send(SessionEvent::RecoveryModalDismissed);
        }
        self.monitor.clear_condition();

        {
            let mut timer = self.timer.lock();
            if timer.is_paused() {
                timer.resume();
                let _ = self.event_tx.send(SessionEvent::TimerResumed);
            }
        }

        let state = self.state();
        if state == CallSessionState::Paused {
            self.set_state(CallSessionState::Active);
        }
    }

    /// Re-run the audio checks from the recovery UI's "try again"
    pub async fn retry_audio_check(&self) -> AudioHealthStatus {
        self.monitor.stop_level_detection();
        let status = self.monitor.perform_checks().await;
        if status.is_healthy() {
            self.dismiss_recovery_modal();
        }
        status
    }

    /// Switch the microphone without disturbing the session
    pub fn change_microphone_device(&self, device_id: Option<String>) {
        self.monitor.change_device(device_id);
    }

    /// Count a tab/window switch reported by the focus tracker
    pub fn record_tab_switch(&self) -> u32 {
        self.tab_switches.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Tear down every spawned task; nothing fires afterwards
    pub fn shutdown(&self) {
        self.cancel.cancel();
        self.cancel_escalation();
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
        self.monitor.stop_level_detection();
    }

    fn set_state(&self, to: CallSessionState) -> bool {
        {
            let mut state = self.state.lock();
            if *state == to || !state.can_transition_to(to) {
                return false;
            }
            debug!(from = state.display_name(), to = to.display_name(), "State transition");
            *state = to;
        }
        let _ = self.event_tx.send(SessionEvent::StateChanged(to));
        true
    }

    /// Terminal outcome reached before any call was provisioned, e.g. a
    /// duplicate respondent; nothing to persist
    ///
    /// Still a full teardown: the microphone is released and nothing
    /// may fire over the terminal screen afterwards.
    fn end_without_call(&self, reason: EndReason) {
        if self.finished.swap(true, Ordering::SeqCst) {
            return;
        }
        self.cancel_escalation();
        self.timer.lock().pause();
        self.monitor.stop_level_detection();
        self.monitor.set_call_active(false);

        *self.end_reason.lock() = Some(reason.clone());
        self.set_state(CallSessionState::Ended);
        let _ = self.event_tx.send(SessionEvent::SessionEnded(reason));
        self.cancel.cancel();
    }

    /// End-of-call side effects, behind a one-shot latch
    ///
    /// Stops everything, persists the final response exactly once, then
    /// fetches the analysis with bounded retry. Persistence failures
    /// are logged, never surfaced to the candidate.
    async fn finish(&self, reason: EndReason) {
        if self.finished.swap(true, Ordering::SeqCst) {
            return;
        }
        info!(reason = ?reason, "Session finishing");

        self.cancel_escalation();
        self.timer.lock().pause();
        self.monitor.stop_level_detection();
        self.monitor.set_call_active(false);
        let _ = self.services.transport.stop_call().await;

        *self.end_reason.lock() = Some(reason.clone());
        let terminal = if reason.is_failure() {
            CallSessionState::Failed
        } else {
            CallSessionState::Ended
        };
        self.set_state(terminal);
        let _ = self.event_tx.send(SessionEvent::SessionEnded(reason));

        let token = self.response_token.lock().clone();
        if let Some(token) = &token {
            let update = ResponseUpdate {
                is_ended: Some(true),
                tab_switch_count: Some(self.tab_switches.load(Ordering::SeqCst)),
                duration_seconds: Some(self.timer.lock().elapsed().as_secs()),
                ..Default::default()
            };
            if let Err(e) = self.services.responses.update_response(token, update).await {
                warn!(error = %e, "Failed to persist final response");
            }
        }

        let call_id = self.call_id.lock().clone();
        if let (Some(call_id), Some(token)) = (call_id, token) {
            self.fetch_analysis(&call_id, &token).await;
        }

        self.cancel.cancel();
    }

    async fn fetch_analysis(&self, call_id: &str, token: &str) {
        let max_attempts = self.settings.retry.max_attempts;
        let mut backoff = Duration::from_millis(self.settings.retry.initial_backoff_ms);

        for attempt in 1..=max_attempts {
            match self.services.analysis.analyze(call_id).await {
                Ok(analysis) => {
                    let update = ResponseUpdate {
                        details: Some(analysis.details),
                        ..Default::default()
                    };
                    if let Err(e) = self.services.responses.update_response(token, update).await {
                        warn!(error = %e, "Failed to persist analysis");
                    }
                    return;
                }
                Err(e) if attempt < max_attempts => {
                    debug!(attempt, error = %e, "Analysis not ready, retrying");
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                }
                Err(e) => {
                    warn!(error = %e, "Analysis unavailable after retries");
                }
            }
        }
    }

    async fn transport_loop(
        weak: Weak<Self>,
        cancel: CancellationToken,
        mut rx: broadcast::Receiver<TransportEvent>,
    ) {
        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => break,
                event = rx.recv() => event,
            };
            let Some(this) = weak.upgrade() else { break };
            match event {
                Ok(event) => this.handle_transport_event(event).await,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Transport event stream lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }

    async fn handle_transport_event(&self, event: TransportEvent) {
        match event {
            TransportEvent::CallStarted => {
                info!("Call started");
                self.set_state(CallSessionState::Active);
                self.monitor.set_call_active(true);
                self.spawn_checks();
            }
            TransportEvent::AgentStoppedSpeaking => {
                self.arm_escalation();
            }
            TransportEvent::AgentStartedSpeaking => {
                self.cancel_escalation();
                let state = self.state();
                if state == CallSessionState::SilenceWarning {
                    self.set_state(CallSessionState::Active);
                }
            }
            TransportEvent::TranscriptUpdate(deltas) => {
                let (before, after) = {
                    let mut transcript = self.transcript.lock();
                    let before = transcript.candidate_len();
                    transcript.apply(&deltas);
                    (before, transcript.candidate_len())
                };
                let _ = self.event_tx.send(SessionEvent::TranscriptUpdated);

                if after != before {
                    self.cancel_escalation();
                    let state = self.state();
                    if state == CallSessionState::SilenceWarning {
                        self.set_state(CallSessionState::Active);
                    }
                }
            }
            TransportEvent::CallEnded => {
                self.finish(EndReason::Completed).await;
            }
            TransportEvent::Error(message) => {
                warn!(error = %message, "Transport error, ending session");
                self.finish(EndReason::TransportError(message)).await;
            }
        }
    }

    async fn audio_loop(
        weak: Weak<Self>,
        cancel: CancellationToken,
        mut rx: broadcast::Receiver<AudioEvent>,
    ) {
        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => break,
                event = rx.recv() => event,
            };
            let Some(this) = weak.upgrade() else { break };
            match event {
                Ok(AudioEvent::PromptMessage(message)) => {
                    // Surfaced as the agent's utterance, as if spoken
                    this.transcript.lock().set_agent(&message);
                    let _ = this.event_tx.send(SessionEvent::TranscriptUpdated);
                }
                Ok(AudioEvent::ShowRecovery) => this.pause_for_recovery(),
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Audio event stream lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }

    /// Drives the countdown under the compound guard: live call, not
    /// paused, audio healthy
    ///
    /// Each tick accrues the measured time since the previous tick, so
    /// ticks skipped under load do not lose wall time.
    async fn timer_loop(weak: Weak<Self>, cancel: CancellationToken, tick_interval: Duration) {
        let mut ticker = interval(tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut last = Instant::now();

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let now = Instant::now();
            let dt = now - last;
            last = now;

            let Some(this) = weak.upgrade() else { break };
            let calling = this.state().is_calling();
            let audio_healthy = this.monitor.status().audio_level_detected;
            let expired = this.timer.lock().tick(dt, calling, audio_healthy);

            if expired {
                info!("Allowed interview duration reached");
                this.finish(EndReason::TimerExpired).await;
                break;
            }
        }
    }

    /// Arm the two-stage silence escalation after the agent stops
    /// speaking
    ///
    /// Stage one fires after the response timeout if the candidate's
    /// utterance has not grown: warn and inject the spoken prompt.
    /// Stage two follows after the message delay: pause the timer and
    /// force the recovery UI. Candidate speech or a new agent utterance
    /// cancels whatever remains.
    fn arm_escalation(&self) {
        let baseline = self.transcript.lock().candidate_len();
        let response_timeout = Duration::from_millis(self.settings.silence.response_timeout_ms);
        let message_delay = Duration::from_millis(self.settings.silence.message_delay_ms);
        let prompt = self.settings.silence.recovery_prompt.clone();
        let weak = self.weak.clone();

        let handle = tokio::spawn(async move {
            tokio::time::sleep(response_timeout).await;

            {
                let Some(this) = weak.upgrade() else { return };
                if !this.state().is_calling() {
                    return;
                }
                if this.transcript.lock().candidate_len() != baseline {
                    return;
                }

                info!("Candidate silent past response timeout");
                this.set_state(CallSessionState::SilenceWarning);
                this.transcript.lock().set_agent(&prompt);
                let _ = this.event_tx.send(SessionEvent::TranscriptUpdated);
            }

            tokio::time::sleep(message_delay).await;

            let Some(this) = weak.upgrade() else { return };
            if this.transcript.lock().candidate_len() != baseline {
                return;
            }
            this.monitor.trigger_condition(true);
            this.pause_for_recovery();
        });

        if let Some(previous) = self.escalation.lock().replace(handle) {
            previous.abort();
        }
    }

    fn cancel_escalation(&self) {
        if let Some(task) = self.escalation.lock().take() {
            task.abort();
        }
    }

    /// Freeze the session while the recovery UI is up
    fn pause_for_recovery(&self) {
        if !self.recovery_modal_visible.swap(true, Ordering::SeqCst) {
            let _ = self.event_tx.send(SessionEvent::RecoveryModalShown);
        }

        let calling = self.state().is_calling();
        if calling {
            {
                let mut timer = self.timer.lock();
                if !timer.is_paused() {
                    timer.pause();
                    let _ = self.event_tx.send(SessionEvent::TimerPaused);
                }
            }
            self.set_state(CallSessionState::Paused);
        }
    }
}

impl Drop for CallSessionController {
    fn drop(&mut self) {
        self.cancel.cancel();
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
        if let Some(task) = self.escalation.lock().take() {
            task.abort();
        }
    }
}
