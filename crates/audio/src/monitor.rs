//! Audio health monitor
//!
//! Runs a level-detection loop against the capture backend and raises a
//! latched recovery condition after a sustained silence window. The
//! recovery UI is shown after a short delay so a spoken prompt can land
//! first during an active call.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use interview_agent_config::AudioConfig;

use crate::{AudioError, CaptureBackend, CaptureDevice};

/// Map a raw 0-255 sample onto the 0-100 scale surfaced in status
fn normalize(level: u8) -> u8 {
    (u16::from(level) * 100 / 255) as u8
}

/// Snapshot of every audio health flag
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioHealthStatus {
    /// Microphone access granted
    pub microphone_permission: bool,
    /// Host supports audio capture
    pub capture_supported: bool,
    /// At least one input device is present
    pub device_available: bool,
    /// Voice-level audio seen within the silence window
    pub audio_level_detected: bool,
    /// Latest level sample normalized to 0-100
    pub current_level: u8,
}

impl Default for AudioHealthStatus {
    fn default() -> Self {
        Self {
            microphone_permission: true,
            capture_supported: true,
            device_available: true,
            audio_level_detected: true,
            current_level: 0,
        }
    }
}

impl AudioHealthStatus {
    /// All flags healthy
    pub fn is_healthy(&self) -> bool {
        self.microphone_permission
            && self.capture_supported
            && self.device_available
            && self.audio_level_detected
    }
}

/// Events published by the monitor
#[derive(Debug, Clone)]
pub enum AudioEvent {
    /// A health flag changed
    StatusChanged(AudioHealthStatus),
    /// Spoken prompt to inject into the conversation
    PromptMessage(String),
    /// Show the recovery UI (after the modal delay)
    ShowRecovery,
    /// The condition was cleared by the user
    ConditionCleared,
}

/// Watches capture levels and escalates sustained silence
pub struct AudioHealthMonitor {
    /// Self-reference for spawning the detection loop from `&self`
    weak: Weak<Self>,
    backend: Arc<dyn CaptureBackend>,
    config: AudioConfig,
    /// Prompt injected when the silence condition fires mid-call
    prompt: String,
    status: Mutex<AudioHealthStatus>,
    event_tx: broadcast::Sender<AudioEvent>,
    detection_task: Mutex<Option<JoinHandle<()>>>,
    recovery_task: Mutex<Option<JoinHandle<()>>>,
    /// One-shot latch: the recovery path fires once per episode
    recovery_shown: AtomicBool,
    call_active: AtomicBool,
    device_id: Mutex<Option<String>>,
    /// When voice-level audio was last observed
    last_voice: Mutex<Instant>,
}

impl AudioHealthMonitor {
    pub fn new(backend: Arc<dyn CaptureBackend>, config: AudioConfig, prompt: String) -> Arc<Self> {
        let (event_tx, _) = broadcast::channel(100);
        Arc::new_cyclic(|weak| Self {
            weak: weak.clone(),
            backend,
            config,
            prompt,
            status: Mutex::new(AudioHealthStatus::default()),
            event_tx,
            detection_task: Mutex::new(None),
            recovery_task: Mutex::new(None),
            recovery_shown: AtomicBool::new(false),
            call_active: AtomicBool::new(false),
            device_id: Mutex::new(None),
            last_voice: Mutex::new(Instant::now()),
        })
    }

    /// Subscribe to monitor events
    pub fn subscribe(&self) -> broadcast::Receiver<AudioEvent> {
        self.event_tx.subscribe()
    }

    /// Current health snapshot
    pub fn status(&self) -> AudioHealthStatus {
        self.status.lock().clone()
    }

    /// Selects the recovery delay: longer during an active call so the
    /// spoken prompt is heard before the UI appears
    pub fn set_call_active(&self, active: bool) {
        self.call_active.store(active, Ordering::SeqCst);
    }

    /// Run the checks: capture support, permission, devices; start
    /// level detection when everything passes
    ///
    /// The recovery latch is re-armed first so a retry can fire the
    /// condition again. Failures degrade the corresponding flag instead
    /// of erroring; an unhealthy outcome schedules the recovery UI
    /// without a spoken prompt.
    pub async fn perform_checks(&self) -> AudioHealthStatus {
        self.recovery_shown.store(false, Ordering::SeqCst);
        let supported = self.backend.is_supported();

        let permission = if supported {
            match self.backend.request_permission().await {
                Ok(granted) => granted,
                Err(e) => {
                    warn!(error = %e, "Microphone permission check failed");
                    false
                }
            }
        } else {
            false
        };

        let device_available = if permission {
            match self.backend.list_devices().await {
                Ok(devices) => !devices.is_empty(),
                Err(e) => {
                    warn!(error = %e, "Device enumeration failed");
                    false
                }
            }
        } else {
            false
        };

        let snapshot = {
            let mut status = self.status.lock();
            status.capture_supported = supported;
            status.microphone_permission = permission;
            status.device_available = device_available;
            status.clone()
        };

        info!(
            supported,
            permission, device_available, "Audio pre-call checks complete"
        );
        let _ = self.event_tx.send(AudioEvent::StatusChanged(snapshot.clone()));

        if snapshot.is_healthy() {
            self.start_level_detection();
        } else {
            self.schedule_recovery(true);
        }

        snapshot
    }

    /// Enumerate input devices, degrading to empty on backend failure
    pub async fn list_devices(&self) -> Vec<CaptureDevice> {
        match self.backend.list_devices().await {
            Ok(devices) => devices,
            Err(e) => {
                warn!(error = %e, "Device enumeration failed");
                Vec::new()
            }
        }
    }

    /// Start the level-detection loop; no-op when already running
    pub fn start_level_detection(&self) {
        let mut guard = self.detection_task.lock();
        if guard.is_some() {
            return;
        }

        *self.last_voice.lock() = Instant::now();
        *guard = Some(tokio::spawn(Self::detection_loop(self.weak.clone())));
        debug!("Level detection started");
    }

    /// Stop the level-detection loop; safe to call when not running
    ///
    /// Releases the stream, zeroes the level and re-arms the latch so a
    /// later restart begins from a clean slate.
    pub fn stop_level_detection(&self) {
        if let Some(task) = self.detection_task.lock().take() {
            task.abort();
            debug!("Level detection stopped");
        }
        if let Some(task) = self.recovery_task.lock().take() {
            task.abort();
        }
        self.recovery_shown.store(false, Ordering::SeqCst);
        self.status.lock().current_level = 0;
    }

    /// Switch capture to another device
    ///
    /// The running loop is torn down, any pending condition cleared,
    /// and detection restarted against the new device.
    pub fn change_device(&self, device_id: Option<String>) {
        info!(device = ?device_id, "Changing capture device");
        self.stop_level_detection();
        *self.device_id.lock() = device_id;
        self.clear_condition();
        self.start_level_detection();
    }

    /// Sample the microphone for a short burst and report whether any
    /// sample cleared the silence threshold
    pub async fn test_microphone(&self) -> Result<bool, AudioError> {
        let device = self.device_id.lock().clone();
        let stream = self.backend.open_stream(device.as_deref()).await?;

        let samples =
            (self.config.mic_test_duration_ms / self.config.mic_test_interval_ms).max(1);
        let mut ticker = interval(Duration::from_millis(self.config.mic_test_interval_ms));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut max_level = 0u8;
        for _ in 0..samples {
            ticker.tick().await;
            max_level = max_level.max(stream.level());
        }

        debug!(max_level, "Microphone test complete");
        Ok(max_level > self.config.level_threshold)
    }

    /// Raise the recovery condition from outside the detection loop,
    /// e.g. when silence escalation decides the candidate is gone
    ///
    /// Unlike the sampled path this shows the recovery UI immediately;
    /// the caller has already given any spoken prompt time to land.
    pub fn trigger_condition(&self, skip_message: bool) {
        let snapshot = {
            let mut status = self.status.lock();
            if !status.audio_level_detected {
                None
            } else {
                status.audio_level_detected = false;
                Some(status.clone())
            }
        };
        if let Some(snapshot) = snapshot {
            let _ = self.event_tx.send(AudioEvent::StatusChanged(snapshot));
        }

        if self.recovery_shown.swap(true, Ordering::SeqCst) {
            return;
        }
        if !skip_message {
            let _ = self
                .event_tx
                .send(AudioEvent::PromptMessage(self.prompt.clone()));
        }
        let _ = self.event_tx.send(AudioEvent::ShowRecovery);
    }

    /// Clear the condition and re-arm the latch
    ///
    /// Called when the candidate dismisses the recovery UI. The silence
    /// window restarts from now so the condition does not immediately
    /// re-fire.
    pub fn clear_condition(&self) {
        if let Some(task) = self.recovery_task.lock().take() {
            task.abort();
        }
        self.recovery_shown.store(false, Ordering::SeqCst);
        *self.last_voice.lock() = Instant::now();

        let snapshot = {
            let mut status = self.status.lock();
            status.audio_level_detected = true;
            status.clone()
        };
        let _ = self.event_tx.send(AudioEvent::StatusChanged(snapshot));
        let _ = self.event_tx.send(AudioEvent::ConditionCleared);
    }

    /// Holds the monitor only through a `Weak` per iteration, so the
    /// loop winds down on its own when the last external handle drops
    async fn detection_loop(weak: Weak<Self>) {
        let (stream, threshold, window, frame) = {
            let Some(this) = weak.upgrade() else { return };
            let device = this.device_id.lock().clone();
            let stream = match this.backend.open_stream(device.as_deref()).await {
                Ok(stream) => stream,
                Err(e) => {
                    warn!(error = %e, "Capture unavailable, raising recovery condition");
                    this.degrade_for(&e);
                    this.schedule_recovery(true);
                    return;
                }
            };
            (
                stream,
                this.config.level_threshold,
                Duration::from_millis(this.config.silence_window_ms),
                Duration::from_millis(this.config.frame_interval_ms),
            )
        };

        let mut ticker = interval(frame);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            let Some(this) = weak.upgrade() else { break };
            let level = stream.level();

            if level > threshold {
                *this.last_voice.lock() = Instant::now();
                this.mark_detected(level);
            } else if this.last_voice.lock().elapsed() >= window {
                this.mark_silent(level);
            } else {
                this.status.lock().current_level = normalize(level);
            }
        }
    }

    fn mark_detected(&self, level: u8) {
        let snapshot = {
            let mut status = self.status.lock();
            status.current_level = normalize(level);
            if status.audio_level_detected {
                None
            } else {
                status.audio_level_detected = true;
                Some(status.clone())
            }
        };
        if let Some(snapshot) = snapshot {
            debug!(level, "Audio level recovered");
            let _ = self.event_tx.send(AudioEvent::StatusChanged(snapshot));
        }
    }

    fn mark_silent(&self, level: u8) {
        let snapshot = {
            let mut status = self.status.lock();
            status.current_level = normalize(level);
            if !status.audio_level_detected {
                None
            } else {
                status.audio_level_detected = false;
                Some(status.clone())
            }
        };
        if let Some(snapshot) = snapshot {
            info!("Silence window elapsed without voice-level audio");
            let _ = self.event_tx.send(AudioEvent::StatusChanged(snapshot));
        }
        self.schedule_recovery(false);
    }

    /// Fire the one-shot recovery path: optional spoken prompt now, the
    /// recovery UI after the modal delay
    fn schedule_recovery(&self, skip_message: bool) {
        if self.recovery_shown.swap(true, Ordering::SeqCst) {
            return;
        }

        if !skip_message {
            let _ = self
                .event_tx
                .send(AudioEvent::PromptMessage(self.prompt.clone()));
        }

        let delay_ms = if self.call_active.load(Ordering::SeqCst) {
            self.config.modal_delay_active_ms
        } else {
            self.config.modal_delay_precall_ms
        };

        let event_tx = self.event_tx.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            let _ = event_tx.send(AudioEvent::ShowRecovery);
        });
        if let Some(previous) = self.recovery_task.lock().replace(handle) {
            previous.abort();
        }
    }

    fn degrade_for(&self, error: &AudioError) {
        let snapshot = {
            let mut status = self.status.lock();
            match error {
                AudioError::PermissionDenied => status.microphone_permission = false,
                AudioError::Unsupported => status.capture_supported = false,
                AudioError::NoDevice => status.device_available = false,
                AudioError::Backend(_) => status.audio_level_detected = false,
            }
            status.clone()
        };
        let _ = self.event_tx.send(AudioEvent::StatusChanged(snapshot));
    }
}

impl Drop for AudioHealthMonitor {
    fn drop(&mut self) {
        if let Some(task) = self.detection_task.lock().take() {
            task.abort();
        }
        if let Some(task) = self.recovery_task.lock().take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SimulatedCaptureBackend;

    const PROMPT: &str = "I can see you, but I'm not receiving any audio yet.";

    fn monitor_with_backend() -> (Arc<AudioHealthMonitor>, Arc<SimulatedCaptureBackend>) {
        let backend = Arc::new(SimulatedCaptureBackend::new());
        let monitor = AudioHealthMonitor::new(
            backend.clone(),
            AudioConfig::default(),
            PROMPT.to_string(),
        );
        (monitor, backend)
    }

    /// Step the paused clock in small increments, yielding between
    /// steps so newly spawned delay tasks get polled (and their timers
    /// armed) at the intended instant instead of after the whole jump
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
    }

    fn drain(rx: &mut broadcast::Receiver<AudioEvent>) -> Vec<AudioEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    fn prompt_count(events: &[AudioEvent]) -> usize {
        events
            .iter()
            .filter(|e| matches!(e, AudioEvent::PromptMessage(_)))
            .count()
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_condition_just_under_window() {
        let (monitor, backend) = monitor_with_backend();
        backend.set_level(0);
        let mut rx = monitor.subscribe();
        monitor.start_level_detection();

        advance(9_900).await;

        assert!(monitor.status().audio_level_detected);
        assert_eq!(prompt_count(&drain(&mut rx)), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_condition_just_over_window() {
        let (monitor, backend) = monitor_with_backend();
        backend.set_level(0);
        let mut rx = monitor.subscribe();
        monitor.start_level_detection();

        advance(10_100).await;

        assert!(!monitor.status().audio_level_detected);
        let events = drain(&mut rx);
        assert_eq!(prompt_count(&events), 1);
        // Pre-call delay has not elapsed yet
        assert!(!events.iter().any(|e| matches!(e, AudioEvent::ShowRecovery)));

        advance(1_100).await;
        assert!(drain(&mut rx)
            .iter()
            .any(|e| matches!(e, AudioEvent::ShowRecovery)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_active_call_uses_longer_modal_delay() {
        let (monitor, backend) = monitor_with_backend();
        backend.set_level(0);
        monitor.set_call_active(true);
        let mut rx = monitor.subscribe();
        monitor.start_level_detection();

        advance(10_100).await;
        advance(1_100).await;
        // 2s active delay still pending at 1.1s
        assert!(!drain(&mut rx)
            .iter()
            .any(|e| matches!(e, AudioEvent::ShowRecovery)));

        advance(1_000).await;
        assert!(drain(&mut rx)
            .iter()
            .any(|e| matches!(e, AudioEvent::ShowRecovery)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_voice_resets_window() {
        let (monitor, backend) = monitor_with_backend();
        backend.set_level(0);
        let mut rx = monitor.subscribe();
        monitor.start_level_detection();

        advance(8_000).await;
        backend.set_level(50);
        advance(100).await;
        backend.set_level(0);
        advance(8_000).await;

        assert!(monitor.status().audio_level_detected);
        assert_eq!(prompt_count(&drain(&mut rx)), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_latch_prevents_repeat_prompt() {
        let (monitor, backend) = monitor_with_backend();
        backend.set_level(0);
        let mut rx = monitor.subscribe();
        monitor.start_level_detection();

        advance(10_100).await;
        // Voice returns, then a second silence episode
        backend.set_level(50);
        advance(100).await;
        backend.set_level(0);
        advance(10_100).await;

        assert_eq!(prompt_count(&drain(&mut rx)), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_condition_rearms_latch() {
        let (monitor, backend) = monitor_with_backend();
        backend.set_level(0);
        let mut rx = monitor.subscribe();
        monitor.start_level_detection();

        advance(10_100).await;
        assert_eq!(prompt_count(&drain(&mut rx)), 1);

        monitor.clear_condition();
        assert!(monitor.status().audio_level_detected);

        advance(10_100).await;
        assert_eq!(prompt_count(&drain(&mut rx)), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_is_idempotent() {
        let (monitor, backend) = monitor_with_backend();
        backend.set_level(0);
        let mut rx = monitor.subscribe();
        monitor.start_level_detection();
        monitor.start_level_detection();

        advance(10_100).await;
        assert_eq!(prompt_count(&drain(&mut rx)), 1);

        monitor.stop_level_detection();
        monitor.stop_level_detection();
    }

    #[tokio::test(start_paused = true)]
    async fn test_capture_failure_degrades_and_recovers_ui() {
        let (monitor, backend) = monitor_with_backend();
        backend.deny_permission();
        let mut rx = monitor.subscribe();
        monitor.start_level_detection();

        advance(1_100).await;

        assert!(!monitor.status().microphone_permission);
        let events = drain(&mut rx);
        // Degraded path skips the spoken prompt
        assert_eq!(prompt_count(&events), 0);
        assert!(events.iter().any(|e| matches!(e, AudioEvent::ShowRecovery)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_microphone_burst() {
        let (monitor, backend) = monitor_with_backend();
        backend.set_level(0);
        assert!(!monitor.test_microphone().await.unwrap());

        backend.set_level(50);
        assert!(monitor.test_microphone().await.unwrap());
    }

    #[tokio::test]
    async fn test_perform_checks_reports_denied_permission() {
        let (monitor, backend) = monitor_with_backend();
        backend.deny_permission();

        let status = monitor.perform_checks().await;
        assert!(!status.microphone_permission);
        assert!(!status.is_healthy());
    }

    #[tokio::test(start_paused = true)]
    async fn test_change_device_restarts_detection() {
        let (monitor, backend) = monitor_with_backend();
        backend.add_device("usb-1", "USB microphone");
        backend.set_level(0);
        monitor.start_level_detection();

        advance(10_100).await;
        assert!(!monitor.status().audio_level_detected);

        monitor.change_device(Some("usb-1".to_string()));
        assert!(monitor.status().audio_level_detected);

        // Window restarts on the new device
        advance(9_000).await;
        assert!(monitor.status().audio_level_detected);
    }
}
