//! Main settings module

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[derive(Default)]
pub struct Settings {
    /// Audio-health monitoring configuration
    #[serde(default)]
    pub audio: AudioConfig,

    /// Silence-escalation configuration
    #[serde(default)]
    pub silence: SilenceConfig,

    /// Session timer configuration
    #[serde(default)]
    pub timer: TimerConfig,

    /// Intake form configuration
    #[serde(default)]
    pub intake: IntakeConfig,

    /// Analysis-fetch retry configuration
    #[serde(default)]
    pub retry: RetryConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Settings {
    /// Create default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.audio.silence_window_ms < 1000 {
            return Err(ConfigError::InvalidValue {
                field: "audio.silence_window_ms".to_string(),
                message: "Silence window too short (minimum 1000ms)".to_string(),
            });
        }

        if self.audio.frame_interval_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "audio.frame_interval_ms".to_string(),
                message: "Frame interval must be non-zero".to_string(),
            });
        }

        if self.silence.response_timeout_ms < 1000 {
            return Err(ConfigError::InvalidValue {
                field: "silence.response_timeout_ms".to_string(),
                message: "Response timeout too short (minimum 1000ms)".to_string(),
            });
        }

        if self.retry.max_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                field: "retry.max_attempts".to_string(),
                message: "At least one analysis attempt is required".to_string(),
            });
        }

        Ok(())
    }
}

/// Audio-health monitoring configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    /// Raw level (0-255) below which a sample counts as silence
    #[serde(default = "default_level_threshold")]
    pub level_threshold: u8,

    /// Sustained sub-threshold time before the not-detected condition is raised
    #[serde(default = "default_silence_window_ms")]
    pub silence_window_ms: u64,

    /// Sampling cadence of the level-detection loop (~60 Hz)
    #[serde(default = "default_frame_interval_ms")]
    pub frame_interval_ms: u64,

    /// Delay before showing the recovery UI while a call is active,
    /// leaving room for the spoken prompt to be heard first
    #[serde(default = "default_modal_delay_active_ms")]
    pub modal_delay_active_ms: u64,

    /// Delay before showing the recovery UI before the call starts
    #[serde(default = "default_modal_delay_precall_ms")]
    pub modal_delay_precall_ms: u64,

    /// Length of the manual microphone test burst
    #[serde(default = "default_mic_test_duration_ms")]
    pub mic_test_duration_ms: u64,

    /// Sampling cadence of the microphone test burst
    #[serde(default = "default_mic_test_interval_ms")]
    pub mic_test_interval_ms: u64,
}

fn default_level_threshold() -> u8 {
    5
}
fn default_silence_window_ms() -> u64 {
    10_000
}
fn default_frame_interval_ms() -> u64 {
    16
}
fn default_modal_delay_active_ms() -> u64 {
    2_000
}
fn default_modal_delay_precall_ms() -> u64 {
    1_000
}
fn default_mic_test_duration_ms() -> u64 {
    3_000
}
fn default_mic_test_interval_ms() -> u64 {
    50
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            level_threshold: default_level_threshold(),
            silence_window_ms: default_silence_window_ms(),
            frame_interval_ms: default_frame_interval_ms(),
            modal_delay_active_ms: default_modal_delay_active_ms(),
            modal_delay_precall_ms: default_modal_delay_precall_ms(),
            mic_test_duration_ms: default_mic_test_duration_ms(),
            mic_test_interval_ms: default_mic_test_interval_ms(),
        }
    }
}

/// Silence-escalation configuration
///
/// The response timeout drifted between 5s and 10s across revisions of the
/// original flow, so it is configurable rather than hard-coded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SilenceConfig {
    /// Window after the agent stops talking in which the candidate is
    /// expected to respond
    #[serde(default = "default_response_timeout_ms")]
    pub response_timeout_ms: u64,

    /// Delay between injecting the spoken prompt and pausing the timer /
    /// showing the recovery UI
    #[serde(default = "default_message_delay_ms")]
    pub message_delay_ms: u64,

    /// Prompt injected as the agent utterance when the candidate goes quiet
    #[serde(default = "default_recovery_prompt")]
    pub recovery_prompt: String,
}

fn default_response_timeout_ms() -> u64 {
    10_000
}
fn default_message_delay_ms() -> u64 {
    2_000
}
fn default_recovery_prompt() -> String {
    "I can see you, but I'm not receiving any audio yet. Let's quickly check a few things together."
        .to_string()
}

impl Default for SilenceConfig {
    fn default() -> Self {
        Self {
            response_timeout_ms: default_response_timeout_ms(),
            message_delay_ms: default_message_delay_ms(),
            recovery_prompt: default_recovery_prompt(),
        }
    }
}

/// Session timer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimerConfig {
    /// Tick interval for the timer drive task
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
}

fn default_tick_interval_ms() -> u64 {
    100
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
        }
    }
}

/// Intake form configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntakeConfig {
    /// Debounce applied to per-field async validation
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

fn default_debounce_ms() -> u64 {
    300
}

impl Default for IntakeConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
        }
    }
}

/// Analysis-fetch retry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum analysis attempts after call end
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry; doubles on each subsequent attempt
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
}

fn default_max_attempts() -> u32 {
    3
}
fn default_initial_backoff_ms() -> u64 {
    1_000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
        }
    }
}

/// Observability configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default)]
    pub log_json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_json: false,
        }
    }
}

/// Load settings from files and environment
///
/// Priority (highest to lowest):
/// 1. Environment variables (INTERVIEW_AGENT__ prefix)
/// 2. config/{env}.yaml (if env specified)
/// 3. config/default.yaml
pub fn load_settings(env: Option<&str>) -> Result<Settings, ConfigError> {
    let mut builder = Config::builder();

    builder = builder.add_source(File::with_name("config/default").required(false));

    if let Some(env_name) = env {
        builder = builder.add_source(File::with_name(&format!("config/{}", env_name)).required(false));
    }

    builder = builder.add_source(
        Environment::with_prefix("INTERVIEW_AGENT")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder.build()?;
    let settings: Settings = config.try_deserialize()?;

    settings.validate()?;

    Ok(settings)
}
