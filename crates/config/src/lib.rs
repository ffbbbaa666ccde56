//! Configuration for the interview call-session engine
//!
//! Settings are layered: `config/default.yaml`, an optional
//! environment-specific file, then `INTERVIEW_AGENT__`-prefixed
//! environment variables.

mod settings;

pub use settings::{
    load_settings, AudioConfig, IntakeConfig, ObservabilityConfig, RetryConfig, Settings,
    SilenceConfig, TimerConfig,
};

use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("Config load error: {0}")]
    Load(#[from] config::ConfigError),
}
