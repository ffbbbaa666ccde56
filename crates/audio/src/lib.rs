//! Audio capture health monitoring
//!
//! Watches the candidate's microphone through a pluggable capture
//! backend and raises a recovery condition when no voice-level audio
//! arrives for a sustained window. The condition is latched so the
//! recovery prompt fires once per episode, and cleared when the
//! candidate dismisses the recovery UI.

mod capture;
mod error;
mod monitor;

pub use capture::{
    CaptureBackend, CaptureDevice, CaptureStream, SimulatedCaptureBackend, SimulatedCaptureStream,
};
pub use error::AudioError;
pub use monitor::{AudioEvent, AudioHealthMonitor, AudioHealthStatus};
