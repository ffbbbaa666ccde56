//! Capture backend abstraction
//!
//! The monitor never talks to audio hardware directly; it goes through
//! [`CaptureBackend`], which hands out level streams. Production hosts
//! bind this to their platform capture API; tests use
//! [`SimulatedCaptureBackend`].

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::watch;

use crate::AudioError;

/// An enumerable audio input device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureDevice {
    pub id: String,
    pub label: String,
}

/// Interface to the host's audio capture facility
#[async_trait]
pub trait CaptureBackend: Send + Sync {
    /// Whether the host supports audio capture at all
    fn is_supported(&self) -> bool;

    /// Request microphone access; `Ok(false)` means the user declined
    async fn request_permission(&self) -> Result<bool, AudioError>;

    /// Enumerate available input devices
    async fn list_devices(&self) -> Result<Vec<CaptureDevice>, AudioError>;

    /// Open a level stream, from the default device when `device_id` is None
    async fn open_stream(
        &self,
        device_id: Option<&str>,
    ) -> Result<Box<dyn CaptureStream>, AudioError>;
}

/// A live level stream from one capture device
pub trait CaptureStream: Send + Sync {
    /// Latest raw level sample on the 0-255 scale
    fn level(&self) -> u8;
}

/// In-memory backend for tests and local runs
///
/// The level is a shared cell; tests drive it with [`set_level`] and
/// every open stream observes the same value.
///
/// [`set_level`]: SimulatedCaptureBackend::set_level
pub struct SimulatedCaptureBackend {
    supported: AtomicBool,
    permission_granted: AtomicBool,
    fail_open: AtomicBool,
    devices: Mutex<Vec<CaptureDevice>>,
    level_tx: watch::Sender<u8>,
}

impl SimulatedCaptureBackend {
    pub fn new() -> Self {
        let (level_tx, _) = watch::channel(0);
        Self {
            supported: AtomicBool::new(true),
            permission_granted: AtomicBool::new(true),
            fail_open: AtomicBool::new(false),
            devices: Mutex::new(vec![CaptureDevice {
                id: "default".to_string(),
                label: "Default microphone".to_string(),
            }]),
            level_tx,
        }
    }

    /// Set the level seen by all open streams
    ///
    /// Stored unconditionally, so levels set before any stream is open
    /// are observed by streams opened later.
    pub fn set_level(&self, level: u8) {
        self.level_tx.send_replace(level);
    }

    pub fn deny_permission(&self) {
        self.permission_granted.store(false, Ordering::SeqCst);
    }

    pub fn set_unsupported(&self) {
        self.supported.store(false, Ordering::SeqCst);
    }

    pub fn remove_all_devices(&self) {
        self.devices.lock().clear();
    }

    pub fn add_device(&self, id: &str, label: &str) {
        self.devices.lock().push(CaptureDevice {
            id: id.to_string(),
            label: label.to_string(),
        });
    }

    /// Make every subsequent `open_stream` fail
    pub fn fail_open(&self) {
        self.fail_open.store(true, Ordering::SeqCst);
    }
}

impl Default for SimulatedCaptureBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CaptureBackend for SimulatedCaptureBackend {
    fn is_supported(&self) -> bool {
        self.supported.load(Ordering::SeqCst)
    }

    async fn request_permission(&self) -> Result<bool, AudioError> {
        if !self.is_supported() {
            return Err(AudioError::Unsupported);
        }
        Ok(self.permission_granted.load(Ordering::SeqCst))
    }

    async fn list_devices(&self) -> Result<Vec<CaptureDevice>, AudioError> {
        Ok(self.devices.lock().clone())
    }

    async fn open_stream(
        &self,
        device_id: Option<&str>,
    ) -> Result<Box<dyn CaptureStream>, AudioError> {
        if !self.is_supported() {
            return Err(AudioError::Unsupported);
        }
        if !self.permission_granted.load(Ordering::SeqCst) {
            return Err(AudioError::PermissionDenied);
        }
        if self.fail_open.load(Ordering::SeqCst) {
            return Err(AudioError::Backend("simulated open failure".to_string()));
        }

        let devices = self.devices.lock();
        let available = match device_id {
            Some(id) => devices.iter().any(|d| d.id == id),
            None => !devices.is_empty(),
        };
        if !available {
            return Err(AudioError::NoDevice);
        }

        Ok(Box::new(SimulatedCaptureStream {
            level_rx: self.level_tx.subscribe(),
        }))
    }
}

/// Stream handed out by [`SimulatedCaptureBackend`]
pub struct SimulatedCaptureStream {
    level_rx: watch::Receiver<u8>,
}

impl CaptureStream for SimulatedCaptureStream {
    fn level(&self) -> u8 {
        *self.level_rx.borrow()
    }
}
