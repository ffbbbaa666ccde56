//! Generic debounce combinator
//!
//! Each call schedules a closure to run after a fixed delay; a newer call
//! cancels the outstanding one, so only the last edit in a burst is acted
//! on.

use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;

/// Debounced task scheduler for one logical target (e.g. one form field)
pub struct Debouncer {
    delay: Duration,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: Mutex::new(None),
        }
    }

    /// Schedule `f` to run after the delay, cancelling any pending run
    ///
    /// Must be called from within a tokio runtime.
    pub fn call<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let delay = self.delay;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            f();
        });

        if let Some(previous) = self.pending.lock().replace(handle) {
            previous.abort();
        }
    }

    /// Cancel any pending run
    pub fn cancel(&self) {
        if let Some(handle) = self.pending.lock().take() {
            handle.abort();
        }
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.cancel();
    }
}
