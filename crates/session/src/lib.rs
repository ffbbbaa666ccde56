//! Call session orchestration
//!
//! Owns the lifecycle of one interview call: intake gating, the start
//! sequence, transport event handling, the session timer, and the
//! silence escalation that nudges an unresponsive candidate before
//! pausing the session.

mod controller;
mod error;
mod timer;

pub use controller::{CallSessionController, SessionEvent, SessionServices};
pub use error::SessionError;
pub use timer::SessionTimer;
