//! Voice transport layer
//!
//! Abstracts the realtime voice provider behind two seams: a registrar
//! that provisions a call with the provider, and a transport that runs
//! the live call and publishes its events. The session controller only
//! ever sees these traits.

mod error;
mod registrar;
mod simulated;
mod traits;

pub use error::TransportError;
pub use registrar::{CallContext, CallRegistrar, RegisteredCall, SimulatedCallRegistrar};
pub use simulated::SimulatedVoiceTransport;
pub use traits::{TransportEvent, VoiceTransport};
