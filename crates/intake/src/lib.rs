//! Candidate intake form
//!
//! Collects and validates candidate fields before a session may start.
//! Validation is debounced per field and never fails loudly: invalid
//! input only flips a per-field validity flag, so the form withholds
//! readiness instead of erroring.

mod debounce;
mod form;
pub mod validators;

pub use debounce::Debouncer;
pub use form::{CandidateIntake, Field, FieldValidity};
