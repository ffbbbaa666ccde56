//! Candidate intake form state

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use interview_agent_core::CandidateProfile;

use crate::debounce::Debouncer;
use crate::validators;

/// Intake form fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Email,
    FullName,
    Phone,
    Country,
    Gender,
    YearsExperience,
    Linkedin,
    Twitter,
}

/// Per-field validity flags
///
/// Email starts invalid (it is empty); phone and the URL fields start
/// valid because empty input is not an error for them, only a missing
/// requirement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldValidity {
    pub email: bool,
    pub phone: bool,
    pub twitter: bool,
    pub linkedin: bool,
}

impl Default for FieldValidity {
    fn default() -> Self {
        Self {
            email: false,
            phone: true,
            twitter: true,
            linkedin: true,
        }
    }
}

#[derive(Debug, Clone, Default)]
struct FormState {
    email: String,
    full_name: String,
    phone: String,
    country: String,
    gender: String,
    years_experience: String,
    linkedin: String,
    twitter: String,
}

/// Candidate intake form with debounced validation
///
/// `set_field` stores raw input immediately and schedules validation of
/// that field after the debounce window, so validity flags settle once
/// the candidate stops typing.
pub struct CandidateIntake {
    state: Arc<Mutex<FormState>>,
    validity: Arc<Mutex<FieldValidity>>,
    email_debounce: Debouncer,
    phone_debounce: Debouncer,
    twitter_debounce: Debouncer,
    linkedin_debounce: Debouncer,
}

impl CandidateIntake {
    pub fn new(debounce: Duration) -> Self {
        Self {
            state: Arc::new(Mutex::new(FormState::default())),
            validity: Arc::new(Mutex::new(FieldValidity::default())),
            email_debounce: Debouncer::new(debounce),
            phone_debounce: Debouncer::new(debounce),
            twitter_debounce: Debouncer::new(debounce),
            linkedin_debounce: Debouncer::new(debounce),
        }
    }

    /// Store raw input and schedule debounced validation for the field
    pub fn set_field(&self, field: Field, value: impl Into<String>) {
        let value = value.into();

        {
            let mut state = self.state.lock();
            match field {
                Field::Email => state.email = value.clone(),
                Field::FullName => state.full_name = value.clone(),
                Field::Phone => state.phone = value.clone(),
                Field::Country => state.country = value.clone(),
                Field::Gender => state.gender = value.clone(),
                Field::YearsExperience => state.years_experience = value.clone(),
                Field::Linkedin => state.linkedin = value.clone(),
                Field::Twitter => state.twitter = value.clone(),
            }
        }

        let validity = Arc::clone(&self.validity);
        match field {
            Field::Email => self.email_debounce.call(move || {
                validity.lock().email = validators::is_valid_email(&value);
            }),
            Field::Phone => self.phone_debounce.call(move || {
                validity.lock().phone = Self::phone_valid(&value);
            }),
            Field::Twitter => self.twitter_debounce.call(move || {
                validity.lock().twitter = validators::is_valid_url(&value);
            }),
            Field::Linkedin => self.linkedin_debounce.call(move || {
                validity.lock().linkedin = validators::is_valid_url(&value);
            }),
            // Plain text fields have no format rule
            _ => {}
        }
    }

    // Empty phone is "valid but missing"; only non-empty input is checked
    fn phone_valid(value: &str) -> bool {
        if value.trim().is_empty() {
            true
        } else {
            validators::is_valid_phone(value)
        }
    }

    /// Re-run every validator synchronously, bypassing the debounce
    ///
    /// Used at submit time so stale flags from an in-flight debounce
    /// window cannot gate the form.
    pub fn validate_all(&self) {
        let state = self.state.lock().clone();
        let mut validity = self.validity.lock();
        validity.email = validators::is_valid_email(&state.email);
        validity.phone = Self::phone_valid(&state.phone);
        validity.twitter = validators::is_valid_url(&state.twitter);
        validity.linkedin = validators::is_valid_url(&state.linkedin);
    }

    /// Current validity flags
    pub fn validity(&self) -> FieldValidity {
        *self.validity.lock()
    }

    /// Current raw value of a field
    pub fn value(&self, field: Field) -> String {
        let state = self.state.lock();
        match field {
            Field::Email => state.email.clone(),
            Field::FullName => state.full_name.clone(),
            Field::Phone => state.phone.clone(),
            Field::Country => state.country.clone(),
            Field::Gender => state.gender.clone(),
            Field::YearsExperience => state.years_experience.clone(),
            Field::Linkedin => state.linkedin.clone(),
            Field::Twitter => state.twitter.clone(),
        }
    }

    /// Whether the form allows a session to start
    ///
    /// True iff (email valid OR anonymous) AND every required field is
    /// non-empty AND the phone/twitter/linkedin validity flags hold.
    pub fn is_form_valid(&self, is_anonymous: bool) -> bool {
        let state = self.state.lock();
        let validity = *self.validity.lock();

        let required_present = !state.full_name.trim().is_empty()
            && !state.phone.trim().is_empty()
            && !state.country.trim().is_empty()
            && !state.gender.trim().is_empty()
            && !state.years_experience.trim().is_empty()
            && !state.linkedin.trim().is_empty();

        (is_anonymous || validity.email)
            && required_present
            && validity.phone
            && validity.twitter
            && validity.linkedin
    }

    /// Snapshot the profile for session start
    pub fn profile(&self) -> CandidateProfile {
        let state = self.state.lock();

        let none_if_empty = |s: &str| {
            let t = s.trim();
            if t.is_empty() {
                None
            } else {
                Some(t.to_string())
            }
        };

        CandidateProfile {
            full_name: state.full_name.trim().to_string(),
            email: none_if_empty(&state.email),
            phone: state.phone.trim().to_string(),
            country: state.country.trim().to_string(),
            gender: state.gender.trim().to_string(),
            years_experience: state.years_experience.trim().to_string(),
            linkedin_url: state.linkedin.trim().to_string(),
            twitter_url: none_if_empty(&state.twitter),
        }
    }
}
