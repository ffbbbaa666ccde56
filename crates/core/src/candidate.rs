//! Candidate profile collected by the intake form

use serde::{Deserialize, Serialize};

/// Profile the intake form hands to the session at start
///
/// Validation happens in the intake crate; a profile snapshot carries raw
/// (trimmed) values. Optional fields are `None` when left empty.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CandidateProfile {
    pub full_name: String,
    pub email: Option<String>,
    /// E.164 phone number
    pub phone: String,
    pub country: String,
    pub gender: String,
    pub years_experience: String,
    pub linkedin_url: String,
    pub twitter_url: Option<String>,
}

impl CandidateProfile {
    /// Social links present on the profile, keyed by platform
    pub fn social_links(&self) -> Vec<(&'static str, &str)> {
        let mut links = Vec::new();
        if !self.linkedin_url.is_empty() {
            links.push(("linkedin", self.linkedin_url.as_str()));
        }
        if let Some(twitter) = self.twitter_url.as_deref() {
            if !twitter.is_empty() {
                links.push(("twitter", twitter));
            }
        }
        links
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_social_links_skip_empty() {
        let profile = CandidateProfile {
            full_name: "Ada".to_string(),
            linkedin_url: "https://linkedin.com/in/ada".to_string(),
            twitter_url: None,
            ..Default::default()
        };

        let links = profile.social_links();
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].0, "linkedin");
    }
}
