//! Interview configuration as seen by a candidate session

use serde::{Deserialize, Serialize};

/// One interview template a candidate joins through a link
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Interview {
    /// Interview id
    pub id: String,

    /// Display name
    pub name: String,

    /// Interview objective fed to the voice agent
    pub objective: String,

    /// Questions the agent should work through
    pub questions: Vec<String>,

    /// Allowed session duration in minutes
    pub time_duration_minutes: u32,

    /// Interviewer (voice agent persona) id
    pub interviewer_id: String,

    /// Anonymous interviews do not require a candidate email
    pub is_anonymous: bool,

    /// Optional allow-list of respondent emails; `None` means open
    pub respondents: Option<Vec<String>>,
}

impl Interview {
    /// Allowed session duration in seconds
    pub fn allowed_duration_seconds(&self) -> u64 {
        u64::from(self.time_duration_minutes) * 60
    }

    /// Questions joined for the agent prompt
    pub fn questions_joined(&self) -> String {
        self.questions.join(", ")
    }
}

/// Voice agent persona backing an interview
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Interviewer {
    /// Interviewer id
    pub id: String,

    /// Avatar shown to the candidate
    pub image: String,

    /// Handle of the voice agent at the transport provider
    pub agent_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allowed_duration() {
        let interview = Interview {
            id: "iv-1".to_string(),
            name: "Backend Engineer".to_string(),
            objective: "Assess Rust experience".to_string(),
            questions: vec!["Tell me about yourself".to_string()],
            time_duration_minutes: 10,
            interviewer_id: "er-1".to_string(),
            is_anonymous: false,
            respondents: None,
        };

        assert_eq!(interview.allowed_duration_seconds(), 600);
    }
}
