use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One question/response/evaluation cycle within a session.
///
/// A step is created in pending form (question only) when issued, and is
/// answered exactly once: response, score, feedback and tracking land
/// together with `completed_at`. It is never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationStep {
    pub step_number: u32,
    pub question: String,
    pub context: Option<String>,
    pub instructions: Option<String>,
    pub expected_skills: Vec<String>,
    pub user_response: Option<String>,
    pub score: Option<u8>,
    pub feedback: Option<StepFeedback>,
    pub interaction: InteractionTracking,
    pub issued_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl SimulationStep {
    pub fn issued(step_number: u32, question: IssuedQuestion, issued_at: DateTime<Utc>) -> Self {
        Self {
            step_number,
            question: question.question,
            context: question.context,
            instructions: question.instructions,
            expected_skills: question.expected_skills,
            user_response: None,
            score: None,
            feedback: None,
            interaction: InteractionTracking::default(),
            issued_at,
            completed_at: None,
        }
    }

    pub fn is_answered(&self) -> bool {
        self.user_response.is_some()
    }
}

/// Structured evaluation feedback, pass-through from the content generator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StepFeedback {
    pub strengths: Vec<String>,
    pub areas_for_improvement: Vec<String>,
    pub narrative: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InteractionTracking {
    pub response_time_seconds: Option<u32>,
    pub response_length: u32,
    pub sentence_count: u32,
    pub help_requested: bool,
    pub flagged_vague: bool,
}

/// Scenario-turn content as issued by the content generator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssuedQuestion {
    pub question: String,
    pub context: Option<String>,
    pub instructions: Option<String>,
    #[serde(default)]
    pub expected_skills: Vec<String>,
}

/// Whether the session continues with another question or ends here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContinuationSignal {
    Continue,
    Complete,
}
