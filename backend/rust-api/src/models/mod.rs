use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

pub mod feedback;
pub mod step;

pub use feedback::CompletionFeedback;
pub use step::{InteractionTracking, SimulationStep, StepFeedback};

/// One end-to-end practice run for a user against one scenario. Steps are
/// embedded so a turn transition commits in a single document write.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationSession {
    #[serde(rename = "_id")]
    pub session_id: String,
    pub user_id: String,
    pub skill_type: String,
    pub scenario_id: String,
    pub scenario_title: String,
    pub status: SessionStatus,
    pub current_step_number: u32,
    pub max_steps: u32,
    pub steps: Vec<SimulationStep>,
    pub metadata: SessionMetadata,
    pub completed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Created,
    Active,
    Completed,
    Abandoned,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Created => "created",
            SessionStatus::Active => "active",
            SessionStatus::Completed => "completed",
            SessionStatus::Abandoned => "abandoned",
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionMetadata {
    pub difficulty_level: u8,
    pub platform: String,
    pub specialization: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl SimulationSession {
    pub fn is_active(&self) -> bool {
        matches!(self.status, SessionStatus::Created | SessionStatus::Active)
    }

    /// The step whose question has been issued but not yet answered.
    /// Invariant: it is always the step numbered `current_step_number`.
    pub fn pending_step(&self) -> Option<&SimulationStep> {
        self.steps
            .iter()
            .find(|s| s.step_number == self.current_step_number && !s.is_answered())
    }

    pub fn pending_step_index(&self) -> Option<usize> {
        self.steps
            .iter()
            .position(|s| s.step_number == self.current_step_number && !s.is_answered())
    }

    pub fn answered_steps(&self) -> impl Iterator<Item = &SimulationStep> {
        self.steps.iter().filter(|s| s.is_answered())
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.session_id.clone(),
            user_id: self.user_id.clone(),
            scenario_id: self.scenario_id.clone(),
            scenario_title: self.scenario_title.clone(),
            skill_type: self.skill_type.clone(),
            status: self.status,
            current_step_number: self.current_step_number,
            max_steps: self.max_steps,
            difficulty_level: self.metadata.difficulty_level,
            started_at: self.metadata.created_at,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct StartSimulationRequest {
    #[validate(length(min = 3, max = 50))]
    pub user_id: String,
    #[validate(length(min = 3, max = 30))]
    pub skill_type: String,
    pub scenario_ref: Option<String>,
    #[validate(range(min = 1, max = 5))]
    pub difficulty_preference: Option<u8>,
    pub specialization: Option<String>,
    pub platform: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StartSimulationResponse {
    pub session_id: String,
    pub scenario: ScenarioInfo,
    pub first_step: NextStepInfo,
    pub session: SessionSnapshot,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ScenarioInfo {
    pub scenario_id: String,
    pub title: String,
    pub description: String,
    pub initial_situation: String,
}

#[derive(Debug, Deserialize)]
pub struct RespondSimulationRequest {
    pub user_response: String,
    pub response_time_seconds: Option<i64>,
    #[serde(default)]
    pub help_requested: bool,
}

/// Result of one accepted turn: either the next question or, on the final
/// turn, the aggregated completion feedback.
#[derive(Debug, Serialize)]
pub struct TurnOutcome {
    pub session_id: String,
    pub step_number: u32,
    pub completed: bool,
    pub evaluation: TurnEvaluationSummary,
    pub next_step: Option<NextStepInfo>,
    pub completion_feedback: Option<CompletionFeedback>,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct TurnEvaluationSummary {
    pub score: u8,
    pub strengths: Vec<String>,
    pub areas_for_improvement: Vec<String>,
    pub feedback: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct NextStepInfo {
    pub step_number: u32,
    pub question: String,
    pub context: Option<String>,
    pub instructions: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub session_id: String,
    pub user_id: String,
    pub scenario_id: String,
    pub scenario_title: String,
    pub skill_type: String,
    pub status: SessionStatus,
    pub current_step_number: u32,
    pub max_steps: u32,
    pub difficulty_level: u8,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct SessionStatusResponse {
    pub session: SessionSnapshot,
    pub steps_completed: Vec<CompletedStepInfo>,
    pub current_step: Option<NextStepInfo>,
    pub progress: ProgressSummary,
    pub is_active: bool,
}

#[derive(Debug, Serialize)]
pub struct CompletedStepInfo {
    pub step_number: u32,
    pub question: String,
    pub user_response: String,
    pub score: u8,
    pub strengths: Vec<String>,
    pub areas_for_improvement: Vec<String>,
    pub feedback: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct ProgressSummary {
    pub completed_steps: u32,
    pub total_steps: u32,
    pub completion_percentage: f64,
    pub average_score: Option<f64>,
}
