use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// End-of-session assessment, produced once per session and returned to the
/// caller. Derived data; the engine does not persist it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionFeedback {
    pub session_id: String,
    pub user_id: String,
    pub skill_type: String,
    pub scenario_title: String,
    pub overall_score: f64,
    pub performance: PerformanceMetrics,
    pub skill_assessments: Vec<SkillAssessment>,
    pub badges_unlocked: Vec<String>,
    pub recommendations: Vec<Recommendation>,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub overall_score: f64,
    pub average_response_time_seconds: f64,
    pub help_requests_count: u32,
    pub completion_percentage: f64,
    pub answered_steps: u32,
    pub total_steps: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillAssessment {
    pub skill_name: String,
    pub score: f64,
    pub tier: ProficiencyTier,
    pub strengths: Vec<String>,
    pub areas_for_improvement: Vec<String>,
}

/// Coarse skill-level bucket derived from configured score thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProficiencyTier {
    Beginner,
    Intermediate,
    Advanced,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub skill_name: String,
    pub action: String,
    pub priority: RecommendationPriority,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationPriority {
    High,
    Medium,
}
