use std::collections::BTreeMap;

use crate::models::feedback::{
    CompletionFeedback, PerformanceMetrics, ProficiencyTier, Recommendation,
    RecommendationPriority, SkillAssessment,
};
use crate::models::{SimulationSession, SimulationStep};

pub const BADGE_EXPERT_COMMUNICATOR: &str = "Expert Communicator";
pub const BADGE_INDEPENDENT_PROBLEM_SOLVER: &str = "Independent Problem Solver";
pub const BADGE_QUICK_DECISION_MAKER: &str = "Quick Decision Maker";

const MAX_SIGNALS_PER_SKILL: usize = 3;
const MAX_RECOMMENDATIONS: usize = 4;

/// Score thresholds for proficiency tiers. Configuration, not business law;
/// applied consistently everywhere tiers are derived.
#[derive(Debug, Clone)]
pub struct FeedbackThresholds {
    pub advanced: f64,
    pub intermediate: f64,
}

impl Default for FeedbackThresholds {
    fn default() -> Self {
        Self {
            advanced: 85.0,
            intermediate: 60.0,
        }
    }
}

/// Aggregates a completed session's answered steps into the final
/// assessment. Pure: no I/O, no clock reads, deterministic for a given
/// step sequence.
pub struct CompletionFeedbackEngine {
    thresholds: FeedbackThresholds,
}

impl CompletionFeedbackEngine {
    pub fn new(thresholds: FeedbackThresholds) -> Self {
        Self { thresholds }
    }

    pub fn generate(&self, session: &SimulationSession) -> CompletionFeedback {
        let answered: Vec<&SimulationStep> = session.answered_steps().collect();

        let scores: Vec<f64> = answered
            .iter()
            .filter_map(|s| s.score.map(f64::from))
            .collect();
        let overall_score = round_one_decimal(mean(&scores));

        let performance = self.performance_metrics(session, &answered, overall_score);
        let skill_assessments = self.skill_assessments(session, &answered);
        let badges_unlocked = self.unlock_badges(&performance);
        let recommendations = self.recommendations(&skill_assessments);

        CompletionFeedback {
            session_id: session.session_id.clone(),
            user_id: session.user_id.clone(),
            skill_type: session.skill_type.clone(),
            scenario_title: session.scenario_title.clone(),
            overall_score,
            performance,
            skill_assessments,
            badges_unlocked,
            recommendations,
            completed_at: session.completed_at.unwrap_or(session.updated_at),
        }
    }

    fn performance_metrics(
        &self,
        session: &SimulationSession,
        answered: &[&SimulationStep],
        overall_score: f64,
    ) -> PerformanceMetrics {
        let response_times: Vec<f64> = answered
            .iter()
            .filter_map(|s| s.interaction.response_time_seconds.map(f64::from))
            .collect();

        let help_requests_count = answered
            .iter()
            .filter(|s| s.interaction.help_requested)
            .count() as u32;

        let completion_percentage = if session.max_steps > 0 {
            round_one_decimal(answered.len() as f64 / session.max_steps as f64 * 100.0)
        } else {
            0.0
        };

        PerformanceMetrics {
            overall_score,
            average_response_time_seconds: round_one_decimal(mean(&response_times)),
            help_requests_count,
            completion_percentage,
            answered_steps: answered.len() as u32,
            total_steps: session.max_steps,
        }
    }

    fn skill_assessments(
        &self,
        session: &SimulationSession,
        answered: &[&SimulationStep],
    ) -> Vec<SkillAssessment> {
        struct SkillBucket {
            scores: Vec<f64>,
            strengths: Vec<String>,
            improvements: Vec<String>,
        }

        let mut buckets: BTreeMap<String, SkillBucket> = BTreeMap::new();

        for step in answered {
            let Some(score) = step.score else { continue };

            let skills: Vec<&str> = if step.expected_skills.is_empty() {
                vec![session.skill_type.as_str()]
            } else {
                step.expected_skills.iter().map(String::as_str).collect()
            };

            for skill in skills {
                let bucket = buckets.entry(skill.to_string()).or_insert(SkillBucket {
                    scores: Vec::new(),
                    strengths: Vec::new(),
                    improvements: Vec::new(),
                });
                bucket.scores.push(f64::from(score));

                if let Some(feedback) = &step.feedback {
                    // Strength signals from vague responses are discounted;
                    // improvement areas still count.
                    if !step.interaction.flagged_vague {
                        bucket.strengths.extend(feedback.strengths.iter().cloned());
                    }
                    bucket
                        .improvements
                        .extend(feedback.areas_for_improvement.iter().cloned());
                }
            }
        }

        buckets
            .into_iter()
            .map(|(skill_name, bucket)| {
                let score = round_one_decimal(mean(&bucket.scores));
                SkillAssessment {
                    skill_name,
                    score,
                    tier: self.tier_for(score),
                    strengths: dedup_capped(bucket.strengths, MAX_SIGNALS_PER_SKILL),
                    areas_for_improvement: dedup_capped(bucket.improvements, MAX_SIGNALS_PER_SKILL),
                }
            })
            .collect()
    }

    fn tier_for(&self, score: f64) -> ProficiencyTier {
        if score >= self.thresholds.advanced {
            ProficiencyTier::Advanced
        } else if score >= self.thresholds.intermediate {
            ProficiencyTier::Intermediate
        } else {
            ProficiencyTier::Beginner
        }
    }

    /// Deterministic, ordered rule evaluation. All matching non-conflicting
    /// badges are granted.
    fn unlock_badges(&self, performance: &PerformanceMetrics) -> Vec<String> {
        let mut badges = Vec::new();

        if performance.overall_score >= 95.0 {
            badges.push(BADGE_EXPERT_COMMUNICATOR.to_string());
        }
        if performance.overall_score >= 85.0 && performance.help_requests_count == 0 {
            badges.push(BADGE_INDEPENDENT_PROBLEM_SOLVER.to_string());
        }
        // Requires at least one measured response time; an unmeasured
        // average is not evidence of speed.
        if performance.completion_percentage >= 100.0
            && performance.average_response_time_seconds > 0.0
            && performance.average_response_time_seconds < 60.0
        {
            badges.push(BADGE_QUICK_DECISION_MAKER.to_string());
        }

        badges
    }

    /// Weakest skills first; the single weakest carries high priority.
    fn recommendations(&self, assessments: &[SkillAssessment]) -> Vec<Recommendation> {
        let mut ranked: Vec<&SkillAssessment> = assessments.iter().collect();
        ranked.sort_by(|a, b| a.score.partial_cmp(&b.score).unwrap_or(std::cmp::Ordering::Equal));

        ranked
            .iter()
            .take(MAX_RECOMMENDATIONS)
            .enumerate()
            .map(|(rank, assessment)| Recommendation {
                skill_name: assessment.skill_name.clone(),
                action: next_practice_action(&assessment.skill_name, assessment.score),
                priority: if rank == 0 {
                    RecommendationPriority::High
                } else {
                    RecommendationPriority::Medium
                },
            })
            .collect()
    }
}

fn next_practice_action(skill: &str, score: f64) -> String {
    if score < 70.0 {
        format!("Practice more {} scenarios to strengthen the fundamentals", skill)
    } else if score < 85.0 {
        format!("Seek out more complex {} situations to reach the next level", skill)
    } else {
        format!("Consider mentoring others in {}", skill)
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

fn round_one_decimal(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

fn dedup_capped(items: Vec<String>, cap: usize) -> Vec<String> {
    let mut seen = Vec::with_capacity(cap);
    for item in items {
        if !seen.contains(&item) {
            seen.push(item);
            if seen.len() == cap {
                break;
            }
        }
    }
    seen
}
