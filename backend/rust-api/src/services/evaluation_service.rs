use chrono::Utc;
use std::sync::Arc;

use crate::error::SimulationError;
use crate::metrics::{TURNS_EVALUATED_TOTAL, VAGUE_RESPONSES_TOTAL};
use crate::models::step::{ContinuationSignal, IssuedQuestion, SimulationStep};
use crate::models::{InteractionTracking, SimulationSession};
use crate::services::content_generator::{ContentGenerator, EvaluateTurnRequest, HistoryTurn};
use crate::utils::validation;

/// Narrative feedback is truncated to this many characters before storage
/// to bound payload size. Truncation is silent.
pub const MAX_FEEDBACK_CHARS: usize = 500;

#[derive(Debug, Clone, Default)]
pub struct TurnMetadata {
    pub response_time_seconds: Option<i64>,
    pub help_requested: bool,
}

/// An answered step ready to be committed, plus the continuation decision.
pub struct EvaluatedTurn {
    pub step: SimulationStep,
    pub signal: ContinuationSignal,
    pub next_question: Option<IssuedQuestion>,
}

/// Turns a raw user response into a scored, answered step. Validation and
/// the quality gate live here so transport handlers stay free of per-field
/// checks. On upstream failure nothing is recorded, so the caller can
/// retry the same turn safely.
pub struct StepEvaluationPipeline {
    generator: Arc<dyn ContentGenerator>,
}

impl StepEvaluationPipeline {
    pub fn new(generator: Arc<dyn ContentGenerator>) -> Self {
        Self { generator }
    }

    pub async fn evaluate(
        &self,
        session: &SimulationSession,
        pending: &SimulationStep,
        user_response: &str,
        turn: &TurnMetadata,
    ) -> Result<EvaluatedTurn, SimulationError> {
        if pending.is_answered() {
            return Err(SimulationError::StepAlreadyAnswered {
                session_id: session.session_id.clone(),
                step_number: pending.step_number,
            });
        }

        let trimmed = user_response.trim();
        if trimmed.is_empty() {
            return Err(SimulationError::EmptyResponse);
        }

        if let Some(seconds) = turn.response_time_seconds {
            if seconds < 0 {
                return Err(SimulationError::InvalidTiming(seconds));
            }
        }

        // Quality gate: vague responses are flagged, never rejected.
        let vague = validation::vague_reason(trimmed);
        if let Some(reason) = vague {
            VAGUE_RESPONSES_TOTAL
                .with_label_values(&[reason.as_str()])
                .inc();
            tracing::debug!(
                "Vague response on session={} step={}: {}",
                session.session_id,
                pending.step_number,
                reason.as_str()
            );
        }

        let history: Vec<HistoryTurn> = session
            .answered_steps()
            .map(|s| HistoryTurn {
                question: s.question.clone(),
                user_response: s.user_response.clone().unwrap_or_default(),
                score: s.score.unwrap_or(0),
            })
            .collect();

        let evaluation = self
            .generator
            .evaluate_turn(EvaluateTurnRequest {
                skill_type: &session.skill_type,
                difficulty_level: session.metadata.difficulty_level,
                question: &pending.question,
                context: pending.context.as_deref(),
                user_response: trimmed,
                history: &history,
            })
            .await?;

        let mut feedback = evaluation.feedback;
        if let Some(narrative) = feedback.narrative.take() {
            feedback.narrative = Some(truncate_chars(&narrative, MAX_FEEDBACK_CHARS));
        }

        let mut step = pending.clone();
        step.user_response = Some(trimmed.to_string());
        step.score = Some(evaluation.score);
        step.feedback = Some(feedback);
        step.interaction = InteractionTracking {
            response_time_seconds: turn.response_time_seconds.map(|s| s as u32),
            response_length: trimmed.chars().count() as u32,
            sentence_count: validation::sentence_count(trimmed),
            help_requested: turn.help_requested,
            flagged_vague: vague.is_some(),
        };
        step.completed_at = Some(Utc::now());

        let outcome = match evaluation.signal {
            ContinuationSignal::Continue => "continued",
            ContinuationSignal::Complete => "completed",
        };
        TURNS_EVALUATED_TOTAL.with_label_values(&[outcome]).inc();

        Ok(EvaluatedTurn {
            step,
            signal: evaluation.signal,
            next_question: evaluation.next_question,
        })
    }
}

fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}
