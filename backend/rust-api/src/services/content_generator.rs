use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::SimulationError;
use crate::metrics::track_content_operation;
use crate::models::step::{ContinuationSignal, IssuedQuestion};
use crate::models::StepFeedback;

const DEFAULT_TOTAL_STEPS: u32 = 5;

#[derive(Debug, Serialize)]
pub struct OpenScenarioRequest<'a> {
    pub skill_type: &'a str,
    pub difficulty_level: u8,
    pub scenario_ref: Option<&'a str>,
    pub specialization: Option<&'a str>,
}

/// Scenario metadata plus the first question, as returned by the generator.
#[derive(Debug, Clone, Deserialize)]
pub struct ScenarioOpening {
    pub scenario_id: String,
    pub title: String,
    pub description: String,
    pub initial_situation: String,
    #[serde(default)]
    pub total_steps: u32,
    pub first_question: IssuedQuestion,
}

#[derive(Debug, Serialize)]
pub struct EvaluateTurnRequest<'a> {
    pub skill_type: &'a str,
    pub difficulty_level: u8,
    pub question: &'a str,
    pub context: Option<&'a str>,
    pub user_response: &'a str,
    pub history: &'a [HistoryTurn],
}

/// Prior answered turns, passed so the generator can keep the conversation
/// coherent and decide on early completion.
#[derive(Debug, Clone, Serialize)]
pub struct HistoryTurn {
    pub question: String,
    pub user_response: String,
    pub score: u8,
}

#[derive(Debug, Clone)]
pub struct TurnEvaluation {
    pub score: u8,
    pub feedback: StepFeedback,
    pub signal: ContinuationSignal,
    pub next_question: Option<IssuedQuestion>,
}

/// External service producing scenario openings and turn evaluations.
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    async fn open_scenario(
        &self,
        request: OpenScenarioRequest<'_>,
    ) -> Result<ScenarioOpening, SimulationError>;

    async fn evaluate_turn(
        &self,
        request: EvaluateTurnRequest<'_>,
    ) -> Result<TurnEvaluation, SimulationError>;
}

#[derive(Debug, Deserialize)]
struct WireEvaluation {
    score: i64,
    #[serde(default)]
    feedback: StepFeedback,
    signal: ContinuationSignal,
    next_question: Option<IssuedQuestion>,
}

fn evaluation_from_wire(wire: WireEvaluation) -> Result<TurnEvaluation, SimulationError> {
    if !(0..=100).contains(&wire.score) {
        return Err(SimulationError::EvaluationUnavailable(format!(
            "generator returned score {} outside [0,100]",
            wire.score
        )));
    }
    if wire.signal == ContinuationSignal::Continue && wire.next_question.is_none() {
        return Err(SimulationError::EvaluationUnavailable(
            "generator signalled continue without a next question".to_string(),
        ));
    }

    Ok(TurnEvaluation {
        score: wire.score as u8,
        feedback: wire.feedback,
        signal: wire.signal,
        next_question: wire.next_question,
    })
}

/// HTTP client for the content generation sidecar.
pub struct HttpContentGenerator {
    client: reqwest::Client,
    base_url: String,
}

impl HttpContentGenerator {
    pub fn new(base_url: String, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, base_url })
    }
}

#[async_trait]
impl ContentGenerator for HttpContentGenerator {
    async fn open_scenario(
        &self,
        request: OpenScenarioRequest<'_>,
    ) -> Result<ScenarioOpening, SimulationError> {
        let url = format!("{}/v1/scenarios/open", self.base_url);

        tracing::debug!(
            "Calling content generator: {} skill_type={} difficulty={}",
            url,
            request.skill_type,
            request.difficulty_level
        );

        let response = track_content_operation("open_scenario", async {
            self.client
                .post(&url)
                .json(&request)
                .send()
                .await
                .map_err(|e| SimulationError::ContentUnavailable(e.to_string()))
        })
        .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(SimulationError::ContentUnavailable(format!(
                "generator returned {}: {}",
                status, error_text
            )));
        }

        let mut opening: ScenarioOpening = response
            .json()
            .await
            .map_err(|e| SimulationError::ContentUnavailable(e.to_string()))?;

        if opening.total_steps == 0 {
            opening.total_steps = DEFAULT_TOTAL_STEPS;
        }

        tracing::info!(
            "Scenario opened: id={} title={:?} total_steps={}",
            opening.scenario_id,
            opening.title,
            opening.total_steps
        );

        Ok(opening)
    }

    async fn evaluate_turn(
        &self,
        request: EvaluateTurnRequest<'_>,
    ) -> Result<TurnEvaluation, SimulationError> {
        let url = format!("{}/v1/evaluations", self.base_url);

        let response = track_content_operation("evaluate_turn", async {
            self.client
                .post(&url)
                .json(&request)
                .send()
                .await
                .map_err(|e| SimulationError::EvaluationUnavailable(e.to_string()))
        })
        .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(SimulationError::EvaluationUnavailable(format!(
                "generator returned {}: {}",
                status, error_text
            )));
        }

        let wire: WireEvaluation = response
            .json()
            .await
            .map_err(|e| SimulationError::EvaluationUnavailable(e.to_string()))?;

        evaluation_from_wire(wire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_continue_evaluation() {
        let wire: WireEvaluation = serde_json::from_value(json!({
            "score": 87,
            "feedback": {
                "strengths": ["clear framing"],
                "areas_for_improvement": ["ask follow-up questions"],
                "narrative": "Good instinct to de-escalate."
            },
            "signal": "continue",
            "next_question": {
                "question": "The colleague pushes back. What now?",
                "context": "They feel unheard.",
                "expected_skills": ["active_listening"]
            }
        }))
        .unwrap();

        let evaluation = evaluation_from_wire(wire).unwrap();
        assert_eq!(evaluation.score, 87);
        assert_eq!(evaluation.signal, ContinuationSignal::Continue);
        assert!(evaluation.next_question.is_some());
    }

    #[test]
    fn parses_complete_without_next_question() {
        let wire: WireEvaluation = serde_json::from_value(json!({
            "score": 92,
            "signal": "complete"
        }))
        .unwrap();

        let evaluation = evaluation_from_wire(wire).unwrap();
        assert_eq!(evaluation.signal, ContinuationSignal::Complete);
        assert!(evaluation.next_question.is_none());
        assert!(evaluation.feedback.strengths.is_empty());
    }

    #[test]
    fn rejects_out_of_range_score() {
        let wire: WireEvaluation = serde_json::from_value(json!({
            "score": 150,
            "signal": "complete"
        }))
        .unwrap();

        let err = evaluation_from_wire(wire).unwrap_err();
        assert!(matches!(err, SimulationError::EvaluationUnavailable(_)));
    }

    #[test]
    fn rejects_continue_without_next_question() {
        let wire: WireEvaluation = serde_json::from_value(json!({
            "score": 70,
            "signal": "continue"
        }))
        .unwrap();

        let err = evaluation_from_wire(wire).unwrap_err();
        assert!(matches!(err, SimulationError::EvaluationUnavailable(_)));
    }
}
