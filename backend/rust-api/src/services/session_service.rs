use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use uuid::Uuid;
use validator::Validate;

use crate::error::SimulationError;
use crate::metrics::{BADGES_UNLOCKED_TOTAL, SIMULATIONS_ACTIVE, SIMULATIONS_TOTAL};
use crate::models::step::{ContinuationSignal, SimulationStep};
use crate::models::{
    CompletedStepInfo, NextStepInfo, ProgressSummary, RespondSimulationRequest, ScenarioInfo,
    SessionMetadata, SessionStatus, SessionStatusResponse, SimulationSession,
    StartSimulationRequest, StartSimulationResponse, TurnEvaluationSummary, TurnOutcome,
};
use crate::services::completion_service::{CompletionFeedbackEngine, FeedbackThresholds};
use crate::services::content_generator::{ContentGenerator, OpenScenarioRequest};
use crate::services::evaluation_service::{StepEvaluationPipeline, TurnMetadata};
use crate::services::event_publisher::EventPublisher;
use crate::services::session_repository::SessionRepository;

const DEFAULT_DIFFICULTY: u8 = 2;

/// Scenario openings may ask for an unreasonable number of turns; the
/// engine caps the terminal bound at creation.
const MAX_STEPS_CEILING: u32 = 12;

/// What to do when a turn arrives while another is in flight for the same
/// session: fail fast with `SessionBusy`, or queue behind the holder.
/// Either way a pending step can never be consumed twice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusyPolicy {
    FailFast,
    Wait,
}

/// Per-session critical sections, keyed by session id. Entries whose lock
/// is no longer held are pruned on the next acquire.
pub struct SessionLocks {
    inner: StdMutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl SessionLocks {
    pub fn new() -> Self {
        Self {
            inner: StdMutex::new(HashMap::new()),
        }
    }

    pub async fn acquire(
        &self,
        session_id: &str,
        policy: BusyPolicy,
    ) -> Result<OwnedMutexGuard<()>, SimulationError> {
        let slot = {
            let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            map.retain(|_, lock| Arc::strong_count(lock) > 1);
            map.entry(session_id.to_string()).or_default().clone()
        };

        match policy {
            BusyPolicy::Wait => Ok(slot.lock_owned().await),
            BusyPolicy::FailFast => slot
                .try_lock_owned()
                .map_err(|_| SimulationError::SessionBusy(session_id.to_string())),
        }
    }
}

impl Default for SessionLocks {
    fn default() -> Self {
        Self::new()
    }
}

/// Owns session lifecycle transitions and per-session serialization of
/// turns. The store is the source of truth between calls; every mutating
/// path commits a full step transition or nothing.
pub struct SessionStateMachine {
    repository: Arc<dyn SessionRepository>,
    generator: Arc<dyn ContentGenerator>,
    pipeline: StepEvaluationPipeline,
    feedback_engine: CompletionFeedbackEngine,
    locks: SessionLocks,
    busy_policy: BusyPolicy,
    events: Option<Arc<EventPublisher>>,
}

impl SessionStateMachine {
    pub fn new(
        repository: Arc<dyn SessionRepository>,
        generator: Arc<dyn ContentGenerator>,
        thresholds: FeedbackThresholds,
        busy_policy: BusyPolicy,
        events: Option<Arc<EventPublisher>>,
    ) -> Self {
        Self {
            repository,
            pipeline: StepEvaluationPipeline::new(generator.clone()),
            generator,
            feedback_engine: CompletionFeedbackEngine::new(thresholds),
            locks: SessionLocks::new(),
            busy_policy,
            events,
        }
    }

    /// Opens a scenario, stores the session with its first pending step and
    /// returns the opening question. Nothing is persisted when the
    /// generator cannot produce an opening.
    pub async fn create(
        &self,
        request: StartSimulationRequest,
    ) -> Result<StartSimulationResponse, SimulationError> {
        request
            .validate()
            .map_err(|e| SimulationError::InvalidRequest(e.to_string()))?;

        let difficulty = request.difficulty_preference.unwrap_or(DEFAULT_DIFFICULTY);

        let opening = self
            .generator
            .open_scenario(OpenScenarioRequest {
                skill_type: &request.skill_type,
                difficulty_level: difficulty,
                scenario_ref: request.scenario_ref.as_deref(),
                specialization: request.specialization.as_deref(),
            })
            .await?;

        let now = Utc::now();
        let session_id = Uuid::new_v4().to_string();
        let first_step = SimulationStep::issued(1, opening.first_question.clone(), now);
        let first_step_info = step_to_next_info(&first_step);

        let mut session = SimulationSession {
            session_id: session_id.clone(),
            user_id: request.user_id.clone(),
            skill_type: request.skill_type.clone(),
            scenario_id: opening.scenario_id.clone(),
            scenario_title: opening.title.clone(),
            status: SessionStatus::Created,
            current_step_number: 1,
            max_steps: opening.total_steps.clamp(1, MAX_STEPS_CEILING),
            steps: vec![first_step],
            metadata: SessionMetadata {
                difficulty_level: difficulty,
                platform: request.platform.unwrap_or_else(|| "web".to_string()),
                specialization: request.specialization.clone(),
                created_at: now,
            },
            completed_at: None,
            updated_at: now,
        };

        // The opening question is already issued, so the session goes live
        // in the same write.
        session.status = SessionStatus::Active;
        self.repository.insert(&session).await?;

        SIMULATIONS_TOTAL.with_label_values(&["created"]).inc();
        SIMULATIONS_ACTIVE.inc();

        tracing::info!(
            "Simulation created: {} for user: {} skill: {}",
            session_id,
            session.user_id,
            session.skill_type
        );

        Ok(StartSimulationResponse {
            session_id,
            scenario: ScenarioInfo {
                scenario_id: opening.scenario_id,
                title: opening.title,
                description: opening.description,
                initial_situation: opening.initial_situation,
            },
            first_step: first_step_info,
            session: session.snapshot(),
            message: "Simulation started. Answer the opening question to begin.".to_string(),
        })
    }

    /// The sole mutating entry point after creation. Serialized per
    /// session; a retry after an upstream failure sees the same pending
    /// step and is therefore safe.
    pub async fn respond(
        &self,
        session_id: &str,
        request: RespondSimulationRequest,
    ) -> Result<TurnOutcome, SimulationError> {
        let _guard = self.locks.acquire(session_id, self.busy_policy).await?;

        let mut session = self
            .repository
            .find_by_session_id(session_id)
            .await?
            .ok_or_else(|| SimulationError::SessionNotFound(session_id.to_string()))?;

        if !session.is_active() {
            return Err(SimulationError::SessionNotActive {
                session_id: session_id.to_string(),
                status: session.status,
            });
        }

        let pending_index = session
            .pending_step_index()
            .ok_or_else(|| SimulationError::NoPendingStep(session_id.to_string()))?;

        let turn_meta = TurnMetadata {
            response_time_seconds: request.response_time_seconds,
            help_requested: request.help_requested,
        };

        let evaluated = self
            .pipeline
            .evaluate(
                &session,
                &session.steps[pending_index],
                &request.user_response,
                &turn_meta,
            )
            .await?;

        let step_number = evaluated.step.step_number;
        let score = evaluated.step.score.unwrap_or(0);
        let summary = evaluation_summary(&evaluated.step);

        let completed = evaluated.signal == ContinuationSignal::Complete
            || step_number >= session.max_steps;

        let now = Utc::now();
        session.steps[pending_index] = evaluated.step;
        session.updated_at = now;

        if completed {
            session.status = SessionStatus::Completed;
            session.completed_at = Some(now);

            let feedback = self.feedback_engine.generate(&session);
            self.repository.update(&session).await?;

            SIMULATIONS_TOTAL.with_label_values(&["completed"]).inc();
            SIMULATIONS_ACTIVE.dec();
            for badge in &feedback.badges_unlocked {
                BADGES_UNLOCKED_TOTAL
                    .with_label_values(&[badge.as_str()])
                    .inc();
            }

            if let Some(events) = &self.events {
                if let Err(e) = events
                    .publish_simulation_completed(
                        &session.user_id,
                        session_id,
                        feedback.overall_score,
                    )
                    .await
                {
                    tracing::warn!(
                        "Failed to publish completion event for {}: {:#}",
                        session_id,
                        e
                    );
                }
            }

            tracing::info!(
                "Simulation completed: {} overall_score={}",
                session_id,
                feedback.overall_score
            );

            return Ok(TurnOutcome {
                session_id: session_id.to_string(),
                step_number,
                completed: true,
                evaluation: summary,
                next_step: None,
                completion_feedback: Some(feedback),
                message: format!("Simulation completed! Final score: {}/100.", score),
            });
        }

        // Nothing has been persisted yet, so failing here leaves the
        // pending step in the store for an idempotent retry.
        let next_question = evaluated.next_question.ok_or_else(|| {
            SimulationError::EvaluationUnavailable(
                "generator continued without a next question".to_string(),
            )
        })?;

        let next_number = step_number + 1;
        let next_step = SimulationStep::issued(next_number, next_question, now);
        let next_info = step_to_next_info(&next_step);

        session.steps.push(next_step);
        session.current_step_number = next_number;
        self.repository.update(&session).await?;

        tracing::info!(
            "Turn {} recorded for session {} (score {})",
            step_number,
            session_id,
            score
        );

        Ok(TurnOutcome {
            session_id: session_id.to_string(),
            step_number,
            completed: false,
            evaluation: summary,
            next_step: Some(next_info),
            completion_feedback: None,
            message: format!(
                "Response evaluated (Score: {}/100). Proceeding to the next step.",
                score
            ),
        })
    }

    /// Read-only snapshot for the surrounding service.
    pub async fn status(&self, session_id: &str) -> Result<SessionStatusResponse, SimulationError> {
        let session = self
            .repository
            .find_by_session_id(session_id)
            .await?
            .ok_or_else(|| SimulationError::SessionNotFound(session_id.to_string()))?;

        let steps_completed: Vec<CompletedStepInfo> = session
            .answered_steps()
            .map(|step| CompletedStepInfo {
                step_number: step.step_number,
                question: step.question.clone(),
                user_response: step.user_response.clone().unwrap_or_default(),
                score: step.score.unwrap_or(0),
                strengths: step
                    .feedback
                    .as_ref()
                    .map(|f| f.strengths.clone())
                    .unwrap_or_default(),
                areas_for_improvement: step
                    .feedback
                    .as_ref()
                    .map(|f| f.areas_for_improvement.clone())
                    .unwrap_or_default(),
                feedback: step.feedback.as_ref().and_then(|f| f.narrative.clone()),
                completed_at: step.completed_at,
            })
            .collect();

        let current_step = if session.is_active() {
            session.pending_step().map(step_to_next_info)
        } else {
            None
        };

        let answered = steps_completed.len() as u32;
        let average_score = if steps_completed.is_empty() {
            None
        } else {
            let sum: f64 = steps_completed.iter().map(|s| f64::from(s.score)).sum();
            Some((sum / answered as f64 * 10.0).round() / 10.0)
        };
        let completion_percentage = if session.max_steps > 0 {
            (answered as f64 / session.max_steps as f64 * 1000.0).round() / 10.0
        } else {
            0.0
        };

        Ok(SessionStatusResponse {
            is_active: session.is_active(),
            progress: ProgressSummary {
                completed_steps: answered,
                total_steps: session.max_steps,
                completion_percentage,
                average_score,
            },
            steps_completed,
            current_step,
            session: session.snapshot(),
        })
    }

    /// Explicit terminal transition for an external idle-timeout policy.
    /// The engine never infers abandonment on its own.
    pub async fn abandon(&self, session_id: &str) -> Result<(), SimulationError> {
        let _guard = self.locks.acquire(session_id, self.busy_policy).await?;

        let mut session = self
            .repository
            .find_by_session_id(session_id)
            .await?
            .ok_or_else(|| SimulationError::SessionNotFound(session_id.to_string()))?;

        if !session.is_active() {
            return Err(SimulationError::SessionNotActive {
                session_id: session_id.to_string(),
                status: session.status,
            });
        }

        session.status = SessionStatus::Abandoned;
        session.updated_at = Utc::now();
        self.repository.update(&session).await?;

        SIMULATIONS_TOTAL.with_label_values(&["abandoned"]).inc();
        SIMULATIONS_ACTIVE.dec();

        tracing::info!("Simulation abandoned: {}", session_id);
        Ok(())
    }
}

fn step_to_next_info(step: &SimulationStep) -> NextStepInfo {
    NextStepInfo {
        step_number: step.step_number,
        question: step.question.clone(),
        context: step.context.clone(),
        instructions: step.instructions.clone(),
    }
}

fn evaluation_summary(step: &SimulationStep) -> TurnEvaluationSummary {
    let feedback = step.feedback.as_ref();
    TurnEvaluationSummary {
        score: step.score.unwrap_or(0),
        strengths: feedback.map(|f| f.strengths.clone()).unwrap_or_default(),
        areas_for_improvement: feedback
            .map(|f| f.areas_for_improvement.clone())
            .unwrap_or_default(),
        feedback: feedback.and_then(|f| f.narrative.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn fail_fast_policy_rejects_second_acquire() {
        let locks = SessionLocks::new();
        let guard = locks.acquire("sess-1", BusyPolicy::FailFast).await.unwrap();

        let err = locks
            .acquire("sess-1", BusyPolicy::FailFast)
            .await
            .unwrap_err();
        assert!(matches!(err, SimulationError::SessionBusy(_)));

        // Other sessions are unaffected.
        let _other = locks.acquire("sess-2", BusyPolicy::FailFast).await.unwrap();

        drop(guard);
        let _again = locks.acquire("sess-1", BusyPolicy::FailFast).await.unwrap();
    }

    #[tokio::test]
    async fn wait_policy_queues_behind_the_holder() {
        let locks = Arc::new(SessionLocks::new());
        let guard = locks.acquire("sess-1", BusyPolicy::Wait).await.unwrap();

        let locks_clone = locks.clone();
        let waiter = tokio::spawn(async move {
            locks_clone.acquire("sess-1", BusyPolicy::Wait).await.is_ok()
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(guard);
        assert!(waiter.await.unwrap());
    }

    #[tokio::test]
    async fn released_entries_are_pruned() {
        let locks = SessionLocks::new();
        {
            let _guard = locks.acquire("sess-1", BusyPolicy::FailFast).await.unwrap();
        }
        let _trigger = locks.acquire("sess-2", BusyPolicy::FailFast).await.unwrap();

        let map = locks.inner.lock().unwrap();
        assert!(!map.contains_key("sess-1"));
    }
}
