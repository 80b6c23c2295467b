use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use softskills_api::error::SimulationError;
use softskills_api::models::step::{ContinuationSignal, IssuedQuestion};
use softskills_api::models::{
    RespondSimulationRequest, SessionStatus, SimulationSession, StartSimulationRequest,
    StepFeedback,
};
use softskills_api::services::completion_service::FeedbackThresholds;
use softskills_api::services::content_generator::{
    ContentGenerator, EvaluateTurnRequest, OpenScenarioRequest, ScenarioOpening, TurnEvaluation,
};
use softskills_api::services::session_repository::SessionRepository;
use softskills_api::services::session_service::{BusyPolicy, SessionStateMachine};

struct InMemorySessionRepository {
    sessions: Mutex<HashMap<String, SimulationSession>>,
}

impl InMemorySessionRepository {
    fn new() -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
        }
    }

    fn stored(&self, session_id: &str) -> Option<SimulationSession> {
        self.sessions.lock().unwrap().get(session_id).cloned()
    }

    fn len(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }
}

#[async_trait]
impl SessionRepository for InMemorySessionRepository {
    async fn insert(&self, session: &SimulationSession) -> Result<(), SimulationError> {
        self.sessions
            .lock()
            .unwrap()
            .insert(session.session_id.clone(), session.clone());
        Ok(())
    }

    async fn find_by_session_id(
        &self,
        session_id: &str,
    ) -> Result<Option<SimulationSession>, SimulationError> {
        Ok(self.sessions.lock().unwrap().get(session_id).cloned())
    }

    async fn update(&self, session: &SimulationSession) -> Result<(), SimulationError> {
        let mut sessions = self.sessions.lock().unwrap();
        if !sessions.contains_key(&session.session_id) {
            return Err(SimulationError::SessionNotFound(session.session_id.clone()));
        }
        sessions.insert(session.session_id.clone(), session.clone());
        Ok(())
    }
}

struct ScriptedGenerator {
    opening: Result<ScenarioOpening, String>,
    evaluations: Mutex<VecDeque<Result<TurnEvaluation, String>>>,
    evaluation_delay: Option<Duration>,
}

impl ScriptedGenerator {
    fn with_evaluations(evaluations: Vec<Result<TurnEvaluation, String>>) -> Self {
        Self {
            opening: Ok(opening(5)),
            evaluations: Mutex::new(evaluations.into()),
            evaluation_delay: None,
        }
    }

    fn failing_opening(message: &str) -> Self {
        Self {
            opening: Err(message.to_string()),
            evaluations: Mutex::new(VecDeque::new()),
            evaluation_delay: None,
        }
    }
}

#[async_trait]
impl ContentGenerator for ScriptedGenerator {
    async fn open_scenario(
        &self,
        _request: OpenScenarioRequest<'_>,
    ) -> Result<ScenarioOpening, SimulationError> {
        match &self.opening {
            Ok(opening) => Ok(opening.clone()),
            Err(message) => Err(SimulationError::ContentUnavailable(message.clone())),
        }
    }

    async fn evaluate_turn(
        &self,
        _request: EvaluateTurnRequest<'_>,
    ) -> Result<TurnEvaluation, SimulationError> {
        if let Some(delay) = self.evaluation_delay {
            tokio::time::sleep(delay).await;
        }
        let next = self.evaluations.lock().unwrap().pop_front();
        match next {
            Some(Ok(evaluation)) => Ok(evaluation),
            Some(Err(message)) => Err(SimulationError::EvaluationUnavailable(message)),
            None => panic!("generator script exhausted"),
        }
    }
}

fn opening(total_steps: u32) -> ScenarioOpening {
    serde_json::from_value(serde_json::json!({
        "scenario_id": "scen-42",
        "title": "The missed deadline",
        "description": "A teammate keeps slipping on commitments.",
        "initial_situation": "You notice the sprint board is red again.",
        "total_steps": total_steps,
        "first_question": {
            "question": "How do you open the conversation?",
            "context": "One-on-one, end of day.",
            "expected_skills": []
        }
    }))
    .unwrap()
}

fn continue_eval(score: u8) -> Result<TurnEvaluation, String> {
    Ok(TurnEvaluation {
        score,
        feedback: StepFeedback {
            strengths: vec!["direct but kind".into()],
            areas_for_improvement: vec!["probe for root causes".into()],
            narrative: Some("Solid handling of the situation.".into()),
        },
        signal: ContinuationSignal::Continue,
        next_question: Some(IssuedQuestion {
            question: "They get defensive. What next?".into(),
            context: None,
            instructions: None,
            expected_skills: vec![],
        }),
    })
}

fn complete_eval(score: u8) -> Result<TurnEvaluation, String> {
    Ok(TurnEvaluation {
        score,
        feedback: StepFeedback::default(),
        signal: ContinuationSignal::Complete,
        next_question: None,
    })
}

fn engine_with(
    repository: Arc<InMemorySessionRepository>,
    generator: ScriptedGenerator,
    policy: BusyPolicy,
) -> SessionStateMachine {
    SessionStateMachine::new(
        repository,
        Arc::new(generator),
        FeedbackThresholds::default(),
        policy,
        None,
    )
}

fn start_request() -> StartSimulationRequest {
    serde_json::from_value(serde_json::json!({
        "user_id": "user-123",
        "skill_type": "communication",
        "difficulty_preference": 3
    }))
    .unwrap()
}

fn respond_request(text: &str, seconds: Option<i64>) -> RespondSimulationRequest {
    serde_json::from_value(serde_json::json!({
        "user_response": text,
        "response_time_seconds": seconds,
        "help_requested": false
    }))
    .unwrap()
}

#[tokio::test]
async fn full_simulation_flow_completes_with_badges() {
    let repository = Arc::new(InMemorySessionRepository::new());
    let scores = [90u8, 92, 96, 88, 94];
    let mut script: Vec<Result<TurnEvaluation, String>> = scores[..4]
        .iter()
        .map(|score| continue_eval(*score))
        .collect();
    // The generator keeps continuing; the engine completes because the
    // terminal step bound is reached.
    script.push(continue_eval(scores[4]));
    let engine = engine_with(
        repository.clone(),
        ScriptedGenerator::with_evaluations(script),
        BusyPolicy::FailFast,
    );

    let started = engine.create(start_request()).await.unwrap();
    assert_eq!(started.session.current_step_number, 1);
    assert_eq!(started.session.max_steps, 5);
    assert_eq!(started.first_step.step_number, 1);

    let session_id = started.session_id.clone();

    for turn in 1..=4u32 {
        let outcome = engine
            .respond(
                &session_id,
                respond_request("I would talk with them privately first.", Some(70)),
            )
            .await
            .unwrap();
        assert!(!outcome.completed);
        assert_eq!(outcome.step_number, turn);
        assert_eq!(outcome.next_step.as_ref().unwrap().step_number, turn + 1);

        // Step-ordering invariant after each accepted turn.
        let stored = repository.stored(&session_id).unwrap();
        assert_eq!(stored.status, SessionStatus::Active);
        assert_eq!(stored.current_step_number, turn + 1);
        assert_eq!(
            stored.answered_steps().count() as u32,
            stored.current_step_number - 1
        );
    }

    let outcome = engine
        .respond(
            &session_id,
            respond_request("I would summarize our agreement in writing.", Some(70)),
        )
        .await
        .unwrap();

    assert!(outcome.completed);
    assert!(outcome.next_step.is_none());
    let feedback = outcome.completion_feedback.unwrap();
    assert_eq!(feedback.overall_score, 92.0);
    assert_eq!(feedback.performance.help_requests_count, 0);
    // 92 < 95: no expert badge, but independent solver unlocks.
    assert_eq!(
        feedback.badges_unlocked,
        vec!["Independent Problem Solver".to_string()]
    );

    let stored = repository.stored(&session_id).unwrap();
    assert_eq!(stored.status, SessionStatus::Completed);
    assert_eq!(stored.answered_steps().count(), 5);
    assert!(stored.completed_at.is_some());
}

#[tokio::test]
async fn generator_early_completion_ends_the_session() {
    let repository = Arc::new(InMemorySessionRepository::new());
    let engine = engine_with(
        repository.clone(),
        ScriptedGenerator::with_evaluations(vec![continue_eval(80), complete_eval(85)]),
        BusyPolicy::FailFast,
    );

    let started = engine.create(start_request()).await.unwrap();
    let session_id = started.session_id;

    let first = engine
        .respond(&session_id, respond_request("A thoughtful first answer.", None))
        .await
        .unwrap();
    assert!(!first.completed);

    let second = engine
        .respond(&session_id, respond_request("A decisive second answer.", None))
        .await
        .unwrap();
    assert!(second.completed);

    let stored = repository.stored(&session_id).unwrap();
    assert_eq!(stored.status, SessionStatus::Completed);
    assert_eq!(stored.answered_steps().count(), 2);
    // Early completion: fewer answered steps than the terminal bound.
    assert!(stored.answered_steps().count() < stored.max_steps as usize);
}

#[tokio::test]
async fn failed_create_persists_nothing() {
    let repository = Arc::new(InMemorySessionRepository::new());
    let engine = engine_with(
        repository.clone(),
        ScriptedGenerator::failing_opening("model overloaded"),
        BusyPolicy::FailFast,
    );

    let err = engine.create(start_request()).await.unwrap_err();
    assert!(matches!(err, SimulationError::ContentUnavailable(_)));
    assert_eq!(repository.len(), 0);
}

#[tokio::test]
async fn upstream_failure_leaves_pending_step_for_retry() {
    let repository = Arc::new(InMemorySessionRepository::new());
    let engine = engine_with(
        repository.clone(),
        ScriptedGenerator::with_evaluations(vec![
            Err("evaluation timed out".to_string()),
            continue_eval(77),
        ]),
        BusyPolicy::FailFast,
    );

    let started = engine.create(start_request()).await.unwrap();
    let session_id = started.session_id;

    let err = engine
        .respond(&session_id, respond_request("My considered answer.", Some(30)))
        .await
        .unwrap_err();
    assert!(matches!(err, SimulationError::EvaluationUnavailable(_)));

    // No partial write: the pending step is still unanswered.
    let stored = repository.stored(&session_id).unwrap();
    assert_eq!(stored.current_step_number, 1);
    assert_eq!(stored.answered_steps().count(), 0);
    assert!(stored.pending_step().is_some());

    // Retrying the same turn succeeds as if it were the first attempt.
    let outcome = engine
        .respond(&session_id, respond_request("My considered answer.", Some(30)))
        .await
        .unwrap();
    assert_eq!(outcome.step_number, 1);
    assert!(!outcome.completed);
    let stored = repository.stored(&session_id).unwrap();
    assert_eq!(stored.current_step_number, 2);
    assert_eq!(stored.answered_steps().count(), 1);
}

#[tokio::test]
async fn concurrent_responds_consume_the_pending_step_once() {
    let repository = Arc::new(InMemorySessionRepository::new());
    let mut generator = ScriptedGenerator::with_evaluations(vec![continue_eval(70)]);
    generator.evaluation_delay = Some(Duration::from_millis(100));
    let engine = Arc::new(engine_with(
        repository.clone(),
        generator,
        BusyPolicy::FailFast,
    ));

    let started = engine.create(start_request()).await.unwrap();
    let session_id = started.session_id;

    let first = {
        let engine = engine.clone();
        let session_id = session_id.clone();
        tokio::spawn(async move {
            engine
                .respond(&session_id, respond_request("Racing answer one.", None))
                .await
        })
    };
    let second = {
        let engine = engine.clone();
        let session_id = session_id.clone();
        tokio::spawn(async move {
            // Give the first call a head start so it holds the session lock.
            tokio::time::sleep(Duration::from_millis(20)).await;
            engine
                .respond(&session_id, respond_request("Racing answer two.", None))
                .await
        })
    };

    let first = first.await.unwrap();
    let second = second.await.unwrap();

    assert!(first.is_ok());
    assert!(matches!(second, Err(SimulationError::SessionBusy(_))));

    let stored = repository.stored(&session_id).unwrap();
    assert_eq!(stored.answered_steps().count(), 1);
    assert_eq!(stored.current_step_number, 2);
}

#[tokio::test]
async fn vague_response_is_scored_not_rejected() {
    let repository = Arc::new(InMemorySessionRepository::new());
    let engine = engine_with(
        repository.clone(),
        ScriptedGenerator::with_evaluations(vec![continue_eval(15)]),
        BusyPolicy::FailFast,
    );

    let started = engine.create(start_request()).await.unwrap();
    let session_id = started.session_id;

    let outcome = engine
        .respond(&session_id, respond_request("ok", None))
        .await
        .unwrap();
    assert_eq!(outcome.evaluation.score, 15);

    let stored = repository.stored(&session_id).unwrap();
    let answered = stored.answered_steps().next().unwrap();
    assert!(answered.interaction.flagged_vague);
}

#[tokio::test]
async fn empty_response_fails_without_consuming_the_step() {
    let repository = Arc::new(InMemorySessionRepository::new());
    let engine = engine_with(
        repository.clone(),
        ScriptedGenerator::with_evaluations(vec![]),
        BusyPolicy::FailFast,
    );

    let started = engine.create(start_request()).await.unwrap();
    let session_id = started.session_id;

    let err = engine
        .respond(&session_id, respond_request("   ", None))
        .await
        .unwrap_err();
    assert!(matches!(err, SimulationError::EmptyResponse));

    let stored = repository.stored(&session_id).unwrap();
    assert!(stored.pending_step().is_some());
    assert_eq!(stored.answered_steps().count(), 0);
}

#[tokio::test]
async fn responding_to_terminal_or_unknown_sessions_fails() {
    let repository = Arc::new(InMemorySessionRepository::new());
    let engine = engine_with(
        repository.clone(),
        ScriptedGenerator::with_evaluations(vec![complete_eval(90)]),
        BusyPolicy::FailFast,
    );

    let err = engine
        .respond("missing-session", respond_request("hello there friend", None))
        .await
        .unwrap_err();
    assert!(matches!(err, SimulationError::SessionNotFound(_)));

    let started = engine.create(start_request()).await.unwrap();
    let session_id = started.session_id;
    let outcome = engine
        .respond(&session_id, respond_request("Wrapping this up now.", None))
        .await
        .unwrap();
    assert!(outcome.completed);

    let err = engine
        .respond(&session_id, respond_request("One more thought.", None))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SimulationError::SessionNotActive {
            status: SessionStatus::Completed,
            ..
        }
    ));
}

#[tokio::test]
async fn abandon_is_terminal() {
    let repository = Arc::new(InMemorySessionRepository::new());
    let engine = engine_with(
        repository.clone(),
        ScriptedGenerator::with_evaluations(vec![]),
        BusyPolicy::FailFast,
    );

    let started = engine.create(start_request()).await.unwrap();
    let session_id = started.session_id;

    engine.abandon(&session_id).await.unwrap();
    let stored = repository.stored(&session_id).unwrap();
    assert_eq!(stored.status, SessionStatus::Abandoned);

    let err = engine
        .respond(&session_id, respond_request("Too late to answer.", None))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SimulationError::SessionNotActive {
            status: SessionStatus::Abandoned,
            ..
        }
    ));

    let err = engine.abandon(&session_id).await.unwrap_err();
    assert!(matches!(err, SimulationError::SessionNotActive { .. }));
}

#[tokio::test]
async fn status_reports_progress_and_pending_step() {
    let repository = Arc::new(InMemorySessionRepository::new());
    let engine = engine_with(
        repository.clone(),
        ScriptedGenerator::with_evaluations(vec![continue_eval(80)]),
        BusyPolicy::FailFast,
    );

    let started = engine.create(start_request()).await.unwrap();
    let session_id = started.session_id;

    engine
        .respond(&session_id, respond_request("A full first answer.", Some(45)))
        .await
        .unwrap();

    let status = engine.status(&session_id).await.unwrap();
    assert!(status.is_active);
    assert_eq!(status.progress.completed_steps, 1);
    assert_eq!(status.progress.total_steps, 5);
    assert_eq!(status.progress.completion_percentage, 20.0);
    assert_eq!(status.progress.average_score, Some(80.0));
    assert_eq!(status.steps_completed.len(), 1);
    assert_eq!(status.current_step.as_ref().unwrap().step_number, 2);
}
