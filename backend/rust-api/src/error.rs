use axum::{http::StatusCode, response::IntoResponse, response::Response, Json};
use serde_json::json;
use thiserror::Error;

use crate::models::SessionStatus;

/// Every failure the simulation engine can produce. Upstream failures keep
/// their kind so the caller can decide between retry and surfacing.
#[derive(Debug, Error)]
pub enum SimulationError {
    #[error("user response must not be empty")]
    EmptyResponse,

    #[error("response_time_seconds must be >= 0, got {0}")]
    InvalidTiming(i64),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error("session {session_id} is not active (status: {status})")]
    SessionNotActive {
        session_id: String,
        status: SessionStatus,
    },

    #[error("session {0} has no pending step")]
    NoPendingStep(String),

    #[error("step {step_number} of session {session_id} is already answered")]
    StepAlreadyAnswered {
        session_id: String,
        step_number: u32,
    },

    #[error("content generator could not open a scenario: {0}")]
    ContentUnavailable(String),

    #[error("content generator could not evaluate the turn: {0}")]
    EvaluationUnavailable(String),

    #[error("session store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("another turn is already in flight for session {0}")]
    SessionBusy(String),
}

/// Coarse classification used for response mapping and retry decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    State,
    Upstream,
    Conflict,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::NotFound => "not_found",
            ErrorKind::State => "state",
            ErrorKind::Upstream => "upstream_unavailable",
            ErrorKind::Conflict => "concurrency_conflict",
        }
    }
}

impl SimulationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SimulationError::EmptyResponse
            | SimulationError::InvalidTiming(_)
            | SimulationError::InvalidRequest(_) => ErrorKind::Validation,
            SimulationError::SessionNotFound(_) => ErrorKind::NotFound,
            SimulationError::SessionNotActive { .. }
            | SimulationError::NoPendingStep(_)
            | SimulationError::StepAlreadyAnswered { .. } => ErrorKind::State,
            SimulationError::ContentUnavailable(_)
            | SimulationError::EvaluationUnavailable(_)
            | SimulationError::StoreUnavailable(_) => ErrorKind::Upstream,
            SimulationError::SessionBusy(_) => ErrorKind::Conflict,
        }
    }

    /// Transient failures the caller may retry with the same input.
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Upstream | ErrorKind::Conflict)
    }
}

impl IntoResponse for SimulationError {
    fn into_response(self) -> Response {
        let status = match self.kind() {
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::State | ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::Upstream => StatusCode::SERVICE_UNAVAILABLE,
        };

        let body = Json(json!({
            "error": self.to_string(),
            "kind": self.kind().as_str(),
            "retryable": self.is_retryable(),
        }));

        (status, body).into_response()
    }
}
