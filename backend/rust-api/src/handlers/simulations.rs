use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use std::sync::Arc;

use crate::{
    error::SimulationError,
    models::{RespondSimulationRequest, StartSimulationRequest},
    services::AppState,
};

pub async fn start_simulation(
    State(state): State<Arc<AppState>>,
    Json(req): Json<StartSimulationRequest>,
) -> Result<impl IntoResponse, SimulationError> {
    tracing::info!(
        "Starting simulation for user_id={}, skill_type={}",
        req.user_id,
        req.skill_type
    );

    let response = state.engine.create(req).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

pub async fn respond_simulation(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    Json(req): Json<RespondSimulationRequest>,
) -> Result<impl IntoResponse, SimulationError> {
    tracing::info!("Processing turn for session: {}", session_id);

    let outcome = state.engine.respond(&session_id, req).await?;
    Ok((StatusCode::OK, Json(outcome)))
}

pub async fn get_simulation_status(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, SimulationError> {
    tracing::debug!("Getting simulation status: {}", session_id);

    let status = state.engine.status(&session_id).await?;
    Ok((StatusCode::OK, Json(status)))
}

pub async fn abandon_simulation(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, SimulationError> {
    tracing::info!("Abandoning simulation: {}", session_id);

    state.engine.abandon(&session_id).await?;
    Ok((StatusCode::NO_CONTENT, ()))
}
