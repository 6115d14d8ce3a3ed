//! Placement handlers.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
};
use uuid::Uuid;
use validator::Validate;

use crate::AppState;
use lingopath_domain::{
    AssessmentError, StartPlacementResponse, SubmitAnswerRequest, SubmitAnswerResponse,
};

/// Begin or resume a placement session for an assignment.
pub async fn start_test(
    State(state): State<Arc<AppState>>,
    Path(assigned_id): Path<Uuid>,
) -> Result<Json<StartPlacementResponse>, AssessmentError> {
    tracing::info!(assigned_id = %assigned_id, "Placement start requested");

    let result = state.placement.start_session(assigned_id).await?;

    tracing::info!(
        assigned_id = %assigned_id,
        session_id = %result.session_id,
        questions_completed = result.progress.questions_completed,
        "Placement start completed"
    );

    Ok(Json(StartPlacementResponse {
        session_id: result.session_id,
        first_question: result.first_question,
        progress: result.progress,
    }))
}

/// Submit the answer to the pending question and receive the next one or the
/// completion notice.
pub async fn submit_answer(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<Uuid>,
    Json(req): Json<SubmitAnswerRequest>,
) -> Result<Json<SubmitAnswerResponse>, AssessmentError> {
    req.validate()
        .map_err(AssessmentError::from_validation_errors)?;

    tracing::info!(session_id = %session_id, "Answer submission started");

    let outcome = state
        .placement
        .submit_answer(session_id, req.response_data, req.time_taken)
        .await?;

    tracing::info!(
        session_id = %session_id,
        is_correct = outcome.is_correct,
        is_complete = outcome.is_complete,
        questions_completed = outcome.progress.questions_completed,
        "Answer submission completed"
    );

    Ok(Json(SubmitAnswerResponse {
        next_question: outcome.next_question,
        progress: outcome.progress,
        assessment_complete: outcome.is_complete,
    }))
}
