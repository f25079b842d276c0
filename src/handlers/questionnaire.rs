//! Questionnaire read/write/delete endpoints

use axum::{
    extract::{Path, State},
    response::Json,
};
use tracing::info;

use super::state::AppState;
use super::types::{
    DeleteQuestionnaireResponse, QuestionnaireResponse, SaveQuestionnaireRequest,
    SaveQuestionnaireResponse,
};
use crate::engine::retrieval::{RetrievalOutcome, SaveOutcome};
use crate::errors::AppError;
use crate::validation;

/// `GET /api/questionnaire/{action_id}` - tiered read. The response names
/// the tier that served it; a total miss is the fixed 503 outcome.
pub async fn get_questionnaire(
    State(state): State<AppState>,
    Path(action_id): Path<String>,
) -> Result<Json<QuestionnaireResponse>, AppError> {
    validation::validate_id("actionId", &action_id)
        .map_err(|e| AppError::InvalidActionId(e.to_string()))?;

    match state.engine.get_questionnaire(&action_id).await {
        RetrievalOutcome::Hit { graph, tier } => {
            info!(action_id, tier, "questionnaire served");
            Ok(Json(QuestionnaireResponse {
                graph,
                source_tier: tier,
            }))
        }
        RetrievalOutcome::NotFound => Err(AppError::ActionNotFound(action_id)),
        RetrievalOutcome::Unavailable => Err(AppError::TemporarilyUnavailable),
    }
}

/// `POST /api/questionnaire` - author or update a questionnaire. During a
/// primary outage the write is queued and the caller is told so: nothing
/// has been committed yet.
pub async fn save_questionnaire(
    State(state): State<AppState>,
    Json(req): Json<SaveQuestionnaireRequest>,
) -> Result<Json<SaveQuestionnaireResponse>, AppError> {
    validation::validate_graph(&req.graph).map_err(|e| AppError::InvalidInput {
        field: "questionnaire".to_string(),
        reason: e.to_string(),
    })?;

    let author = req.author.as_deref().unwrap_or("system");
    let result = state.engine.save_questionnaire(&req.graph, author).await;

    let status = match result.outcome {
        SaveOutcome::Applied => "applied",
        SaveOutcome::Queued => "queued",
    };
    info!(action_id = %result.action_id, status, "questionnaire save");

    Ok(Json(SaveQuestionnaireResponse {
        status,
        action_id: result.action_id,
    }))
}

/// `DELETE /api/questionnaire/{action_id}` - explicit purge, the only
/// hard-delete path. Not queueable during an outage.
pub async fn delete_questionnaire(
    State(state): State<AppState>,
    Path(action_id): Path<String>,
) -> Result<Json<DeleteQuestionnaireResponse>, AppError> {
    validation::validate_id("actionId", &action_id)
        .map_err(|e| AppError::InvalidActionId(e.to_string()))?;

    let found = state
        .engine
        .delete_questionnaire(&action_id)
        .await
        .map_err(|e| AppError::StorageError(format!("{e:#}")))?;

    if !found {
        return Err(AppError::ActionNotFound(action_id));
    }

    info!(action_id, "questionnaire purged");
    Ok(Json(DeleteQuestionnaireResponse {
        success: true,
        action_id,
    }))
}
