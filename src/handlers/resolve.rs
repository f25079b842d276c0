//! Rule resolution endpoint

use axum::{extract::State, response::Json};
use tracing::info;

use super::state::AppState;
use super::types::{ResolveRequest, ResolveResponse};
use crate::errors::AppError;
use crate::validation;

/// `POST /api/resolve` - map a flow + runtime context attributes to the
/// action id whose questionnaire should be rendered.
pub async fn resolve_action(
    State(state): State<AppState>,
    Json(req): Json<ResolveRequest>,
) -> Result<Json<ResolveResponse>, AppError> {
    validation::validate_flow(&req.flow).map_err(|e| AppError::InvalidFlow(e.to_string()))?;
    validation::validate_attributes(&req.attributes).map_err(|e| AppError::InvalidInput {
        field: "attributes".to_string(),
        reason: e.to_string(),
    })?;

    let action_id = state.engine.resolve_action(&req.flow, &req.attributes).await;
    info!(
        flow = %req.flow,
        matched = action_id.is_some(),
        "resolve"
    );

    Ok(Json(ResolveResponse {
        matched: action_id.is_some(),
        action_id,
    }))
}
