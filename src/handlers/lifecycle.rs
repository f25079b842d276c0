//! Soft-delete / restore endpoints
//!
//! Rows are never removed here: both mutations flip the `active` flag and
//! restamp the audit block, and either one invalidates the cached assembled
//! graph of the owning action.

use axum::{
    extract::{Path, State},
    response::Json,
};
use tracing::info;

use super::state::AppState;
use super::types::{LifecycleRequest, LifecycleResponse};
use crate::engine::storage::AuditStamp;
use crate::engine::types::EntityKind;
use crate::errors::AppError;
use crate::validation;

fn parse_target(kind: &str, key: &str) -> Result<(EntityKind, String), AppError> {
    let kind = EntityKind::parse(kind)
        .ok_or_else(|| AppError::InvalidEntityKind(kind.to_string()))?;
    validation::validate_id("key", key).map_err(|e| AppError::InvalidInput {
        field: "key".to_string(),
        reason: e.to_string(),
    })?;
    Ok((kind, key.to_string()))
}

/// `POST /api/lifecycle/{kind}/{key}/soft-delete`
pub async fn soft_delete(
    State(state): State<AppState>,
    Path((kind, key)): Path<(String, String)>,
    Json(req): Json<LifecycleRequest>,
) -> Result<Json<LifecycleResponse>, AppError> {
    let (kind, key) = parse_target(&kind, &key)?;
    let stamp = AuditStamp {
        by: req.by,
        remarks: req.remarks,
    };

    let change = state
        .engine
        .soft_delete(kind, &key, stamp)
        .await
        .map_err(|e| AppError::StorageError(format!("{e:#}")))?
        .ok_or_else(|| AppError::EntityNotFound {
            kind: kind.as_str().to_string(),
            key: key.clone(),
        })?;

    info!(kind = %kind, key = %key, "soft-deleted");
    Ok(Json(LifecycleResponse {
        success: true,
        kind: kind.as_str().to_string(),
        key,
        owning_action: change.owning_action,
    }))
}

/// `POST /api/lifecycle/{kind}/{key}/restore`
pub async fn restore(
    State(state): State<AppState>,
    Path((kind, key)): Path<(String, String)>,
    Json(req): Json<LifecycleRequest>,
) -> Result<Json<LifecycleResponse>, AppError> {
    let (kind, key) = parse_target(&kind, &key)?;
    let stamp = AuditStamp {
        by: req.by,
        remarks: req.remarks,
    };

    let change = state
        .engine
        .restore(kind, &key, stamp)
        .await
        .map_err(|e| AppError::StorageError(format!("{e:#}")))?
        .ok_or_else(|| AppError::EntityNotFound {
            kind: kind.as_str().to_string(),
            key: key.clone(),
        })?;

    info!(kind = %kind, key = %key, "restored");
    Ok(Json(LifecycleResponse {
        success: true,
        kind: kind.as_str().to_string(),
        key,
        owning_action: change.owning_action,
    }))
}
