//! Flow-rule authoring and listing endpoints

use axum::{
    extract::{Path, State},
    response::Json,
};
use tracing::info;

use super::state::AppState;
use super::types::{RulesResponse, RuleUpsertRequest};
use crate::errors::AppError;
use crate::validation;

/// `GET /api/rules/{flow}` - every rule of a flow, inactive ones included.
/// Inactive rules never fire but stay listable for audit.
pub async fn list_rules(
    State(state): State<AppState>,
    Path(flow): Path<String>,
) -> Result<Json<RulesResponse>, AppError> {
    validation::validate_flow(&flow).map_err(|e| AppError::InvalidFlow(e.to_string()))?;

    let rules = state.engine.list_rules(&flow).await;
    let total = rules.len();
    Ok(Json(RulesResponse { flow, rules, total }))
}

/// `POST /api/rules` - author or update one flow rule.
pub async fn upsert_rule(
    State(state): State<AppState>,
    Json(req): Json<RuleUpsertRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let mut rule = req.rule;
    validation::validate_flow(&rule.flow).map_err(|e| AppError::InvalidFlow(e.to_string()))?;
    validation::validate_id("ruleId", &rule.rule_id)
        .map_err(|e| AppError::InvalidInput {
            field: "ruleId".to_string(),
            reason: e.to_string(),
        })?;
    validation::validate_id("actionId", &rule.action_id)
        .map_err(|e| AppError::InvalidActionId(e.to_string()))?;
    validation::validate_text("ruleName", &rule.rule_name, false).map_err(|e| {
        AppError::InvalidInput {
            field: "ruleName".to_string(),
            reason: e.to_string(),
        }
    })?;
    if rule.condition.attribute.is_empty() {
        return Err(AppError::InvalidInput {
            field: "condition.attribute".to_string(),
            reason: "cannot be empty".to_string(),
        });
    }

    let author = req.author.as_deref().unwrap_or("system");
    if rule.audit.created_ts.is_none() {
        rule.audit = crate::engine::types::Audit::created_now(author);
    } else {
        rule.audit.touch(author, None);
    }

    let flow = rule.flow.clone();
    let rule_id = rule.rule_id.clone();
    state
        .engine
        .put_rule(rule)
        .await
        .map_err(|e| AppError::StorageError(format!("{e:#}")))?;

    info!(flow = %flow, rule_id = %rule_id, "rule upserted");
    Ok(Json(serde_json::json!({
        "success": true,
        "flow": flow,
        "ruleId": rule_id,
    })))
}
