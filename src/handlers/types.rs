//! Request/response DTOs for the questionnaire API

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::engine::types::{FlowRule, QuestionnaireGraph};

// =============================================================================
// RULE RESOLUTION
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct ResolveRequest {
    pub flow: String,
    #[serde(default)]
    pub attributes: HashMap<String, String>,
}

/// A miss is a normal response, not an error: `matched` false, no action id.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveResponse {
    pub matched: bool,
    pub action_id: Option<String>,
}

// =============================================================================
// QUESTIONNAIRE
// =============================================================================

/// Assembled questionnaire plus the tier that served it.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionnaireResponse {
    #[serde(flatten)]
    pub graph: QuestionnaireGraph,
    pub source_tier: &'static str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveQuestionnaireRequest {
    #[serde(flatten)]
    pub graph: QuestionnaireGraph,
    /// Author recorded in the audit block. Defaults to "system".
    #[serde(default)]
    pub author: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveQuestionnaireResponse {
    /// "applied" when committed to the primary store, "queued" when held
    /// for replay during an outage.
    pub status: &'static str,
    pub action_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteQuestionnaireResponse {
    pub success: bool,
    pub action_id: String,
}

// =============================================================================
// RULES
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleUpsertRequest {
    #[serde(flatten)]
    pub rule: FlowRule,
    #[serde(default)]
    pub author: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RulesResponse {
    pub flow: String,
    pub rules: Vec<FlowRule>,
    pub total: usize,
}

// =============================================================================
// LIFECYCLE
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LifecycleRequest {
    /// Who performed the mutation; lands in `modifiedBy`.
    pub by: String,
    #[serde(default)]
    pub remarks: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LifecycleResponse {
    pub success: bool,
    pub kind: String,
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owning_action: Option<String>,
}

// =============================================================================
// ADMIN
// =============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotRebuildResponse {
    pub groups_written: usize,
}
