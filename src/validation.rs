//! Input validation for the questionnaire API
//!
//! Identifiers double as storage keys and file names, so the charset is
//! locked down before anything touches a tier.

use anyhow::{anyhow, Result};

/// Maximum lengths for security
pub const MAX_ID_LENGTH: usize = 128;
pub const MAX_FLOW_LENGTH: usize = 64;
pub const MAX_TEXT_LENGTH: usize = 10_000;
pub const MAX_ATTRIBUTES: usize = 64;
pub const MAX_ATTRIBUTE_VALUE_LENGTH: usize = 512;
pub const MAX_GRAPH_QUESTIONS: usize = 500;

/// Validate an entity or action identifier.
///
/// Ids become RocksDB key segments, cache keys, and `{id}.json` file names;
/// only alphanumerics, dash, underscore, and dot are allowed.
pub fn validate_id(field: &str, id: &str) -> Result<()> {
    if id.is_empty() {
        return Err(anyhow!("{field} cannot be empty"));
    }
    if id.len() > MAX_ID_LENGTH {
        return Err(anyhow!(
            "{field} too long: {} chars (max: {})",
            id.len(),
            MAX_ID_LENGTH
        ));
    }
    if !id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
    {
        return Err(anyhow!(
            "{field} contains invalid characters (allowed: alphanumeric, -, _, .)"
        ));
    }
    // ".." would escape the file-fallback directory
    if id.contains("..") {
        return Err(anyhow!("{field} must not contain '..'"));
    }
    Ok(())
}

/// Validate a flow name (uppercase business identifier by convention, but
/// only the charset is enforced).
pub fn validate_flow(flow: &str) -> Result<()> {
    if flow.is_empty() {
        return Err(anyhow!("flow cannot be empty"));
    }
    if flow.len() > MAX_FLOW_LENGTH {
        return Err(anyhow!(
            "flow too long: {} chars (max: {})",
            flow.len(),
            MAX_FLOW_LENGTH
        ));
    }
    if !flow
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(anyhow!(
            "flow contains invalid characters (allowed: alphanumeric, -, _)"
        ));
    }
    Ok(())
}

/// Validate the runtime context attribute map of a resolve request.
pub fn validate_attributes(attrs: &std::collections::HashMap<String, String>) -> Result<()> {
    if attrs.len() > MAX_ATTRIBUTES {
        return Err(anyhow!(
            "too many attributes: {} (max: {})",
            attrs.len(),
            MAX_ATTRIBUTES
        ));
    }
    for (key, value) in attrs {
        if key.is_empty() {
            return Err(anyhow!("attribute names cannot be empty"));
        }
        if value.len() > MAX_ATTRIBUTE_VALUE_LENGTH {
            return Err(anyhow!(
                "attribute '{key}' value too long: {} chars (max: {})",
                value.len(),
                MAX_ATTRIBUTE_VALUE_LENGTH
            ));
        }
    }
    Ok(())
}

/// Validate display text fields before they are persisted.
pub fn validate_text(field: &str, text: &str, allow_empty: bool) -> Result<()> {
    if !allow_empty && text.trim().is_empty() {
        return Err(anyhow!("{field} cannot be empty"));
    }
    if text.len() > MAX_TEXT_LENGTH {
        return Err(anyhow!(
            "{field} too long: {} chars (max: {})",
            text.len(),
            MAX_TEXT_LENGTH
        ));
    }
    Ok(())
}

/// Structural validation of an incoming questionnaire graph.
pub fn validate_graph(graph: &crate::engine::types::QuestionnaireGraph) -> Result<()> {
    if !graph.action_id.is_empty() {
        validate_id("actionId", &graph.action_id)?;
    }
    validate_text("actionText", &graph.action_text, false)?;

    let total = graph.question_count();
    if total > MAX_GRAPH_QUESTIONS {
        return Err(anyhow!(
            "questionnaire too large: {} questions (max: {})",
            total,
            MAX_GRAPH_QUESTIONS
        ));
    }

    fn walk(nodes: &[crate::engine::types::QuestionNode]) -> Result<()> {
        for node in nodes {
            validate_text("questionText", &node.question.question_text, false)?;
            if !node.question.question_id.is_empty() {
                validate_id("questionId", &node.question.question_id)?;
            }
            for opt in &node.answer_options {
                validate_text("optionText", &opt.option.option_text, false)?;
                if !opt.option.answer_option_id.is_empty() {
                    validate_id("answerOptionId", &opt.option.answer_option_id)?;
                }
                walk(&opt.related_questions)?;
            }
        }
        Ok(())
    }
    walk(&graph.questions)?;

    for detail in &graph.details {
        validate_text("title", &detail.title, false)?;
        if !detail.detail_id.is_empty() {
            validate_id("detailId", &detail.detail_id)?;
        }
    }
    Ok(())
}
