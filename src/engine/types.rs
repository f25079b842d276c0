//! Type definitions for the questionnaire engine
//!
//! Entities follow the authoring model: an `Action` owns ordered questions
//! and detail panels, questions own answer options, and answer options may
//! point back at follow-up questions, which makes the assembled structure a
//! rooted, possibly multi-level tree. All wire DTOs serialize camelCase.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Audit block stamped on every authored entity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Audit {
    pub created_ts: Option<DateTime<Utc>>,
    pub created_by: Option<String>,
    pub modified_ts: Option<DateTime<Utc>>,
    pub modified_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remarks: Option<String>,
}

impl Audit {
    /// Fresh audit block for a newly authored entity.
    pub fn created_now(by: &str) -> Self {
        let now = Utc::now();
        Self {
            created_ts: Some(now),
            created_by: Some(by.to_string()),
            modified_ts: Some(now),
            modified_by: Some(by.to_string()),
            remarks: None,
        }
    }

    /// Stamp a mutation without touching the creation fields.
    pub fn touch(&mut self, by: &str, remarks: Option<String>) {
        self.modified_ts = Some(Utc::now());
        self.modified_by = Some(by.to_string());
        if remarks.is_some() {
            self.remarks = remarks;
        }
    }
}

/// Entity kinds addressable by the lifecycle operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Action,
    FlowRule,
    Question,
    AnswerOption,
    Detail,
}

impl EntityKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "action" => Some(Self::Action),
            "flow_rule" | "rule" => Some(Self::FlowRule),
            "question" => Some(Self::Question),
            "answer_option" | "option" => Some(Self::AnswerOption),
            "detail" => Some(Self::Detail),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Action => "action",
            Self::FlowRule => "flow_rule",
            Self::Question => "question",
            Self::AnswerOption => "answer_option",
            Self::Detail => "detail",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolved questionnaire unit. Ordered id lists define authoring order;
/// ids that resolve to nothing are dropped at read time, never erred.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Action {
    pub action_id: String,
    pub action_text: String,
    #[serde(default)]
    pub question_ids: Vec<String>,
    #[serde(default)]
    pub detail_ids: Vec<String>,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default)]
    pub audit: Audit,
}

/// Single attribute-equals-literal condition. The rule grammar is
/// deliberately this narrow: one attribute compared against one literal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    pub attribute: String,
    pub equals: String,
}

impl Condition {
    pub fn matches(&self, attributes: &std::collections::HashMap<String, String>) -> bool {
        attributes
            .get(&self.attribute)
            .map(|v| v == &self.equals)
            .unwrap_or(false)
    }
}

/// Decision rule owned by a flow. Higher salience evaluates first; inactive
/// rules never fire but are retained for listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowRule {
    pub flow: String,
    pub rule_id: String,
    pub rule_name: String,
    pub condition: Condition,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lob: Option<String>,
    pub salience: i32,
    pub action_id: String,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default)]
    pub audit: Audit,
}

/// Answer widget the client should render for a question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnswerType {
    FreeText,
    SingleSelect,
    MultiSelect,
    Date,
    Numeric,
    Boolean,
}

impl Default for AnswerType {
    fn default() -> Self {
        Self::FreeText
    }
}

/// Client-side validation metadata carried verbatim to the renderer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionValidation {
    #[serde(default)]
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_length: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_length: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    /// Empty on the authoring path until flatten generates one.
    #[serde(default)]
    pub question_id: String,
    /// Owning action; stamped during flatten, used for composite keys.
    #[serde(default)]
    pub action_id: String,
    pub question_text: String,
    #[serde(default)]
    pub answer_type: AnswerType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation: Option<QuestionValidation>,
    #[serde(default)]
    pub answer_option_ids: Vec<String>,
    /// 1-based position within the owning list; `None` until first flatten.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sequence_id: Option<u32>,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default)]
    pub audit: Audit,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerOption {
    #[serde(default)]
    pub answer_option_id: String,
    #[serde(default)]
    pub question_id: String,
    #[serde(default)]
    pub action_id: String,
    pub option_text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub option_value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sequence_id: Option<u32>,
    /// Follow-up questions revealed when this option is chosen.
    #[serde(default)]
    pub related_question_ids: Vec<String>,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default)]
    pub audit: Audit,
}

/// Descriptive panel rendered alongside the questionnaire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Detail {
    #[serde(default)]
    pub detail_id: String,
    #[serde(default)]
    pub action_id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub helper_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub footer: Option<String>,
    #[serde(default)]
    pub page_number: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sequence_id: Option<u32>,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default)]
    pub audit: Audit,
}

fn default_active() -> bool {
    true
}

// =============================================================================
// ASSEMBLED GRAPH
// =============================================================================

/// Fully assembled questionnaire: the response DTO served to clients and the
/// exact JSON shape mirrored into the cold fallback tiers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionnaireGraph {
    #[serde(default)]
    pub action_id: String,
    pub action_text: String,
    pub questions: Vec<QuestionNode>,
    pub details: Vec<Detail>,
}

/// Question with its answer options attached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionNode {
    #[serde(flatten)]
    pub question: Question,
    #[serde(rename = "answerOptions", default)]
    pub answer_options: Vec<AnswerOptionNode>,
}

/// Answer option with any nested follow-up questions attached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerOptionNode {
    #[serde(flatten)]
    pub option: AnswerOption,
    #[serde(rename = "relatedQuestions", default)]
    pub related_questions: Vec<QuestionNode>,
}

impl QuestionnaireGraph {
    /// Count of questions at every nesting level.
    pub fn question_count(&self) -> usize {
        fn walk(nodes: &[QuestionNode]) -> usize {
            nodes
                .iter()
                .map(|n| {
                    1 + n
                        .answer_options
                        .iter()
                        .map(|o| walk(&o.related_questions))
                        .sum::<usize>()
                })
                .sum()
        }
        walk(&self.questions)
    }
}

// =============================================================================
// CACHE RECORD
// =============================================================================

/// Envelope spoken by the external cache service. Field casing is part of the
/// wire contract (`cachetype` / `cacheobject`, all lowercase) and must not be
/// normalized.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheRecord {
    pub cachetype: String,
    pub key: String,
    pub cacheobject: serde_json::Value,
}

impl CacheRecord {
    pub fn new(cachetype: &str, key: &str, cacheobject: serde_json::Value) -> Self {
        Self {
            cachetype: cachetype.to_string(),
            key: key.to_string(),
            cacheobject,
        }
    }
}

/// One snapshot group: every entity of one action, as stored in the dataset
/// snapshot cache entries.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetGroup {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<Action>,
    #[serde(default)]
    pub questions: Vec<Question>,
    #[serde(default)]
    pub answer_options: Vec<AnswerOption>,
    #[serde(default)]
    pub details: Vec<Detail>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn condition_matches_exact_literal_only() {
        let cond = Condition {
            attribute: "context".to_string(),
            equals: "A".to_string(),
        };
        let mut attrs = HashMap::new();
        attrs.insert("context".to_string(), "A".to_string());
        assert!(cond.matches(&attrs));

        attrs.insert("context".to_string(), "a".to_string());
        assert!(!cond.matches(&attrs), "matching is case-sensitive");

        assert!(!cond.matches(&HashMap::new()));
    }

    #[test]
    fn cache_record_wire_casing_is_lowercase() {
        let rec = CacheRecord::new("questionnaire", "act1", serde_json::json!({"a": 1}));
        let json = serde_json::to_value(&rec).unwrap();
        assert!(json.get("cachetype").is_some());
        assert!(json.get("cacheobject").is_some());
        assert!(json.get("cacheType").is_none());
    }

    #[test]
    fn graph_serializes_flattened_nodes() {
        let q = Question {
            question_id: "q1".to_string(),
            action_id: "act1".to_string(),
            question_text: "How old are you?".to_string(),
            answer_type: AnswerType::Numeric,
            validation: None,
            answer_option_ids: vec![],
            sequence_id: Some(1),
            active: true,
            audit: Audit::default(),
        };
        let graph = QuestionnaireGraph {
            action_id: "act1".to_string(),
            action_text: "Screening".to_string(),
            questions: vec![QuestionNode {
                question: q,
                answer_options: vec![],
            }],
            details: vec![],
        };
        let json = serde_json::to_value(&graph).unwrap();
        // QuestionNode flattens the question fields beside answerOptions
        assert_eq!(json["questions"][0]["questionId"], "q1");
        assert!(json["questions"][0]["answerOptions"].is_array());
    }
}
