//! Graph assembly: stitching questions, answer options, and detail panels
//! into the questionnaire tree, and flattening it back for persistence
//!
//! Assembly is pure in-memory traversal. All I/O happens before this module
//! is reached, so recursion depth costs CPU only. References that resolve to
//! nothing (dangling ids, soft-deleted rows) are dropped, never erred; the
//! entity graph is nominally a tree, but a revisited question id is skipped
//! instead of recursed to keep a malformed cycle from running away.

use std::collections::{HashMap, HashSet};
use tracing::warn;
use uuid::Uuid;

use super::types::{
    Action, AnswerOption, AnswerOptionNode, Detail, Question, QuestionNode, QuestionnaireGraph,
};

/// Entity pools fetched for one action, input to [`assemble`].
#[derive(Debug, Clone, Default)]
pub struct EntityPools {
    pub questions: Vec<Question>,
    pub answer_options: Vec<AnswerOption>,
    pub details: Vec<Detail>,
}

/// Flattened questionnaire, output of [`flatten`] and the unit handed to the
/// primary store on save.
#[derive(Debug, Clone)]
pub struct FlatQuestionnaire {
    pub action: Action,
    pub questions: Vec<Question>,
    pub answer_options: Vec<AnswerOption>,
    pub details: Vec<Detail>,
}

// =============================================================================
// ASSEMBLE
// =============================================================================

/// Build the questionnaire tree for `action` out of the entity pools.
///
/// Only ids referenced by the action (and transitively by its answer
/// options) are retained. Each question pulls in its answer options, each
/// answer option pulls in its follow-up questions, to unbounded depth.
pub fn assemble(action: &Action, pools: &EntityPools) -> QuestionnaireGraph {
    let questions_by_id: HashMap<&str, &Question> = pools
        .questions
        .iter()
        .filter(|q| q.active)
        .map(|q| (q.question_id.as_str(), q))
        .collect();
    let options_by_id: HashMap<&str, &AnswerOption> = pools
        .answer_options
        .iter()
        .filter(|o| o.active)
        .map(|o| (o.answer_option_id.as_str(), o))
        .collect();

    let mut visited: HashSet<String> = HashSet::new();
    let mut questions = attach_questions(
        &action.question_ids,
        &questions_by_id,
        &options_by_id,
        &mut visited,
    );
    sort_questions(&mut questions);

    let details_by_id: HashMap<&str, &Detail> = pools
        .details
        .iter()
        .filter(|d| d.active)
        .map(|d| (d.detail_id.as_str(), d))
        .collect();
    let mut details: Vec<Detail> = action
        .detail_ids
        .iter()
        .filter_map(|id| details_by_id.get(id.as_str()).map(|d| (*d).clone()))
        .collect();
    details.sort_by_key(|d| d.sequence_id.unwrap_or(u32::MAX));

    QuestionnaireGraph {
        action_id: action.action_id.clone(),
        action_text: action.action_text.clone(),
        questions,
        details,
    }
}

fn attach_questions(
    ids: &[String],
    questions_by_id: &HashMap<&str, &Question>,
    options_by_id: &HashMap<&str, &AnswerOption>,
    visited: &mut HashSet<String>,
) -> Vec<QuestionNode> {
    let mut nodes = Vec::with_capacity(ids.len());
    for id in ids {
        let Some(question) = questions_by_id.get(id.as_str()) else {
            // Dangling reference: drop silently, the authored list may be
            // ahead of (or behind) the stored entities.
            continue;
        };
        if !visited.insert(id.clone()) {
            warn!(question_id = %id, "question revisited during assembly, skipping");
            continue;
        }

        let mut answer_options: Vec<AnswerOptionNode> = question
            .answer_option_ids
            .iter()
            .filter_map(|oid| options_by_id.get(oid.as_str()))
            .map(|option| {
                let mut related = attach_questions(
                    &option.related_question_ids,
                    questions_by_id,
                    options_by_id,
                    visited,
                );
                sort_questions(&mut related);
                AnswerOptionNode {
                    option: (*option).clone(),
                    related_questions: related,
                }
            })
            .collect();
        sort_answer_options(&mut answer_options);

        nodes.push(QuestionNode {
            question: (*question).clone(),
            answer_options,
        });
    }
    nodes
}

fn sort_questions(nodes: &mut [QuestionNode]) {
    nodes.sort_by_key(|n| n.question.sequence_id.unwrap_or(u32::MAX));
}

/// Answer options carry two distinct orders and both are load-bearing: a
/// fully sequenced list (read path, sequence ids stamped by flatten) sorts by
/// sequence ascending; a list with any unsequenced member is still in its
/// authoring state and sorts by display text instead.
fn sort_answer_options(nodes: &mut Vec<AnswerOptionNode>) {
    let fully_sequenced = !nodes.is_empty() && nodes.iter().all(|n| n.option.sequence_id.is_some());
    if fully_sequenced {
        nodes.sort_by_key(|n| n.option.sequence_id.unwrap_or(u32::MAX));
    } else {
        nodes.sort_by(|a, b| a.option.option_text.cmp(&b.option.option_text));
    }
}

// =============================================================================
// FLATTEN
// =============================================================================

/// Inverse walk of [`assemble`]: break the tree back into entity lists,
/// generating ids where missing, stamping the owning `action_id`, and
/// assigning 1-based `sequence_id`s by list position at every recursion
/// level.
pub fn flatten(graph: &QuestionnaireGraph) -> FlatQuestionnaire {
    let action_id = non_empty_or_generated(&graph.action_id);

    let mut out = FlatQuestionnaire {
        action: Action {
            action_id: action_id.clone(),
            action_text: graph.action_text.clone(),
            question_ids: Vec::new(),
            detail_ids: Vec::new(),
            active: true,
            audit: Default::default(),
        },
        questions: Vec::new(),
        answer_options: Vec::new(),
        details: Vec::new(),
    };

    let mut visited: HashSet<String> = HashSet::new();
    let top_ids = flatten_questions(&graph.questions, &action_id, &mut out, &mut visited);
    out.action.question_ids = top_ids;

    for (idx, detail) in graph.details.iter().enumerate() {
        let mut detail = detail.clone();
        detail.detail_id = non_empty_or_generated(&detail.detail_id);
        detail.action_id = action_id.clone();
        detail.sequence_id = Some(idx as u32 + 1);
        out.action.detail_ids.push(detail.detail_id.clone());
        out.details.push(detail);
    }

    out
}

fn flatten_questions(
    nodes: &[QuestionNode],
    action_id: &str,
    out: &mut FlatQuestionnaire,
    visited: &mut HashSet<String>,
) -> Vec<String> {
    let mut ids = Vec::with_capacity(nodes.len());
    for (idx, node) in nodes.iter().enumerate() {
        let mut question = node.question.clone();
        question.question_id = non_empty_or_generated(&question.question_id);
        if !visited.insert(question.question_id.clone()) {
            warn!(question_id = %question.question_id, "question revisited during flatten, skipping");
            continue;
        }
        question.action_id = action_id.to_string();
        question.sequence_id = Some(idx as u32 + 1);
        ids.push(question.question_id.clone());

        let mut option_ids = Vec::with_capacity(node.answer_options.len());
        for (opt_idx, opt_node) in node.answer_options.iter().enumerate() {
            let mut option = opt_node.option.clone();
            option.answer_option_id = non_empty_or_generated(&option.answer_option_id);
            option.question_id = question.question_id.clone();
            option.action_id = action_id.to_string();
            option.sequence_id = Some(opt_idx as u32 + 1);
            option.related_question_ids =
                flatten_questions(&opt_node.related_questions, action_id, out, visited);
            option_ids.push(option.answer_option_id.clone());
            out.answer_options.push(option);
        }

        question.answer_option_ids = option_ids;
        out.questions.push(question);
    }
    ids
}

fn non_empty_or_generated(id: &str) -> String {
    if id.trim().is_empty() {
        Uuid::new_v4().to_string()
    } else {
        id.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::types::{AnswerType, Audit};

    fn question(id: &str, text: &str, option_ids: &[&str], seq: Option<u32>) -> Question {
        Question {
            question_id: id.to_string(),
            action_id: "act1".to_string(),
            question_text: text.to_string(),
            answer_type: AnswerType::SingleSelect,
            validation: None,
            answer_option_ids: option_ids.iter().map(|s| s.to_string()).collect(),
            sequence_id: seq,
            active: true,
            audit: Audit::default(),
        }
    }

    fn option(id: &str, qid: &str, text: &str, seq: Option<u32>, related: &[&str]) -> AnswerOption {
        AnswerOption {
            answer_option_id: id.to_string(),
            question_id: qid.to_string(),
            action_id: "act1".to_string(),
            option_text: text.to_string(),
            option_value: None,
            sequence_id: seq,
            related_question_ids: related.iter().map(|s| s.to_string()).collect(),
            active: true,
            audit: Audit::default(),
        }
    }

    fn detail(id: &str, title: &str, seq: Option<u32>) -> Detail {
        Detail {
            detail_id: id.to_string(),
            action_id: "act1".to_string(),
            title: title.to_string(),
            instructions: None,
            helper_text: None,
            footer: None,
            page_number: 1,
            sequence_id: seq,
            active: true,
            audit: Audit::default(),
        }
    }

    fn action(question_ids: &[&str], detail_ids: &[&str]) -> Action {
        Action {
            action_id: "act1".to_string(),
            action_text: "Screening".to_string(),
            question_ids: question_ids.iter().map(|s| s.to_string()).collect(),
            detail_ids: detail_ids.iter().map(|s| s.to_string()).collect(),
            active: true,
            audit: Audit::default(),
        }
    }

    #[test]
    fn dangling_question_reference_is_dropped() {
        let act = action(&["q1", "q2"], &[]);
        let pools = EntityPools {
            questions: vec![question("q1", "Only stored question", &[], Some(1))],
            ..Default::default()
        };
        let graph = assemble(&act, &pools);
        assert_eq!(graph.questions.len(), 1);
        assert_eq!(graph.questions[0].question.question_id, "q1");
    }

    #[test]
    fn nested_follow_up_questions_are_attached() {
        let act = action(&["q1"], &[]);
        let pools = EntityPools {
            questions: vec![
                question("q1", "Do you have allergies?", &["o1", "o2"], Some(1)),
                question("q2", "Which ones?", &[], Some(1)),
            ],
            answer_options: vec![
                option("o1", "q1", "Yes", Some(1), &["q2"]),
                option("o2", "q1", "No", Some(2), &[]),
            ],
            ..Default::default()
        };
        let graph = assemble(&act, &pools);
        let yes = &graph.questions[0].answer_options[0];
        assert_eq!(yes.option.answer_option_id, "o1");
        assert_eq!(yes.related_questions.len(), 1);
        assert_eq!(yes.related_questions[0].question.question_id, "q2");
    }

    #[test]
    fn sequenced_options_sort_by_sequence() {
        let act = action(&["q1"], &[]);
        let pools = EntityPools {
            questions: vec![question("q1", "Pick one", &["o1", "o2", "o3"], Some(1))],
            answer_options: vec![
                option("o1", "q1", "Zebra", Some(1), &[]),
                option("o2", "q1", "Apple", Some(3), &[]),
                option("o3", "q1", "Mango", Some(2), &[]),
            ],
            ..Default::default()
        };
        let graph = assemble(&act, &pools);
        let texts: Vec<&str> = graph.questions[0]
            .answer_options
            .iter()
            .map(|o| o.option.option_text.as_str())
            .collect();
        assert_eq!(texts, vec!["Zebra", "Mango", "Apple"]);
    }

    #[test]
    fn unsequenced_options_sort_by_display_text() {
        let act = action(&["q1"], &[]);
        let pools = EntityPools {
            questions: vec![question("q1", "Pick one", &["o1", "o2", "o3"], Some(1))],
            answer_options: vec![
                option("o1", "q1", "Zebra", None, &[]),
                option("o2", "q1", "Apple", Some(1), &[]),
                option("o3", "q1", "Mango", None, &[]),
            ],
            ..Default::default()
        };
        let graph = assemble(&act, &pools);
        let texts: Vec<&str> = graph.questions[0]
            .answer_options
            .iter()
            .map(|o| o.option.option_text.as_str())
            .collect();
        assert_eq!(texts, vec!["Apple", "Mango", "Zebra"]);
    }

    #[test]
    fn soft_deleted_entities_vanish_from_graph() {
        let act = action(&["q1", "q2"], &["d1"]);
        let mut dead = question("q2", "Gone", &[], Some(2));
        dead.active = false;
        let mut dead_detail = detail("d1", "Gone too", Some(1));
        dead_detail.active = false;
        let pools = EntityPools {
            questions: vec![question("q1", "Alive", &[], Some(1)), dead],
            answer_options: vec![],
            details: vec![dead_detail],
        };
        let graph = assemble(&act, &pools);
        assert_eq!(graph.questions.len(), 1);
        assert!(graph.details.is_empty());
    }

    #[test]
    fn cyclic_reference_fails_closed() {
        // q1 -> o1 -> q2 -> o2 -> q1: the revisit of q1 is skipped.
        let act = action(&["q1"], &[]);
        let pools = EntityPools {
            questions: vec![
                question("q1", "First", &["o1"], Some(1)),
                question("q2", "Second", &["o2"], Some(1)),
            ],
            answer_options: vec![
                option("o1", "q1", "Next", Some(1), &["q2"]),
                option("o2", "q2", "Back", Some(1), &["q1"]),
            ],
            ..Default::default()
        };
        let graph = assemble(&act, &pools);
        assert_eq!(graph.question_count(), 2);
        let q2 = &graph.questions[0].answer_options[0].related_questions[0];
        assert!(q2.answer_options[0].related_questions.is_empty());
    }

    #[test]
    fn flatten_generates_ids_and_stamps_sequence() {
        let graph = QuestionnaireGraph {
            action_id: String::new(),
            action_text: "Screening".to_string(),
            questions: vec![QuestionNode {
                question: question("", "Unsaved question", &[], None),
                answer_options: vec![
                    AnswerOptionNode {
                        option: option("", "", "Yes", None, &[]),
                        related_questions: vec![],
                    },
                    AnswerOptionNode {
                        option: option("", "", "No", None, &[]),
                        related_questions: vec![],
                    },
                ],
            }],
            details: vec![detail("", "Intro", None)],
        };

        let flat = flatten(&graph);
        assert!(!flat.action.action_id.is_empty());
        assert_eq!(flat.questions.len(), 1);
        assert_eq!(flat.answer_options.len(), 2);
        assert_eq!(flat.details.len(), 1);

        let q = &flat.questions[0];
        assert!(!q.question_id.is_empty());
        assert_eq!(q.sequence_id, Some(1));
        assert_eq!(q.action_id, flat.action.action_id);
        assert_eq!(q.answer_option_ids.len(), 2);

        let seqs: Vec<Option<u32>> = flat.answer_options.iter().map(|o| o.sequence_id).collect();
        assert_eq!(seqs, vec![Some(1), Some(2)]);
        assert_eq!(flat.details[0].sequence_id, Some(1));
    }

    #[test]
    fn assemble_of_flatten_reproduces_graph() {
        let act = action(&["q1", "q2"], &["d1"]);
        let pools = EntityPools {
            questions: vec![
                question("q1", "Allergies?", &["o1", "o2"], Some(1)),
                question("q2", "Age?", &[], Some(2)),
                question("q3", "Which?", &[], Some(1)),
            ],
            answer_options: vec![
                option("o1", "q1", "Yes", Some(1), &["q3"]),
                option("o2", "q1", "No", Some(2), &[]),
            ],
            details: vec![detail("d1", "Read me first", Some(1))],
        };

        let original = assemble(&act, &pools);
        let flat = flatten(&original);
        let rebuilt = assemble(
            &flat.action,
            &EntityPools {
                questions: flat.questions.clone(),
                answer_options: flat.answer_options.clone(),
                details: flat.details.clone(),
            },
        );

        // Identical shape: same ids in the same order at every level.
        assert_eq!(rebuilt.action_id, original.action_id);
        assert_eq!(rebuilt.question_count(), original.question_count());
        assert_eq!(
            rebuilt.questions[0].question.question_id,
            original.questions[0].question.question_id
        );
        assert_eq!(
            rebuilt.questions[0].answer_options[0].related_questions[0]
                .question
                .question_id,
            "q3"
        );
        assert_eq!(rebuilt.details.len(), 1);
    }
}
