//! Rule matching: flow + runtime context attributes -> action id
//!
//! Evaluation is intentionally boring: active rules only, salience
//! descending, first condition that matches wins, and a miss is a normal
//! result rather than an error.

use std::collections::HashMap;
use tracing::debug;

use super::types::FlowRule;

/// Evaluate the rules of one flow against runtime context attributes.
///
/// Rules are sorted by salience descending before evaluation; evaluation
/// stops at the first firing rule. Salience ties keep their incoming order,
/// which is storage order and deliberately unspecified - authors that need a
/// deterministic winner must use distinct saliences.
pub fn resolve_action(
    flow: &str,
    rules: &[FlowRule],
    attributes: &HashMap<String, String>,
) -> Option<String> {
    let mut candidates: Vec<&FlowRule> = rules
        .iter()
        .filter(|r| r.active && r.flow == flow)
        .collect();
    candidates.sort_by(|a, b| b.salience.cmp(&a.salience));

    for rule in candidates {
        if rule.condition.matches(attributes) {
            debug!(
                flow,
                rule_id = %rule.rule_id,
                salience = rule.salience,
                action_id = %rule.action_id,
                "rule fired"
            );
            return Some(rule.action_id.clone());
        }
    }

    debug!(flow, "no rule matched");
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::types::{Audit, Condition};

    fn rule(flow: &str, rule_id: &str, attr: &str, value: &str, salience: i32, action: &str) -> FlowRule {
        FlowRule {
            flow: flow.to_string(),
            rule_id: rule_id.to_string(),
            rule_name: format!("rule {rule_id}"),
            condition: Condition {
                attribute: attr.to_string(),
                equals: value.to_string(),
            },
            lob: None,
            salience,
            action_id: action.to_string(),
            active: true,
            audit: Audit::default(),
        }
    }

    fn attrs(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn highest_salience_match_wins() {
        let rules = vec![
            rule("VACCINE", "r1", "context", "A", 10, "X"),
            rule("VACCINE", "r2", "context", "A", 20, "Y"),
        ];
        let result = resolve_action("VACCINE", &rules, &attrs(&[("context", "A")]));
        assert_eq!(result.as_deref(), Some("Y"));
    }

    #[test]
    fn evaluation_stops_at_first_fire() {
        // Lower-salience rule matches a different attribute; it must never
        // be consulted once the higher one fires.
        let rules = vec![
            rule("VACCINE", "r1", "context", "A", 30, "FIRST"),
            rule("VACCINE", "r2", "context", "A", 10, "SECOND"),
        ];
        let result = resolve_action("VACCINE", &rules, &attrs(&[("context", "A")]));
        assert_eq!(result.as_deref(), Some("FIRST"));
    }

    #[test]
    fn inactive_rules_never_fire() {
        let mut winner = rule("VACCINE", "r1", "context", "A", 50, "X");
        winner.active = false;
        let rules = vec![winner, rule("VACCINE", "r2", "context", "A", 5, "Y")];
        let result = resolve_action("VACCINE", &rules, &attrs(&[("context", "A")]));
        assert_eq!(result.as_deref(), Some("Y"));
    }

    #[test]
    fn other_flows_are_ignored() {
        let rules = vec![rule("DENTAL", "r1", "context", "A", 10, "X")];
        let result = resolve_action("VACCINE", &rules, &attrs(&[("context", "A")]));
        assert_eq!(result, None);
    }

    #[test]
    fn miss_is_none_not_error() {
        let rules = vec![rule("VACCINE", "r1", "context", "B", 10, "X")];
        let result = resolve_action("VACCINE", &rules, &attrs(&[("context", "A")]));
        assert_eq!(result, None);
    }

    #[test]
    fn missing_attribute_does_not_match() {
        let rules = vec![rule("VACCINE", "r1", "region", "WEST", 10, "X")];
        let result = resolve_action("VACCINE", &rules, &attrs(&[("context", "A")]));
        assert_eq!(result, None);
    }
}
