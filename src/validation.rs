//! # Validation Interpreter
//!
//! Reduces a successful evaluation to what the user needs to see: messages per
//! field, and the informational results of `EVALUATE` rules.
//!
//! | Action         | Produces                                                       |
//! |----------------|----------------------------------------------------------------|
//! | `ACCEPT`       | error unless the outcome is `true`                             |
//! | `REJECT`       | error when the outcome is `true`                               |
//! | `WARNING`      | warning when the outcome is `true`                             |
//! | `SET_REQUIRED` | error when the outcome is `true` and the field is absent/null  |
//! | `EVALUATE`     | an evaluation entry, never a message                           |
//! | `SET`          | nothing; its value only shows up in the reply's updates        |
//!
//! Only a literal boolean `true` counts as true. The interpreter is a pure
//! function of its borrowed inputs.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, instrument};

use crate::evaluation::protocol::{Output, Values};
use crate::evaluation::state::EvaluationState;
use crate::playground::PlaygroundState;
use crate::rule::{RuleAction, RuleId, RuleWithId};

/// Outcome used for a rule the reply has no value for.
pub const NOT_FOUND: &str = "Not found";

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum MessageLevel {
    Error,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldMessage {
    pub rule_id: RuleId,
    pub level: MessageLevel,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationEntry {
    pub rule_id: RuleId,
    pub text: String,
    pub outcome: Output,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    /// Messages keyed by field name, each list in rule order.
    pub messages_by_field: BTreeMap<String, Vec<FieldMessage>>,
    pub evaluations: Vec<EvaluationEntry>,
}

impl ValidationResult {
    /// No field messages. Evaluation entries do not count.
    pub fn is_clean(&self) -> bool {
        self.messages_by_field.is_empty()
    }

    pub fn messages_for(&self, field: &str) -> &[FieldMessage] {
        self.messages_by_field
            .get(field)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    fn push(&mut self, rule: &RuleWithId, level: MessageLevel) {
        self.messages_by_field
            .entry(rule.field_name.clone())
            .or_default()
            .push(FieldMessage {
                rule_id: rule.id.clone(),
                level,
                text: rule.rule_message.clone(),
            });
    }
}

#[instrument(level = "debug", skip_all, fields(rules = rules.len()))]
pub fn interpret(rules: &[RuleWithId], current_data: &str, values: &Values) -> ValidationResult {
    let data: Value = serde_json::from_str(current_data).unwrap_or_else(|e| {
        debug!("current data is not JSON, treating it as empty: {}", e);
        Value::Object(Map::new())
    });
    let not_found = Output::error(NOT_FOUND);

    let mut result = ValidationResult::default();
    for rule in rules {
        let outcome = values.get(&rule.id).unwrap_or(&not_found);
        match rule.rule_action {
            RuleAction::Accept => {
                if !outcome.is_true() {
                    result.push(rule, MessageLevel::Error);
                }
            }
            RuleAction::Reject => {
                if outcome.is_true() {
                    result.push(rule, MessageLevel::Error);
                }
            }
            RuleAction::Warning => {
                if outcome.is_true() {
                    result.push(rule, MessageLevel::Warning);
                }
            }
            RuleAction::SetRequired => {
                // an explicit null counts as missing
                let missing = data.get(&rule.field_name).map_or(true, Value::is_null);
                if outcome.is_true() && missing {
                    result.push(rule, MessageLevel::Error);
                }
            }
            RuleAction::Evaluate => result.evaluations.push(EvaluationEntry {
                rule_id: rule.id.clone(),
                text: rule.rule_message.clone(),
                outcome: outcome.clone(),
            }),
            RuleAction::Set => {}
        }
    }
    result
}

/// Validation of one snapshot against its evaluation state.
#[derive(Debug, Clone, PartialEq)]
pub enum Validation {
    /// The evaluation did not succeed, so nothing can be said about the rules.
    Indeterminate,
    Complete(ValidationResult),
}

pub fn validate(snapshot: &PlaygroundState, state: &EvaluationState) -> Validation {
    match state {
        EvaluationState::Success { values, .. } => {
            Validation::Complete(interpret(&snapshot.rules, &snapshot.data, values))
        }
        _ => Validation::Indeterminate,
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::rule::Rule;

    fn rule(id: &str, field: &str, action: RuleAction, message: &str) -> RuleWithId {
        RuleWithId::new(id, Rule::new(field, action, "", message))
    }

    fn values(entries: &[(&str, Output)]) -> Values {
        entries
            .iter()
            .map(|(id, output)| (RuleId::from(*id), output.clone()))
            .collect()
    }

    fn single(action: RuleAction, outcome: Output, data: &str) -> ValidationResult {
        interpret(
            &[rule("r", "Field", action, "msg")],
            data,
            &values(&[("r", outcome)]),
        )
    }

    fn message(level: MessageLevel) -> FieldMessage {
        FieldMessage {
            rule_id: RuleId::from("r"),
            level,
            text: "msg".to_string(),
        }
    }

    #[test]
    fn test_accept() {
        assert!(single(RuleAction::Accept, Output::value(true), "{}").is_clean());

        for outcome in [Output::value(false), Output::value("yes"), Output::error("boom")] {
            let result = single(RuleAction::Accept, outcome, "{}");
            assert_eq!(result.messages_for("Field"), &[message(MessageLevel::Error)]);
        }
    }

    #[test]
    fn test_reject_and_warning() {
        assert_eq!(
            single(RuleAction::Reject, Output::value(true), "{}").messages_for("Field"),
            &[message(MessageLevel::Error)]
        );
        assert!(single(RuleAction::Reject, Output::value(false), "{}").is_clean());
        assert!(single(RuleAction::Reject, Output::error("boom"), "{}").is_clean());

        assert_eq!(
            single(RuleAction::Warning, Output::value(true), "{}").messages_for("Field"),
            &[message(MessageLevel::Warning)]
        );
        assert!(single(RuleAction::Warning, Output::value(false), "{}").is_clean());
    }

    #[test]
    fn test_set_required() {
        let required = |data: &str| single(RuleAction::SetRequired, Output::value(true), data);

        assert!(!required("{}").is_clean());
        assert!(!required(r#"{"Field": null}"#).is_clean());
        assert!(required(r#"{"Field": 0}"#).is_clean());
        assert!(required(r#"{"Field": ""}"#).is_clean());
        assert!(single(RuleAction::SetRequired, Output::value(false), "{}").is_clean());
    }

    #[test]
    fn test_evaluate_and_set() {
        let result = single(RuleAction::Evaluate, Output::value(42), "{}");
        assert!(result.is_clean());
        assert_eq!(
            result.evaluations,
            vec![EvaluationEntry {
                rule_id: RuleId::from("r"),
                text: "msg".to_string(),
                outcome: Output::value(42),
            }]
        );

        let result = single(RuleAction::Set, Output::value(false), "{}");
        assert_eq!(result, ValidationResult::default());
    }

    #[test]
    fn test_messages_keep_rule_order_per_field() {
        let rules = [
            rule("1", "Price", RuleAction::Warning, "first"),
            rule("2", "Status", RuleAction::Accept, "other field"),
            rule("3", "Price", RuleAction::Accept, "second"),
            rule("4", "Price", RuleAction::Reject, "third"),
        ];
        let outcomes = values(&[
            ("1", Output::value(true)),
            ("2", Output::value(false)),
            ("3", Output::value(false)),
            ("4", Output::value(true)),
        ]);

        let result = interpret(&rules, "{}", &outcomes);
        let texts: Vec<_> = result
            .messages_for("Price")
            .iter()
            .map(|m| m.text.as_str())
            .collect();
        assert_eq!(texts, vec!["first", "second", "third"]);
        assert_eq!(result.messages_for("Status").len(), 1);
    }

    #[test]
    fn test_missing_outcome_is_not_found() {
        let rules = [
            rule("accept", "A", RuleAction::Accept, "accept"),
            rule("eval", "B", RuleAction::Evaluate, "eval"),
        ];
        let result = interpret(&rules, "{}", &Values::new());

        assert_eq!(result.messages_for("A").len(), 1);
        assert_eq!(result.evaluations[0].outcome, Output::error(NOT_FOUND));
    }

    #[test]
    fn test_unparseable_data_is_an_empty_record() {
        let result = single(RuleAction::SetRequired, Output::value(true), "{oops");
        assert_eq!(result.messages_for("Field"), &[message(MessageLevel::Error)]);
    }

    #[test]
    fn test_validate_needs_a_successful_state() {
        let snapshot = PlaygroundState {
            data: json!({"A": 1}).to_string(),
            previous_data: "null".to_string(),
            rules: vec![rule("r", "A", RuleAction::Accept, "msg")],
        };

        let failed = EvaluationState::ExpressionParseError {
            error: "bad".to_string(),
        };
        assert_eq!(validate(&snapshot, &failed), Validation::Indeterminate);
        assert_eq!(validate(&snapshot, &EvaluationState::Loading), Validation::Indeterminate);

        let success = EvaluationState::Success {
            values: values(&[("r", Output::value(true))]),
            updates: Default::default(),
        };
        assert_eq!(
            validate(&snapshot, &success),
            Validation::Complete(ValidationResult::default())
        );
    }
}
