//! # Rules
//!
//! A rule pairs an expression with the judgment to make about its outcome.
//! Rules travel as an ordered list; the position is what the user sees and
//! reorders, while the [`RuleId`] is what replies and messages are keyed by.

use serde::{Deserialize, Serialize};

/// Stable identity of a rule, independent of its position in the list.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleId(String);

impl RuleId {
    /// Mints a fresh random id.
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RuleId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for RuleId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for RuleId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for RuleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// The kind of judgment a rule performs on its outcome.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum RuleAction {
    Evaluate,
    Accept,
    Reject,
    Warning,
    Set,
    SetRequired,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Rule {
    pub field_name: String,
    pub rule_action: RuleAction,
    pub rule_expression: String,
    pub rule_message: String,
}

impl Rule {
    pub fn new(
        field_name: impl Into<String>,
        rule_action: RuleAction,
        rule_expression: impl Into<String>,
        rule_message: impl Into<String>,
    ) -> Self {
        Self {
            field_name: field_name.into(),
            rule_action,
            rule_expression: rule_expression.into(),
            rule_message: rule_message.into(),
        }
    }

    /// Attaches a freshly minted id.
    pub fn with_new_id(self) -> RuleWithId {
        RuleWithId {
            id: RuleId::new(),
            rule: self,
        }
    }
}

/// A rule as it lives in a snapshot: the rule body plus its identity.
///
/// On the wire the id sits next to the PascalCase rule fields:
/// `{"id": "...", "FieldName": "...", "RuleAction": "ACCEPT", ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleWithId {
    pub id: RuleId,
    #[serde(flatten)]
    pub rule: Rule,
}

impl RuleWithId {
    pub fn new(id: impl Into<RuleId>, rule: Rule) -> Self {
        Self {
            id: id.into(),
            rule,
        }
    }
}

impl std::ops::Deref for RuleWithId {
    type Target = Rule;

    fn deref(&self) -> &Self::Target {
        &self.rule
    }
}
