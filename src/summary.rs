//! Plain-text and JSON rendering of an evaluation round for the CLI.

use std::fmt::Write;

use serde::Serialize;

use crate::evaluation::protocol::Output;
use crate::evaluation::state::EvaluationState;
use crate::validation::{Validation, ValidationResult};

/// Everything `check` reports about one snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub state: EvaluationState,
    /// `None` when the evaluation did not succeed.
    pub validation: Option<ValidationResult>,
}

impl Report {
    pub fn new(state: EvaluationState, validation: Validation) -> Self {
        let validation = match validation {
            Validation::Complete(result) => Some(result),
            Validation::Indeterminate => None,
        };
        Self { state, validation }
    }

    /// Evaluation succeeded and no field has a message.
    pub fn passed(&self) -> bool {
        self.state.is_success() && self.validation.as_ref().is_some_and(ValidationResult::is_clean)
    }

    pub fn render(&self) -> String {
        format!(
            "== Evaluation ==\n{}\n\n== Validation ==\n{}\n\n== Updates ==\n{}\n",
            render_state(&self.state),
            render_validation(self.validation.as_ref()),
            render_updates(&self.state)
        )
    }
}

pub fn render_state(state: &EvaluationState) -> String {
    match state {
        EvaluationState::Loading => "Loading...".to_string(),
        EvaluationState::Success { values, .. } => {
            format!("Evaluated {} rule(s)", values.len())
        }
        EvaluationState::JsonParseError { error } => format!("JSON parse error: {}", error),
        EvaluationState::ExpressionParseError { error } => {
            format!("Expression parse error: {}", error)
        }
        EvaluationState::ExpressionEvaluationError { error } => {
            format!("Expression evaluation error: {}", error)
        }
        EvaluationState::UnknownError { error } => error.clone(),
    }
}

/// Renders a complete validation; `None` means the evaluation failed.
pub fn render_validation(validation: Option<&ValidationResult>) -> String {
    let Some(result) = validation else {
        return "Evaluation failed".to_string();
    };

    let mut out = String::new();
    if result.is_clean() {
        out.push_str("Validation successful!\n");
    }
    for (field, messages) in &result.messages_by_field {
        for message in messages {
            let _ = writeln!(out, "[{}] {}: {}", message.level, field, message.text);
        }
    }
    for entry in &result.evaluations {
        let _ = writeln!(out, "{}\n  => {}", entry.text, render_output(&entry.outcome));
    }
    out.trim_end().to_string()
}

pub fn render_output(output: &Output) -> String {
    match output {
        Output::Value { value } => value.to_string(),
        Output::Error { error } => format!("error: {}", error),
    }
}

pub fn render_updates(state: &EvaluationState) -> String {
    match state {
        EvaluationState::Success { updates, .. } if updates.is_empty() => {
            "Values set by SET actions will show up here".to_string()
        }
        EvaluationState::Success { updates, .. } => {
            // BTreeMap keeps the keys sorted
            serde_json::to_string_pretty(updates).unwrap_or_default()
        }
        _ => "No updates found".to_string(),
    }
}
