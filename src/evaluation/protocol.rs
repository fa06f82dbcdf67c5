//! Request and reply types exchanged with the evaluation unit.
//!
//! On the wire every message is the payload's own fields plus a numeric `id`
//! used only for correlation:
//!
//! ```text
//! → {"id": 7, "rules": [...], "currentData": "...", "previousData": "...", "now": "...", "today": "..."}
//! ← {"id": 7, "type": "success", "values": {...}, "updates": {...}}
//! ```

use std::collections::BTreeMap;

use chrono::{DateTime, FixedOffset, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::playground::PlaygroundState;
use crate::rule::{RuleId, RuleWithId};

/// Correlation id assigned by the correlator.
pub type CallId = u64;

/// A payload tagged with its correlation id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub id: CallId,
    #[serde(flatten)]
    pub payload: T,
}

impl<T> Envelope<T> {
    pub fn new(id: CallId, payload: T) -> Self {
        Self { id, payload }
    }

    /// Wraps a reply for the same call.
    pub fn reply<R>(&self, payload: R) -> Envelope<R> {
        Envelope {
            id: self.id,
            payload,
        }
    }
}

/// One evaluation round for the unit.
///
/// `now` and `today` are fixed when the request is built so that every rule in
/// the round sees the same instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Request {
    pub rules: Vec<RuleWithId>,
    pub current_data: String,
    pub previous_data: String,
    /// RFC 3339, UTC, millisecond precision.
    pub now: String,
    /// `YYYY-MM-DD` in the caller's local offset.
    pub today: String,
}

impl Request {
    pub fn new(snapshot: &PlaygroundState, now: DateTime<FixedOffset>) -> Self {
        Self {
            rules: snapshot.rules.clone(),
            current_data: snapshot.data.clone(),
            previous_data: snapshot.previous_data.clone(),
            now: now
                .with_timezone(&Utc)
                .to_rfc3339_opts(SecondsFormat::Millis, true),
            today: now.date_naive().format("%Y-%m-%d").to_string(),
        }
    }
}

/// Result of evaluating a single rule expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Output {
    Value { value: Value },
    Error { error: String },
}

impl Output {
    pub fn value(value: impl Into<Value>) -> Self {
        Output::Value {
            value: value.into(),
        }
    }

    pub fn error(error: impl Into<String>) -> Self {
        Output::Error {
            error: error.into(),
        }
    }

    /// Only a literal boolean `true` counts.
    pub fn is_true(&self) -> bool {
        matches!(self, Output::Value { value: Value::Bool(true) })
    }
}

impl std::fmt::Display for Output {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Output::Value { value } => write!(f, "{}", value),
            Output::Error { error } => f.write_str(error),
        }
    }
}

pub type Values = BTreeMap<RuleId, Output>;
pub type Updates = BTreeMap<String, Value>;

/// Everything the unit can answer with. The set is closed: whatever failure
/// the unit hits is mapped onto one of these variants before it leaves it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Reply {
    Success {
        values: Values,
        updates: Updates,
    },
    JsonParseError {
        error: String,
    },
    ExpressionParseError {
        error: String,
    },
    ExpressionEvaluationError {
        error: String,
    },
    UnknownError {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

impl Reply {
    pub fn is_success(&self) -> bool {
        matches!(self, Reply::Success { .. })
    }
}

/// Raw failure raised while evaluating a request, before it is turned into a
/// [`Reply`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UnitFailure {
    #[error("JSON parse error: {error}")]
    JsonParseError { error: String },
    #[error("Expression parse error: {error}")]
    ExpressionParseError { error: String },
    #[error("Expression runtime error: {error}")]
    ExpressionRuntimeError { error: String },
}

/// Successful evaluation of a whole rule set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Evaluated {
    pub values: Values,
    pub updates: Updates,
}

impl From<UnitFailure> for Reply {
    fn from(failure: UnitFailure) -> Self {
        match failure {
            UnitFailure::JsonParseError { error } => Reply::JsonParseError { error },
            UnitFailure::ExpressionParseError { error } => Reply::ExpressionParseError { error },
            UnitFailure::ExpressionRuntimeError { error } => {
                Reply::ExpressionEvaluationError { error }
            }
        }
    }
}

impl From<Result<Evaluated, UnitFailure>> for Reply {
    fn from(result: Result<Evaluated, UnitFailure>) -> Self {
        match result {
            Ok(Evaluated { values, updates }) => Reply::Success { values, updates },
            Err(failure) => failure.into(),
        }
    }
}
