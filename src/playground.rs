//! # Playground State
//!
//! The snapshot a user edits: current record, previous record and the ordered
//! rule list. Every evaluation round is driven by one immutable
//! [`PlaygroundState`] value; edits produce the next one.
//!
//! Two JSON forms exist:
//!
//! - the full form (`from_json` / `to_json`) keeps rule ids and is what the CLI
//!   stores on disk,
//! - the share form (`from_share_json` / `to_share_json`) drops ids; importing
//!   it mints fresh ones.

use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tracing::warn;

use crate::rule::{Rule, RuleAction, RuleId, RuleWithId};

#[derive(Error, Debug)]
pub enum PlaygroundError {
    #[error("Rule not found: {0}")]
    RuleNotFound(RuleId),
    #[error("Input is not valid playground state: {0}")]
    InvalidState(#[from] serde_json::Error),
}

pub type PlaygroundResult<T> = Result<T, PlaygroundError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Direction {
    Up,
    Down,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaygroundState {
    pub data: String,
    pub previous_data: String,
    pub rules: Vec<RuleWithId>,
}

/// Id-less form used for sharing a playground.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SharedPlaygroundState {
    pub data: String,
    pub previous_data: String,
    pub rules: Vec<Rule>,
}

impl From<SharedPlaygroundState> for PlaygroundState {
    fn from(shared: SharedPlaygroundState) -> Self {
        Self {
            data: shared.data,
            previous_data: shared.previous_data,
            rules: shared.rules.into_iter().map(Rule::with_new_id).collect(),
        }
    }
}

impl From<&PlaygroundState> for SharedPlaygroundState {
    fn from(state: &PlaygroundState) -> Self {
        Self {
            data: state.data.clone(),
            previous_data: state.previous_data.clone(),
            rules: state.rules.iter().map(|rule| rule.rule.clone()).collect(),
        }
    }
}

impl Default for PlaygroundState {
    fn default() -> Self {
        Self::initial()
    }
}

impl PlaygroundState {
    /// A single-field record, no previous version and no rules.
    pub fn initial() -> Self {
        Self {
            data: pretty(&json!({
                "@reso.context": "urn:reso:metadata:2.0:resource:property",
                "MlsStatus": "Active",
            })),
            previous_data: "null".to_string(),
            rules: vec![],
        }
    }

    /// A listing record with a handful of representative rules.
    pub fn example() -> Self {
        let data = json!({
            "@reso.context": "urn:reso:metadata:2.0:resource:property",
            "ListPrice": 1000000,
            "PublicRemarks": "This message does not contain a phone number",
            "MlsStatus": "Pending",
            "ParkingTotal": 3,
            "GarageSpaces": 3,
            "OpenParkingSpaces": null,
            "Cooling": ["Electric", "Central Air"],
        });
        let previous_data = json!({
            "@reso.context": "urn:reso:metadata:2.0:resource:property",
            "ListPrice": 1200000,
            "MlsStatus": "Active",
            "ParkingTotal": 3,
            "GarageSpaces": 3,
            "OpenParkingSpaces": null,
        });

        SharedPlaygroundState {
            data: pretty(&data),
            previous_data: pretty(&previous_data),
            rules: vec![
                Rule::new(
                    "LastPrice",
                    RuleAction::Accept,
                    "ListPrice > 0",
                    "List price must be greater than 0",
                ),
                Rule::new(
                    "PublicRemarks",
                    RuleAction::Reject,
                    "MATCH(\n  PublicRemarks,\n  \"\\\\d{3}-\\\\d{4}\"\n)\n",
                    "Public remarks must not contain a phone number",
                ),
                Rule::new(
                    "ClosePrice",
                    RuleAction::SetRequired,
                    "MlsStatus = \"Closed\"",
                    "A close price is required when closing a listing",
                ),
                Rule::new(
                    "ParkingTotal",
                    RuleAction::Accept,
                    "IIF(ParkingTotal != .EMPTY., ParkingTotal, 0) = IIF(GarageSpaces != .EMPTY., GarageSpaces, 0) + IIF(OpenParkingSpaces != .EMPTY., OpenParkingSpaces, 0)",
                    "Parking Total must be consistent with Garage Spaces and Open Parking Spaces",
                ),
                Rule::new(
                    "Cooling",
                    RuleAction::Accept,
                    ".NOT. (Cooling .CONTAINS. \"None\") .OR. LENGTH(Cooling) = 1",
                    "Cooling can not contain 'None' and other values",
                ),
                Rule::new(
                    "PreviousListPrice",
                    RuleAction::Set,
                    "IIF(ListPrice != LAST ListPrice,\n  LAST ListPrice,\n  PreviousListPrice)\n",
                    "Update the previous list price when a new price is set",
                ),
                Rule::new(
                    "PendingTimestamp",
                    RuleAction::Set,
                    "IIF(MlsStatus = \"Pending\" .AND.\n      LAST MlsStatus != \"Pending\",\n  .NOW.,\n  PendingTimestamp)\n",
                    "Set the Pending Timestamp when the listing transitions to pending",
                ),
            ],
        }
        .into()
    }

    pub fn from_json(input: &str) -> PlaygroundResult<Self> {
        Ok(serde_json::from_str(input)?)
    }

    pub fn to_json(&self) -> PlaygroundResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Imports the id-less share form, minting a fresh id per rule.
    pub fn from_share_json(input: &str) -> PlaygroundResult<Self> {
        let shared: SharedPlaygroundState = serde_json::from_str(input)?;
        Ok(shared.into())
    }

    pub fn to_share_json(&self) -> PlaygroundResult<String> {
        Ok(serde_json::to_string_pretty(&SharedPlaygroundState::from(
            self,
        ))?)
    }

    pub fn set_data(&mut self, data: impl Into<String>) {
        self.data = data.into();
    }

    pub fn set_previous_data(&mut self, previous_data: impl Into<String>) {
        self.previous_data = previous_data.into();
    }

    pub fn rule(&self, id: &RuleId) -> Option<&RuleWithId> {
        self.rules.iter().find(|rule| &rule.id == id)
    }

    /// Appends a rule under a freshly minted id and returns that id.
    pub fn add_rule(&mut self, rule: Rule) -> RuleId {
        let rule = rule.with_new_id();
        let id = rule.id.clone();
        self.rules.push(rule);
        id
    }

    /// Replaces the body of an existing rule in place; the id and position are kept.
    pub fn set_rule(&mut self, id: &RuleId, rule: Rule) -> PlaygroundResult<()> {
        match self.rules.iter_mut().find(|existing| &existing.id == id) {
            Some(existing) => {
                existing.rule = rule;
                Ok(())
            }
            None => Err(not_found("set_rule", id)),
        }
    }

    /// Moves a rule one step. Returns `false` when it is already at that end.
    pub fn move_rule(&mut self, id: &RuleId, direction: Direction) -> PlaygroundResult<bool> {
        let index = self
            .rules
            .iter()
            .position(|rule| &rule.id == id)
            .ok_or_else(|| not_found("move_rule", id))?;

        let target = match direction {
            Direction::Up => index.saturating_sub(1),
            Direction::Down => (index + 1).min(self.rules.len() - 1),
        };
        if target == index {
            return Ok(false);
        }
        self.rules.swap(index, target);
        Ok(true)
    }

    pub fn remove_rule(&mut self, id: &RuleId) -> PlaygroundResult<RuleWithId> {
        let index = self
            .rules
            .iter()
            .position(|rule| &rule.id == id)
            .ok_or_else(|| not_found("remove_rule", id))?;
        Ok(self.rules.remove(index))
    }
}

fn not_found(operation: &str, id: &RuleId) -> PlaygroundError {
    warn!("{} with id={}: matching rule was not found", operation, id);
    PlaygroundError::RuleNotFound(id.clone())
}

fn pretty(value: &serde_json::Value) -> String {
    // Value serialization cannot fail
    serde_json::to_string_pretty(value).unwrap_or_default()
}
