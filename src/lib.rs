//! # ruleplay: Rule Playground Engine
//!
//! ruleplay evaluates an ordered list of validation and derivation rules
//! against a JSON record (and its previous version) and reports which rules
//! pass, fail, warn or compute values.
//!
//! ## Architecture
//!
//! ### 1. Playground State
//! The snapshot a user edits: current record, previous record and rules.
//! - Rules and their actions ([`rule`])
//! - Snapshot editing and import/export ([`playground`])
//!
//! ### 2. Asynchronous Evaluation
//! Each snapshot is evaluated off the caller's thread:
//! - Request/reply protocol ([`evaluation::protocol`])
//! - Id-based request multiplexing ([`evaluation::correlator`])
//! - Isolated evaluation worker ([`evaluation::unit`])
//! - Observable evaluation state ([`evaluation::state`])
//!
//! ### 3. Expressions
//! The unit parses and evaluates rule expressions through the
//! [`expression::ExpressionEngine`] trait; [`expression::BasicEngine`] is
//! bundled.
//!
//! ### 4. Validation
//! A successful evaluation is reduced to per-field messages and informational
//! results ([`validation`]) and rendered for the terminal ([`summary`]).
//!
//! ## Processing Pipeline
//!
//! ```text
//! PlaygroundState → EvaluationStateMachine → Correlator → EvaluationUnit
//!                 → EvaluationState → Validation Interpreter → Summary
//! ```

pub mod config;
pub mod error;
pub mod evaluation;
pub mod expression;
pub mod playground;
pub mod rule;
pub mod summary;
pub mod validation;

// Re-exports
pub use error::*;
pub use evaluation::{EvaluationState, EvaluationStateMachine};
pub use playground::PlaygroundState;
pub use rule::*;
pub use validation::{interpret, validate, Validation, ValidationResult};
