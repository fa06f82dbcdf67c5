//! # Expression Engines
//!
//! The evaluation unit does not know how rule expressions are written. It
//! parses and evaluates them through an [`ExpressionEngine`], which sees the
//! current record, the previous record, values set by earlier `SET` rules and
//! the request's fixed clock readings.
//!
//! [`BasicEngine`] is the engine bundled with the crate. It understands a small
//! RETS-style subset:
//!
//! ```text
//! ListPrice > 0 .AND. MlsStatus != "Closed"
//! IIF(ListPrice != LAST ListPrice, LAST ListPrice, PreviousListPrice)
//! .NOT. (Cooling .CONTAINS. "None") .OR. LENGTH(Cooling) = 1
//! MATCH(PublicRemarks, "\\d{3}-\\d{4}")
//! ```

pub mod ast;
pub mod evaluator;
pub mod parser;

use std::collections::BTreeMap;

use chrono::{DateTime, FixedOffset, NaiveDate};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum EngineError {
    #[error("{0}")]
    Parse(String),
    #[error("{0}")]
    Evaluation(String),
}

pub type EngineResult<T> = Result<T, EngineError>;

/// What an expression can see while it is evaluated.
#[derive(Debug, Clone, Copy)]
pub struct Scope<'a> {
    pub current: &'a Value,
    pub previous: &'a Value,
    /// Values assigned by earlier `SET` rules; they shadow record fields.
    pub locals: &'a BTreeMap<String, Value>,
    pub now: DateTime<FixedOffset>,
    pub today: NaiveDate,
}

impl<'a> Scope<'a> {
    /// Resolves a field name against locals first, then the current record.
    pub fn field(&self, name: &str) -> Value {
        self.locals
            .get(name)
            .or_else(|| self.current.get(name))
            .cloned()
            .unwrap_or(Value::Null)
    }

    pub fn previous_field(&self, name: &str) -> Value {
        self.previous.get(name).cloned().unwrap_or(Value::Null)
    }
}

pub trait ExpressionEngine: Send + 'static {
    type Expression: Send;

    fn parse(&self, source: &str) -> EngineResult<Self::Expression>;

    fn evaluate(&self, expression: &Self::Expression, scope: &Scope<'_>) -> EngineResult<Value>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BasicEngine;

impl ExpressionEngine for BasicEngine {
    type Expression = ast::Expr;

    fn parse(&self, source: &str) -> EngineResult<ast::Expr> {
        parser::parse(source)
    }

    fn evaluate(&self, expression: &ast::Expr, scope: &Scope<'_>) -> EngineResult<Value> {
        evaluator::evaluate(expression, scope)
    }
}
