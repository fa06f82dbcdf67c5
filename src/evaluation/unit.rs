//! # Evaluation Unit
//!
//! Runs one whole rule set per request, isolated on its own OS thread. The
//! unit is stateless between requests; everything it needs, including the
//! clock readings, arrives in the [`Request`].
//!
//! A round goes through three passes:
//!
//! 1. decode `now`, `today` and both records; any failure is a `JsonParseError`
//! 2. parse every expression up front
//! 3. evaluate the parsed rules in list order, with each `SET` rule's value
//!    visible to the rules after it
//!
//! In lenient mode (the default) a rule that fails to parse or evaluate gets an
//! [`Output::Error`] and the round carries on. Strict mode turns the first such
//! failure into a failed round.

use std::panic::{self, AssertUnwindSafe};

use chrono::{DateTime, NaiveDate};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error, info, instrument};

use super::correlator::{Channel, Correlator, UnitEndpoint};
use super::protocol::{Evaluated, Output, Reply, Request, UnitFailure, Updates, Values};
use crate::config::UnitConfig;
use crate::expression::{ExpressionEngine, Scope};
use crate::rule::RuleAction;

#[derive(Debug, Error)]
pub enum UnitError {
    #[error("Failed to spawn evaluation unit thread: {0}")]
    Spawn(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EvaluationOptions {
    /// Abort the whole round on the first expression failure.
    pub strict: bool,
}

pub struct EvaluationUnit<E> {
    engine: E,
    options: EvaluationOptions,
}

impl<E: ExpressionEngine> EvaluationUnit<E> {
    pub fn new(engine: E) -> Self {
        Self::with_options(engine, EvaluationOptions::default())
    }

    pub fn with_options(engine: E, options: EvaluationOptions) -> Self {
        Self { engine, options }
    }

    /// Evaluates one request. Never panics; a panic inside the engine is
    /// reported as [`Reply::UnknownError`].
    #[instrument(level = "debug", skip_all, fields(rules = request.rules.len()))]
    pub fn evaluate(&self, request: &Request) -> Reply {
        match panic::catch_unwind(AssertUnwindSafe(|| self.run(request))) {
            Ok(result) => result.into(),
            Err(payload) => {
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned());
                error!("Evaluation panicked: {:?}", message);
                Reply::UnknownError { error: message }
            }
        }
    }

    pub fn run(&self, request: &Request) -> Result<Evaluated, UnitFailure> {
        let now = DateTime::parse_from_rfc3339(&request.now)
            .map_err(|e| json_failure(format!("invalid now {:?}: {}", request.now, e)))?;
        let today = NaiveDate::parse_from_str(&request.today, "%Y-%m-%d")
            .map_err(|e| json_failure(format!("invalid today {:?}: {}", request.today, e)))?;
        let current: Value = serde_json::from_str(&request.current_data)
            .map_err(|e| json_failure(format!("current data: {}", e)))?;
        let previous: Value = serde_json::from_str(&request.previous_data)
            .map_err(|e| json_failure(format!("previous data: {}", e)))?;

        let mut values = Values::new();
        let mut parsed = Vec::with_capacity(request.rules.len());
        for rule in &request.rules {
            match self.engine.parse(&rule.rule_expression) {
                Ok(expression) => parsed.push((rule, expression)),
                Err(e) if self.options.strict => {
                    return Err(UnitFailure::ExpressionParseError {
                        error: format!("{}: {}", rule.field_name, e),
                    });
                }
                Err(e) => {
                    debug!(rule = %rule.id, "expression did not parse: {}", e);
                    values.insert(rule.id.clone(), Output::error(e.to_string()));
                }
            }
        }

        let mut locals = Updates::new();
        for (rule, expression) in &parsed {
            let scope = Scope {
                current: &current,
                previous: &previous,
                locals: &locals,
                now,
                today,
            };
            let output = match self.engine.evaluate(expression, &scope) {
                Ok(value) => {
                    if rule.rule_action == RuleAction::Set {
                        locals.insert(rule.field_name.clone(), value.clone());
                    }
                    Output::Value { value }
                }
                Err(e) if self.options.strict => {
                    return Err(UnitFailure::ExpressionRuntimeError {
                        error: format!("{}: {}", rule.field_name, e),
                    });
                }
                Err(e) => Output::error(e.to_string()),
            };
            values.insert(rule.id.clone(), output);
        }

        Ok(Evaluated {
            values,
            updates: locals,
        })
    }

    /// Moves the unit onto its own thread and returns the caller's end of its
    /// channel. The thread exits once that channel is dropped.
    pub fn spawn(self, config: &UnitConfig) -> Result<Channel<Request, Reply>, UnitError> {
        let (channel, endpoint) = Channel::pair();
        std::thread::Builder::new()
            .name(config.thread_name.clone())
            .stack_size(config.stack_size)
            .spawn(move || self.serve(endpoint))?;
        info!(
            thread = %config.thread_name,
            stack_size = config.stack_size,
            "Evaluation unit started"
        );
        Ok(channel)
    }

    /// Spawns the unit and wraps its channel in a correlator. A spawn failure
    /// yields an unavailable correlator.
    pub fn connect(self, config: &UnitConfig) -> Correlator<Request, Reply> {
        Correlator::connect(|| self.spawn(config))
    }

    fn serve(self, mut endpoint: UnitEndpoint<Request, Reply>) {
        while let Some(envelope) = endpoint.requests.blocking_recv() {
            let reply = envelope.reply(self.evaluate(&envelope.payload));
            if endpoint.replies.send(reply).is_err() {
                debug!("reply channel closed");
                break;
            }
        }
        debug!("Evaluation unit stopped");
    }
}

fn json_failure(error: String) -> UnitFailure {
    UnitFailure::JsonParseError { error }
}
