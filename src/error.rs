use std::time::Duration;

use thiserror::Error;

use crate::config::ConfigError;
use crate::evaluation::{correlator::CorrelatorError, unit::UnitError};
use crate::expression::EngineError;
use crate::playground::PlaygroundError;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Correlator error: {0}")]
    Correlator(#[from] CorrelatorError),
    #[error("Evaluation unit error: {0}")]
    Unit(#[from] UnitError),
    #[error("Expression error: {0}")]
    Engine(#[from] EngineError),
    #[error("Playground error: {0}")]
    Playground(#[from] PlaygroundError),
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // evaluation unit never answered
    #[error("No evaluation reply within {0:?}")]
    Timeout(Duration),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type RuleplayResult<T> = Result<T, Error>;

impl Error {
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Error::Internal(message.into())
    }
}
