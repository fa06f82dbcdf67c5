//! # Evaluation State Machine
//!
//! Turns each accepted snapshot into exactly one correlator call and publishes
//! the outcome as an [`EvaluationState`] on a `watch` channel.
//!
//! ## State Flow
//!
//! ```text
//! update(snapshot) ──► Loading ──reply──► Success | JsonParseError | ExpressionParseError
//!                                          | ExpressionEvaluationError | UnknownError
//! ```
//!
//! `Loading` is published before `update` returns. Every call to `update`
//! starts a new generation; a reply is only published if no newer generation
//! has started since its request was sent, so a slow answer for an old
//! snapshot never overwrites the state of a newer one. The generation check
//! and the publication happen under the channel's write lock, the same lock
//! `update` holds while it bumps the generation.
//!
//! A correlator failure is not an evaluation result, so it never becomes an
//! `EvaluationState`. It is published on a separate channel tagged with its
//! generation, and [`EvaluationStateMachine::settled`] returns it as an error
//! when it belongs to the latest snapshot.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;
use tracing::{debug, error, instrument};

use super::clock::{Clock, SystemClock};
use super::correlator::{Correlator, CorrelatorError};
use super::protocol::{Reply, Request, Updates, Values};
use crate::playground::PlaygroundState;

/// Message shown for failures the unit could not classify.
pub const UNKNOWN_ERROR_MESSAGE: &str = "Unknown error";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EvaluationState {
    Loading,
    Success { values: Values, updates: Updates },
    JsonParseError { error: String },
    ExpressionParseError { error: String },
    ExpressionEvaluationError { error: String },
    UnknownError { error: String },
}

impl EvaluationState {
    pub fn is_loading(&self) -> bool {
        matches!(self, EvaluationState::Loading)
    }

    pub fn is_success(&self) -> bool {
        matches!(self, EvaluationState::Success { .. })
    }

    /// The failure message, if this is a failure state.
    pub fn error(&self) -> Option<&str> {
        match self {
            EvaluationState::Loading | EvaluationState::Success { .. } => None,
            EvaluationState::JsonParseError { error }
            | EvaluationState::ExpressionParseError { error }
            | EvaluationState::ExpressionEvaluationError { error }
            | EvaluationState::UnknownError { error } => Some(error),
        }
    }
}

impl From<Reply> for EvaluationState {
    fn from(reply: Reply) -> Self {
        match reply {
            Reply::Success { values, updates } => EvaluationState::Success { values, updates },
            Reply::JsonParseError { error } => EvaluationState::JsonParseError { error },
            Reply::ExpressionParseError { error } => {
                EvaluationState::ExpressionParseError { error }
            }
            Reply::ExpressionEvaluationError { error } => {
                EvaluationState::ExpressionEvaluationError { error }
            }
            Reply::UnknownError { .. } => EvaluationState::UnknownError {
                error: UNKNOWN_ERROR_MESSAGE.to_string(),
            },
        }
    }
}

pub struct EvaluationStateMachine {
    correlator: Arc<Correlator<Request, Reply>>,
    clock: Arc<dyn Clock>,
    generation: Arc<AtomicU64>,
    state: Arc<watch::Sender<EvaluationState>>,
    failure: Arc<watch::Sender<Option<Failure>>>,
}

/// A correlator error and the generation whose request it ended.
#[derive(Debug, Clone, PartialEq)]
struct Failure {
    generation: u64,
    error: CorrelatorError,
}

fn publish_failure(
    failure: &watch::Sender<Option<Failure>>,
    latest: &AtomicU64,
    generation: u64,
    error: CorrelatorError,
) {
    failure.send_if_modified(|current| {
        if latest.load(Ordering::SeqCst) != generation {
            return false;
        }
        *current = Some(Failure { generation, error });
        true
    });
}

impl EvaluationStateMachine {
    pub fn new(correlator: Arc<Correlator<Request, Reply>>, clock: Arc<dyn Clock>) -> Self {
        let (state, _) = watch::channel(EvaluationState::Loading);
        let (failure, _) = watch::channel(None);
        Self {
            correlator,
            clock,
            generation: Arc::new(AtomicU64::new(0)),
            state: Arc::new(state),
            failure: Arc::new(failure),
        }
    }

    pub fn with_system_clock(correlator: Arc<Correlator<Request, Reply>>) -> Self {
        Self::new(correlator, Arc::new(SystemClock))
    }

    /// Accepts a new snapshot: publishes `Loading`, sends one request and
    /// returns the generation assigned to it.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns the correlator's error when the request could not be sent. The
    /// state is left at `Loading` and the error is also recorded as this
    /// generation's [`failure`](Self::failure).
    #[instrument(level = "debug", skip_all, fields(rules = snapshot.rules.len()))]
    pub fn update(&self, snapshot: &PlaygroundState) -> Result<u64, CorrelatorError> {
        let mut generation = 0;
        self.state.send_modify(|state| {
            generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
            *state = EvaluationState::Loading;
        });

        let request = Request::new(snapshot, self.clock.now());
        let pending = self.correlator.submit(request).map_err(|e| {
            error!(generation, "Failed to submit evaluation request: {}", e);
            publish_failure(&self.failure, &self.generation, generation, e.clone());
            e
        })?;

        let latest = self.generation.clone();
        let state = self.state.clone();
        let failure = self.failure.clone();
        tokio::spawn(async move {
            match pending.await {
                Ok(reply) => {
                    let published = state.send_if_modified(|current| {
                        if latest.load(Ordering::SeqCst) != generation {
                            return false;
                        }
                        *current = reply.into();
                        true
                    });
                    if !published {
                        debug!(generation, "discarding reply for a superseded snapshot");
                    }
                }
                Err(e) => {
                    error!(generation, "Evaluation reply lost: {}", e);
                    publish_failure(&failure, &latest, generation, e);
                }
            }
        });

        Ok(generation)
    }

    /// Generation of the most recent snapshot; 0 before the first `update`.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    pub fn current(&self) -> EvaluationState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<EvaluationState> {
        self.state.subscribe()
    }

    /// Every published state, starting with the current one.
    pub fn stream(&self) -> WatchStream<EvaluationState> {
        WatchStream::new(self.subscribe())
    }

    /// The correlator error that ended the latest snapshot's request, if any.
    pub fn failure(&self) -> Option<CorrelatorError> {
        self.latest_error(&self.failure.borrow())
    }

    fn latest_error(&self, failure: &Option<Failure>) -> Option<CorrelatorError> {
        let generation = self.generation();
        failure
            .as_ref()
            .filter(|failure| failure.generation == generation)
            .map(|failure| failure.error.clone())
    }

    /// Waits until the latest snapshot has left `Loading`.
    ///
    /// # Errors
    ///
    /// Returns the correlator's error once it is known that no reply will
    /// arrive for the latest snapshot.
    pub async fn settled(&self) -> Result<EvaluationState, CorrelatorError> {
        let mut states = self.subscribe();
        let mut failures = self.failure.subscribe();
        loop {
            {
                let state = states.borrow_and_update();
                if !state.is_loading() {
                    return Ok(state.clone());
                }
            }
            let error = self.latest_error(&failures.borrow_and_update());
            if let Some(error) = error {
                return Err(error);
            }
            // both senders live as long as `self`
            tokio::select! {
                _ = states.changed() => {}
                _ = failures.changed() => {}
            }
        }
    }

    /// `update` followed by `settled`.
    pub async fn evaluate(
        &self,
        snapshot: &PlaygroundState,
    ) -> Result<EvaluationState, CorrelatorError> {
        self.update(snapshot)?;
        self.settled().await
    }
}
