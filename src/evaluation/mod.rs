//! # Evaluation
//!
//! Everything between a playground snapshot and a rendered result:
//!
//! ```text
//! PlaygroundState → EvaluationStateMachine → Correlator → EvaluationUnit
//!                          ↑                     │
//!                  EvaluationState  ←───  Reply (matched by id)
//! ```
//!
//! - [`protocol`]: request/reply payloads and the id-carrying [`protocol::Envelope`]
//! - [`correlator`]: multiplexes concurrent calls over one channel
//! - [`unit`]: the isolated worker that actually runs the rules
//! - [`state`]: projects replies into an observable [`state::EvaluationState`]
//! - [`clock`]: timestamps each request once, before it is sent

pub mod clock;
pub mod correlator;
pub mod protocol;
pub mod state;
pub mod unit;

pub use clock::{Clock, SystemClock};
pub use correlator::{Channel, Correlator, CorrelatorError, PendingReply};
pub use protocol::{Envelope, Output, Reply, Request, Updates, Values};
pub use state::{EvaluationState, EvaluationStateMachine};
pub use unit::{EvaluationOptions, EvaluationUnit, UnitError};
