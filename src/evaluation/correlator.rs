//! # Correlator
//!
//! The Correlator multiplexes many concurrent logical calls over the single
//! channel that leads to an evaluation unit, and hands each caller back the
//! reply meant for it.
//!
//! ## Key Features
//!
//! - **Id Correlation**: every outbound message carries a fresh id; replies are
//!   matched by that id alone, so they may arrive in any order
//! - **Exactly-once Resolution**: a pending entry is removed on the first
//!   matching reply; later or unknown ids are dropped
//! - **Fail Fast**: a correlator whose channel could not be built rejects
//!   `submit` immediately instead of leaving the caller hanging
//! - **Cleanup on Drop**: dropping a [`PendingReply`] removes its table entry, and
//!   the reply, if it ever comes, is discarded
//!
//! ## Implementation Details
//!
//! Pending calls live in a `DashMap<CallId, oneshot::Sender<Resp>>`. The entry is
//! inserted before the request is sent, so a reply can never beat its own
//! entry into the table. A dispatcher task drains the inbound half of the
//! channel and resolves entries with `DashMap::remove`, which makes
//! lookup-then-delete a single step with respect to concurrent submits. When
//! the inbound half closes, every remaining caller is woken with
//! [`CorrelatorError::Disconnected`].
//!
//! The correlator knows nothing about rules; it is generic over the request and
//! reply payload types.

use std::{
    future::Future,
    pin::Pin,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    task::{Context, Poll},
};

use dashmap::DashMap;
use thiserror::Error;
use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
};
use tracing::{debug, instrument, warn};

use super::protocol::{CallId, Envelope};

/// Both halves of the link to an evaluation unit, as seen from the caller's side.
pub struct Channel<Req, Resp> {
    pub outbound: mpsc::UnboundedSender<Envelope<Req>>,
    pub inbound: mpsc::UnboundedReceiver<Envelope<Resp>>,
}

impl<Req, Resp> Channel<Req, Resp> {
    /// Creates a linked pair: the caller's channel and the unit's endpoint.
    pub fn pair() -> (Self, UnitEndpoint<Req, Resp>) {
        let (request_tx, request_rx) = mpsc::unbounded_channel();
        let (reply_tx, reply_rx) = mpsc::unbounded_channel();
        (
            Self {
                outbound: request_tx,
                inbound: reply_rx,
            },
            UnitEndpoint {
                requests: request_rx,
                replies: reply_tx,
            },
        )
    }
}

/// The unit's side of a [`Channel`].
pub struct UnitEndpoint<Req, Resp> {
    pub requests: mpsc::UnboundedReceiver<Envelope<Req>>,
    pub replies: mpsc::UnboundedSender<Envelope<Resp>>,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum CorrelatorError {
    #[error("Evaluation channel unavailable: {0}")]
    Unavailable(String),
    #[error("Evaluation channel closed")]
    ChannelClosed,
    #[error("Evaluation unit disconnected before replying")]
    Disconnected,
}

pub type CorrelatorResult<T> = Result<T, CorrelatorError>;

/// Id source owned by one correlator. Starts at 0 and only ever grows.
#[derive(Debug, Default)]
pub struct CallSequence(AtomicU64);

impl CallSequence {
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    pub fn next(&self) -> CallId {
        self.0.fetch_add(1, Ordering::Relaxed)
    }
}

type PendingTable<Resp> = DashMap<CallId, oneshot::Sender<Resp>>;

enum Link<Req> {
    Connected {
        outbound: mpsc::UnboundedSender<Envelope<Req>>,
        dispatcher: JoinHandle<()>,
    },
    Unavailable(String),
}

pub struct Correlator<Req, Resp> {
    link: Link<Req>,
    pending: Arc<PendingTable<Resp>>,
    sequence: CallSequence,
}

impl<Req, Resp> Correlator<Req, Resp>
where
    Req: Send + 'static,
    Resp: Send + 'static,
{
    /// Takes ownership of `channel` and starts dispatching its replies.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(channel: Channel<Req, Resp>) -> Self {
        let pending = Arc::new(PendingTable::new());
        let dispatcher = tokio::spawn(Self::dispatch_loop(channel.inbound, pending.clone()));
        Self {
            link: Link::Connected {
                outbound: channel.outbound,
                dispatcher,
            },
            pending,
            sequence: CallSequence::new(),
        }
    }

    /// Builds the channel with `connect`. If that fails the correlator is still
    /// returned, but every `submit` is rejected with
    /// [`CorrelatorError::Unavailable`].
    pub fn connect<F, E>(connect: F) -> Self
    where
        F: FnOnce() -> Result<Channel<Req, Resp>, E>,
        E: std::fmt::Display,
    {
        match connect() {
            Ok(channel) => Self::new(channel),
            Err(e) => {
                warn!("Failed to create evaluation channel: {}", e);
                Self::unavailable(e.to_string())
            }
        }
    }

    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            link: Link::Unavailable(reason.into()),
            pending: Arc::new(PendingTable::new()),
            sequence: CallSequence::new(),
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self.link, Link::Connected { .. })
    }

    /// Number of calls still waiting for a reply.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Sends `request` and returns a future for its reply.
    ///
    /// Returns as soon as the message is handed to the channel; only awaiting
    /// the returned [`PendingReply`] suspends.
    ///
    /// # Errors
    ///
    /// * `CorrelatorError::Unavailable` - the channel was never built
    /// * `CorrelatorError::ChannelClosed` - the unit has stopped reading requests
    #[instrument(level = "debug", skip(self, request))]
    pub fn submit(&self, request: Req) -> CorrelatorResult<PendingReply<Resp>> {
        let outbound = match &self.link {
            Link::Connected { outbound, .. } => outbound,
            Link::Unavailable(reason) => {
                return Err(CorrelatorError::Unavailable(reason.clone()));
            }
        };

        let id = self.sequence.next();
        let (tx, rx) = oneshot::channel();
        self.pending.insert(id, tx);

        if outbound.send(Envelope::new(id, request)).is_err() {
            self.pending.remove(&id);
            return Err(CorrelatorError::ChannelClosed);
        }
        debug!(id, "request submitted");

        Ok(PendingReply {
            id,
            receiver: rx,
            pending: self.pending.clone(),
        })
    }

    /// Submits and waits for the reply in one step.
    pub async fn call(&self, request: Req) -> CorrelatorResult<Resp> {
        self.submit(request)?.await
    }

    async fn dispatch_loop(
        mut inbound: mpsc::UnboundedReceiver<Envelope<Resp>>,
        pending: Arc<PendingTable<Resp>>,
    ) {
        while let Some(envelope) = inbound.recv().await {
            resolve(&pending, envelope);
        }

        if !pending.is_empty() {
            warn!(
                "Evaluation channel closed with {} call(s) still pending",
                pending.len()
            );
        }
        // dropping the senders wakes every waiting caller with Disconnected
        pending.clear();
    }
}

/// Resolves the pending call matching `envelope.id`, if there is one.
///
/// Returns whether a caller was resolved.
fn resolve<Resp>(pending: &PendingTable<Resp>, envelope: Envelope<Resp>) -> bool {
    let Envelope { id, payload } = envelope;
    match pending.remove(&id) {
        Some((_, sender)) => {
            if sender.send(payload).is_err() {
                debug!(id, "caller went away before its reply arrived");
                return false;
            }
            debug!(id, "reply resolved");
            true
        }
        None => {
            debug!(id, "dropping reply with no pending call");
            false
        }
    }
}

impl<Req, Resp> Drop for Correlator<Req, Resp> {
    fn drop(&mut self) {
        if let Link::Connected { dispatcher, .. } = &self.link {
            dispatcher.abort();
        }
        self.pending.clear();
    }
}

/// The eventual reply to one submitted call.
///
/// Dropping it before it resolves forgets the call; a reply arriving later is
/// treated as unknown and discarded.
pub struct PendingReply<Resp> {
    id: CallId,
    receiver: oneshot::Receiver<Resp>,
    pending: Arc<PendingTable<Resp>>,
}

impl<Resp> PendingReply<Resp> {
    pub fn id(&self) -> CallId {
        self.id
    }
}

impl<Resp> Future for PendingReply<Resp> {
    type Output = CorrelatorResult<Resp>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.receiver)
            .poll(cx)
            .map(|result| result.map_err(|_| CorrelatorError::Disconnected))
    }
}

impl<Resp> Drop for PendingReply<Resp> {
    fn drop(&mut self) {
        self.pending.remove(&self.id);
    }
}
