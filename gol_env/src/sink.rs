//! Render sink abstraction: how a lobby pokes a participant's session.

use crate::error::EnvError;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// Events a lobby pushes to a participant's render sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SinkEvent {
    /// A draw tick fired; the session should re-render its viewport.
    GenerationAdvanced,

    /// The lobby was torn down; the session should return to the menu.
    LobbyClosed,
}

/// Opaque handle to a participant's session.
///
/// # Delivery
///
/// ```text
/// Lobby driver                 Sink                     Session
///   |                           |                          |
///   |-- notify(event) --------->|                          |
///   |<- Ok / Err (never blocks) |-- [buffered] ----------->|
///   |                           |                          |-- render
/// ```
///
/// Implementations must never block: a slow or dead session must not
/// stall the driver. Returning an error only means the event was lost.
pub trait RenderSink: Send + Sync + 'static {
    /// Delivers an event, fire-and-forget.
    fn notify(&self, event: SinkEvent) -> Result<(), EnvError>;
}

/// Sink backed by a bounded tokio channel.
///
/// Events are dropped when the channel is full; redraws are idempotent,
/// so a lost event is recovered by the next tick.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<SinkEvent>,
}

impl ChannelSink {
    /// Wraps an existing sender.
    pub fn new(tx: mpsc::Sender<SinkEvent>) -> Self {
        Self { tx }
    }

    /// Creates a sink and the receiver the session reads from.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<SinkEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self::new(tx), rx)
    }
}

impl RenderSink for ChannelSink {
    fn notify(&self, event: SinkEvent) -> Result<(), EnvError> {
        self.tx.try_send(event).map_err(|e| match e {
            TrySendError::Full(_) => EnvError::SinkFull,
            TrySendError::Closed(_) => EnvError::SinkClosed,
        })
    }
}
