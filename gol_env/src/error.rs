//! Error types for the environment abstraction.

use thiserror::Error;

/// Errors that can occur in the environment abstraction layer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EnvError {
    /// The sink's receiving side is gone (session disconnected)
    #[error("Render sink closed")]
    SinkClosed,

    /// The sink's buffer is full; the event was dropped
    #[error("Render sink full, event dropped")]
    SinkFull,
}

impl EnvError {
    /// Returns true if the sink will never accept another event.
    pub fn is_permanent(&self) -> bool {
        matches!(self, Self::SinkClosed)
    }
}
