//! Render sink that records what a lobby sent, for scenario assertions.

use gol_env::{EnvError, RenderSink, SinkEvent};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Counts events per kind; can be switched to reject deliveries.
#[derive(Debug, Default)]
pub struct RecordingSink {
    generations: AtomicU64,
    closed: AtomicU64,
    rejected: AtomicU64,
    refusing: AtomicBool,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// `GenerationAdvanced` events received.
    pub fn generations(&self) -> u64 {
        self.generations.load(Ordering::Acquire)
    }

    /// `LobbyClosed` events received.
    pub fn closed(&self) -> u64 {
        self.closed.load(Ordering::Acquire)
    }

    /// Deliveries refused while in refusing mode.
    pub fn rejected(&self) -> u64 {
        self.rejected.load(Ordering::Acquire)
    }

    /// Simulates a session whose buffer is full.
    pub fn set_refusing(&self, refusing: bool) {
        self.refusing.store(refusing, Ordering::Release);
    }

    pub fn total(&self) -> u64 {
        self.generations() + self.closed()
    }
}

impl RenderSink for RecordingSink {
    fn notify(&self, event: SinkEvent) -> Result<(), EnvError> {
        if self.refusing.load(Ordering::Acquire) {
            self.rejected.fetch_add(1, Ordering::AcqRel);
            return Err(EnvError::SinkFull);
        }
        let counter = match event {
            SinkEvent::GenerationAdvanced => &self.generations,
            SinkEvent::LobbyClosed => &self.closed,
        };
        counter.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }
}
