//! Common identifier types shared by the core and the harness.

use serde::{Deserialize, Serialize};
use std::num::NonZeroU32;

/// Identifier of a participant within one lobby.
///
/// Zero is reserved for "no owner" (background), so the id wraps a
/// `NonZeroU32`; `Option<ParticipantId>` stays four bytes wide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ParticipantId(NonZeroU32);

impl ParticipantId {
    /// Creates an id, rejecting the reserved value 0.
    pub fn new(raw: u32) -> Option<Self> {
        NonZeroU32::new(raw).map(Self)
    }

    /// Returns the raw integer value.
    pub fn get(&self) -> u32 {
        self.0.get()
    }
}

impl std::fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "p{}", self.0)
    }
}

/// Identifier of a lobby, unique for the lifetime of a manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LobbyId(pub u64);

impl LobbyId {
    /// Returns the raw integer value.
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for LobbyId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "lobby-{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_participant_id_rejects_zero() {
        assert!(ParticipantId::new(0).is_none());
        assert_eq!(ParticipantId::new(3).map(|id| id.get()), Some(3));
    }

    #[test]
    fn test_option_participant_id_is_compact() {
        assert_eq!(std::mem::size_of::<Option<ParticipantId>>(), 4);
    }

    #[test]
    fn test_display() {
        assert_eq!(ParticipantId::new(12).unwrap().to_string(), "p12");
        assert_eq!(LobbyId(4).to_string(), "lobby-4");
    }
}
