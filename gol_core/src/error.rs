//! Error types for lobbies, participant actions, and configuration.

use gol_env::{LobbyId, ParticipantId};
use thiserror::Error;

/// Failures surfaced to the session layer on join/leave.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LobbyError {
    /// The lobby already holds `capacity` participants
    #[error("Lobby has reached capacity of {capacity}")]
    CapacityExceeded { capacity: usize },

    /// No lobby with this id exists (or it was just torn down)
    #[error("Lobby with id={0} does not exist")]
    LobbyNotFound(LobbyId),
}

/// Rejections of a participant action.
///
/// Every variant leaves lobby state untouched, so callers that ignore
/// the result observe the same behavior as a silent no-op.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ActionError {
    /// The participant left before the action arrived
    #[error("Participant {0} is no longer in the lobby")]
    StaleParticipant(ParticipantId),

    /// Cells can only be staged while paused
    #[error("Participant is playing; pause to place cells")]
    NotPaused,

    /// The staged-cell budget is exhausted
    #[error("Placement limit of {limit} cells reached")]
    PlacementLimitReached { limit: usize },

    /// Another participant already staged this cell
    #[error("Cell is staged by another participant")]
    StagedByOther,

    /// Staged cells overlap cells that are live under another owner
    #[error("{conflicts} staged cells overlap live cells of other participants")]
    PauseConflict { conflicts: usize },
}

/// Invalid lobby configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Boards must have at least one cell
    #[error("Board must be non-empty, got {width}x{height}")]
    EmptyBoard { width: usize, height: usize },

    /// Capacity must fit the color palette
    #[error("Capacity {capacity} must be between 1 and {max}")]
    Capacity { capacity: usize, max: usize },

    /// A rate field was zero
    #[error("{0} must be non-zero")]
    ZeroRate(&'static str),

    /// Viewport clamps must be non-zero
    #[error("Viewport limits must be non-zero")]
    EmptyViewport,

    /// Config document could not be parsed
    #[error("Config parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Malformed ASCII board pattern.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PatternError {
    /// The pattern has no rows or no columns
    #[error("Pattern is empty")]
    Empty,

    /// A row's width differs from the first row's
    #[error("Row {row} has width {width}, expected {expected}")]
    Ragged { row: usize, width: usize, expected: usize },

    /// A character other than '.', '#', or '1'..='9'
    #[error("Unknown glyph {glyph:?} at row {row}, column {col}")]
    UnknownGlyph { glyph: char, row: usize, col: usize },
}
