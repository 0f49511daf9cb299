//! gol Core - Multiplayer Game of Life Lobby Engine
//!
//! Many participants share one toroidal board per lobby:
//! 1. **Grid Engine**: Conway's rule generalized to owned cells via neighbor majority
//! 2. **Lobbies**: join/leave, staged placement while paused, a timed simulation driver
//! 3. **Viewport Renderer**: wrapped, tiled, run-length coalesced windows of the board
//! 4. **Manager**: lobby creation, listing, and teardown when the last participant leaves

pub mod colors;
pub mod config;
pub mod error;
pub mod life;
pub mod lobby;
pub mod manager;
pub mod names;
pub mod registry;
pub mod viewport;

// Re-export key types for convenience
pub use colors::{Color, PlayerStyle, PALETTE, PALETTE_SIZE};
pub use config::{LobbyConfig, DEFAULT_HEIGHT, DEFAULT_WIDTH};
pub use error::{ActionError, ConfigError, LobbyError, PatternError};
pub use life::{advance, advance_by, Cell, Grid};
pub use lobby::{AuditReport, DriverHandle, Lobby, PauseState, Placement, ScoreEntry, Scoreboard};
pub use manager::{JoinTicket, LobbyInfo, Manager};
pub use registry::{Participant, ParticipantSnapshot, Registry};
pub use viewport::{Overlay, Pixel, Span, Viewport, Window};
