//! Lobby configuration.

use crate::colors::PALETTE_SIZE;
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default board width in cells.
pub const DEFAULT_WIDTH: usize = 160;

/// Default board height in cells.
pub const DEFAULT_HEIGHT: usize = 90;

/// Configuration shared by every lobby a manager creates.
///
/// Deserializes from partial JSON: missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LobbyConfig {
    /// Board width in cells (default: 160)
    pub width: usize,

    /// Board height in cells (default: 90)
    pub height: usize,

    /// Maximum participants per lobby (default: 10, at most the palette size)
    pub capacity: usize,

    /// Maximum staged cells per participant (default: 40)
    pub max_placed_cells: usize,

    /// Driver tick rate in Hz (default: 20)
    pub draw_rate_hz: u32,

    /// Draw ticks per generation (default: 4, i.e. 5 generations/s)
    pub draws_per_generation: u32,

    /// Viewport width clamp in cells (default: 2 × default width)
    pub max_view_width: usize,

    /// Viewport height clamp in cells (default: 2 × default height)
    pub max_view_height: usize,
}

impl Default for LobbyConfig {
    fn default() -> Self {
        Self {
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            capacity: PALETTE_SIZE,
            max_placed_cells: 40,
            draw_rate_hz: 20,
            draws_per_generation: 4,
            max_view_width: DEFAULT_WIDTH * 2,
            max_view_height: DEFAULT_HEIGHT * 2,
        }
    }
}

impl LobbyConfig {
    /// Parses a (possibly partial) JSON document and validates it.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Sets the board dimensions.
    pub fn with_board(mut self, width: usize, height: usize) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Sets the participant capacity.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Sets the staged-cell budget.
    pub fn with_max_placed_cells(mut self, limit: usize) -> Self {
        self.max_placed_cells = limit;
        self
    }

    /// Sets the draw rate and the number of draws per generation.
    pub fn with_rates(mut self, draw_rate_hz: u32, draws_per_generation: u32) -> Self {
        self.draw_rate_hz = draw_rate_hz;
        self.draws_per_generation = draws_per_generation;
        self
    }

    /// Checks the invariants the lobby relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.width == 0 || self.height == 0 {
            return Err(ConfigError::EmptyBoard {
                width: self.width,
                height: self.height,
            });
        }
        if self.capacity == 0 || self.capacity > PALETTE_SIZE {
            return Err(ConfigError::Capacity {
                capacity: self.capacity,
                max: PALETTE_SIZE,
            });
        }
        if self.draw_rate_hz == 0 {
            return Err(ConfigError::ZeroRate("draw_rate_hz"));
        }
        if self.draws_per_generation == 0 {
            return Err(ConfigError::ZeroRate("draws_per_generation"));
        }
        if self.max_view_width == 0 || self.max_view_height == 0 {
            return Err(ConfigError::EmptyViewport);
        }
        Ok(())
    }

    /// Wall-clock period between driver ticks.
    pub fn draw_period(&self) -> Duration {
        Duration::from_secs(1) / self.draw_rate_hz.max(1)
    }

    /// Wall-clock period between generations.
    pub fn generation_period(&self) -> Duration {
        self.draw_period() * self.draws_per_generation
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = LobbyConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.draw_period(), Duration::from_millis(50));
        assert_eq!(config.generation_period(), Duration::from_millis(200));
        assert_eq!(config.max_view_width, 320);
        assert_eq!(config.max_view_height, 180);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = LobbyConfig::from_json(r#"{ "width": 32, "height": 24 }"#).unwrap();
        assert_eq!(config.width, 32);
        assert_eq!(config.height, 24);
        assert_eq!(config.capacity, 10);
        assert_eq!(config.max_placed_cells, 40);
    }

    #[test]
    fn test_rejects_bad_values() {
        let empty = LobbyConfig::default().with_board(0, 10);
        assert!(matches!(empty.validate(), Err(ConfigError::EmptyBoard { .. })));

        let crowded = LobbyConfig::default().with_capacity(11);
        assert!(matches!(crowded.validate(), Err(ConfigError::Capacity { .. })));

        let frozen = LobbyConfig::default().with_rates(20, 0);
        assert!(matches!(frozen.validate(), Err(ConfigError::ZeroRate(_))));

        assert!(matches!(
            LobbyConfig::from_json("{ not json"),
            Err(ConfigError::Parse(_))
        ));
    }
}
