//! gol Deterministic Scenario Harness
//!
//! Drives lobbies without wall-clock timers so every run repeats from a
//! single 64-bit seed:
//! - **Time**: `SimContext` keeps a virtual clock
//! - **Randomness**: spawn positions and lobby names come from `ChaCha8Rng(seed)`
//! - **Ticks**: scenarios call `Lobby::tick` themselves
//!
//! Only `live_driver` runs real tokio drivers, to check teardown.
//!
//! # Usage
//!
//! ```ignore
//! use gol_sim::{ScenarioRunner, scenarios::ScenarioId};
//!
//! let result = ScenarioRunner::new(42).with_generations(40).run(ScenarioId::Glider);
//! assert!(result.passed);
//! ```

mod context;
mod runner;
mod sink;
pub mod scenarios;

pub use context::SimContext;
pub use runner::{ScenarioFailure, ScenarioMetrics, ScenarioResult, ScenarioRunner};
pub use sink::RecordingSink;
