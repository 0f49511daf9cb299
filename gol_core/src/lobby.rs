//! Lobby: participants, the shared board, and the simulation driver.
//!
//! # Locking
//!
//! A lobby holds two independent locks, the participant registry and the
//! grid. Whenever both are needed they are taken registry first, then
//! grid; `with_both` and `with_both_mut` are the only places that do so.
//! Sinks are cloned out under the registry read lock and notified after
//! every lock is released.
//!
//! # Driver
//!
//! ```text
//! loop every draw period:
//!     tick N % draws_per_generation == 0  ->  grid = advance(grid)
//!     every tick                          ->  notify(GenerationAdvanced)
//! ```
//!
//! The driver task holds only a `Weak` handle and exits on `stop()` or
//! when the lobby is dropped.

use crate::colors::Color;
use crate::config::LobbyConfig;
use crate::error::{ActionError, ConfigError, LobbyError};
use crate::life::{self, Grid};
use crate::registry::{ParticipantSnapshot, Registry};
use crate::viewport::{self, Overlay, Viewport, Window};
use gol_env::{LifeContext, LobbyId, ParticipantId, RenderSink, SinkEvent};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::watch;
use tracing::{debug, info, trace, warn};

/// Dropped sink events between two warnings.
const DROP_WARN_INTERVAL: u64 = 100;

/// Outcome of a successful `place`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Placement {
    /// The cursor cell is now staged by the caller
    Staged,
    /// The caller's staged mark was removed
    Unstaged,
}

/// Participant mode after a successful `toggle_pause`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PauseState {
    /// Editing: cells may be staged
    Paused,
    /// Staged cells committed and evolving
    Playing,
}

/// Cancellation handle for a lobby's driver task.
#[derive(Debug)]
pub struct DriverHandle {
    stop_tx: watch::Sender<bool>,
    stopped: AtomicBool,
    started: AtomicBool,
}

impl DriverHandle {
    fn new() -> Self {
        let (stop_tx, _) = watch::channel(false);
        Self {
            stop_tx,
            stopped: AtomicBool::new(false),
            started: AtomicBool::new(false),
        }
    }

    /// Signals the driver to exit. Returns false if already stopped.
    pub fn stop(&self) -> bool {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.stop_tx.send_replace(true);
        true
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }
}

/// One row of the scoreboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ScoreEntry {
    pub participant: ParticipantId,
    pub color: Color,
    pub live_cells: usize,
}

/// Participants ranked by live cells, descending; ties by color.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Scoreboard {
    pub entries: Vec<ScoreEntry>,
}

impl Scoreboard {
    fn from_registry(registry: &Registry) -> Self {
        let mut entries: Vec<ScoreEntry> = registry
            .iter()
            .map(|p| ScoreEntry {
                participant: p.id,
                color: p.color,
                live_cells: p.live_cells,
            })
            .collect();
        entries.sort_by(|a, b| b.live_cells.cmp(&a.live_cells).then(a.color.cmp(&b.color)));
        Self { entries }
    }

    pub fn leader(&self) -> Option<&ScoreEntry> {
        self.entries.first()
    }
}

impl std::fmt::Display for Scoreboard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, entry) in self.entries.iter().enumerate() {
            if i > 0 {
                f.write_str("  ")?;
            }
            write!(f, "{} {:<5}", entry.color, entry.live_cells)?;
        }
        Ok(())
    }
}

/// Consistency report produced by `Lobby::audit`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AuditReport {
    pub violations: Vec<String>,
}

impl AuditReport {
    pub fn is_clean(&self) -> bool {
        self.violations.is_empty()
    }
}

/// A running game room.
pub struct Lobby<Ctx: LifeContext> {
    id: LobbyId,
    name: String,
    config: LobbyConfig,
    context: Arc<Ctx>,

    registry: RwLock<Registry>,
    grid: RwLock<Grid>,

    /// Mirrors `registry.len()` for lock-free reads
    participant_count: AtomicUsize,
    generation: AtomicU64,
    draw_ticks: AtomicU64,
    /// Set under the registry write lock; closed lobbies admit nobody
    closed: AtomicBool,
    /// True once anyone has joined
    occupied: AtomicBool,
    dropped_events: AtomicU64,

    driver: DriverHandle,
}

impl<Ctx: LifeContext> Lobby<Ctx> {
    /// Creates a lobby with an empty board. The driver is not started.
    pub fn new(
        id: LobbyId,
        name: impl Into<String>,
        config: LobbyConfig,
        context: Arc<Ctx>,
    ) -> Result<Arc<Self>, ConfigError> {
        config.validate()?;
        Ok(Self::build(id, name, config, context))
    }

    /// Builds a lobby from an already validated config.
    pub(crate) fn build(
        id: LobbyId,
        name: impl Into<String>,
        config: LobbyConfig,
        context: Arc<Ctx>,
    ) -> Arc<Self> {
        Arc::new(Self {
            id,
            name: name.into(),
            registry: RwLock::new(Registry::new(config.capacity)),
            grid: RwLock::new(Grid::new(config.width, config.height)),
            config,
            context,
            participant_count: AtomicUsize::new(0),
            generation: AtomicU64::new(0),
            draw_ticks: AtomicU64::new(0),
            closed: AtomicBool::new(false),
            occupied: AtomicBool::new(false),
            dropped_events: AtomicU64::new(0),
            driver: DriverHandle::new(),
        })
    }

    pub fn id(&self) -> LobbyId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &LobbyConfig {
        &self.config
    }

    pub fn board_size(&self) -> (usize, usize) {
        (self.config.width, self.config.height)
    }

    pub fn capacity(&self) -> usize {
        self.config.capacity
    }

    /// Lock-free participant count.
    pub fn participant_count(&self) -> usize {
        self.participant_count.load(Ordering::Acquire)
    }

    /// Generations computed so far.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// True once the lobby has had at least one participant.
    pub fn was_occupied(&self) -> bool {
        self.occupied.load(Ordering::Acquire)
    }

    pub fn driver(&self) -> &DriverHandle {
        &self.driver
    }

    /// Sink events lost to full or closed sinks.
    pub fn dropped_events(&self) -> u64 {
        self.dropped_events.load(Ordering::Relaxed)
    }

    // ---- locking -------------------------------------------------------

    fn read_registry(&self) -> RwLockReadGuard<'_, Registry> {
        self.registry.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_registry(&self) -> RwLockWriteGuard<'_, Registry> {
        self.registry.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn read_grid(&self) -> RwLockReadGuard<'_, Grid> {
        self.grid.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_grid(&self) -> RwLockWriteGuard<'_, Grid> {
        self.grid.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn with_both<R>(&self, f: impl FnOnce(&Registry, &Grid) -> R) -> R {
        let registry = self.read_registry();
        let grid = self.read_grid();
        f(&registry, &grid)
    }

    fn with_both_mut<R>(&self, f: impl FnOnce(&mut Registry, &mut Grid) -> R) -> R {
        let mut registry = self.write_registry();
        let mut grid = self.write_grid();
        f(&mut registry, &mut grid)
    }

    /// Runs `f` against a consistent read-only view of the lobby.
    pub fn inspect<R>(&self, f: impl FnOnce(&Registry, &Grid) -> R) -> R {
        self.with_both(f)
    }

    // ---- driver --------------------------------------------------------

    /// Spawns the driver task. Calling it again is a no-op.
    pub fn start(self: &Arc<Self>) {
        if self.driver.started.swap(true, Ordering::AcqRel) {
            return;
        }

        let weak = Arc::downgrade(self);
        let mut stop_rx = self.driver.stop_tx.subscribe();
        let context = Arc::clone(&self.context);
        let period = self.config.draw_period();
        let lobby_id = self.id;

        self.context.spawn(&format!("{lobby_id}-driver"), async move {
            loop {
                if *stop_rx.borrow() {
                    break;
                }
                tokio::select! {
                    _ = context.sleep(period) => {}
                    // Either a stop signal or the lobby (and its sender) is gone
                    _ = stop_rx.changed() => break,
                }
                let Some(lobby) = weak.upgrade() else {
                    break;
                };
                lobby.tick();
            }
            debug!("Driver for {} exited at {:?}", lobby_id, context.now());
        });
        info!(
            "Lobby {} ({}) started at {:?} per draw (seed={})",
            self.id,
            self.name,
            period,
            self.context.seed()
        );
    }

    /// Runs one draw tick. Returns true when a generation was computed.
    ///
    /// Public so the simulation harness can drive lobbies without timers.
    pub fn tick(&self) -> bool {
        if self.is_closed() || self.driver.is_stopped() {
            return false;
        }

        let ticks = self.draw_ticks.fetch_add(1, Ordering::AcqRel) + 1;
        let stepped = ticks % u64::from(self.config.draws_per_generation) == 0;
        if stepped {
            self.step_generation();
        }
        self.broadcast(SinkEvent::GenerationAdvanced);
        stepped
    }

    /// Replaces the board with its successor and recounts live cells.
    pub fn step_generation(&self) -> u64 {
        self.with_both_mut(|registry, grid| {
            *grid = life::advance(grid);
            registry.apply_live_counts(&grid.live_counts());
        });
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        trace!("{} generation {}", self.id, generation);
        generation
    }

    fn broadcast(&self, event: SinkEvent) {
        let sinks = {
            let registry = self.read_registry();
            if self.is_closed() {
                return;
            }
            registry.sinks()
        };

        let mut dropped = 0;
        for (participant, sink) in &sinks {
            if let Err(e) = sink.notify(event) {
                if e.is_permanent() {
                    debug!("{} sink for {} is closed", self.id, participant);
                } else {
                    trace!("{} dropped {:?} for {}: {}", self.id, event, participant, e);
                }
                dropped += 1;
            }
        }

        if dropped > 0 {
            let total = self.dropped_events.fetch_add(dropped, Ordering::Relaxed) + dropped;
            if total / DROP_WARN_INTERVAL != (total - dropped) / DROP_WARN_INTERVAL {
                warn!("{} has dropped {} sink events", self.id, total);
            }
        }
    }

    // ---- membership ----------------------------------------------------

    /// Admits a participant at a random position, paused.
    pub fn join(&self, sink: Arc<dyn RenderSink>) -> Result<ParticipantId, LobbyError> {
        let x = self.context.random_below(self.config.width);
        let y = self.context.random_below(self.config.height);

        let mut registry = self.write_registry();
        if self.is_closed() {
            return Err(LobbyError::LobbyNotFound(self.id));
        }
        let id = registry.admit(x, y, sink)?;
        let count = registry.len();
        self.participant_count.store(count, Ordering::Release);
        self.occupied.store(true, Ordering::Release);
        drop(registry);

        debug!("{} joined {} at ({}, {}); {} present", id, self.id, x, y, count);
        Ok(id)
    }

    /// Removes a participant and every mark it has on the board.
    ///
    /// Returns whether the participant was present.
    pub fn leave(&self, id: ParticipantId) -> bool {
        let outcome = self.with_both_mut(|registry, grid| {
            registry.remove(id).map(|_| {
                let cleared = grid.clear_owner(id);
                let remaining = registry.len();
                self.participant_count.store(remaining, Ordering::Release);
                (cleared, remaining)
            })
        });

        match outcome {
            Some((cleared, remaining)) => {
                debug!("{} left {}; cleared {} marks, {} remain", id, self.id, cleared, remaining);
                true
            }
            None => false,
        }
    }

    /// Closes the lobby if nobody is in it. Returns true when closed.
    pub(crate) fn close_if_empty(&self) -> bool {
        let registry = self.write_registry();
        if !registry.is_empty() {
            return false;
        }
        self.closed.store(true, Ordering::Release);
        drop(registry);

        if self.driver.stop() {
            info!("Lobby {} ({}) closed", self.id, self.name);
        }
        true
    }

    /// Closes the lobby regardless of occupancy and tells every session.
    pub fn shutdown(&self) {
        let sinks = {
            let registry = self.write_registry();
            if self.closed.swap(true, Ordering::AcqRel) {
                None
            } else {
                Some(registry.sinks())
            }
        };
        self.driver.stop();

        if let Some(sinks) = sinks {
            for (_, sink) in &sinks {
                let _ = sink.notify(SinkEvent::LobbyClosed);
            }
            info!("Lobby {} ({}) shut down with {} participants", self.id, self.name, sinks.len());
        }
    }

    // ---- participant actions -------------------------------------------

    /// Toggles the caller's staged mark at its cursor.
    pub fn place(&self, id: ParticipantId) -> Result<Placement, ActionError> {
        let limit = self.config.max_placed_cells;
        let result = self.with_both_mut(|registry, grid| {
            let participant = registry.get_mut(id).ok_or(ActionError::StaleParticipant(id))?;
            if !participant.paused {
                return Err(ActionError::NotPaused);
            }

            let cell = grid.cell_mut(participant.x, participant.y);
            match cell.staged {
                Some(owner) if owner == id => {
                    cell.staged = None;
                    participant.placed = participant.placed.saturating_sub(1);
                    Ok(Placement::Unstaged)
                }
                Some(_) => Err(ActionError::StagedByOther),
                None if participant.placed >= limit => {
                    Err(ActionError::PlacementLimitReached { limit })
                }
                None => {
                    cell.staged = Some(id);
                    participant.placed += 1;
                    Ok(Placement::Staged)
                }
            }
        });

        if let Err(e) = &result {
            debug!("{} place rejected in {}: {}", id, self.id, e);
        }
        result
    }

    /// Commits staged cells (paused) or withdraws live cells (playing).
    pub fn toggle_pause(&self, id: ParticipantId) -> Result<PauseState, ActionError> {
        let result = self.with_both_mut(|registry, grid| {
            let participant = registry.get_mut(id).ok_or(ActionError::StaleParticipant(id))?;

            if participant.paused {
                let conflicts = grid.staging_conflicts(id);
                if conflicts > 0 {
                    return Err(ActionError::PauseConflict { conflicts });
                }
                grid.commit_staged(id);
                participant.live_cells = grid.live_cells_of(id);
                participant.paused = false;
                Ok(PauseState::Playing)
            } else {
                grid.clear_live(id);
                participant.live_cells = 0;
                participant.placed = 0;
                participant.paused = true;
                Ok(PauseState::Paused)
            }
        });

        match &result {
            Ok(state) => debug!("{} is now {:?} in {}", id, state, self.id),
            Err(e) => debug!("{} pause toggle rejected in {}: {}", id, self.id, e),
        }
        result
    }

    /// Moves the cursor with wraparound. Returns the new position.
    pub fn move_cursor(&self, id: ParticipantId, dx: i64, dy: i64) -> Option<(usize, usize)> {
        let mut registry = self.write_registry();
        let participant = registry.get_mut(id)?;
        let (width, height) = (self.config.width, self.config.height);
        // Reduce the deltas first; the raw sum can overflow.
        participant.x = (participant.x + dx.rem_euclid(width as i64) as usize) % width;
        participant.y = (participant.y + dy.rem_euclid(height as i64) as usize) % height;
        Some((participant.x, participant.y))
    }

    // ---- queries -------------------------------------------------------

    /// Renders a window of the board with every participant's cursor.
    pub fn view_board(&self, top: i64, left: i64, width: usize, height: usize) -> Viewport {
        let window = Window::new(top, left, width, height)
            .clamped(self.config.max_view_width, self.config.max_view_height);
        self.with_both(|registry, grid| {
            viewport::render(grid, &Overlay::from_registry(registry), window)
        })
    }

    pub fn scoreboard(&self) -> Scoreboard {
        Scoreboard::from_registry(&self.read_registry())
    }

    pub fn participant(&self, id: ParticipantId) -> Option<ParticipantSnapshot> {
        self.read_registry().get(id).map(|p| p.snapshot())
    }

    pub fn participants(&self) -> Vec<ParticipantSnapshot> {
        self.read_registry().iter().map(|p| p.snapshot()).collect()
    }

    /// Cross-checks registry and board invariants.
    pub fn audit(&self) -> AuditReport {
        let max_placed = self.config.max_placed_cells;

        self.with_both(|registry, grid| {
            // Only written under the registry write lock.
            let count = self.participant_count();
            let mut violations = Vec::new();

            if registry.len() > registry.capacity() {
                violations.push(format!(
                    "{} participants exceed capacity {}",
                    registry.len(),
                    registry.capacity()
                ));
            }
            if count != registry.len() {
                violations.push(format!(
                    "participant count {} disagrees with registry {}",
                    count,
                    registry.len()
                ));
            }
            if !registry.colors_consistent() {
                violations.push("color slots out of sync with participants".to_string());
            }

            let counts = grid.live_counts();
            for p in registry.iter() {
                let live = counts.get(&p.id).copied().unwrap_or(0);
                let staged = grid.staged_cells_of(p.id);
                if p.live_cells != live {
                    violations.push(format!("{} reports {} live cells, board has {}", p.id, p.live_cells, live));
                }
                if p.placed > max_placed {
                    violations.push(format!("{} placed {} > {}", p.id, p.placed, max_placed));
                }
                if p.paused && live > 0 {
                    violations.push(format!("{} is paused with {} live cells", p.id, live));
                }
                if p.paused && staged != p.placed {
                    violations.push(format!("{} placed {} but has {} staged", p.id, p.placed, staged));
                }
                if !p.paused && staged > 0 {
                    violations.push(format!("{} is playing with {} staged cells", p.id, staged));
                }
            }

            let orphans = grid
                .iter()
                .filter(|(_, _, cell)| {
                    [cell.live, cell.staged]
                        .into_iter()
                        .flatten()
                        .any(|owner| registry.get(owner).is_none())
                })
                .count();
            if orphans > 0 {
                violations.push(format!("{} cells reference departed participants", orphans));
            }

            AuditReport { violations }
        })
    }
}

impl<Ctx: LifeContext> Drop for Lobby<Ctx> {
    fn drop(&mut self) {
        self.driver.stop();
    }
}

impl<Ctx: LifeContext> std::fmt::Debug for Lobby<Ctx> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lobby")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("participants", &self.participant_count())
            .field("generation", &self.generation())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gol_env::{ChannelSink, EnvError, TokioContext};
    use proptest::prelude::*;
    use std::time::Duration;

    struct NullSink;

    impl RenderSink for NullSink {
        fn notify(&self, _event: SinkEvent) -> Result<(), EnvError> {
            Ok(())
        }
    }

    fn sink() -> Arc<dyn RenderSink> {
        Arc::new(NullSink)
    }

    fn small_lobby(width: usize, height: usize) -> Arc<Lobby<TokioContext>> {
        let config = LobbyConfig::default().with_board(width, height);
        Lobby::new(LobbyId(1), "test-lobby", config, TokioContext::shared()).unwrap()
    }

    fn move_to<Ctx: LifeContext>(lobby: &Lobby<Ctx>, id: ParticipantId, x: usize, y: usize) {
        let p = lobby.participant(id).unwrap();
        lobby.move_cursor(id, x as i64 - p.x as i64, y as i64 - p.y as i64);
    }

    fn stage<Ctx: LifeContext>(lobby: &Lobby<Ctx>, id: ParticipantId, cells: &[(usize, usize)]) {
        for &(x, y) in cells {
            move_to(lobby, id, x, y);
            assert_eq!(lobby.place(id), Ok(Placement::Staged));
        }
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let config = LobbyConfig::default().with_board(0, 5);
        assert!(Lobby::new(LobbyId(1), "x", config, TokioContext::shared()).is_err());
    }

    #[test]
    fn test_join_places_paused_participant_on_board() {
        let lobby = small_lobby(7, 5);
        let id = lobby.join(sink()).unwrap();
        let p = lobby.participant(id).unwrap();

        assert!(p.paused);
        assert!(p.x < 7 && p.y < 5);
        assert_eq!(lobby.participant_count(), 1);
        assert!(lobby.was_occupied());
    }

    #[test]
    fn test_join_full_lobby() {
        let config = LobbyConfig::default().with_capacity(2);
        let lobby = Lobby::new(LobbyId(3), "tiny", config, TokioContext::shared()).unwrap();
        lobby.join(sink()).unwrap();
        lobby.join(sink()).unwrap();

        assert_eq!(lobby.join(sink()), Err(LobbyError::CapacityExceeded { capacity: 2 }));
        assert_eq!(lobby.participant_count(), 2);
    }

    #[test]
    fn test_join_closed_lobby() {
        let lobby = small_lobby(5, 5);
        assert!(lobby.close_if_empty());
        assert_eq!(lobby.join(sink()), Err(LobbyError::LobbyNotFound(LobbyId(1))));
    }

    #[test]
    fn test_place_toggles_and_enforces_limit() {
        let config = LobbyConfig::default().with_board(10, 10).with_max_placed_cells(2);
        let lobby = Lobby::new(LobbyId(1), "l", config, TokioContext::shared()).unwrap();
        let id = lobby.join(sink()).unwrap();

        stage(&lobby, id, &[(0, 0), (1, 0)]);
        move_to(&lobby, id, 2, 0);
        assert_eq!(lobby.place(id), Err(ActionError::PlacementLimitReached { limit: 2 }));

        move_to(&lobby, id, 1, 0);
        assert_eq!(lobby.place(id), Ok(Placement::Unstaged));
        assert_eq!(lobby.participant(id).unwrap().placed, 1);
        assert!(lobby.audit().is_clean());
    }

    #[test]
    fn test_place_on_cell_staged_by_other() {
        let lobby = small_lobby(10, 10);
        let a = lobby.join(sink()).unwrap();
        let b = lobby.join(sink()).unwrap();

        stage(&lobby, a, &[(4, 4)]);
        move_to(&lobby, b, 4, 4);
        assert_eq!(lobby.place(b), Err(ActionError::StagedByOther));
        assert_eq!(lobby.participant(b).unwrap().placed, 0);
    }

    #[test]
    fn test_place_while_playing_rejected() {
        let lobby = small_lobby(10, 10);
        let id = lobby.join(sink()).unwrap();
        assert_eq!(lobby.toggle_pause(id), Ok(PauseState::Playing));
        assert_eq!(lobby.place(id), Err(ActionError::NotPaused));
    }

    #[test]
    fn test_stale_participant_is_noop() {
        let lobby = small_lobby(10, 10);
        let id = lobby.join(sink()).unwrap();
        assert!(lobby.leave(id));
        assert!(!lobby.leave(id));

        assert_eq!(lobby.place(id), Err(ActionError::StaleParticipant(id)));
        assert_eq!(lobby.toggle_pause(id), Err(ActionError::StaleParticipant(id)));
        assert_eq!(lobby.move_cursor(id, 1, 1), None);
    }

    #[test]
    fn test_commit_and_withdraw_cycle() {
        let lobby = small_lobby(10, 10);
        let id = lobby.join(sink()).unwrap();
        stage(&lobby, id, &[(1, 1), (2, 1), (1, 2), (2, 2)]);

        assert_eq!(lobby.toggle_pause(id), Ok(PauseState::Playing));
        let p = lobby.participant(id).unwrap();
        assert_eq!(p.live_cells, 4);
        assert_eq!(p.placed, 4);
        assert_eq!(lobby.inspect(|_, grid| grid.staged_cells_of(id)), 0);

        // A block is still life
        for _ in 0..8 {
            lobby.tick();
        }
        assert_eq!(lobby.generation(), 2);
        assert_eq!(lobby.participant(id).unwrap().live_cells, 4);

        assert_eq!(lobby.toggle_pause(id), Ok(PauseState::Paused));
        let p = lobby.participant(id).unwrap();
        assert_eq!((p.live_cells, p.placed), (0, 0));
        assert_eq!(lobby.inspect(|_, grid| grid.population()), 0);
        assert!(lobby.audit().is_clean());
    }

    #[test]
    fn test_pause_conflict_leaves_state_untouched() {
        let lobby = small_lobby(10, 10);
        let a = lobby.join(sink()).unwrap();
        let b = lobby.join(sink()).unwrap();

        stage(&lobby, a, &[(5, 5)]);
        stage(&lobby, b, &[(6, 5)]);
        move_to(&lobby, b, 5, 5);
        assert_eq!(lobby.place(b), Err(ActionError::StagedByOther));

        // a commits (5,5); b stages (6,5) and then the cell under a's live cell
        assert_eq!(lobby.toggle_pause(a), Ok(PauseState::Playing));
        assert_eq!(lobby.place(b), Ok(Placement::Staged));
        assert_eq!(lobby.toggle_pause(b), Err(ActionError::PauseConflict { conflicts: 1 }));

        let snapshot = lobby.participant(b).unwrap();
        assert!(snapshot.paused);
        assert_eq!(snapshot.placed, 2);
        assert!(lobby.audit().is_clean());
    }

    #[test]
    fn test_move_cursor_wraps() {
        let lobby = small_lobby(8, 6);
        let id = lobby.join(sink()).unwrap();
        move_to(&lobby, id, 0, 0);

        assert_eq!(lobby.move_cursor(id, -1, -1), Some((7, 5)));
        assert_eq!(lobby.move_cursor(id, 17, 13), Some((0, 0)));
    }

    #[test]
    fn test_move_cursor_and_view_with_extreme_values() {
        let lobby = small_lobby(10, 10);
        let id = lobby.join(sink()).unwrap();
        move_to(&lobby, id, 3, 4);

        // i64::MAX % 10 == 7, i64::MIN mod 10 == 2
        assert_eq!(lobby.move_cursor(id, i64::MAX, 0), Some((0, 4)));
        assert_eq!(lobby.move_cursor(id, 0, i64::MIN), Some((0, 6)));
        assert_eq!(lobby.move_cursor(id, i64::MIN, i64::MAX), Some((2, 3)));

        let view = lobby.view_board(i64::MAX, i64::MIN, 4, 2);
        assert_eq!(view.to_string(), lobby.view_board(7, 2, 4, 2).to_string());
        assert_eq!(view.height(), 2);
    }

    #[test]
    fn test_leave_clears_only_own_marks() {
        let lobby = small_lobby(10, 10);
        let a = lobby.join(sink()).unwrap();
        let b = lobby.join(sink()).unwrap();

        stage(&lobby, a, &[(1, 1), (2, 1), (1, 2), (2, 2)]);
        lobby.toggle_pause(a).unwrap();
        stage(&lobby, b, &[(2, 2), (7, 7)]);

        assert!(lobby.leave(a));
        lobby.inspect(|_, grid| {
            assert_eq!(grid.live_cells_of(a), 0);
            assert_eq!(grid.staged_cells_of(b), 2);
            assert_eq!(grid.cell(2, 2).staged, Some(b));
        });
        assert_eq!(lobby.participant_count(), 1);
        assert!(lobby.audit().is_clean());
    }

    #[test]
    fn test_view_board_shows_cursor_and_clamps() {
        let config = LobbyConfig {
            max_view_width: 3,
            max_view_height: 2,
            ..LobbyConfig::default().with_board(4, 4)
        };
        let lobby = Lobby::new(LobbyId(1), "v", config, TokioContext::shared()).unwrap();
        let id = lobby.join(sink()).unwrap();
        move_to(&lobby, id, 1, 0);

        let view = lobby.view_board(0, 0, 100, 100);
        assert_eq!((view.width(), view.height()), (3, 2));
        assert_eq!(view.to_string(), "  []  \n      ");
    }

    #[test]
    fn test_scoreboard_order_and_format() {
        let lobby = small_lobby(20, 20);
        let a = lobby.join(sink()).unwrap();
        let b = lobby.join(sink()).unwrap();
        let c = lobby.join(sink()).unwrap();

        stage(&lobby, b, &[(1, 1), (2, 1), (1, 2), (2, 2)]);
        lobby.toggle_pause(b).unwrap();
        stage(&lobby, c, &[(10, 10), (11, 10), (10, 11), (11, 11)]);
        lobby.toggle_pause(c).unwrap();

        let board = lobby.scoreboard();
        let order: Vec<_> = board.entries.iter().map(|e| e.participant).collect();
        assert_eq!(order, vec![b, c, a]);

        let cb = lobby.participant(b).unwrap().color;
        let cc = lobby.participant(c).unwrap().color;
        let ca = lobby.participant(a).unwrap().color;
        assert_eq!(board.to_string(), format!("{cb} 4      {cc} 4      {ca} 0    "));
    }

    #[test]
    fn test_concurrent_joins_respect_capacity() {
        let lobby = small_lobby(30, 30);
        let admitted = AtomicUsize::new(0);

        std::thread::scope(|scope| {
            for _ in 0..32 {
                scope.spawn(|| {
                    if lobby.join(sink()).is_ok() {
                        admitted.fetch_add(1, Ordering::Relaxed);
                    }
                });
            }
        });

        assert_eq!(admitted.load(Ordering::Relaxed), lobby.capacity());
        assert_eq!(lobby.participant_count(), lobby.capacity());
        assert!(lobby.audit().is_clean());
    }

    #[test]
    fn test_leave_is_atomic_under_concurrent_ticks_and_renders() {
        let lobby = small_lobby(30, 30);
        let a = lobby.join(sink()).unwrap();
        let b = lobby.join(sink()).unwrap();

        // Ten blocks: a still life, so only a leave can change the count.
        let blocks: Vec<(usize, usize)> = (0..5)
            .flat_map(|k| [(4 * k + 1, 1), (4 * k + 1, 6)])
            .flat_map(|(x, y)| [(x, y), (x + 1, y), (x, y + 1), (x + 1, y + 1)])
            .collect();
        stage(&lobby, a, &blocks);
        lobby.toggle_pause(a).unwrap();
        let marks: Vec<(usize, usize)> = (0..12).map(|x| (x * 2, 20)).collect();
        stage(&lobby, b, &marks);

        let rounds = AtomicUsize::new(0);
        std::thread::scope(|scope| {
            scope.spawn(|| {
                for (leaver, after) in [(a, 50), (b, 100)] {
                    while rounds.load(Ordering::Acquire) < after {
                        std::thread::yield_now();
                    }
                    assert!(lobby.leave(leaver));
                }
            });
            scope.spawn(|| {
                for _ in 0..200 {
                    lobby.step_generation();
                    assert_eq!(lobby.view_board(0, 0, 30, 30).height(), 30);
                    lobby.inspect(|registry, grid| {
                        let live = grid.live_cells_of(a);
                        let staged = grid.staged_cells_of(b);
                        let a_present = registry.get(a).is_some();
                        let b_present = registry.get(b).is_some();
                        assert_eq!(live, if a_present { 40 } else { 0 });
                        assert_eq!(staged, if b_present { 12 } else { 0 });
                    });
                    assert!(lobby.audit().is_clean());
                    rounds.fetch_add(1, Ordering::Release);
                }
            });
        });

        assert_eq!(lobby.participant_count(), 0);
        lobby.inspect(|_, grid| assert_eq!(grid.population(), 0));
    }

    #[test]
    fn test_tick_notifies_every_draw() {
        let config = LobbyConfig::default().with_board(6, 6).with_rates(20, 4);
        let lobby = Lobby::new(LobbyId(1), "n", config, TokioContext::shared()).unwrap();
        let (tx, mut rx) = tokio::sync::mpsc::channel(64);
        lobby.join(Arc::new(ChannelSink::new(tx))).unwrap();

        let stepped: Vec<bool> = (0..8).map(|_| lobby.tick()).collect();
        assert_eq!(stepped, vec![false, false, false, true, false, false, false, true]);

        let mut events = 0;
        while let Ok(event) = rx.try_recv() {
            assert_eq!(event, SinkEvent::GenerationAdvanced);
            events += 1;
        }
        assert_eq!(events, 8);
    }

    #[test]
    fn test_full_sink_counts_drops() {
        let lobby = small_lobby(6, 6);
        let (sink, _rx) = ChannelSink::channel(1);
        lobby.join(Arc::new(sink)).unwrap();

        lobby.tick();
        lobby.tick();
        lobby.tick();
        assert_eq!(lobby.dropped_events(), 2);
    }

    #[test]
    fn test_shutdown_notifies_once() {
        let lobby = small_lobby(6, 6);
        let (sink, mut rx) = ChannelSink::channel(8);
        lobby.join(Arc::new(sink)).unwrap();

        lobby.shutdown();
        lobby.shutdown();
        assert!(!lobby.tick());

        assert_eq!(rx.try_recv(), Ok(SinkEvent::LobbyClosed));
        assert!(rx.try_recv().is_err());
        assert!(lobby.driver().is_stopped());
    }

    #[tokio::test]
    async fn test_driver_advances_generations() {
        let config = LobbyConfig::default().with_board(8, 8).with_rates(500, 1);
        let lobby = Lobby::new(LobbyId(1), "fast", config, TokioContext::shared()).unwrap();
        let (sink, mut rx) = ChannelSink::channel(1024);
        lobby.join(Arc::new(sink)).unwrap();
        lobby.start();
        lobby.start();

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(lobby.generation() > 0);
        assert_eq!(rx.recv().await, Some(SinkEvent::GenerationAdvanced));
        lobby.driver().stop();
    }

    #[tokio::test]
    async fn test_no_notifications_after_close() {
        let config = LobbyConfig::default().with_board(8, 8).with_rates(500, 1);
        let lobby = Lobby::new(LobbyId(1), "closing", config, TokioContext::shared()).unwrap();
        let (sink, mut rx) = ChannelSink::channel(4096);
        let id = lobby.join(Arc::new(sink)).unwrap();
        lobby.start();

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(lobby.leave(id));
        assert!(lobby.close_if_empty());
        assert!(lobby.driver().is_stopped());

        tokio::time::sleep(Duration::from_millis(50)).await;
        while rx.try_recv().is_ok() {}
        let generation = lobby.generation();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(lobby.generation(), generation);
        // The sink was dropped with the participant
        assert_eq!(
            rx.try_recv(),
            Err(tokio::sync::mpsc::error::TryRecvError::Disconnected)
        );
    }

    #[derive(Debug, Clone)]
    enum Op {
        Join,
        Leave(usize),
        Move(usize, i64, i64),
        Place(usize),
        Toggle(usize),
        Tick,
    }

    fn arb_op() -> impl Strategy<Value = Op> {
        prop_oneof![
            1 => Just(Op::Join),
            1 => (0usize..12).prop_map(Op::Leave),
            4 => (0usize..12, -3i64..4, -3i64..4).prop_map(|(p, dx, dy)| Op::Move(p, dx, dy)),
            6 => (0usize..12).prop_map(Op::Place),
            2 => (0usize..12).prop_map(Op::Toggle),
            2 => Just(Op::Tick),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn prop_random_sessions_keep_invariants(ops in proptest::collection::vec(arb_op(), 1..120)) {
            let config = LobbyConfig::default()
                .with_board(9, 7)
                .with_capacity(4)
                .with_max_placed_cells(5)
                .with_rates(20, 2);
            let lobby = Lobby::new(LobbyId(1), "prop", config, TokioContext::shared()).unwrap();
            let mut ids: Vec<ParticipantId> = Vec::new();

            for op in ops {
                match op {
                    Op::Join => {
                        if let Ok(id) = lobby.join(sink()) {
                            ids.push(id);
                        }
                    }
                    Op::Leave(i) if !ids.is_empty() => {
                        let id = ids.remove(i % ids.len());
                        prop_assert!(lobby.leave(id));
                        let orphaned = lobby.inspect(|_, grid| {
                            grid.live_cells_of(id) + grid.staged_cells_of(id)
                        });
                        prop_assert_eq!(orphaned, 0);
                    }
                    Op::Move(i, dx, dy) if !ids.is_empty() => {
                        lobby.move_cursor(ids[i % ids.len()], dx, dy);
                    }
                    Op::Place(i) if !ids.is_empty() => {
                        let _ = lobby.place(ids[i % ids.len()]);
                    }
                    Op::Toggle(i) if !ids.is_empty() => {
                        let _ = lobby.toggle_pause(ids[i % ids.len()]);
                    }
                    Op::Tick => {
                        lobby.tick();
                    }
                    _ => {}
                }
                let report = lobby.audit();
                prop_assert!(report.is_clean(), "{:?}", report.violations);
            }
        }
    }
}
