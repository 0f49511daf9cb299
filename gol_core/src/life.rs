//! The Grid Engine: a toroidal board of owned cells and the multiplayer
//! generalization of Conway's rule.
//!
//! Ownership spreads by neighbor majority:
//! - Conway counts on *all* live neighbors decide birth/survival
//! - The owner holding the most neighbor votes (at least 2) takes the cell
//! - Ties go to the smallest owner id, scanned in a fixed order
//!
//! With a single owner this reduces exactly to classical Life on a torus.

use crate::error::PatternError;
use gol_env::ParticipantId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Minimum neighbor votes the majority owner needs for birth or survival.
pub const MIN_MAJORITY_VOTES: u8 = 2;

/// One grid location.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Cell {
    /// Owner of the live cell, `None` when dead
    pub live: Option<ParticipantId>,

    /// Participant who provisionally placed this cell while paused
    pub staged: Option<ParticipantId>,

    /// Generations survived under the current owner
    pub age: u32,
}

impl Cell {
    pub fn is_alive(&self) -> bool {
        self.live.is_some()
    }

    /// Dead and unstaged.
    pub fn is_background(&self) -> bool {
        self.live.is_none() && self.staged.is_none()
    }
}

/// Fixed-size board with wraparound addressing on both axes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grid {
    width: usize,
    height: usize,
    /// Row-major
    cells: Vec<Cell>,
}

impl Grid {
    /// Creates an empty board.
    ///
    /// # Panics
    /// Panics if either dimension is zero; `LobbyConfig::validate` rejects
    /// such boards before a lobby is built.
    pub fn new(width: usize, height: usize) -> Self {
        assert!(width > 0 && height > 0, "grid dimensions must be non-zero");
        Self {
            width,
            height,
            cells: vec![Cell::default(); width * height],
        }
    }

    /// Builds a board from ASCII rows.
    ///
    /// `.` is dead, `#` is live under owner 1, and `1`..=`9` are live
    /// under that owner id.
    pub fn from_pattern(rows: &[&str]) -> Result<Self, PatternError> {
        let height = rows.len();
        let width = rows.first().map(|r| r.chars().count()).unwrap_or(0);
        if height == 0 || width == 0 {
            return Err(PatternError::Empty);
        }

        let mut grid = Self::new(width, height);
        for (y, row) in rows.iter().enumerate() {
            let row_width = row.chars().count();
            if row_width != width {
                return Err(PatternError::Ragged {
                    row: y,
                    width: row_width,
                    expected: width,
                });
            }
            for (x, glyph) in row.chars().enumerate() {
                let owner = match glyph {
                    '.' => None,
                    '#' => ParticipantId::new(1),
                    '1'..='9' => glyph.to_digit(10).and_then(ParticipantId::new),
                    _ => return Err(PatternError::UnknownGlyph { glyph, row: y, col: x }),
                };
                grid.cell_mut(x, y).live = owner;
            }
        }
        Ok(grid)
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    fn index(&self, x: usize, y: usize) -> usize {
        y * self.width + x
    }

    /// Maps any signed coordinate onto the board.
    pub fn wrap(&self, x: i64, y: i64) -> (usize, usize) {
        (
            x.rem_euclid(self.width as i64) as usize,
            y.rem_euclid(self.height as i64) as usize,
        )
    }

    /// Returns the cell at in-range coordinates.
    pub fn get(&self, x: usize, y: usize) -> Option<&Cell> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.cells.get(self.index(x, y))
    }

    /// Returns the cell at any coordinates, wrapping.
    pub fn cell(&self, x: i64, y: i64) -> &Cell {
        let (x, y) = self.wrap(x, y);
        &self.cells[self.index(x, y)]
    }

    /// Mutable access with wraparound on `usize` coordinates.
    pub fn cell_mut(&mut self, x: usize, y: usize) -> &mut Cell {
        let idx = self.index(x % self.width, y % self.height);
        &mut self.cells[idx]
    }

    /// One row of cells.
    pub fn row(&self, y: usize) -> &[Cell] {
        let start = self.index(0, y % self.height);
        &self.cells[start..start + self.width]
    }

    /// Iterates `(x, y, cell)` in row-major order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, usize, &Cell)> + '_ {
        self.cells
            .iter()
            .enumerate()
            .map(move |(i, cell)| (i % self.width, i / self.width, cell))
    }

    /// Number of live cells, any owner.
    pub fn population(&self) -> usize {
        self.cells.iter().filter(|c| c.is_alive()).count()
    }

    /// Live cells per owner, in ascending owner order.
    pub fn live_counts(&self) -> BTreeMap<ParticipantId, usize> {
        let mut counts = BTreeMap::new();
        for owner in self.cells.iter().filter_map(|c| c.live) {
            *counts.entry(owner).or_insert(0) += 1;
        }
        counts
    }

    /// Live cells held by one owner.
    pub fn live_cells_of(&self, owner: ParticipantId) -> usize {
        self.cells.iter().filter(|c| c.live == Some(owner)).count()
    }

    /// Staged cells held by one owner.
    pub fn staged_cells_of(&self, owner: ParticipantId) -> usize {
        self.cells.iter().filter(|c| c.staged == Some(owner)).count()
    }

    /// Kills every cell `owner` holds live. Returns how many died.
    pub fn clear_live(&mut self, owner: ParticipantId) -> usize {
        let mut cleared = 0;
        for cell in self.cells.iter_mut().filter(|c| c.live == Some(owner)) {
            cell.live = None;
            cell.age = 0;
            cleared += 1;
        }
        cleared
    }

    /// Removes every live and staged mark of `owner`.
    ///
    /// Marks of other participants sharing a cell are left alone.
    /// Returns the number of fields cleared.
    pub fn clear_owner(&mut self, owner: ParticipantId) -> usize {
        let mut cleared = 0;
        for cell in self.cells.iter_mut() {
            if cell.live == Some(owner) {
                cell.live = None;
                cell.age = 0;
                cleared += 1;
            }
            if cell.staged == Some(owner) {
                cell.staged = None;
                cleared += 1;
            }
        }
        cleared
    }

    /// Cells `owner` staged that are live under someone else.
    pub fn staging_conflicts(&self, owner: ParticipantId) -> usize {
        self.cells
            .iter()
            .filter(|c| c.staged == Some(owner) && c.live.is_some_and(|live| live != owner))
            .count()
    }

    /// Turns every cell staged by `owner` into a newborn live cell.
    ///
    /// The staged mark is consumed. Returns how many cells were committed.
    pub fn commit_staged(&mut self, owner: ParticipantId) -> usize {
        let mut committed = 0;
        for cell in self.cells.iter_mut().filter(|c| c.staged == Some(owner)) {
            cell.staged = None;
            cell.live = Some(owner);
            cell.age = 0;
            committed += 1;
        }
        committed
    }
}

/// Per-cell neighbor vote tally.
///
/// At most 8 distinct owners can border a cell, so the tally lives in a
/// fixed array; no hashing, no iteration-order dependence.
#[derive(Debug, Default)]
struct NeighborTally {
    votes: [(Option<ParticipantId>, u8); 8],
    owners: usize,
    alive: u8,
}

impl NeighborTally {
    fn collect(grid: &Grid, x: usize, y: usize) -> Self {
        let mut tally = Self::default();
        for dy in -1i64..=1 {
            for dx in -1i64..=1 {
                if dx == 0 && dy == 0 {
                    continue;
                }
                if let Some(owner) = grid.cell(x as i64 + dx, y as i64 + dy).live {
                    tally.record(owner);
                }
            }
        }
        tally
    }

    fn record(&mut self, owner: ParticipantId) {
        self.alive += 1;
        if let Some(entry) = self.votes[..self.owners]
            .iter_mut()
            .find(|(o, _)| *o == Some(owner))
        {
            entry.1 += 1;
            return;
        }
        self.votes[self.owners] = (Some(owner), 1);
        self.owners += 1;
    }

    /// Owner with the most votes; ties go to the smallest id.
    fn majority(&self) -> Option<(ParticipantId, u8)> {
        self.votes[..self.owners]
            .iter()
            .filter_map(|(owner, votes)| owner.map(|o| (o, *votes)))
            .fold(None, |best, (owner, votes)| match best {
                Some((best_owner, best_votes))
                    if best_votes > votes || (best_votes == votes && best_owner < owner) =>
                {
                    Some((best_owner, best_votes))
                }
                _ => Some((owner, votes)),
            })
    }
}

/// Computes the next generation. The input is never mutated.
///
/// Staged marks are carried over unchanged; only the placement protocol
/// touches them.
pub fn advance(grid: &Grid) -> Grid {
    let mut next = Grid::new(grid.width, grid.height);

    for y in 0..grid.height {
        for x in 0..grid.width {
            let idx = grid.index(x, y);
            let current = grid.cells[idx];
            let slot = &mut next.cells[idx];
            slot.staged = current.staged;

            let tally = NeighborTally::collect(grid, x, y);
            let Some((owner, votes)) = tally.majority() else {
                continue;
            };
            if votes < MIN_MAJORITY_VOTES {
                continue;
            }

            let lives = match (current.live, tally.alive) {
                (None, 3) => true,
                (Some(_), 2) | (Some(_), 3) => true,
                _ => false,
            };
            if !lives {
                continue;
            }

            slot.live = Some(owner);
            slot.age = match current.live {
                Some(previous) if previous == owner => current.age.saturating_add(1),
                _ => 0,
            };
        }
    }

    next
}

/// Advances `generations` times.
pub fn advance_by(grid: &Grid, generations: usize) -> Grid {
    let mut current = grid.clone();
    for _ in 0..generations {
        current = advance(&current);
    }
    current
}
