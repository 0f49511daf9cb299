//! Participant Registry: per-lobby session state and color-slot ownership.

use crate::colors::{Color, ColorSlots, PALETTE_SIZE};
use crate::error::LobbyError;
use gol_env::{ParticipantId, RenderSink};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Mutable session state of one participant.
pub struct Participant {
    pub id: ParticipantId,
    pub color: Color,
    pub x: usize,
    pub y: usize,
    /// Paused participants stage cells; playing ones have live cells
    pub paused: bool,
    /// Cells staged since the last pause
    pub placed: usize,
    /// Live cells owned on the board
    pub live_cells: usize,
    sink: Arc<dyn RenderSink>,
}

impl Participant {
    pub fn sink(&self) -> &Arc<dyn RenderSink> {
        &self.sink
    }

    pub fn snapshot(&self) -> ParticipantSnapshot {
        ParticipantSnapshot {
            id: self.id,
            color: self.color,
            x: self.x,
            y: self.y,
            paused: self.paused,
            placed: self.placed,
            live_cells: self.live_cells,
        }
    }
}

impl std::fmt::Debug for Participant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Participant")
            .field("id", &self.id)
            .field("color", &self.color)
            .field("pos", &(self.x, self.y))
            .field("paused", &self.paused)
            .field("placed", &self.placed)
            .field("live_cells", &self.live_cells)
            .finish_non_exhaustive()
    }
}

/// Read-only copy of a participant's state for HUDs and scoreboards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ParticipantSnapshot {
    pub id: ParticipantId,
    pub color: Color,
    pub x: usize,
    pub y: usize,
    pub paused: bool,
    pub placed: usize,
    pub live_cells: usize,
}

impl ParticipantSnapshot {
    /// HUD mode line, e.g. `EDITING 3/40 cells placed` or `PLAYING`.
    pub fn mode_label(&self, max_placed_cells: usize) -> String {
        if self.paused {
            format!("EDITING {}/{} cells placed", self.placed, max_placed_cells)
        } else {
            "PLAYING".to_string()
        }
    }
}

/// Participants of one lobby keyed by id.
///
/// Always accessed under the lobby's registry lock; color allocation and
/// release therefore never race.
pub struct Registry {
    participants: BTreeMap<ParticipantId, Participant>,
    colors: ColorSlots,
    capacity: usize,
    /// Last id handed out
    last_id: u32,
}

impl Registry {
    pub fn new(capacity: usize) -> Self {
        Self {
            participants: BTreeMap::new(),
            colors: ColorSlots::new(),
            capacity: capacity.min(PALETTE_SIZE),
            last_id: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.participants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.participants.len() >= self.capacity
    }

    /// Next free id after `last_id`. Ids wrap past `u32::MAX`, skipping 0
    /// and any id still present; the registry is never full here.
    fn next_id(&self) -> (u32, ParticipantId) {
        let mut raw = self.last_id;
        loop {
            raw = raw.wrapping_add(1);
            if let Some(id) = ParticipantId::new(raw) {
                if !self.participants.contains_key(&id) {
                    return (raw, id);
                }
            }
        }
    }

    /// Registers a new paused participant at `(x, y)`.
    pub fn admit(
        &mut self,
        x: usize,
        y: usize,
        sink: Arc<dyn RenderSink>,
    ) -> Result<ParticipantId, LobbyError> {
        if self.is_full() {
            return Err(LobbyError::CapacityExceeded {
                capacity: self.capacity,
            });
        }

        let (raw, id) = self.next_id();
        // Rotate the starting color with the id so recent leavers' colors
        // are not immediately reused.
        let color = self
            .colors
            .claim((raw as usize - 1) % PALETTE_SIZE)
            .ok_or(LobbyError::CapacityExceeded {
                capacity: self.capacity,
            })?;

        self.last_id = raw;
        self.participants.insert(
            id,
            Participant {
                id,
                color,
                x,
                y,
                paused: true,
                placed: 0,
                live_cells: 0,
                sink,
            },
        );
        Ok(id)
    }

    /// Removes a participant and frees its color.
    pub fn remove(&mut self, id: ParticipantId) -> Option<Participant> {
        let participant = self.participants.remove(&id)?;
        self.colors.release(participant.color);
        Some(participant)
    }

    pub fn get(&self, id: ParticipantId) -> Option<&Participant> {
        self.participants.get(&id)
    }

    pub fn get_mut(&mut self, id: ParticipantId) -> Option<&mut Participant> {
        self.participants.get_mut(&id)
    }

    /// Participants in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = &Participant> {
        self.participants.values()
    }

    pub fn color_of(&self, id: ParticipantId) -> Option<Color> {
        self.participants.get(&id).map(|p| p.color)
    }

    /// Sinks to notify, paired with their owner for logging.
    pub fn sinks(&self) -> Vec<(ParticipantId, Arc<dyn RenderSink>)> {
        self.participants
            .values()
            .map(|p| (p.id, Arc::clone(&p.sink)))
            .collect()
    }

    /// Overwrites every live-cell count from a fresh board scan.
    pub fn apply_live_counts(&mut self, counts: &BTreeMap<ParticipantId, usize>) {
        for participant in self.participants.values_mut() {
            participant.live_cells = counts.get(&participant.id).copied().unwrap_or(0);
        }
    }

    /// True when every taken color belongs to exactly one participant.
    pub fn colors_consistent(&self) -> bool {
        let mut seen = ColorSlots::new();
        for participant in self.participants.values() {
            if seen.is_taken(participant.color) || !self.colors.is_taken(participant.color) {
                return false;
            }
            seen.claim(participant.color.slot() as usize - 1);
        }
        seen.count() == self.colors.count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gol_env::{EnvError, SinkEvent};

    struct NullSink;

    impl RenderSink for NullSink {
        fn notify(&self, _event: SinkEvent) -> Result<(), EnvError> {
            Ok(())
        }
    }

    fn sink() -> Arc<dyn RenderSink> {
        Arc::new(NullSink)
    }

    #[test]
    fn test_admit_assigns_unique_ids_and_colors() {
        let mut registry = Registry::new(10);
        let a = registry.admit(0, 0, sink()).unwrap();
        let b = registry.admit(1, 1, sink()).unwrap();

        assert_ne!(a, b);
        assert_ne!(registry.color_of(a), registry.color_of(b));
        assert!(registry.get(a).unwrap().paused);
        assert!(registry.colors_consistent());
    }

    #[test]
    fn test_ids_wrap_past_u32_max_without_replacing_members() {
        let mut registry = Registry::new(10);
        let first = registry.admit(0, 0, sink()).unwrap();
        assert_eq!(first.get(), 1);

        registry.last_id = u32::MAX - 1;
        let top = registry.admit(0, 0, sink()).unwrap();
        assert_eq!(top.get(), u32::MAX);

        // 0 is not an id and 1 is still held.
        let wrapped = registry.admit(0, 0, sink()).unwrap();
        assert_eq!(wrapped.get(), 2);
        assert_eq!(registry.len(), 3);
        assert!(registry.get(first).is_some());
        assert!(registry.colors_consistent());
    }

    #[test]
    fn test_capacity_enforced() {
        let mut registry = Registry::new(2);
        registry.admit(0, 0, sink()).unwrap();
        registry.admit(0, 0, sink()).unwrap();

        assert_eq!(
            registry.admit(0, 0, sink()),
            Err(LobbyError::CapacityExceeded { capacity: 2 })
        );
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_remove_frees_color_and_ids_keep_increasing() {
        let mut registry = Registry::new(10);
        let a = registry.admit(0, 0, sink()).unwrap();
        let color = registry.color_of(a).unwrap();

        let removed = registry.remove(a).unwrap();
        assert_eq!(removed.color, color);
        assert!(registry.remove(a).is_none());
        assert!(registry.is_empty());
        assert!(registry.colors_consistent());

        let b = registry.admit(0, 0, sink()).unwrap();
        assert!(b > a);
    }

    #[test]
    fn test_full_palette_cycle() {
        let mut registry = Registry::new(10);
        let ids: Vec<_> = (0..10).map(|_| registry.admit(0, 0, sink()).unwrap()).collect();
        assert!(registry.is_full());
        assert!(registry.colors_consistent());

        // Free a middle color; the next joiner must get exactly that one
        let freed = registry.color_of(ids[4]).unwrap();
        registry.remove(ids[4]);
        let late = registry.admit(0, 0, sink()).unwrap();
        assert_eq!(registry.color_of(late), Some(freed));
    }

    #[test]
    fn test_apply_live_counts() {
        let mut registry = Registry::new(10);
        let a = registry.admit(0, 0, sink()).unwrap();
        let b = registry.admit(0, 0, sink()).unwrap();
        registry.get_mut(b).unwrap().live_cells = 9;

        let counts = BTreeMap::from([(a, 4)]);
        registry.apply_live_counts(&counts);

        assert_eq!(registry.get(a).unwrap().live_cells, 4);
        assert_eq!(registry.get(b).unwrap().live_cells, 0);
    }

    #[test]
    fn test_mode_label() {
        let mut registry = Registry::new(10);
        let a = registry.admit(0, 0, sink()).unwrap();
        let mut snapshot = registry.get(a).unwrap().snapshot();
        assert_eq!(snapshot.mode_label(40), "EDITING 0/40 cells placed");
        snapshot.paused = false;
        assert_eq!(snapshot.mode_label(40), "PLAYING");
    }
}
