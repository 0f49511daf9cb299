//! Participant colors and color-slot allocation.

use serde::{Deserialize, Serialize};

/// Number of assignable colors (slot 0 is the background).
pub const PALETTE_SIZE: usize = 10;

/// Hex styles for one palette entry, consumed by the styling layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlayerStyle {
    /// Cursor foreground
    pub cursor: &'static str,
    /// Live-cell background
    pub cell: &'static str,
}

/// Index 0 is the background entry.
pub const PALETTE: [PlayerStyle; PALETTE_SIZE + 1] = [
    PlayerStyle { cursor: "#080808", cell: "#000000" },
    PlayerStyle { cursor: "#ff0000", cell: "#ff5f5f" },
    PlayerStyle { cursor: "#d75f00", cell: "#ff8700" },
    PlayerStyle { cursor: "#ffd700", cell: "#ffff5f" },
    PlayerStyle { cursor: "#87af00", cell: "#afff00" },
    PlayerStyle { cursor: "#005f00", cell: "#00d700" },
    PlayerStyle { cursor: "#00afff", cell: "#00ffff" },
    PlayerStyle { cursor: "#005f87", cell: "#0087ff" },
    PlayerStyle { cursor: "#d700ff", cell: "#d787ff" },
    PlayerStyle { cursor: "#ff00af", cell: "#ff5faf" },
    PlayerStyle { cursor: "#afafd7", cell: "#eeeeee" },
];

/// A participant color, always in `1..=PALETTE_SIZE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Color(u8);

impl Color {
    /// Creates a color, rejecting the background slot and out-of-range values.
    pub fn new(slot: u8) -> Option<Self> {
        (1..=PALETTE_SIZE as u8).contains(&slot).then_some(Self(slot))
    }

    /// Returns the slot number.
    pub fn slot(&self) -> u8 {
        self.0
    }

    /// Returns the palette entry for this color.
    pub fn style(&self) -> PlayerStyle {
        PALETTE[self.0 as usize]
    }
}

impl std::fmt::Display for Color {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Occupancy bitset over the assignable colors.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColorSlots {
    taken: u16,
}

impl ColorSlots {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims the first free color scanning cyclically from `hint`.
    ///
    /// Starting from a hint derived from the participant id makes colors
    /// rotate across joins instead of always reusing the lowest slot.
    pub fn claim(&mut self, hint: usize) -> Option<Color> {
        (0..PALETTE_SIZE)
            .map(|offset| ((hint + offset) % PALETTE_SIZE) as u8 + 1)
            .find(|slot| self.taken & (1 << slot) == 0)
            .map(|slot| {
                self.taken |= 1 << slot;
                Color(slot)
            })
    }

    /// Frees a color. Returns false if it was not taken.
    pub fn release(&mut self, color: Color) -> bool {
        let bit = 1 << color.0;
        let was_taken = self.taken & bit != 0;
        self.taken &= !bit;
        was_taken
    }

    pub fn is_taken(&self, color: Color) -> bool {
        self.taken & (1 << color.0) != 0
    }

    /// Number of colors currently claimed.
    pub fn count(&self) -> usize {
        self.taken.count_ones() as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_color_range() {
        assert!(Color::new(0).is_none());
        assert!(Color::new(11).is_none());
        assert_eq!(Color::new(10).map(|c| c.slot()), Some(10));
        assert_eq!(Color::new(1).unwrap().style().cursor, "#ff0000");
    }

    #[test]
    fn test_claim_never_hands_out_background() {
        let mut slots = ColorSlots::new();
        let mut seen = Vec::new();
        for hint in 0..PALETTE_SIZE {
            let color = slots.claim(hint).unwrap();
            assert_ne!(color.slot(), 0);
            assert!(!seen.contains(&color));
            seen.push(color);
        }
        assert_eq!(slots.count(), PALETTE_SIZE);
        assert!(slots.claim(0).is_none());
    }

    #[test]
    fn test_claim_rotates_from_hint() {
        let mut slots = ColorSlots::new();
        assert_eq!(slots.claim(3).unwrap().slot(), 4);
        // Slot 4 taken: scanning from the same hint moves on to 5
        assert_eq!(slots.claim(3).unwrap().slot(), 5);
        // Wraps past 10 back to 1
        assert_eq!(slots.claim(9).unwrap().slot(), 10);
        assert_eq!(slots.claim(9).unwrap().slot(), 1);
    }

    #[test]
    fn test_release_frees_slot() {
        let mut slots = ColorSlots::new();
        let color = slots.claim(0).unwrap();
        assert!(slots.is_taken(color));
        assert!(slots.release(color));
        assert!(!slots.is_taken(color));
        assert!(!slots.release(color));
        assert_eq!(slots.claim(0), Some(color));
    }
}
