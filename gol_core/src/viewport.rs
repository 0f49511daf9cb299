//! Viewport Renderer: turns a window of the toroidal board into rows of
//! spans for the styling layer, plus a plain-text form.
//!
//! # Cost model
//!
//! Renders run once per draw tick per participant, far more often than
//! generations. The renderer therefore:
//! - reads only the cells inside the window (no board copy)
//! - coalesces background runs into one `Span::Blank(n)`
//! - renders a full board row once when the window wraps horizontally
//!   and repeats it per wrap
//! - reuses already-rendered rows when the window wraps vertically

use crate::colors::Color;
use crate::life::{Cell, Grid};
use crate::registry::Registry;
use gol_env::ParticipantId;
use std::collections::HashMap;

/// Background glyph
pub const GLYPH_BLANK: &str = "  ";
/// Live cell
pub const GLYPH_LIVE: &str = "##";
/// Staged cell
pub const GLYPH_STAGED: &str = "::";
/// Live under one owner, staged by another
pub const GLYPH_LIVE_STAGED: &str = "#:";
/// Participant cursor
pub const GLYPH_CURSOR: &str = "[]";
/// Cursor on a staged cell
pub const GLYPH_CURSOR_STAGED: &str = ":]";

/// One non-background cell, with colors resolved for the styling layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pixel {
    /// Color of the live cell's owner
    pub live: Option<Color>,
    /// Color of the participant who staged this cell
    pub staged: Option<Color>,
    /// Color of the participant whose cursor sits here
    pub cursor: Option<Color>,
}

impl Pixel {
    pub fn glyph(&self) -> &'static str {
        match (self.cursor, self.live, self.staged) {
            (Some(_), _, Some(_)) => GLYPH_CURSOR_STAGED,
            (Some(_), _, None) => GLYPH_CURSOR,
            (None, Some(_), Some(_)) => GLYPH_LIVE_STAGED,
            (None, Some(_), None) => GLYPH_LIVE,
            (None, None, Some(_)) => GLYPH_STAGED,
            (None, None, None) => GLYPH_BLANK,
        }
    }
}

/// A run of output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Span {
    /// `n` consecutive background cells
    Blank(usize),
    Pixel(Pixel),
}

impl Span {
    /// Cells covered by this span.
    pub fn len(&self) -> usize {
        match self {
            Span::Blank(n) => *n,
            Span::Pixel(_) => 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Participant data the renderer overlays on the board.
#[derive(Debug, Default, Clone)]
pub struct Overlay {
    cursors: HashMap<(usize, usize), Color>,
    colors: HashMap<ParticipantId, Color>,
}

impl Overlay {
    /// Captures cursors and colors. When two cursors share a cell the
    /// lower participant id wins.
    pub fn from_registry(registry: &Registry) -> Self {
        let mut overlay = Self::default();
        for participant in registry.iter() {
            overlay.add(participant.id, participant.color, participant.x, participant.y);
        }
        overlay
    }

    /// Adds one participant; existing cursors at the same cell are kept.
    pub fn add(&mut self, id: ParticipantId, color: Color, x: usize, y: usize) {
        self.cursors.entry((x, y)).or_insert(color);
        self.colors.insert(id, color);
    }

    fn color(&self, owner: Option<ParticipantId>) -> Option<Color> {
        owner.and_then(|id| self.colors.get(&id).copied())
    }

    /// Resolves one cell, `None` when it draws as background.
    fn pixel(&self, cell: &Cell, x: usize, y: usize) -> Option<Pixel> {
        let pixel = Pixel {
            live: self.color(cell.live),
            staged: self.color(cell.staged),
            cursor: self.cursors.get(&(x, y)).copied(),
        };
        if pixel.live.is_none() && pixel.staged.is_none() && pixel.cursor.is_none() {
            None
        } else {
            Some(pixel)
        }
    }
}

/// Requested window; `top`/`left` may be negative or past the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub top: i64,
    pub left: i64,
    pub width: usize,
    pub height: usize,
}

impl Window {
    pub fn new(top: i64, left: i64, width: usize, height: usize) -> Self {
        Self { top, left, width, height }
    }

    /// Shrinks the window to the given limits.
    pub fn clamped(self, max_width: usize, max_height: usize) -> Self {
        Self {
            width: self.width.min(max_width),
            height: self.height.min(max_height),
            ..self
        }
    }
}

/// Rendered window.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Viewport {
    rows: Vec<Vec<Span>>,
    width: usize,
}

impl Viewport {
    pub fn rows(&self) -> &[Vec<Span>] {
        &self.rows
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.rows.len()
    }

    /// Number of spans emitted; a proxy for styling cost.
    pub fn span_count(&self) -> usize {
        self.rows.iter().map(Vec::len).sum()
    }
}

impl std::fmt::Display for Viewport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, row) in self.rows.iter().enumerate() {
            if i > 0 {
                f.write_str("\n")?;
            }
            for span in row {
                match span {
                    Span::Blank(n) => f.write_str(&GLYPH_BLANK.repeat(*n))?,
                    Span::Pixel(pixel) => f.write_str(pixel.glyph())?,
                }
            }
        }
        Ok(())
    }
}

/// Accumulates spans, merging adjacent background runs.
#[derive(Default)]
struct RowBuilder {
    spans: Vec<Span>,
}

impl RowBuilder {
    fn blank(&mut self, n: usize) {
        if n == 0 {
            return;
        }
        if let Some(Span::Blank(run)) = self.spans.last_mut() {
            *run += n;
        } else {
            self.spans.push(Span::Blank(n));
        }
    }

    fn push(&mut self, span: Span) {
        match span {
            Span::Blank(n) => self.blank(n),
            pixel => self.spans.push(pixel),
        }
    }

    fn extend(&mut self, spans: &[Span]) {
        for span in spans {
            self.push(*span);
        }
    }

    /// Scans cells `x_start..x_end` of board row `y`.
    fn scan(&mut self, grid: &Grid, overlay: &Overlay, y: usize, x_start: usize, x_end: usize) {
        let row = grid.row(y);
        let mut blanks = 0;
        for (x, cell) in row.iter().enumerate().take(x_end).skip(x_start) {
            match overlay.pixel(cell, x, y) {
                None => blanks += 1,
                Some(pixel) => {
                    self.blank(blanks);
                    blanks = 0;
                    self.spans.push(Span::Pixel(pixel));
                }
            }
        }
        self.blank(blanks);
    }
}

/// Renders one window row, wrapping horizontally.
fn render_row(grid: &Grid, overlay: &Overlay, y: usize, left: i64, width: usize) -> Vec<Span> {
    let board_width = grid.width();
    let (start, _) = grid.wrap(left, 0);
    let head = width.min(board_width - start);

    let mut builder = RowBuilder::default();
    builder.scan(grid, overlay, y, start, start + head);

    let rest = width - head;
    let full_wraps = rest / board_width;
    let tail = rest % board_width;

    if full_wraps > 0 {
        let mut whole = RowBuilder::default();
        whole.scan(grid, overlay, y, 0, board_width);
        for _ in 0..full_wraps {
            builder.extend(&whole.spans);
        }
    }
    if tail > 0 {
        builder.scan(grid, overlay, y, 0, tail);
    }

    builder.spans
}

/// Renders a window of the board.
///
/// Read-only: callers hold the registry and grid read locks (in that
/// order) while building the overlay and calling this.
pub fn render(grid: &Grid, overlay: &Overlay, window: Window) -> Viewport {
    let mut rows: Vec<Vec<Span>> = Vec::with_capacity(window.height);
    let mut rendered: HashMap<usize, usize> = HashMap::new();
    let board_height = grid.height();
    let (_, top) = grid.wrap(0, window.top);

    for i in 0..window.height {
        let y = (top + i % board_height) % board_height;
        let row = match rendered.get(&y) {
            Some(&earlier) => rows[earlier].clone(),
            None => {
                rendered.insert(y, rows.len());
                render_row(grid, overlay, y, window.left, window.width)
            }
        };
        rows.push(row);
    }

    Viewport {
        rows,
        width: window.width,
    }
}

/// Renders the single cell at `(x, y)` (wrapped).
pub fn render_cell(grid: &Grid, overlay: &Overlay, x: i64, y: i64) -> Span {
    let (x, y) = grid.wrap(x, y);
    match grid.get(x, y).and_then(|cell| overlay.pixel(cell, x, y)) {
        Some(pixel) => Span::Pixel(pixel),
        None => Span::Blank(1),
    }
}
