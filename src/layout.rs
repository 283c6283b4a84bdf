//! Virtual addressing: maps the flat virtual matrix onto serpentine panels.
//!
//! The physical matrix is a chain of identical panels, each wired in a
//! boustrophedon ("zigzag") pattern: even rows run left to right, odd rows
//! run right to left. Panels are chained left to right, so panel `n` owns
//! LED indices `n * panel_len .. (n + 1) * panel_len`.
//!
//! ```text
//! One 4×3 panel:          Two chained panels, virtual 8×3:
//!   0  1  2  3               0  1  2  3 | 12 13 14 15
//!   7  6  5  4               7  6  5  4 | 19 18 17 16
//!   8  9 10 11               8  9 10 11 | 20 21 22 23
//! ```

use derive_more::{Display, Error};

/// Coordinates outside the virtual matrix.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Display, Error)]
#[display("({x}, {y}) is outside the {width}x{height} virtual matrix")]
pub struct AddressingError {
    pub x: usize,
    pub y: usize,
    pub width: usize,
    pub height: usize,
}

/// Geometry of the virtual matrix.
///
/// # Rust concept: Copy configuration
/// Three `usize`s are cheaper to copy than to borrow, so every buffer and
/// renderer keeps its own copy instead of reaching for shared state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MatrixGeometry {
    pub panel_width: usize,
    pub panel_height: usize,
    pub panels: usize,
}

impl MatrixGeometry {
    pub const fn new(panel_width: usize, panel_height: usize, panels: usize) -> Self {
        Self {
            panel_width,
            panel_height,
            panels,
        }
    }

    /// Width of the virtual matrix (all panels side by side).
    pub const fn width(&self) -> usize {
        self.panel_width * self.panels
    }

    /// Height of the virtual matrix.
    pub const fn height(&self) -> usize {
        self.panel_height
    }

    /// LEDs on a single panel.
    pub const fn panel_len(&self) -> usize {
        self.panel_width * self.panel_height
    }

    /// Total number of LEDs across all panels.
    pub const fn led_count(&self) -> usize {
        self.panel_len() * self.panels
    }

    pub const fn contains(&self, x: usize, y: usize) -> bool {
        x < self.width() && y < self.height()
    }

    /// Physical LED index for virtual `(x, y)`.
    ///
    /// Runs once per pixel per tick, so it is O(1) and allocation-free.
    /// Out-of-range coordinates are a caller bug: they panic in debug
    /// builds and are clamped onto the nearest edge in release builds.
    #[inline]
    pub fn physical_index(&self, x: usize, y: usize) -> usize {
        debug_assert!(
            self.contains(x, y),
            "({x}, {y}) outside {}x{} matrix",
            self.width(),
            self.height()
        );
        let x = x.min(self.width() - 1);
        let y = y.min(self.height() - 1);

        let panel = x / self.panel_width;
        let local_x = x % self.panel_width;
        let row_start = y * self.panel_width;
        let local_index = if y % 2 == 0 {
            row_start + local_x
        } else {
            row_start + (self.panel_width - 1 - local_x)
        };

        local_index + panel * self.panel_len()
    }

    /// Checked variant of [`physical_index`](Self::physical_index).
    pub fn try_physical_index(&self, x: usize, y: usize) -> Result<usize, AddressingError> {
        if self.contains(x, y) {
            Ok(self.physical_index(x, y))
        } else {
            Err(AddressingError {
                x,
                y,
                width: self.width(),
                height: self.height(),
            })
        }
    }
}

/// Three 16×10 panels, as wired on the sign.
impl Default for MatrixGeometry {
    fn default() -> Self {
        Self::new(16, 10, 3)
    }
}
