//! Double-buffered frame composition.
//!
//! Renderers draw into a staging [`FrameBuffer`]. Only [`Composer::commit`]
//! touches the display buffer: it copies the whole staging buffer in one go
//! and flushes the result. A frame on the LEDs is therefore always a frame
//! some renderer finished, never half of one.
//!
//! ## Rust concepts
//! - Privacy as an invariant: `display` has no `&mut` accessor
//! - `copy_from_slice` for a single, complete buffer copy

use crate::Color;
use crate::driver::{DriverError, LedDriver};
use crate::layout::MatrixGeometry;

/// A full frame of pixels, stored in physical wiring order and addressed by
/// virtual `(x, y)`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrameBuffer {
    geometry: MatrixGeometry,
    pixels: Vec<Color>,
}

impl FrameBuffer {
    pub fn new(geometry: MatrixGeometry) -> Self {
        Self {
            geometry,
            pixels: vec![Color::BLACK; geometry.led_count()],
        }
    }

    pub fn geometry(&self) -> MatrixGeometry {
        self.geometry
    }

    pub fn width(&self) -> usize {
        self.geometry.width()
    }

    pub fn height(&self) -> usize {
        self.geometry.height()
    }

    #[inline]
    pub fn set(&mut self, x: usize, y: usize, color: Color) {
        let index = self.geometry.physical_index(x, y);
        self.pixels[index] = color;
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> Color {
        self.pixels[self.geometry.physical_index(x, y)]
    }

    pub fn fill(&mut self, color: Color) {
        self.pixels.fill(color);
    }

    pub fn clear(&mut self) {
        self.fill(Color::BLACK);
    }

    /// Pixels in physical order, ready for a driver.
    pub fn as_physical(&self) -> &[Color] {
        &self.pixels
    }

    pub fn is_blank(&self) -> bool {
        self.pixels.iter().all(|c| c.is_black())
    }
}

/// Owns the staging and display buffers.
pub struct Composer {
    staging: FrameBuffer,
    display: FrameBuffer,
    commits: u64,
}

impl Composer {
    pub fn new(geometry: MatrixGeometry) -> Self {
        Self {
            staging: FrameBuffer::new(geometry),
            display: FrameBuffer::new(geometry),
            commits: 0,
        }
    }

    /// The buffer renderers draw into.
    pub fn staging_mut(&mut self) -> &mut FrameBuffer {
        &mut self.staging
    }

    /// The last committed frame. Read-only by construction.
    pub fn display(&self) -> &FrameBuffer {
        &self.display
    }

    /// Number of completed commits.
    pub fn commits(&self) -> u64 {
        self.commits
    }

    /// Copy staging into display, then flush display to the driver.
    ///
    /// The copy counts as committed even if the flush fails; the next
    /// commit will retry with a fresh frame.
    pub fn commit<D: LedDriver>(
        &mut self,
        driver: &mut D,
        brightness: u8,
    ) -> Result<(), DriverError> {
        self.display.pixels.copy_from_slice(&self.staging.pixels);
        self.commits += 1;
        driver.flush(self.display.as_physical(), brightness)
    }
}
