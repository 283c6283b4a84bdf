//! Hardware egress: push a physical-order pixel buffer to the LEDs.
//!
//! The scheduler only knows the [`LedDriver`] trait. On the sign, a
//! [`SmartLedsDriver`] wraps whatever WS2812 writer the board provides.
//! On a development host, [`PreviewDriver`] keeps the last flushed frame in
//! memory so the HTTP server can serve it as a PNG.
//!
//! ## Rust concepts
//! - Traits at the hardware seam, so the render loop is testable on a laptop
//! - Generic adapters over another crate's trait (`SmartLedsWrite`)
//! - `Arc<Mutex<T>>` to share the preview frame with the HTTP side

use crate::Color;
use crate::layout::MatrixGeometry;
use derive_more::{Display, Error};
use image::{ImageFormat, Rgb, RgbImage};
use smart_leds::{RGB8, SmartLedsWrite};
use std::fmt::Debug;
use std::io::Cursor;
use std::sync::{Arc, Mutex, PoisonError};

#[derive(Debug, Display, Error)]
#[display("LED flush failed: {reason}")]
pub struct DriverError {
    pub reason: String,
}

/// Something that can display a full frame of LEDs.
///
/// `pixels` is in physical wiring order, one entry per LED. `brightness`
/// (0-255) is a global scale applied on the way out, the way a WS2812
/// controller's master brightness works.
pub trait LedDriver {
    fn flush(&mut self, pixels: &[Color], brightness: u8) -> Result<(), DriverError>;
}

// ── smart-leds adapter ───────────────────────────────────────────────

/// Adapter from any `smart_leds` writer (WS2812 over SPI, RMT, PIO, ...)
/// to [`LedDriver`].
pub struct SmartLedsDriver<W> {
    writer: W,
}

impl<W> SmartLedsDriver<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W> LedDriver for SmartLedsDriver<W>
where
    W: SmartLedsWrite<Color = RGB8>,
    W::Error: Debug,
{
    fn flush(&mut self, pixels: &[Color], brightness: u8) -> Result<(), DriverError> {
        let colors = pixels.iter().map(|&c| RGB8::from(c));
        self.writer
            .write(smart_leds::brightness(colors, brightness))
            .map_err(|e| DriverError {
                reason: format!("{e:?}"),
            })
    }
}

// ── In-memory preview ────────────────────────────────────────────────

#[derive(Default)]
struct PreviewFrame {
    pixels: Vec<Color>,
    flushes: u64,
}

/// Keeps the most recently flushed frame, brightness applied.
///
/// Clones share the same frame: the render thread owns one clone as its
/// driver, and the HTTP server holds another to read previews.
#[derive(Clone)]
pub struct PreviewDriver {
    geometry: MatrixGeometry,
    latest: Arc<Mutex<PreviewFrame>>,
}

impl PreviewDriver {
    pub fn new(geometry: MatrixGeometry) -> Self {
        Self {
            geometry,
            latest: Arc::new(Mutex::new(PreviewFrame {
                pixels: vec![Color::BLACK; geometry.led_count()],
                flushes: 0,
            })),
        }
    }

    pub fn geometry(&self) -> MatrixGeometry {
        self.geometry
    }

    /// How many frames have been flushed so far.
    pub fn flush_count(&self) -> u64 {
        self.lock().flushes
    }

    /// The last flushed frame, in physical order.
    pub fn snapshot(&self) -> Vec<Color> {
        self.lock().pixels.clone()
    }

    /// Color currently shown at virtual `(x, y)`.
    pub fn pixel(&self, x: usize, y: usize) -> Color {
        let index = self.geometry.physical_index(x, y);
        self.lock().pixels.get(index).copied().unwrap_or_default()
    }

    /// Unscramble the last frame back into virtual layout.
    pub fn to_image(&self) -> RgbImage {
        let pixels = self.snapshot();
        let geometry = self.geometry;
        RgbImage::from_fn(geometry.width() as u32, geometry.height() as u32, |x, y| {
            let c = pixels
                .get(geometry.physical_index(x as usize, y as usize))
                .copied()
                .unwrap_or_default();
            Rgb([c.r, c.g, c.b])
        })
    }

    /// Encode the last frame as a PNG.
    pub fn to_png(&self) -> Result<Vec<u8>, image::ImageError> {
        let mut bytes = Cursor::new(Vec::new());
        self.to_image().write_to(&mut bytes, ImageFormat::Png)?;
        Ok(bytes.into_inner())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, PreviewFrame> {
        self.latest.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl LedDriver for PreviewDriver {
    fn flush(&mut self, pixels: &[Color], brightness: u8) -> Result<(), DriverError> {
        if pixels.len() != self.geometry.led_count() {
            return Err(DriverError {
                reason: format!(
                    "expected {} LEDs, got {}",
                    self.geometry.led_count(),
                    pixels.len()
                ),
            });
        }
        let mut frame = self.lock();
        frame.pixels.clear();
        frame
            .pixels
            .extend(pixels.iter().map(|c| c.apply_brightness(brightness)));
        frame.flushes += 1;
        Ok(())
    }
}
