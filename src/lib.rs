//! Animation engine for a matrix of serpentine-wired WS2812 panels.
//!
//! Three 16×10 panels are chained into one flat 48×10 virtual display.
//! Animation code draws in virtual `(x, y)` space; the [`layout`] module
//! hides the zigzag wiring, and the [`scheduler`] keeps one animation
//! running at a speed-derived cadence while the HTTP [`server`] changes
//! mode, brightness, speed, and scrolling text underneath it.
//!
//! This root module holds the pieces every other module shares:
//! - The [`Color`] type, decoupled from the LED driver crate
//! - Signal handling for clean shutdown

pub mod animation;
pub mod asset;
pub mod control;
pub mod driver;
pub mod font;
pub mod frame;
pub mod layout;
pub mod media;
pub mod scheduler;
pub mod server;
pub mod settings;

use smart_leds::RGB8;
use smart_leds::hsv::{Hsv, hsv2rgb};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

// ── Color ──────────────────────────────────────────────────────────

/// Our own color type, decoupled from the LED driver crate.
///
/// Renderers, buffers, and assets all speak `Color`. At the hardware
/// boundary we convert via `Into<RGB8>`.
///
/// # Rust concept: derive macros
/// `Clone, Copy` make this cheaply copyable (it's just three bytes).
/// `Default` gives us black for free, which is what a cleared buffer holds.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const BLACK: Self = Self::new(0, 0, 0);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Create a color from a hue on the 0-255 color wheel, at full
    /// saturation and value.
    pub fn from_hue(hue: u8) -> Self {
        hsv2rgb(Hsv {
            hue,
            sat: 255,
            val: 255,
        })
        .into()
    }

    /// Scale this color by a brightness level (0-255).
    ///
    /// Uses the same `(c * (b + 1)) >> 8` scaling as the driver side, so
    /// 255 is the identity and 0 is black.
    pub fn apply_brightness(self, brightness: u8) -> Self {
        let scale = |c: u8| ((c as u16 * (brightness as u16 + 1)) >> 8) as u8;
        Self {
            r: scale(self.r),
            g: scale(self.g),
            b: scale(self.b),
        }
    }

    pub fn is_black(self) -> bool {
        self == Self::BLACK
    }
}

impl From<[u8; 3]> for Color {
    fn from([r, g, b]: [u8; 3]) -> Self {
        Self::new(r, g, b)
    }
}

/// Convert our Color to the driver crate's RGB8 at the boundary.
impl From<Color> for RGB8 {
    fn from(c: Color) -> Self {
        RGB8::new(c.r, c.g, c.b)
    }
}

impl From<RGB8> for Color {
    fn from(c: RGB8) -> Self {
        Self::new(c.r, c.g, c.b)
    }
}

// ── Shutdown ───────────────────────────────────────────────────────

/// Set up a Ctrl+C handler that sets `running` to false.
///
/// # Rust concept: Arc and AtomicBool
/// The render thread, the HTTP server, and the signal handler all need to
/// see the same flag. `Arc` gives shared ownership and `AtomicBool` makes
/// the flag thread-safe without a mutex.
pub fn setup_signal_handler() -> Result<Arc<AtomicBool>, ctrlc::Error> {
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();

    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })?;

    Ok(running)
}

/// Check if the render loop should keep running.
pub fn is_running(running: &AtomicBool) -> bool {
    running.load(Ordering::SeqCst)
}

// ── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[test]
    fn color_new() {
        let c = Color::new(10, 20, 30);
        assert_eq!(c.r, 10);
        assert_eq!(c.g, 20);
        assert_eq!(c.b, 30);
    }

    #[test]
    fn default_color_is_black() {
        assert_eq!(Color::default(), Color::BLACK);
        assert!(Color::default().is_black());
    }

    #[test]
    fn hue_zero_is_red() {
        assert_eq!(Color::from_hue(0), Color::new(255, 0, 0));
    }

    #[test]
    fn every_hue_is_fully_saturated() {
        for hue in 0..=255u8 {
            let c = Color::from_hue(hue);
            assert_eq!(c.r.max(c.g).max(c.b), 255, "hue {hue}");
        }
    }

    #[rstest]
    #[case(Color::new(100, 200, 50), 255, Color::new(100, 200, 50))]
    #[case(Color::new(255, 255, 255), 0, Color::new(0, 0, 0))]
    #[case(Color::new(200, 100, 50), 127, Color::new(100, 50, 25))]
    fn apply_brightness_scales(#[case] input: Color, #[case] level: u8, #[case] expected: Color) {
        assert_eq!(input.apply_brightness(level), expected);
    }

    #[test]
    fn converts_to_and_from_rgb8() {
        let c = Color::new(1, 2, 3);
        let rgb: RGB8 = c.into();
        assert_eq!(rgb, RGB8::new(1, 2, 3));
        assert_eq!(Color::from(rgb), c);
    }

    #[test]
    fn converts_from_channel_array() {
        assert_eq!(Color::from([9, 8, 7]), Color::new(9, 8, 7));
    }
}
