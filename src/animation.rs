//! Renderers: one per animation kind.
//!
//! Every renderer owns its own progress counter (hue phase, pan offset,
//! frame index, scroll position) and, on each call to `render`, repaints
//! *every* cell of the staging buffer and then advances that counter by one
//! tick. Renderers never sleep and never look at the control state; pacing
//! and mode switching belong to the scheduler.
//!
//! ## Rust concepts
//! - Enums with data: [`AnimationMode`] says *what* to show,
//!   [`Animation`] carries the live renderer state for it
//! - Exhaustive `match` dispatch instead of integer switch tables
//! - `Arc` to share a cached asset with the renderer without copying it

use crate::asset::AnimationAsset;
use crate::control::ModeId;
use crate::font;
use crate::frame::FrameBuffer;
use crate::Color;
use derive_more::{Display, Error};
use std::sync::Arc;

/// What the display should be showing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AnimationMode {
    Off,
    HueCycle,
    /// Pan across the first frame of the named asset.
    ImagePan(String),
    /// Play every frame of the named asset in order.
    FramePlayback(String),
    ScrollText(String),
}

impl AnimationMode {
    /// Map a control-page id onto the animation it selects.
    ///
    /// `text` is only called for [`ModeId::Text`], so the scroll text is
    /// read once per mode entry rather than every tick.
    pub fn resolve(id: ModeId, text: impl FnOnce() -> String) -> Self {
        match id {
            ModeId::Off => Self::Off,
            ModeId::Pride => Self::HueCycle,
            ModeId::Vip => Self::ImagePan("vip".to_string()),
            ModeId::Mod => Self::ImagePan("mod".to_string()),
            ModeId::Edm => Self::FramePlayback("edm".to_string()),
            ModeId::Text => Self::ScrollText(text()),
        }
    }

    /// The asset this mode needs, if any.
    pub fn asset_key(&self) -> Option<&str> {
        match self {
            Self::ImagePan(key) | Self::FramePlayback(key) => Some(key),
            Self::Off | Self::HueCycle | Self::ScrollText(_) => None,
        }
    }
}

/// Settings every renderer may read.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RenderContext {
    /// Hue advance per tick for the hue cycle. Fixed per tick: the speed
    /// setting changes how often ticks happen, not how far each one moves.
    pub hue_step: u8,
    /// Color of scrolling text.
    pub text_color: Color,
}

impl Default for RenderContext {
    fn default() -> Self {
        Self {
            hue_step: 1,
            text_color: Color::new(255, 255, 255),
        }
    }
}

/// Whether an animation wants more ticks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RenderOutcome {
    Continue,
    /// One-shot animation has shown everything.
    Finished,
}

#[derive(Clone, Debug, PartialEq, Eq, Display, Error)]
pub enum RenderError {
    /// The asset cannot be laid onto the matrix.
    #[display(
        "asset {asset:?} frames are {frame_width} columns wide, the matrix has {matrix_width}"
    )]
    BufferSizeMismatch {
        asset: String,
        frame_width: usize,
        matrix_width: usize,
    },
}

// ── Off ──────────────────────────────────────────────────────────────

fn render_off(staging: &mut FrameBuffer) {
    staging.clear();
}

// ── Hue cycle ("pride") ──────────────────────────────────────────────

/// Diagonal rainbow that drifts over time.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HueCycle {
    phase: u8,
}

impl HueCycle {
    /// Hue change per column.
    pub const X_STEP: usize = 10;
    /// Hue change per row.
    pub const Y_STEP: usize = 10;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> u8 {
        self.phase
    }

    /// Hue of cell `(x, y)` at the current phase.
    pub fn hue_at(&self, x: usize, y: usize) -> u8 {
        ((x * Self::X_STEP + y * Self::Y_STEP + self.phase as usize) % 256) as u8
    }

    pub fn render(&mut self, ctx: &RenderContext, staging: &mut FrameBuffer) -> RenderOutcome {
        for y in 0..staging.height() {
            for x in 0..staging.width() {
                staging.set(x, y, Color::from_hue(self.hue_at(x, y)));
            }
        }
        self.phase = self.phase.wrapping_add(ctx.hue_step);
        RenderOutcome::Continue
    }
}

// ── Image pan ("vip", "mod") ─────────────────────────────────────────

/// Scrolls a tileable image sideways, one column per tick.
#[derive(Clone, Debug)]
pub struct ImagePan {
    asset: Arc<AnimationAsset>,
    offset: usize,
}

impl ImagePan {
    pub fn new(asset: Arc<AnimationAsset>) -> Self {
        Self { asset, offset: 0 }
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn asset(&self) -> &AnimationAsset {
        &self.asset
    }

    pub fn render(&mut self, staging: &mut FrameBuffer) -> RenderOutcome {
        let Some(strip) = self.asset.frame(0) else {
            render_off(staging);
            return RenderOutcome::Continue;
        };

        for y in 0..staging.height() {
            for x in 0..staging.width() {
                // `pixel` wraps both axes: x by the strip width, y by its height.
                staging.set(x, y, strip.pixel(x + self.offset, y));
            }
        }
        self.offset = (self.offset + 1) % strip.width();
        RenderOutcome::Continue
    }
}

// ── Frame playback ("edm") ───────────────────────────────────────────

/// Plays an asset's frames in a loop, centred with black borders.
#[derive(Clone, Debug)]
pub struct FramePlayback {
    asset: Arc<AnimationAsset>,
    index: usize,
}

impl FramePlayback {
    pub fn new(asset: Arc<AnimationAsset>) -> Self {
        Self { asset, index: 0 }
    }

    /// Index of the frame the next render will show.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn asset(&self) -> &AnimationAsset {
        &self.asset
    }

    pub fn render(&mut self, staging: &mut FrameBuffer) -> Result<RenderOutcome, RenderError> {
        let count = self.asset.frame_count();
        let Some(frame) = self.asset.frame(self.index) else {
            render_off(staging);
            return Ok(RenderOutcome::Continue);
        };

        let matrix_width = staging.width();
        if frame.width() > matrix_width {
            return Err(RenderError::BufferSizeMismatch {
                asset: self.asset.key().to_string(),
                frame_width: frame.width(),
                matrix_width,
            });
        }

        let pad = (matrix_width - frame.width()) / 2;
        let columns = pad..pad + frame.width();
        for y in 0..staging.height() {
            for x in 0..matrix_width {
                let color = if columns.contains(&x) {
                    frame.pixel(x - pad, y)
                } else {
                    Color::BLACK
                };
                staging.set(x, y, color);
            }
        }
        self.index = (self.index + 1) % count;
        Ok(RenderOutcome::Continue)
    }
}

// ── Scrolling text ───────────────────────────────────────────────────

/// Moves a line of text from the right edge to past the left edge, once.
#[derive(Clone, Debug)]
pub struct ScrollText {
    text: String,
    columns: Vec<u8>,
    /// Display column where the text strip starts; may be negative.
    position: isize,
}

impl ScrollText {
    /// Start with the text just beyond the right edge of a display
    /// `matrix_width` columns wide.
    pub fn new(text: impl Into<String>, matrix_width: usize) -> Self {
        let text = text.into();
        let columns = font::text_columns(&text);
        Self {
            text,
            columns,
            position: matrix_width as isize,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Display column of the first text column for the next render.
    pub fn position(&self) -> isize {
        self.position
    }

    /// Width of the rendered text in columns.
    pub fn text_width(&self) -> usize {
        self.columns.len()
    }

    fn has_exited(&self) -> bool {
        self.position + self.columns.len() as isize <= 0
    }

    pub fn render(&mut self, ctx: &RenderContext, staging: &mut FrameBuffer) -> RenderOutcome {
        if self.columns.is_empty() {
            render_off(staging);
            return RenderOutcome::Finished;
        }

        let top = staging.height().saturating_sub(font::GLYPH_HEIGHT) / 2;
        for x in 0..staging.width() {
            let column = usize::try_from(x as isize - self.position)
                .ok()
                .and_then(|i| self.columns.get(i))
                .copied()
                .unwrap_or(0);
            for y in 0..staging.height() {
                let lit = y
                    .checked_sub(top)
                    .filter(|row| *row < font::GLYPH_HEIGHT)
                    .is_some_and(|row| column & (1 << row) != 0);
                let color = if lit { ctx.text_color } else { Color::BLACK };
                staging.set(x, y, color);
            }
        }

        if self.has_exited() {
            return RenderOutcome::Finished;
        }
        self.position -= 1;
        RenderOutcome::Continue
    }
}

// ── Dispatch ─────────────────────────────────────────────────────────

/// The live renderer for the active mode.
///
/// Dropping it discards all progress; renderers hold no other resources.
#[derive(Clone, Debug, Default)]
pub enum Animation {
    #[default]
    Off,
    HueCycle(HueCycle),
    ImagePan(ImagePan),
    FramePlayback(FramePlayback),
    ScrollText(ScrollText),
}

impl Animation {
    /// Build a fresh renderer for `mode`.
    ///
    /// Asset-backed modes fall back to [`Animation::Off`] when `asset` is
    /// `None`, so a failed load shows a blank display instead of stale
    /// pixels.
    pub fn start(
        mode: &AnimationMode,
        asset: Option<Arc<AnimationAsset>>,
        matrix_width: usize,
    ) -> Self {
        match (mode, asset) {
            (AnimationMode::Off, _) => Self::Off,
            (AnimationMode::HueCycle, _) => Self::HueCycle(HueCycle::new()),
            (AnimationMode::ImagePan(_), Some(asset)) => Self::ImagePan(ImagePan::new(asset)),
            (AnimationMode::FramePlayback(_), Some(asset)) => {
                Self::FramePlayback(FramePlayback::new(asset))
            }
            (AnimationMode::ImagePan(_) | AnimationMode::FramePlayback(_), None) => Self::Off,
            (AnimationMode::ScrollText(text), _) => {
                Self::ScrollText(ScrollText::new(text.clone(), matrix_width))
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::HueCycle(_) => "hue-cycle",
            Self::ImagePan(_) => "image-pan",
            Self::FramePlayback(_) => "frame-playback",
            Self::ScrollText(_) => "scroll-text",
        }
    }

    /// Paint one full frame into `staging` and advance by one tick.
    pub fn render(
        &mut self,
        ctx: &RenderContext,
        staging: &mut FrameBuffer,
    ) -> Result<RenderOutcome, RenderError> {
        match self {
            Self::Off => {
                render_off(staging);
                Ok(RenderOutcome::Continue)
            }
            Self::HueCycle(hue) => Ok(hue.render(ctx, staging)),
            Self::ImagePan(pan) => Ok(pan.render(staging)),
            Self::FramePlayback(playback) => playback.render(staging),
            Self::ScrollText(scroll) => Ok(scroll.render(ctx, staging)),
        }
    }
}
