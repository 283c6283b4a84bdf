//! Animation assets: named sequences of equally-sized RGB frames.
//!
//! An asset is validated once, when it is built. After that every frame is
//! guaranteed to have the same non-zero dimensions, so renderers can sample
//! it without re-checking shapes on every tick.
//!
//! On disk, an asset is a JSON document of frames → rows → `[r, g, b]`:
//!
//! ```json
//! { "frames": [ [ [[255, 0, 0], [0, 0, 0]], [[0, 0, 0], [255, 0, 0]] ] ] }
//! ```
//!
//! A PNG file is accepted too and becomes a single-frame asset.

use crate::Color;
use derive_more::{Display, Error};
use image::RgbImage;
use serde::Deserialize;
use serde_json::error::Category;

/// Why an asset could not be produced.
#[derive(Clone, Debug, PartialEq, Eq, Display, Error)]
pub enum AssetError {
    #[display("asset {name:?} not found")]
    NotFound { name: String },
    #[display("asset {name:?} could not be parsed: {reason}")]
    ParseFailure { name: String, reason: String },
    #[display("asset {name:?} does not match the frame schema: {reason}")]
    SchemaMismatch { name: String, reason: String },
}

impl AssetError {
    pub fn name(&self) -> &str {
        match self {
            Self::NotFound { name }
            | Self::ParseFailure { name, .. }
            | Self::SchemaMismatch { name, .. } => name,
        }
    }

    fn schema(name: &str, reason: impl Into<String>) -> Self {
        Self::SchemaMismatch {
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}

/// Anything that can hand the scheduler a decoded asset by name.
///
/// Loading may block on disk I/O; the scheduler only calls it when a mode
/// is entered or a reload is requested.
pub trait AssetSource {
    fn load_asset(&self, name: &str) -> Result<AnimationAsset, AssetError>;
}

// ── Frames ───────────────────────────────────────────────────────────

/// One row-major grid of pixels.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AnimationFrame {
    width: usize,
    height: usize,
    pixels: Vec<Color>,
}

impl AnimationFrame {
    /// Build a frame from rows of pixels. Every row must have the same,
    /// non-zero length.
    pub fn from_rows(rows: Vec<Vec<Color>>) -> Result<Self, String> {
        let height = rows.len();
        let width = rows.first().map_or(0, Vec::len);
        if width == 0 || height == 0 {
            return Err("frame has no pixels".to_string());
        }
        if let Some((y, row)) = rows.iter().enumerate().find(|(_, r)| r.len() != width) {
            return Err(format!(
                "row {y} has {} pixels, expected {width}",
                row.len()
            ));
        }
        Ok(Self {
            width,
            height,
            pixels: rows.into_iter().flatten().collect(),
        })
    }

    /// A frame filled with one color.
    pub fn solid(width: usize, height: usize, color: Color) -> Self {
        Self {
            width,
            height,
            pixels: vec![color; width * height],
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Pixel at `(x, y)`; coordinates wrap so any value is safe.
    #[inline]
    pub fn pixel(&self, x: usize, y: usize) -> Color {
        if self.pixels.is_empty() {
            return Color::BLACK;
        }
        let x = x % self.width;
        let y = y % self.height;
        self.pixels[y * self.width + x]
    }

    pub fn set_pixel(&mut self, x: usize, y: usize, color: Color) {
        if x < self.width && y < self.height {
            self.pixels[y * self.width + x] = color;
        }
    }
}

// ── Assets ───────────────────────────────────────────────────────────

/// A non-empty sequence of frames sharing one size, tagged with its key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AnimationAsset {
    key: String,
    frames: Vec<AnimationFrame>,
}

impl AnimationAsset {
    /// Validate and build an asset. Nothing is returned unless every frame
    /// passes.
    pub fn new(key: impl Into<String>, frames: Vec<AnimationFrame>) -> Result<Self, AssetError> {
        let key = key.into();
        let Some(first) = frames.first() else {
            return Err(AssetError::schema(&key, "asset has no frames"));
        };
        let (width, height) = (first.width(), first.height());
        if width == 0 || height == 0 {
            return Err(AssetError::schema(&key, "frame has no pixels"));
        }
        if let Some((i, frame)) = frames
            .iter()
            .enumerate()
            .find(|(_, f)| (f.width(), f.height()) != (width, height))
        {
            return Err(AssetError::schema(
                &key,
                format!(
                    "frame {i} is {}x{}, expected {width}x{height}",
                    frame.width(),
                    frame.height()
                ),
            ));
        }
        Ok(Self { key, frames })
    }

    /// Decode the JSON frame format.
    pub fn from_json(key: &str, bytes: &[u8]) -> Result<Self, AssetError> {
        #[derive(Deserialize)]
        struct RawAsset {
            frames: Vec<Vec<Vec<[u8; 3]>>>,
        }

        let raw: RawAsset = serde_json::from_slice(bytes).map_err(|e| match e.classify() {
            Category::Data => AssetError::schema(key, e.to_string()),
            Category::Io | Category::Syntax | Category::Eof => AssetError::ParseFailure {
                name: key.to_string(),
                reason: e.to_string(),
            },
        })?;

        let frames = raw
            .frames
            .into_iter()
            .enumerate()
            .map(|(i, rows)| {
                let rows = rows
                    .into_iter()
                    .map(|row| row.into_iter().map(Color::from).collect())
                    .collect();
                AnimationFrame::from_rows(rows)
                    .map_err(|reason| AssetError::schema(key, format!("frame {i}: {reason}")))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Self::new(key, frames)
    }

    /// Wrap a decoded image as a single-frame asset.
    pub fn from_image(key: &str, img: &RgbImage) -> Result<Self, AssetError> {
        let (width, height) = (img.width() as usize, img.height() as usize);
        let mut frame = AnimationFrame::solid(width, height, Color::BLACK);
        for (x, y, pixel) in img.enumerate_pixels() {
            frame.set_pixel(x as usize, y as usize, Color::from(pixel.0));
        }
        Self::new(key, vec![frame])
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn frames(&self) -> &[AnimationFrame] {
        &self.frames
    }

    pub fn frame(&self, index: usize) -> Option<&AnimationFrame> {
        self.frames.get(index)
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    pub fn width(&self) -> usize {
        self.frames.first().map_or(0, AnimationFrame::width)
    }

    pub fn height(&self) -> usize {
        self.frames.first().map_or(0, AnimationFrame::height)
    }
}
