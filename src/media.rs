//! Asset store: load and discover animation assets in a directory.
//!
//! Assets live flat in one directory as `<name>.json` (multi-frame) or
//! `<name>.png` (single frame). When both exist, the JSON file wins.
//!
//! ## Rust concepts
//! - `fs::read_dir()` for directory traversal
//! - `Path` and `PathBuf` for cross-platform file paths
//! - `io::ErrorKind` to tell "missing" apart from "unreadable"
//! - `serde::Serialize` for automatic JSON conversion

use crate::asset::{AnimationAsset, AssetError, AssetSource};
use image::ImageReader;
use serde::Serialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Information about a single asset file.
#[derive(Debug, PartialEq, Eq, Serialize, utoipa::ToSchema)]
pub struct AssetEntry {
    /// Asset key (e.g., "vip")
    pub name: String,
    /// File format: "json" or "png"
    pub format: String,
    /// File size in bytes
    pub size: u64,
}

/// Reads assets from a directory on demand.
#[derive(Clone, Debug)]
pub struct AssetStore {
    dir: PathBuf,
}

impl AssetStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Scan the directory for loadable asset files.
    pub fn list_assets(&self) -> Vec<AssetEntry> {
        let mut entries: Vec<AssetEntry> = Vec::new();

        let read_dir = match fs::read_dir(&self.dir) {
            Ok(rd) => rd,
            Err(_) => return entries,
        };

        for entry in read_dir.flatten() {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }

            let Some(format) = path
                .extension()
                .and_then(|e| e.to_str())
                .filter(|e| matches!(*e, "json" | "png"))
            else {
                continue;
            };
            let Some(name) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .filter(|s| is_valid_name(s))
            else {
                continue;
            };

            // A JSON file shadows a PNG of the same name.
            if let Some(existing) = entries.iter_mut().find(|e| e.name == name) {
                if format == "json" {
                    existing.format = format.to_string();
                    existing.size = entry.metadata().map(|m| m.len()).unwrap_or(0);
                }
                continue;
            }

            entries.push(AssetEntry {
                name: name.to_string(),
                format: format.to_string(),
                size: entry.metadata().map(|m| m.len()).unwrap_or(0),
            });
        }

        entries.sort_by(|a, b| a.name.cmp(&b.name));
        entries
    }
}

impl AssetSource for AssetStore {
    fn load_asset(&self, name: &str) -> Result<AnimationAsset, AssetError> {
        let not_found = || AssetError::NotFound {
            name: name.to_string(),
        };
        // Names are plain keys, never paths.
        if !is_valid_name(name) {
            return Err(not_found());
        }

        let json = self.dir.join(format!("{name}.json"));
        if json.is_file() {
            return load_json(name, &json);
        }
        let png = self.dir.join(format!("{name}.png"));
        if png.is_file() {
            return load_png(name, &png);
        }
        Err(not_found())
    }
}

fn load_json(name: &str, path: &Path) -> Result<AnimationAsset, AssetError> {
    let bytes = fs::read(path).map_err(|e| io_error(name, e))?;
    AnimationAsset::from_json(name, &bytes)
}

fn load_png(name: &str, path: &Path) -> Result<AnimationAsset, AssetError> {
    let parse_failure = |reason: String| AssetError::ParseFailure {
        name: name.to_string(),
        reason,
    };
    let img = ImageReader::open(path)
        .map_err(|e| io_error(name, e))?
        .decode()
        .map_err(|e| parse_failure(e.to_string()))?
        .to_rgb8();
    AnimationAsset::from_image(name, &img)
}

/// Asset names are `[A-Za-z0-9_-]+`.
pub fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

fn io_error(name: &str, e: io::Error) -> AssetError {
    if e.kind() == io::ErrorKind::NotFound {
        AssetError::NotFound {
            name: name.to_string(),
        }
    } else {
        AssetError::ParseFailure {
            name: name.to_string(),
            reason: e.to_string(),
        }
    }
}
