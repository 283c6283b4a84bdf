//! Persistent settings: what the sign comes back up with after a restart.
//!
//! Stored as pretty JSON. Every field has a default, so an older or
//! hand-trimmed file still loads:
//!
//! ```json
//! { "brightness": 120, "animation": "vip", "speed_ms": 40 }
//! ```
//!
//! ## Rust concepts
//! - `#[serde(default)]` to fill in missing keys from `Default`
//! - Write-to-temp then `fs::rename` so a crash never leaves half a file

use crate::Color;
use crate::animation::RenderContext;
use crate::control::{ControlSnapshot, ControlState, MAX_BRIGHTNESS, ModeId};
use crate::scheduler::SpeedMultipliers;
use derive_more::{Display, Error};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

#[derive(Debug, Display, Error)]
pub enum SettingsError {
    #[display("cannot access settings file {}: {source}", path.display())]
    Io { path: PathBuf, source: io::Error },
    #[display("settings file {} is not valid: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Global brightness (0-255)
    pub brightness: u8,
    /// Animation shown at start-up. Never `text`.
    pub animation: ModeId,
    /// Base tick interval in milliseconds
    pub speed_ms: u32,
    pub multipliers: SpeedMultipliers,
    /// Hue advance per tick for the rainbow
    pub hue_step: u8,
    /// Scroll text color as `[r, g, b]`
    pub text_color: [u8; 3],
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            brightness: MAX_BRIGHTNESS,
            animation: ModeId::Off,
            speed_ms: 40,
            multipliers: SpeedMultipliers::default(),
            hue_step: 1,
            text_color: [255, 255, 255],
        }
    }
}

impl Settings {
    /// Read settings from `path`. A missing file is not an error: it means
    /// first boot, and defaults apply.
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::info!("No settings at {}, using defaults", path.display());
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(SettingsError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        let mut settings: Self =
            serde_json::from_slice(&bytes).map_err(|source| SettingsError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        if settings.animation == ModeId::Text {
            settings.animation = ModeId::Off;
        }
        Ok(settings)
    }

    /// Write settings to `path`, replacing the old file in one step.
    pub fn save(&self, path: &Path) -> Result<(), SettingsError> {
        let io_error = |source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        };
        let json = serde_json::to_vec_pretty(self).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        fs::write(&tmp, json).map_err(io_error)?;
        fs::rename(&tmp, path).map_err(io_error)?;

        tracing::debug!("Saved settings to {}", path.display());
        Ok(())
    }

    /// Copy the live controls into these settings.
    ///
    /// Text mode is transient, so the animation it interrupted stays
    /// recorded.
    pub fn record(&mut self, snapshot: &ControlSnapshot) {
        self.brightness = snapshot.brightness;
        self.speed_ms = snapshot.speed_ms;
        if snapshot.mode != ModeId::Text {
            self.animation = snapshot.mode;
        }
    }

    pub fn control_state(&self) -> ControlState {
        ControlState::new(self.animation, self.brightness, self.speed_ms)
    }

    pub fn render_context(&self) -> RenderContext {
        RenderContext {
            hue_step: self.hue_step,
            text_color: Color::from(self.text_color),
        }
    }
}
