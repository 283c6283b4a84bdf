//! Control surface: the live parameters the render thread reads every tick.
//!
//! HTTP handlers write here; the scheduler reads a [`ControlSnapshot`] at
//! the top of each tick. Every field is its own atomic, so a write never
//! blocks the render thread and a reader sees each field either before or
//! after a change, never torn. Fields are not updated together: a mode
//! switch and a speed change sent at the same time may land on different
//! ticks, which is fine for a light show.
//!
//! ## Rust concepts
//! - Atomics (`AtomicU8`, `AtomicU32`, `AtomicU64`) instead of a big mutex
//! - `compare_exchange` for "only if nobody changed it meanwhile"
//! - `#[serde(try_from)]` to accept two wire forms for one type

use derive_more::{Display, Error};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::atomic::{AtomicU8, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// Highest brightness level.
pub const MAX_BRIGHTNESS: u8 = u8::MAX;

/// Slowest base speed accepted. Larger values are clamped to this.
pub const MAX_SPEED_MS: u32 = 10_000;

/// Animation ids, numbered as on the sign's web control page.
///
/// Serialized as the lower-case name (`"vip"`); deserializing also accepts
/// the numeric id (`2`).
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema,
)]
#[serde(rename_all = "lowercase", try_from = "ModeRepr")]
pub enum ModeId {
    #[default]
    Off = 0,
    Pride = 1,
    Vip = 2,
    Edm = 3,
    Mod = 4,
    Text = 5,
}

#[derive(Debug, Display, Error, PartialEq, Eq)]
#[display("unknown animation {input:?}")]
pub struct UnknownMode {
    pub input: String,
}

impl ModeId {
    pub const ALL: [Self; 6] = [
        Self::Off,
        Self::Pride,
        Self::Vip,
        Self::Edm,
        Self::Mod,
        Self::Text,
    ];

    pub fn id(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::Pride => "pride",
            Self::Vip => "vip",
            Self::Edm => "edm",
            Self::Mod => "mod",
            Self::Text => "text",
        }
    }

    pub fn from_id(id: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.id() == id)
    }
}

impl std::fmt::Display for ModeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ModeId {
    type Err = UnknownMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let unknown = || UnknownMode {
            input: s.to_string(),
        };
        if let Ok(id) = s.parse::<u8>() {
            return Self::from_id(id).ok_or_else(unknown);
        }
        Self::ALL
            .into_iter()
            .find(|m| m.name().eq_ignore_ascii_case(s))
            .ok_or_else(unknown)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ModeRepr {
    Id(u8),
    Name(String),
}

impl TryFrom<ModeRepr> for ModeId {
    type Error = UnknownMode;

    fn try_from(repr: ModeRepr) -> Result<Self, Self::Error> {
        match repr {
            ModeRepr::Id(id) => Self::from_id(id).ok_or(UnknownMode {
                input: id.to_string(),
            }),
            ModeRepr::Name(name) => name.parse(),
        }
    }
}

/// One coherent-enough read of the control state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, utoipa::ToSchema)]
pub struct ControlSnapshot {
    /// Requested animation
    pub mode: ModeId,
    /// Global brightness (0-255)
    pub brightness: u8,
    /// Base tick interval in milliseconds, before the per-animation multiplier
    pub speed_ms: u32,
    /// Bumped every time new scroll text is submitted
    pub text_generation: u64,
    /// Bumped every time an asset reload is requested
    pub reload_generation: u64,
}

/// Shared handle to the control state.
pub type ControlHandle = Arc<ControlState>;

/// Process-wide animation controls.
#[derive(Debug)]
pub struct ControlState {
    mode: AtomicU8,
    brightness: AtomicU8,
    speed_ms: AtomicU32,
    scroll_text: Mutex<String>,
    text_generation: AtomicU64,
    reload_generation: AtomicU64,
}

impl ControlState {
    pub fn new(mode: ModeId, brightness: u8, speed_ms: u32) -> Self {
        Self {
            mode: AtomicU8::new(mode.id()),
            brightness: AtomicU8::new(brightness),
            speed_ms: AtomicU32::new(speed_ms.min(MAX_SPEED_MS)),
            scroll_text: Mutex::new(String::new()),
            text_generation: AtomicU64::new(0),
            reload_generation: AtomicU64::new(0),
        }
    }

    pub fn into_handle(self) -> ControlHandle {
        Arc::new(self)
    }

    pub fn set_mode(&self, mode: ModeId) {
        self.mode.store(mode.id(), Ordering::SeqCst);
    }

    pub fn set_brightness(&self, level: u8) {
        self.brightness.store(level, Ordering::SeqCst);
    }

    /// Set the base tick interval, clamped to [`MAX_SPEED_MS`].
    pub fn set_speed(&self, speed_ms: u32) {
        self.speed_ms.store(speed_ms.min(MAX_SPEED_MS), Ordering::SeqCst);
    }

    /// Queue new text and switch to the text animation.
    ///
    /// Submitting text while text is already scrolling restarts the scroll
    /// with the new string.
    pub fn set_scroll_text(&self, text: impl Into<String>) {
        {
            let mut current = self.scroll_text.lock().unwrap_or_else(PoisonError::into_inner);
            *current = text.into();
            // Bumped under the lock so readers of `text_entry` see a matching pair.
            self.text_generation.fetch_add(1, Ordering::SeqCst);
        }
        self.set_mode(ModeId::Text);
    }

    /// Ask the render thread to drop cached assets and load them again.
    pub fn request_reload(&self) {
        self.reload_generation.fetch_add(1, Ordering::SeqCst);
    }

    /// Leave text mode for `previous` once the text from `generation` has
    /// scrolled past.
    ///
    /// Does nothing if another mode was picked meanwhile, or if newer text
    /// arrived (that text still has to be shown).
    pub fn finish_text(&self, previous: ModeId, generation: u64) -> bool {
        if self.text_generation.load(Ordering::SeqCst) != generation {
            return false;
        }
        let restored = self
            .mode
            .compare_exchange(
                ModeId::Text.id(),
                previous.id(),
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_ok();
        // New text slipped in between the check and the swap.
        if restored && self.text_generation.load(Ordering::SeqCst) != generation {
            self.set_mode(ModeId::Text);
            return false;
        }
        restored
    }

    pub fn mode(&self) -> ModeId {
        ModeId::from_id(self.mode.load(Ordering::SeqCst)).unwrap_or_default()
    }

    pub fn brightness(&self) -> u8 {
        self.brightness.load(Ordering::SeqCst)
    }

    pub fn speed_ms(&self) -> u32 {
        self.speed_ms.load(Ordering::SeqCst)
    }

    pub fn scroll_text(&self) -> String {
        self.scroll_text
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The scroll text together with the generation it was submitted as.
    pub fn text_entry(&self) -> (String, u64) {
        let text = self.scroll_text.lock().unwrap_or_else(PoisonError::into_inner);
        (text.clone(), self.text_generation.load(Ordering::SeqCst))
    }

    pub fn snapshot(&self) -> ControlSnapshot {
        ControlSnapshot {
            mode: self.mode(),
            brightness: self.brightness(),
            speed_ms: self.speed_ms(),
            text_generation: self.text_generation.load(Ordering::SeqCst),
            reload_generation: self.reload_generation.load(Ordering::SeqCst),
        }
    }
}

impl Default for ControlState {
    fn default() -> Self {
        Self::new(ModeId::Off, MAX_BRIGHTNESS, 40)
    }
}
