//! Render thread: paces ticks, switches animations, commits frames.
//!
//! The scheduler owns everything on the hot path: both pixel buffers, the
//! asset cache, the live renderer, and the LED driver. Other threads only
//! reach it through the [`ControlState`](crate::control::ControlState)
//! handle, which it reads once at the top of every tick.
//!
//! One tick:
//! 1. snapshot the control state
//! 2. if the requested animation changed, enter it (reset progress, clear
//!    staging, load its asset from cache or disk)
//! 3. render a full frame into staging
//! 4. commit staging → display → LEDs
//! 5. sleep until the next deadline, waking early for shutdown or a new mode
//!
//! Mode changes are only noticed at step 1, so every committed frame comes
//! from exactly one renderer.
//!
//! ## Rust concepts
//! - Generic parameters for the driver and asset source, so tests can swap
//!   in fakes without trait objects
//! - `HashMap<String, Arc<T>>` as a cache that hands out cheap clones
//! - `Instant` arithmetic for drift-free pacing

use crate::animation::{Animation, AnimationMode, RenderContext, RenderOutcome};
use crate::asset::{AnimationAsset, AssetError, AssetSource};
use crate::control::{ControlHandle, ControlSnapshot, ModeId};
use crate::driver::LedDriver;
use crate::frame::Composer;
use crate::is_running;
use crate::layout::MatrixGeometry;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

/// Slow ticks reported before going quiet.
const SLOW_TICK_REPORTS: u32 = 5;

/// Longest time between two ticks, whatever the speed and multiplier.
pub const MAX_INTERVAL: Duration = Duration::from_secs(60);

/// Longest single sleep in [`Scheduler::run`]. Shutdown and mode changes
/// are noticed within this long.
const SLEEP_SLICE: Duration = Duration::from_millis(50);

// ── Pacing ───────────────────────────────────────────────────────────

/// Per-animation multipliers applied to the base speed.
///
/// Text, rainbow, and image animations each look right at a different
/// cadence, so one speed knob scales them differently.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(default)]
pub struct SpeedMultipliers {
    pub off: u32,
    pub hue_cycle: u32,
    pub image_pan: u32,
    pub frame_playback: u32,
    pub scroll_text: u32,
}

impl Default for SpeedMultipliers {
    fn default() -> Self {
        Self {
            off: 1,
            hue_cycle: 1,
            image_pan: 12,
            frame_playback: 4,
            scroll_text: 2,
        }
    }
}

impl SpeedMultipliers {
    pub fn for_mode(&self, mode: &AnimationMode) -> u32 {
        match mode {
            AnimationMode::Off => self.off,
            AnimationMode::HueCycle => self.hue_cycle,
            AnimationMode::ImagePan(_) => self.image_pan,
            AnimationMode::FramePlayback(_) => self.frame_playback,
            AnimationMode::ScrollText(_) => self.scroll_text,
        }
    }

    /// Time between ticks for `mode` at base speed `speed_ms`.
    /// Never zero, so a zero speed cannot spin the render thread, and never
    /// above [`MAX_INTERVAL`].
    pub fn interval(&self, mode: &AnimationMode, speed_ms: u32) -> Duration {
        let ms = speed_ms.saturating_mul(self.for_mode(mode)).max(1);
        Duration::from_millis(u64::from(ms)).min(MAX_INTERVAL)
    }
}

// ── Status ───────────────────────────────────────────────────────────

/// Scheduler lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SchedulerState {
    /// Nothing committed yet.
    Idle,
    /// Showing the given animation.
    Running(ModeId),
}

/// What the display is currently doing, as reported over HTTP.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum DisplayState {
    Idle,
    Running,
}

/// Shared status that the HTTP server can read to report current state.
///
/// Written by the render thread when it enters an animation or hits an
/// error; never on every tick.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, utoipa::ToSchema)]
pub struct DisplayStatus {
    /// Current display state
    pub state: DisplayState,
    /// Animation id being shown
    pub mode: Option<ModeId>,
    /// Renderer in use (falls back to "off" when an asset is missing)
    pub animation: String,
    /// Asset in use, if any
    pub asset: Option<String>,
    /// Frames in the asset in use
    pub total_frames: Option<usize>,
    /// Most recent asset or render error since the last mode entry
    pub last_error: Option<String>,
    /// Server version
    pub version: String,
}

impl DisplayStatus {
    pub fn new() -> Self {
        Self {
            state: DisplayState::Idle,
            mode: None,
            animation: "off".to_string(),
            asset: None,
            total_frames: None,
            last_error: None,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl Default for DisplayStatus {
    fn default() -> Self {
        Self::new()
    }
}

// ── Scheduler ────────────────────────────────────────────────────────

/// Identifies one entry into an animation. When this changes, the
/// scheduler starts the animation over.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct EntryKey {
    mode: ModeId,
    /// Only tracked in text mode: new text restarts the scroll.
    text_generation: u64,
    reload_generation: u64,
}

impl From<&ControlSnapshot> for EntryKey {
    fn from(snap: &ControlSnapshot) -> Self {
        Self {
            mode: snap.mode,
            text_generation: if snap.mode == ModeId::Text {
                snap.text_generation
            } else {
                0
            },
            reload_generation: snap.reload_generation,
        }
    }
}

pub struct Scheduler<D, S> {
    geometry: MatrixGeometry,
    composer: Composer,
    driver: D,
    assets: S,
    cache: HashMap<String, Arc<AnimationAsset>>,
    control: ControlHandle,
    status: Arc<Mutex<DisplayStatus>>,
    ctx: RenderContext,
    multipliers: SpeedMultipliers,
    state: SchedulerState,
    entry: Option<EntryKey>,
    mode: AnimationMode,
    animation: Animation,
    /// Where to go once a one-shot text scroll is done.
    text_return: ModeId,
    slow_ticks: u32,
}

impl<D: LedDriver, S: AssetSource> Scheduler<D, S> {
    pub fn new(
        geometry: MatrixGeometry,
        driver: D,
        assets: S,
        control: ControlHandle,
        status: Arc<Mutex<DisplayStatus>>,
    ) -> Self {
        Self {
            geometry,
            composer: Composer::new(geometry),
            driver,
            assets,
            cache: HashMap::new(),
            control,
            status,
            ctx: RenderContext::default(),
            multipliers: SpeedMultipliers::default(),
            state: SchedulerState::Idle,
            entry: None,
            mode: AnimationMode::Off,
            animation: Animation::Off,
            text_return: ModeId::Off,
            slow_ticks: 0,
        }
    }

    pub fn with_render_context(mut self, ctx: RenderContext) -> Self {
        self.ctx = ctx;
        self
    }

    pub fn with_multipliers(mut self, multipliers: SpeedMultipliers) -> Self {
        self.multipliers = multipliers;
        self
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn animation(&self) -> &Animation {
        &self.animation
    }

    pub fn composer(&self) -> &Composer {
        &self.composer
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// Load every asset an animation id can ask for, so the first entry
    /// does not wait on disk. Failures are logged and retried on the next
    /// entry.
    pub fn preload(&mut self) {
        for id in ModeId::ALL {
            let mode = AnimationMode::resolve(id, String::new);
            let Some(key) = mode.asset_key() else {
                continue;
            };
            if let Err(e) = self.asset(key) {
                tracing::warn!("Preload skipped: {}", e);
            }
        }
    }

    /// Run one tick and return how long to wait before the next one.
    pub fn tick(&mut self) -> Duration {
        let snap = self.control.snapshot();
        let mut key = EntryKey::from(&snap);
        if self.entry != Some(key) {
            key = self.enter(key);
        }

        match self
            .animation
            .render(&self.ctx, self.composer.staging_mut())
        {
            Ok(outcome) => {
                if let Err(e) = self.composer.commit(&mut self.driver, snap.brightness) {
                    tracing::warn!("{}", e);
                }
                self.state = SchedulerState::Running(key.mode);
                if outcome == RenderOutcome::Finished {
                    self.finish_text(key);
                }
            }
            Err(e) => {
                // Leave the display on its last good frame.
                tracing::error!("Render skipped: {}", e);
                self.update_status(|s| s.last_error = Some(e.to_string()));
            }
        }

        self.multipliers.interval(&self.mode, snap.speed_ms)
    }

    /// Tick until `running` goes false, then blank the display.
    pub fn run(&mut self, running: &AtomicBool) {
        tracing::info!("Render thread started");
        let mut due = Instant::now();

        while is_running(running) {
            let tick_start = Instant::now();
            let interval = self.tick();

            let tick_time = tick_start.elapsed();
            if tick_time > interval {
                self.slow_ticks += 1;
                if self.slow_ticks <= SLOW_TICK_REPORTS {
                    tracing::warn!(
                        "Tick took {}ms (target: {}ms)",
                        tick_time.as_millis(),
                        interval.as_millis()
                    );
                }
            }

            due = self.wait_for_next_tick(running, due);
        }

        self.composer.staging_mut().clear();
        if let Err(e) = self.composer.commit(&mut self.driver, 0) {
            tracing::warn!("{}", e);
        }
        if self.slow_ticks > 0 {
            tracing::warn!("Render thread saw {} slow ticks", self.slow_ticks);
        }
        tracing::info!("Render thread stopped");
    }

    /// Sleep in short slices until one interval past `due`, and return the
    /// time the next tick counts as due.
    ///
    /// The interval is recomputed every slice, so a speed change applies to
    /// the wait already in progress. A new mode, new text, a reload request,
    /// or shutdown ends the wait at once.
    fn wait_for_next_tick(&self, running: &AtomicBool, due: Instant) -> Instant {
        let mut slept = false;
        loop {
            let snap = self.control.snapshot();
            let now = Instant::now();
            if !is_running(running) || self.entry != Some(EntryKey::from(&snap)) {
                return now;
            }
            let next = due + self.multipliers.interval(&self.mode, snap.speed_ms);
            match next.checked_duration_since(now) {
                Some(wait) if !wait.is_zero() => {
                    thread::sleep(wait.min(SLEEP_SLICE));
                    slept = true;
                }
                // Running late: start the next tick now instead of bursting.
                _ if !slept => return now,
                _ => return next,
            }
        }
    }

    fn enter(&mut self, mut key: EntryKey) -> EntryKey {
        let reloading = self
            .entry
            .is_some_and(|prev| prev.reload_generation != key.reload_generation);
        if reloading {
            tracing::info!("Reloading {} cached assets", self.cache.len());
            self.cache.clear();
        }

        if let Some(prev) = self
            .entry
            .filter(|prev| key.mode == ModeId::Text && prev.mode != ModeId::Text)
        {
            self.text_return = prev.mode;
        }

        let control = &self.control;
        let mut text_generation = None;
        let mode = AnimationMode::resolve(key.mode, || {
            let (text, generation) = control.text_entry();
            text_generation = Some(generation);
            text
        });
        // The snapshot may predate the text just read; key on the text.
        if let Some(generation) = text_generation {
            key.text_generation = generation;
        }
        let mut load_error = None;
        let asset = match mode.asset_key() {
            Some(name) => match self.asset(name) {
                Ok(asset) => Some(asset),
                Err(e) => {
                    tracing::error!("Showing blank display: {}", e);
                    load_error = Some(e.to_string());
                    None
                }
            },
            None => None,
        };

        self.animation = Animation::start(&mode, asset.clone(), self.geometry.width());
        // Nothing from the previous animation may survive into this one.
        self.composer.staging_mut().clear();
        self.entry = Some(key);

        tracing::info!("Entering {} ({})", key.mode, self.animation.name());

        let animation = self.animation.name().to_string();
        self.mode = mode;
        self.update_status(|s| {
            s.state = DisplayState::Running;
            s.mode = Some(key.mode);
            s.animation = animation;
            s.asset = asset.as_ref().map(|a| a.key().to_string());
            s.total_frames = asset.as_ref().map(|a| a.frame_count());
            s.last_error = load_error;
        });
        key
    }

    fn finish_text(&mut self, key: EntryKey) {
        if self
            .control
            .finish_text(self.text_return, key.text_generation)
        {
            tracing::info!("Text finished, back to {}", self.text_return);
        }
    }

    fn asset(&mut self, name: &str) -> Result<Arc<AnimationAsset>, AssetError> {
        if let Some(asset) = self.cache.get(name) {
            return Ok(Arc::clone(asset));
        }
        let asset = Arc::new(self.assets.load_asset(name)?);
        tracing::info!(
            "Loaded asset {} ({} frames, {}x{})",
            name,
            asset.frame_count(),
            asset.width(),
            asset.height()
        );
        self.cache.insert(name.to_string(), Arc::clone(&asset));
        Ok(asset)
    }

    fn update_status(&self, update: impl FnOnce(&mut DisplayStatus)) {
        update(&mut self.status.lock().unwrap_or_else(PoisonError::into_inner));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Color;
    use crate::animation::{HueCycle, ImagePan};
    use crate::asset::AnimationFrame;
    use crate::control::{ControlState, MAX_SPEED_MS};
    use crate::driver::{DriverError, PreviewDriver};
    use crate::frame::FrameBuffer;
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use std::cell::{Cell, RefCell};
    use std::sync::atomic::Ordering;
    use std::sync::mpsc;

    /// Keeps every flushed frame.
    #[derive(Default)]
    struct RecordingDriver {
        frames: Vec<(Vec<Color>, u8)>,
        /// Runs during the first flush, standing in for a concurrent writer.
        on_first_flush: Option<Box<dyn FnOnce()>>,
        fail: bool,
    }

    impl LedDriver for RecordingDriver {
        fn flush(&mut self, pixels: &[Color], brightness: u8) -> Result<(), DriverError> {
            if let Some(hook) = self.on_first_flush.take() {
                hook();
            }
            if self.fail {
                return Err(DriverError {
                    reason: "strip unplugged".to_string(),
                });
            }
            self.frames.push((pixels.to_vec(), brightness));
            Ok(())
        }
    }

    /// In-memory asset source that counts loads.
    #[derive(Default)]
    struct MemoryAssets {
        assets: RefCell<HashMap<String, AnimationAsset>>,
        loads: Cell<usize>,
    }

    impl MemoryAssets {
        fn with(self, key: &str, color: Color, width: usize, frames: usize) -> Self {
            self.put(key, color, width, frames);
            self
        }

        fn put(&self, key: &str, color: Color, width: usize, frames: usize) {
            let frames = (0..frames)
                .map(|_| AnimationFrame::solid(width, 10, color))
                .collect();
            self.assets
                .borrow_mut()
                .insert(key.to_string(), AnimationAsset::new(key, frames).unwrap());
        }
    }

    impl AssetSource for MemoryAssets {
        fn load_asset(&self, name: &str) -> Result<AnimationAsset, AssetError> {
            self.loads.set(self.loads.get() + 1);
            self.assets
                .borrow()
                .get(name)
                .cloned()
                .ok_or(AssetError::NotFound {
                    name: name.to_string(),
                })
        }
    }

    /// Asset source with nothing in it, usable from another thread.
    struct NoAssets;

    impl AssetSource for NoAssets {
        fn load_asset(&self, name: &str) -> Result<AnimationAsset, AssetError> {
            Err(AssetError::NotFound {
                name: name.to_string(),
            })
        }
    }

    type TestScheduler = Scheduler<RecordingDriver, MemoryAssets>;
    type Parts = (TestScheduler, ControlHandle, Arc<Mutex<DisplayStatus>>);

    fn scheduler(assets: MemoryAssets) -> Parts {
        scheduler_with(assets, RecordingDriver::default())
    }

    fn scheduler_with(assets: MemoryAssets, driver: RecordingDriver) -> Parts {
        let control = ControlState::new(ModeId::Off, 255, 40).into_handle();
        let status = Arc::new(Mutex::new(DisplayStatus::new()));
        let scheduler = Scheduler::new(
            MatrixGeometry::default(),
            driver,
            assets,
            control.clone(),
            status.clone(),
        );
        (scheduler, control, status)
    }

    fn last_frame(scheduler: &TestScheduler) -> &[Color] {
        &scheduler.driver().frames.last().unwrap().0
    }

    fn expected_first_hue_frame() -> Vec<Color> {
        let mut buffer = FrameBuffer::new(MatrixGeometry::default());
        HueCycle::new().render(&RenderContext::default(), &mut buffer);
        buffer.as_physical().to_vec()
    }

    // ── Lifecycle ───────────────────────────────────────────────────

    #[test]
    fn idle_until_first_commit() {
        let (mut scheduler, control, status) = scheduler(MemoryAssets::default());
        control.set_mode(ModeId::Pride);
        assert_eq!(scheduler.state(), SchedulerState::Idle);
        assert_eq!(status.lock().unwrap().state, DisplayState::Idle);

        scheduler.tick();
        assert_eq!(scheduler.state(), SchedulerState::Running(ModeId::Pride));
        assert_eq!(status.lock().unwrap().state, DisplayState::Running);
    }

    #[test]
    fn every_tick_flushes_exactly_once() {
        let (mut scheduler, control, _) = scheduler(MemoryAssets::default());
        control.set_mode(ModeId::Pride);
        for expected in 1..=5 {
            scheduler.tick();
            assert_eq!(scheduler.driver().frames.len(), expected);
        }
    }

    #[test]
    fn brightness_is_passed_to_the_driver() {
        let (mut scheduler, control, _) = scheduler(MemoryAssets::default());
        control.set_brightness(80);
        scheduler.tick();
        assert_eq!(scheduler.driver().frames[0].1, 80);
    }

    // ── Pacing ──────────────────────────────────────────────────────

    #[rstest]
    #[case(ModeId::Off, 40)]
    #[case(ModeId::Pride, 40)]
    #[case(ModeId::Vip, 480)]
    #[case(ModeId::Edm, 160)]
    #[case(ModeId::Text, 80)]
    fn interval_uses_the_mode_multiplier(#[case] mode: ModeId, #[case] expected_ms: u64) {
        let assets = MemoryAssets::default()
            .with("vip", Color::new(1, 0, 0), 16, 1)
            .with("edm", Color::new(0, 1, 0), 16, 4);
        let (mut scheduler, control, _) = scheduler(assets);
        control.set_mode(mode);
        if mode == ModeId::Text {
            control.set_scroll_text("HELLO");
        }
        assert_eq!(scheduler.tick(), Duration::from_millis(expected_ms));
    }

    #[test]
    fn zero_speed_still_waits_a_millisecond() {
        let (mut scheduler, control, _) = scheduler(MemoryAssets::default());
        control.set_speed(0);
        assert_eq!(scheduler.tick(), Duration::from_millis(1));
    }

    #[test]
    fn custom_multipliers_apply() {
        let (scheduler, control, _) = scheduler(MemoryAssets::default());
        let mut scheduler = scheduler.with_multipliers(SpeedMultipliers {
            hue_cycle: 3,
            ..SpeedMultipliers::default()
        });
        control.set_mode(ModeId::Pride);
        control.set_speed(10);
        assert_eq!(scheduler.tick(), Duration::from_millis(30));
    }

    #[test]
    fn interval_never_exceeds_the_cap() {
        let multipliers = SpeedMultipliers {
            hue_cycle: u32::MAX,
            ..SpeedMultipliers::default()
        };
        assert_eq!(
            multipliers.interval(&AnimationMode::HueCycle, MAX_SPEED_MS),
            MAX_INTERVAL
        );
        let pan = AnimationMode::ImagePan("vip".to_string());
        assert_eq!(
            SpeedMultipliers::default().interval(&pan, MAX_SPEED_MS),
            MAX_INTERVAL
        );
    }

    #[test]
    fn speed_changes_cadence_but_not_the_hue_step() {
        let (mut fast, fast_control, _) = scheduler(MemoryAssets::default());
        let (mut slow, slow_control, _) = scheduler(MemoryAssets::default());
        fast_control.set_mode(ModeId::Pride);
        fast_control.set_speed(5);
        slow_control.set_mode(ModeId::Pride);
        slow_control.set_speed(500);

        for _ in 0..4 {
            assert!(fast.tick() < slow.tick());
            assert_eq!(last_frame(&fast), last_frame(&slow));
        }
    }

    // ── Run loop ────────────────────────────────────────────────────

    struct Running {
        preview: PreviewDriver,
        flag: Arc<AtomicBool>,
        stopped: mpsc::Receiver<()>,
    }

    impl Running {
        fn start(control: &ControlHandle) -> Self {
            let geometry = MatrixGeometry::default();
            let preview = PreviewDriver::new(geometry);
            let status = Arc::new(Mutex::new(DisplayStatus::new()));
            let mut scheduler =
                Scheduler::new(geometry, preview.clone(), NoAssets, control.clone(), status);
            let flag = Arc::new(AtomicBool::new(true));
            let thread_flag = flag.clone();
            let (done, stopped) = mpsc::channel();
            thread::spawn(move || {
                scheduler.run(&thread_flag);
                let _ = done.send(());
            });
            Self {
                preview,
                flag,
                stopped,
            }
        }

        /// Wait up to two seconds for `count` flushes.
        fn reached(&self, count: u64) -> bool {
            let give_up = Instant::now() + Duration::from_secs(2);
            while self.preview.flush_count() < count {
                if Instant::now() > give_up {
                    return false;
                }
                thread::sleep(Duration::from_millis(5));
            }
            true
        }

        fn stop(&self) -> bool {
            self.flag.store(false, Ordering::SeqCst);
            self.stopped.recv_timeout(Duration::from_secs(1)).is_ok()
        }
    }

    #[test]
    fn run_stops_promptly_during_a_long_interval() {
        let control = ControlState::new(ModeId::Pride, 255, u32::MAX).into_handle();
        let running = Running::start(&control);
        assert!(running.reached(1));

        assert!(running.stop(), "render thread kept sleeping after shutdown");
        // The blank frame written on the way out.
        assert_eq!(running.preview.flush_count(), 2);
        assert_eq!(running.preview.pixel(0, 0), Color::BLACK);
    }

    #[test]
    fn run_switches_modes_without_waiting_out_the_interval() {
        let control = ControlState::new(ModeId::Pride, 255, MAX_SPEED_MS).into_handle();
        let running = Running::start(&control);
        assert!(running.reached(1));

        control.set_scroll_text("HI");
        assert!(running.reached(2), "mode change waited for the old interval");
        assert!(running.stop());
    }

    #[test]
    fn run_applies_a_faster_speed_to_the_wait_in_progress() {
        let control = ControlState::new(ModeId::Pride, 255, MAX_SPEED_MS).into_handle();
        let running = Running::start(&control);
        assert!(running.reached(1));

        control.set_speed(1);
        assert!(running.reached(5), "speed change waited for the old interval");
        assert!(running.stop());
    }

    // ── Mode switching ──────────────────────────────────────────────

    #[test]
    fn switching_modes_never_mixes_frames() {
        let assets = MemoryAssets::default().with("vip", Color::new(0, 0, 200), 16, 1);
        let (mut scheduler, control, _) = scheduler(assets);

        control.set_mode(ModeId::Pride);
        scheduler.tick();
        assert_eq!(last_frame(&scheduler), expected_first_hue_frame().as_slice());

        control.set_mode(ModeId::Vip);
        scheduler.tick();
        assert!(last_frame(&scheduler).iter().all(|&c| c == Color::new(0, 0, 200)));
    }

    #[test]
    fn switch_during_a_tick_lands_on_the_next_tick() {
        let assets = MemoryAssets::default().with("vip", Color::new(0, 0, 200), 16, 1);
        let control = ControlState::new(ModeId::Pride, 255, 40).into_handle();
        let writer = control.clone();
        let driver = RecordingDriver {
            on_first_flush: Some(Box::new(move || writer.set_mode(ModeId::Vip))),
            ..RecordingDriver::default()
        };
        let status = Arc::new(Mutex::new(DisplayStatus::new()));
        let mut scheduler =
            Scheduler::new(MatrixGeometry::default(), driver, assets, control, status);

        scheduler.tick();
        scheduler.tick();

        let frames = &scheduler.driver().frames;
        assert_eq!(frames[0].0, expected_first_hue_frame());
        assert!(frames[1].0.iter().all(|&c| c == Color::new(0, 0, 200)));
    }

    #[test]
    fn re_entering_a_mode_restarts_its_progress() {
        let (mut scheduler, control, _) = scheduler(MemoryAssets::default());
        control.set_mode(ModeId::Pride);
        for _ in 0..5 {
            scheduler.tick();
        }
        control.set_mode(ModeId::Off);
        scheduler.tick();
        control.set_mode(ModeId::Pride);
        scheduler.tick();

        assert_eq!(last_frame(&scheduler), expected_first_hue_frame().as_slice());
    }

    #[test]
    fn narrow_asset_leaves_no_residue_from_previous_mode() {
        let assets = MemoryAssets::default().with("edm", Color::new(0, 90, 0), 16, 2);
        let (mut scheduler, control, _) = scheduler(assets);
        control.set_mode(ModeId::Pride);
        scheduler.tick();
        control.set_mode(ModeId::Edm);
        scheduler.tick();

        let geometry = MatrixGeometry::default();
        let frame = last_frame(&scheduler);
        for y in 0..10 {
            for x in 0..48 {
                let expected = if (16..32).contains(&x) {
                    Color::new(0, 90, 0)
                } else {
                    Color::BLACK
                };
                assert_eq!(frame[geometry.physical_index(x, y)], expected, "({x}, {y})");
            }
        }
    }

    // ── Assets ──────────────────────────────────────────────────────

    #[test]
    fn missing_asset_commits_a_black_frame_and_reports_it() {
        let (mut scheduler, control, status) = scheduler(MemoryAssets::default());
        control.set_mode(ModeId::Pride);
        scheduler.tick();
        control.set_mode(ModeId::Vip);
        scheduler.tick();

        assert!(last_frame(&scheduler).iter().all(|c| c.is_black()));
        assert!(scheduler.composer().display().is_blank());
        let status = status.lock().unwrap();
        assert_eq!(status.mode, Some(ModeId::Vip));
        assert_eq!(status.animation, "off");
        assert!(status.last_error.as_deref().unwrap().contains("not found"));
    }

    #[test]
    fn assets_load_once_per_entry() {
        let assets = MemoryAssets::default().with("vip", Color::new(1, 1, 1), 16, 1);
        let (mut scheduler, control, _) = scheduler(assets);
        control.set_mode(ModeId::Vip);
        for _ in 0..10 {
            scheduler.tick();
        }
        control.set_mode(ModeId::Off);
        scheduler.tick();
        control.set_mode(ModeId::Vip);
        scheduler.tick();
        // Second entry is a cache hit.
        assert_eq!(scheduler.assets.loads.get(), 1);
    }

    #[test]
    fn failed_load_is_retried_on_next_entry() {
        let (mut scheduler, control, status) = scheduler(MemoryAssets::default());
        control.set_mode(ModeId::Vip);
        scheduler.tick();
        scheduler.tick();
        assert_eq!(scheduler.assets.loads.get(), 1);

        scheduler.assets.put("vip", Color::new(7, 7, 7), 16, 1);
        control.set_mode(ModeId::Off);
        scheduler.tick();
        control.set_mode(ModeId::Vip);
        scheduler.tick();

        assert_eq!(scheduler.assets.loads.get(), 2);
        assert!(last_frame(&scheduler).iter().all(|&c| c == Color::new(7, 7, 7)));
        assert_eq!(status.lock().unwrap().last_error, None);
    }

    #[test]
    fn reload_replaces_cached_assets() {
        let assets = MemoryAssets::default().with("vip", Color::new(1, 0, 0), 16, 1);
        let (mut scheduler, control, _) = scheduler(assets);
        control.set_mode(ModeId::Vip);
        scheduler.tick();

        scheduler.assets.put("vip", Color::new(0, 2, 0), 16, 1);
        scheduler.tick();
        assert!(last_frame(&scheduler).iter().all(|&c| c == Color::new(1, 0, 0)));

        control.request_reload();
        scheduler.tick();
        assert!(last_frame(&scheduler).iter().all(|&c| c == Color::new(0, 2, 0)));
        assert_eq!(scheduler.assets.loads.get(), 2);
    }

    #[test]
    fn preload_fills_the_cache() {
        let assets = MemoryAssets::default().with("vip", Color::new(1, 0, 0), 16, 1);
        let (mut scheduler, control, _) = scheduler(assets);
        // vip, edm, mod
        scheduler.preload();
        assert_eq!(scheduler.assets.loads.get(), 3);

        control.set_mode(ModeId::Vip);
        scheduler.tick();
        assert_eq!(scheduler.assets.loads.get(), 3);
        assert!(matches!(scheduler.animation(), Animation::ImagePan(_)));
    }

    #[test]
    fn oversized_frames_skip_the_commit_but_not_the_scheduler() {
        let assets = MemoryAssets::default().with("edm", Color::new(1, 1, 1), 64, 2);
        let (mut scheduler, control, status) = scheduler(assets);
        control.set_mode(ModeId::Edm);
        scheduler.tick();
        scheduler.tick();

        assert!(scheduler.driver().frames.is_empty());
        assert_eq!(scheduler.state(), SchedulerState::Idle);
        assert!(
            status
                .lock()
                .unwrap()
                .last_error
                .as_deref()
                .unwrap()
                .contains("64 columns")
        );

        control.set_mode(ModeId::Pride);
        scheduler.tick();
        assert_eq!(scheduler.driver().frames.len(), 1);
    }

    #[test]
    fn driver_errors_do_not_stop_ticking() {
        let driver = RecordingDriver {
            fail: true,
            ..RecordingDriver::default()
        };
        let (mut scheduler, control, _) = scheduler_with(MemoryAssets::default(), driver);
        control.set_mode(ModeId::Pride);
        for _ in 0..3 {
            scheduler.tick();
        }
        assert_eq!(scheduler.composer().commits(), 3);
    }

    // ── Scrolling text ──────────────────────────────────────────────

    fn scroll_position(scheduler: &TestScheduler) -> isize {
        match scheduler.animation() {
            Animation::ScrollText(scroll) => scroll.position(),
            other => panic!("expected scroll text, got {}", other.name()),
        }
    }

    #[test]
    fn speed_change_does_not_disturb_the_scroll() {
        let (mut scheduler, control, _) = scheduler(MemoryAssets::default());
        control.set_scroll_text("HELLO WORLD");
        scheduler.tick();
        scheduler.tick();
        let before = scroll_position(&scheduler);

        control.set_speed(5);
        let interval = scheduler.tick();

        assert_eq!(scroll_position(&scheduler), before - 1);
        assert_eq!(interval, Duration::from_millis(10));
    }

    #[test]
    fn finished_text_returns_to_previous_mode() {
        let assets = MemoryAssets::default().with("vip", Color::new(3, 3, 3), 16, 1);
        let (mut scheduler, control, _) = scheduler(assets);
        control.set_mode(ModeId::Vip);
        scheduler.tick();

        control.set_scroll_text("HI");
        let mut ticks = 0;
        while control.mode() == ModeId::Text {
            scheduler.tick();
            ticks += 1;
            assert!(ticks < 1000, "text never finished");
        }
        assert_eq!(control.mode(), ModeId::Vip);

        scheduler.tick();
        assert!(matches!(scheduler.animation(), Animation::ImagePan(_)));
    }

    #[test]
    fn switching_away_abandons_the_scroll() {
        let (mut scheduler, control, _) = scheduler(MemoryAssets::default());
        control.set_scroll_text("A LONG MESSAGE");
        for _ in 0..10 {
            scheduler.tick();
        }
        control.set_mode(ModeId::Pride);
        scheduler.tick();
        assert!(matches!(scheduler.animation(), Animation::HueCycle(_)));
        assert_eq!(control.mode(), ModeId::Pride);
    }

    #[test]
    fn new_text_restarts_the_scroll() {
        let (mut scheduler, control, _) = scheduler(MemoryAssets::default());
        control.set_scroll_text("FIRST");
        for _ in 0..10 {
            scheduler.tick();
        }
        control.set_scroll_text("SECOND");
        scheduler.tick();
        assert_eq!(scroll_position(&scheduler), 47);
        match scheduler.animation() {
            Animation::ScrollText(scroll) => assert_eq!(scroll.text(), "SECOND"),
            other => panic!("expected scroll text, got {}", other.name()),
        }
    }

    #[test]
    fn text_entry_is_keyed_on_the_text_it_shows() {
        let (mut scheduler, control, _) = scheduler(MemoryAssets::default());
        control.set_scroll_text("FIRST");
        let stale = EntryKey::from(&control.snapshot());
        // Newer text lands between the snapshot and the entry.
        control.set_scroll_text("SECOND");

        let key = scheduler.enter(stale);

        assert_eq!(key.text_generation, 2);
        assert_eq!(scheduler.entry, Some(EntryKey::from(&control.snapshot())));
        match scheduler.animation() {
            Animation::ScrollText(scroll) => assert_eq!(scroll.text(), "SECOND"),
            other => panic!("expected scroll text, got {}", other.name()),
        }
    }

    #[test]
    fn image_pan_progress_matches_a_standalone_renderer() {
        let assets = MemoryAssets::default();
        let strip: Vec<Vec<Color>> = (0..10)
            .map(|y| (0..16).map(|x| Color::new(x as u8, y as u8, 0)).collect())
            .collect();
        let asset = AnimationAsset::new("vip", vec![AnimationFrame::from_rows(strip).unwrap()])
            .unwrap();
        assets
            .assets
            .borrow_mut()
            .insert("vip".to_string(), asset.clone());
        let (mut scheduler, control, _) = scheduler(assets);
        control.set_mode(ModeId::Vip);

        let mut reference = ImagePan::new(Arc::new(asset));
        let mut buffer = FrameBuffer::new(MatrixGeometry::default());
        for _ in 0..20 {
            scheduler.tick();
            reference.render(&mut buffer);
            assert_eq!(last_frame(&scheduler), buffer.as_physical());
        }
    }
}
