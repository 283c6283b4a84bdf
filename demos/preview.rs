//! # Preview Example
//!
//! Runs the scheduler for a few ticks against the in-memory preview driver
//! and writes what the LEDs would show to a PNG. No hardware needed.
//!
//! ## Rust concepts introduced
//! - Generic structs picked at the call site (`Scheduler<PreviewDriver, AssetStore>`)
//! - Cloning an `Arc`-backed handle to read results after handing it off
//!
//! ## Run it
//! ```sh
//! cargo run --example preview -- pride 30 preview.png
//! ```

use serpentine_matrix::control::{ControlState, ModeId};
use serpentine_matrix::driver::PreviewDriver;
use serpentine_matrix::layout::MatrixGeometry;
use serpentine_matrix::media::AssetStore;
use serpentine_matrix::scheduler::{DisplayStatus, Scheduler};
use std::sync::{Arc, Mutex};

fn main() {
    tracing_subscriber::fmt().compact().init();

    let mut args = std::env::args().skip(1);
    let mode: ModeId = args
        .next()
        .unwrap_or_else(|| "pride".to_string())
        .parse()
        .expect("Unknown animation");
    let ticks: usize = args
        .next()
        .map(|n| n.parse().expect("Tick count must be a number"))
        .unwrap_or(30);
    let output = args.next().unwrap_or_else(|| "preview.png".to_string());

    let geometry = MatrixGeometry::default();
    let preview = PreviewDriver::new(geometry);
    let control = ControlState::new(mode, 255, 40).into_handle();
    if mode == ModeId::Text {
        control.set_scroll_text("HELLO");
    }

    let mut scheduler = Scheduler::new(
        geometry,
        preview.clone(),
        AssetStore::new("assets"),
        control,
        Arc::new(Mutex::new(DisplayStatus::new())),
    );
    for _ in 0..ticks {
        scheduler.tick();
    }

    let png = preview.to_png().expect("Failed to encode preview");
    std::fs::write(&output, png).expect("Failed to write preview");
    println!(
        "{} after {} ticks ({} flushes) written to {}",
        mode,
        ticks,
        preview.flush_count(),
        output
    );
}
