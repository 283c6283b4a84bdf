//! Serpentine matrix HTTP API server
//!
//! Runs the animation scheduler and a web server that lets any device on
//! the LAN switch animations, change brightness and speed, or scroll text.
//!
//! ## Architecture
//! - **Render thread** (std::thread): owns the scheduler, buffers, and driver
//! - **HTTP server** (tokio/axum): writes the shared control state
//!
//! ## Rust concepts
//! - `#[tokio::main]` async entry point
//! - `std::thread::spawn` for the render thread
//! - `Arc<AtomicBool>` shutdown flag shared by Ctrl+C, the render thread,
//!   and the server
//!
//! ## Usage
//! ```sh
//! ./target/release/serpentine-matrix --assets-dir ./assets --port 8080
//! ```

use clap::Parser;
use serpentine_matrix::control::ControlHandle;
use serpentine_matrix::driver::PreviewDriver;
use serpentine_matrix::layout::MatrixGeometry;
use serpentine_matrix::media::AssetStore;
use serpentine_matrix::scheduler::{DisplayStatus, Scheduler};
use serpentine_matrix::server::{self, AppState};
use serpentine_matrix::settings::Settings;
use serpentine_matrix::{is_running, setup_signal_handler};
use std::error::Error;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Serpentine matrix HTTP API server
#[derive(Parser)]
#[command(name = "serpentine-matrix")]
#[command(about = "Animation engine and HTTP API for a serpentine WS2812 LED matrix")]
#[command(version)]
struct Args {
    /// Settings file, created on the first change
    #[arg(long, default_value = "settings.json")]
    settings: PathBuf,

    /// Directory holding <name>.json and <name>.png animation assets
    #[arg(long, default_value = "assets")]
    assets_dir: PathBuf,

    /// Port to listen on
    #[arg(long, default_value = "8080")]
    port: u16,

    /// Columns on one panel
    #[arg(long, default_value = "16")]
    panel_width: NonZeroUsize,

    /// Rows on one panel
    #[arg(long, default_value = "10")]
    panel_height: NonZeroUsize,

    /// Panels chained left to right
    #[arg(long, default_value = "3")]
    panels: NonZeroUsize,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();

    let filter =
        EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&args.log_level))?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(false) // Disable ANSI color codes for systemd/journald
        .compact()
        .init();

    let geometry = MatrixGeometry::new(
        args.panel_width.get(),
        args.panel_height.get(),
        args.panels.get(),
    );

    let settings = Settings::load(&args.settings).unwrap_or_else(|e| {
        tracing::error!("{}; using defaults", e);
        Settings::default()
    });

    tracing::info!("Serpentine matrix server v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        "Matrix: {}x{} ({} panels of {}x{})",
        geometry.width(),
        geometry.height(),
        geometry.panels,
        geometry.panel_width,
        geometry.panel_height
    );
    tracing::info!("Assets dir: {}", args.assets_dir.display());
    tracing::info!("Settings: {}", args.settings.display());
    tracing::info!(
        "Start-up: {} at brightness {}, speed {}ms",
        settings.animation,
        settings.brightness,
        settings.speed_ms
    );

    let running = setup_signal_handler()?;
    let control: ControlHandle = settings.control_state().into_handle();
    let status = Arc::new(Mutex::new(DisplayStatus::new()));
    let assets = AssetStore::new(&args.assets_dir);
    let preview = PreviewDriver::new(geometry);

    // Spawn the render thread.
    let mut scheduler = Scheduler::new(
        geometry,
        preview.clone(),
        assets.clone(),
        control.clone(),
        status.clone(),
    )
    .with_render_context(settings.render_context())
    .with_multipliers(settings.multipliers);
    let render_running = running.clone();
    let render_handle = std::thread::spawn(move || {
        scheduler.preload();
        scheduler.run(&render_running);
    });

    // Build the HTTP server
    let app_state = AppState {
        control,
        status,
        assets,
        preview,
        settings: Arc::new(Mutex::new(settings)),
        settings_path: Some(args.settings),
    };
    let app = server::create_router(app_state);

    let addr = format!("0.0.0.0:{}", args.port);
    tracing::info!("Listening on http://{}", addr);
    tracing::info!("API Documentation: http://localhost:{}/docs", args.port);
    tracing::info!("Try: curl http://localhost:{}/api/v1/status", args.port);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let server_running = running.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let mut poll = tokio::time::interval(Duration::from_millis(200));
            while is_running(&server_running) {
                poll.tick().await;
            }
            tracing::info!("Shutting down HTTP server");
        })
        .await?;

    if render_handle.join().is_err() {
        tracing::error!("Render thread panicked");
    }
    Ok(())
}
