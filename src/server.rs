//! HTTP API server: axum router and request handlers.
//!
//! The server runs on the tokio async runtime while the scheduler runs on a
//! plain `std::thread`. Handlers never talk to the render thread directly:
//! they write the shared [`ControlState`](crate::control::ControlState) and
//! the scheduler picks the change up at its next tick.
//!
//! ## Rust concepts
//! - `async fn` and `.await` for non-blocking I/O
//! - axum extractors: `State`, `Json`, `Path`
//! - `Arc` for sharing state across async tasks
//! - Serde `Deserialize` for parsing JSON request bodies
//! - `tower-http` middleware for CORS and request tracing

use crate::control::{ControlHandle, ControlSnapshot, ModeId};
use crate::driver::PreviewDriver;
use crate::font;
use crate::media::{self, AssetEntry, AssetStore};
use crate::scheduler::{DisplayState, DisplayStatus};
use crate::settings::Settings;
use axum::Router;
use axum::extract::{Path, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Json};
use axum::routing::{get, post};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use tower_http::cors::CorsLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

// ── App State ────────────────────────────────────────────────────────

/// Shared application state, passed to every handler via axum's `State` extractor.
///
/// Everything inside is an `Arc` or a small value, so the per-request clone
/// axum makes is cheap.
#[derive(Clone)]
pub struct AppState {
    /// Live animation controls (handlers write, render thread reads)
    pub control: ControlHandle,
    /// Shared display status (render thread writes, handlers read)
    pub status: Arc<Mutex<DisplayStatus>>,
    /// Asset directory, for listing
    pub assets: AssetStore,
    /// Last frame sent to the LEDs
    pub preview: PreviewDriver,
    /// Settings as last saved
    pub settings: Arc<Mutex<Settings>>,
    /// Where to save settings; `None` keeps them in memory only
    pub settings_path: Option<PathBuf>,
}

impl AppState {
    /// Save the current controls so they survive a restart.
    ///
    /// A failed save is logged and otherwise ignored: the change is already
    /// live on the display. The file write runs on the blocking pool so a
    /// slow SD card never stalls the runtime.
    async fn persist(&self) {
        let state = self.clone();
        if let Err(e) = tokio::task::spawn_blocking(move || state.save_settings()).await {
            tracing::warn!("Settings save did not finish: {}", e);
        }
    }

    fn save_settings(&self) {
        let mut settings = self
            .settings
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        settings.record(&self.control.snapshot());
        if let Some(path) = &self.settings_path {
            if let Err(e) = settings.save(path) {
                tracing::warn!("{}", e);
            }
        }
    }
}

// ── OpenAPI Documentation ────────────────────────────────────────────

#[derive(OpenApi)]
#[openapi(
    paths(
        get_status,
        get_assets,
        post_mode,
        post_brightness,
        post_speed,
        post_text,
        post_reload,
        get_preview,
    ),
    components(schemas(
        StatusResponse,
        ControlSnapshot,
        DisplayStatus,
        DisplayState,
        ModeId,
        media::AssetEntry,
        ModeRequest,
        BrightnessRequest,
        SpeedRequest,
        TextRequest,
    )),
    tags(
        (name = "display", description = "Display control endpoints"),
        (name = "assets", description = "Animation asset endpoints"),
        (name = "system", description = "System status endpoints"),
    ),
    info(
        title = "Serpentine Matrix API",
        version = env!("CARGO_PKG_VERSION"),
        description = "HTTP API for controlling a serpentine WS2812 LED matrix"
    )
)]
pub struct ApiDoc;

// ── Request/Response types ───────────────────────────────────────────

#[derive(Serialize, utoipa::ToSchema)]
pub struct StatusResponse {
    /// Controls as the render thread will see them on its next tick
    control: ControlSnapshot,
    /// What the render thread is showing
    display: DisplayStatus,
    /// Frames sent to the LEDs since start-up
    frames_flushed: u64,
}

#[derive(Deserialize, utoipa::ToSchema)]
pub struct ModeRequest {
    /// Animation name or numeric id. Use POST /api/v1/text for text.
    #[schema(example = "vip")]
    mode: ModeId,
}

#[derive(Deserialize, utoipa::ToSchema)]
pub struct BrightnessRequest {
    /// Brightness level (0-255)
    #[schema(example = 128, minimum = 0, maximum = 255)]
    value: u8,
}

#[derive(Deserialize, utoipa::ToSchema)]
pub struct SpeedRequest {
    /// Base tick interval in milliseconds. Each animation multiplies it by its own factor.
    /// Values above 10000 are clamped.
    #[schema(example = 40, minimum = 0, maximum = 10000)]
    ms: u32,
}

#[derive(Deserialize, utoipa::ToSchema)]
pub struct TextRequest {
    /// Text to scroll once across the display. Printable ASCII only; other characters are skipped.
    #[schema(example = "HELLO")]
    text: String,
}

// ── Router ───────────────────────────────────────────────────────────

/// Build the axum router with all API endpoints.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .merge(
            SwaggerUi::new("/docs")
                .url("/api-docs/openapi.json", ApiDoc::openapi())
                .config(
                    utoipa_swagger_ui::Config::new(["/api-docs/openapi.json"])
                        .validator_url("none"),
                ),
        )
        .route("/api/v1/status", get(get_status))
        .route("/api/v1/assets", get(get_assets))
        .route("/api/v1/assets/{name}/reload", post(post_reload))
        .route("/api/v1/mode", post(post_mode))
        .route("/api/v1/brightness", post(post_brightness))
        .route("/api/v1/speed", post(post_speed))
        .route("/api/v1/text", post(post_text))
        .route("/api/v1/preview.png", get(get_preview))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ── Handlers ─────────────────────────────────────────────────────────

/// GET /api/v1/status - return controls and current display state
#[utoipa::path(
    get,
    path = "/api/v1/status",
    tag = "system",
    responses(
        (status = 200, description = "Current controls and display status", body = StatusResponse)
    )
)]
async fn get_status(State(state): State<AppState>) -> Json<StatusResponse> {
    let display = state
        .status
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .clone();
    Json(StatusResponse {
        control: state.control.snapshot(),
        display,
        frames_flushed: state.preview.flush_count(),
    })
}

/// GET /api/v1/assets - list available animation assets
#[utoipa::path(
    get,
    path = "/api/v1/assets",
    tag = "assets",
    responses(
        (status = 200, description = "List of available assets", body = Vec<AssetEntry>)
    )
)]
async fn get_assets(State(state): State<AppState>) -> Json<Vec<AssetEntry>> {
    Json(state.assets.list_assets())
}

/// POST /api/v1/assets/{name}/reload - drop cached assets and load them again
#[utoipa::path(
    post,
    path = "/api/v1/assets/{name}/reload",
    tag = "assets",
    params(("name" = String, Path, description = "Asset name, e.g. vip")),
    responses(
        (status = 200, description = "Reload requested"),
        (status = 404, description = "No such asset")
    )
)]
async fn post_reload(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<StatusCode, (StatusCode, String)> {
    if !state.assets.list_assets().iter().any(|e| e.name == name) {
        return Err((StatusCode::NOT_FOUND, format!("Asset not found: {name}")));
    }
    tracing::info!("Reload requested for {}", name);
    state.control.request_reload();
    Ok(StatusCode::OK)
}

/// POST /api/v1/mode - switch animation
#[utoipa::path(
    post,
    path = "/api/v1/mode",
    tag = "display",
    request_body = ModeRequest,
    responses(
        (status = 200, description = "Animation switched"),
        (status = 400, description = "Text mode requested without text"),
        (status = 422, description = "Unknown animation")
    )
)]
async fn post_mode(
    State(state): State<AppState>,
    Json(req): Json<ModeRequest>,
) -> Result<StatusCode, (StatusCode, String)> {
    if req.mode == ModeId::Text {
        return Err((
            StatusCode::BAD_REQUEST,
            "Use /api/v1/text to show text".to_string(),
        ));
    }
    state.control.set_mode(req.mode);
    state.persist().await;
    Ok(StatusCode::OK)
}

/// POST /api/v1/brightness - set display brightness (0-255)
#[utoipa::path(
    post,
    path = "/api/v1/brightness",
    tag = "display",
    request_body = BrightnessRequest,
    responses(
        (status = 200, description = "Brightness updated"),
        (status = 422, description = "Value out of range")
    )
)]
async fn post_brightness(
    State(state): State<AppState>,
    Json(req): Json<BrightnessRequest>,
) -> StatusCode {
    state.control.set_brightness(req.value);
    state.persist().await;
    StatusCode::OK
}

/// POST /api/v1/speed - set the base tick interval
#[utoipa::path(
    post,
    path = "/api/v1/speed",
    tag = "display",
    request_body = SpeedRequest,
    responses(
        (status = 200, description = "Speed updated"),
    )
)]
async fn post_speed(State(state): State<AppState>, Json(req): Json<SpeedRequest>) -> StatusCode {
    state.control.set_speed(req.ms);
    state.persist().await;
    StatusCode::OK
}

/// POST /api/v1/text - scroll text once, then return to the previous animation
#[utoipa::path(
    post,
    path = "/api/v1/text",
    tag = "display",
    request_body = TextRequest,
    responses(
        (status = 200, description = "Text scrolling started"),
        (status = 400, description = "Nothing printable in the text")
    )
)]
async fn post_text(
    State(state): State<AppState>,
    Json(req): Json<TextRequest>,
) -> Result<StatusCode, (StatusCode, String)> {
    if font::text_columns(&req.text).is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            "Text has no printable characters".to_string(),
        ));
    }
    state.control.set_scroll_text(req.text);
    state.persist().await;
    Ok(StatusCode::OK)
}

/// GET /api/v1/preview.png - last frame sent to the LEDs
#[utoipa::path(
    get,
    path = "/api/v1/preview.png",
    tag = "system",
    responses(
        (status = 200, description = "PNG of the display in virtual layout", content_type = "image/png")
    )
)]
async fn get_preview(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let png = state
        .preview
        .to_png()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    Ok(([(header::CONTENT_TYPE, "image/png")], png))
}
