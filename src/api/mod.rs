//! HTTP API handlers

pub mod media;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashSet;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use tower::ServiceBuilder;
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};

use crate::config::Config;
use crate::player::{PlayerError, PlayerHandle, PropertyValue, SharedPlayer};
use crate::snapshot::composite::{fetch_composite, PLAYLIST, TRACK_LIST};
use crate::snapshot::{parse_exclude, Aggregator};
use crate::system::{ComputerAction, SharedSystem};

/// Comma-separated keys answered from cache or default in a status response
pub const STALE_HEADER: &str = "x-snapshot-stale";

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub player: SharedPlayer,
    pub aggregator: Arc<Aggregator>,
    pub system: SharedSystem,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(
        player: SharedPlayer,
        aggregator: Arc<Aggregator>,
        system: SharedSystem,
        config: Arc<Config>,
    ) -> Self {
        Self {
            player,
            aggregator,
            system,
            config,
        }
    }
}

/// Body of every success and error response
#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

fn success() -> Json<MessageResponse> {
    Json(MessageResponse {
        message: "success".to_string(),
    })
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error(transparent)]
    Player(#[from] PlayerError),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Player(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::warn!("Request failed: {}", self);
        }
        (
            status,
            Json(MessageResponse {
                message: self.to_string(),
            }),
        )
            .into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

fn parse_param<T: FromStr>(name: &str, raw: &str) -> ApiResult<T> {
    raw.parse()
        .map_err(|_| ApiError::BadRequest(format!("Invalid {}: {}", name, raw)))
}

// =============================================================================
// Router
// =============================================================================

pub fn router(state: AppState) -> Router {
    Router::new()
        // Status
        .route("/api/v1/status", get(status_handler))
        // Media controls
        .route("/api/v1/controls/play-pause", post(play_pause_handler))
        .route("/api/v1/controls/play", post(play_handler))
        .route("/api/v1/controls/pause", post(pause_handler))
        .route("/api/v1/controls/stop", post(stop_handler))
        .route("/api/v1/controls/prev", post(prev_handler))
        .route("/api/v1/controls/next", post(next_handler))
        .route("/api/v1/controls/fullscreen", post(fullscreen_handler))
        .route("/api/v1/controls/volume/{value}", post(volume_handler))
        .route("/api/v1/controls/mute", post(mute_handler))
        .route("/api/v1/controls/seek", post(seek_handler))
        // Tracks
        .route("/api/v1/tracks", get(tracks_handler))
        .route("/api/v1/tracks/audio/reload/{id}", post(audio_reload_handler))
        .route("/api/v1/tracks/audio/cycle", post(audio_cycle_handler))
        .route("/api/v1/tracks/audio/add", post(audio_add_handler))
        .route("/api/v1/tracks/audio/timing/{seconds}", post(audio_timing_handler))
        .route("/api/v1/tracks/sub/timing/{seconds}", post(sub_timing_handler))
        .route("/api/v1/tracks/sub/ass-override/{value}", post(sub_ass_override_handler))
        .route("/api/v1/tracks/sub/font-size/{size}", post(sub_font_size_handler))
        .route("/api/v1/tracks/sub/toggle-visibility", post(sub_toggle_visibility_handler))
        .route("/api/v1/tracks/sub/visibility/{value}", post(sub_visibility_handler))
        .route("/api/v1/tracks/sub/add", post(sub_add_handler))
        .route("/api/v1/tracks/sub/reload/{id}", post(sub_reload_handler))
        // Playlist
        .route("/api/v1/playlist", get(playlist_handler))
        .route("/api/v1/playlist", post(playlist_add_handler))
        .route("/api/v1/playlist/remove/{index}", delete(playlist_remove_handler))
        .route("/api/v1/playlist/move", post(playlist_move_handler))
        .route("/api/v1/playlist/play/{index}", post(playlist_play_handler))
        .route("/api/v1/playlist/prev", post(prev_handler))
        .route("/api/v1/playlist/next", post(next_handler))
        .route("/api/v1/playlist/clear", post(playlist_clear_handler))
        .route("/api/v1/playlist/shuffle", post(playlist_shuffle_handler))
        // Info and host control
        .route("/api/v1/mpvinfo", get(mpvinfo_handler))
        .route("/api/v1/computer/{action}", post(computer_handler))
        // Middleware
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CompressionLayer::new())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

// =============================================================================
// Status
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct StatusQuery {
    pub exclude: Option<String>,
}

/// GET /api/v1/status - Snapshot of player state within the status deadline
pub async fn status_handler(
    State(state): State<AppState>,
    Query(query): Query<StatusQuery>,
) -> Response {
    let excluded: HashSet<String> = parse_exclude(query.exclude.as_deref());
    let snapshot = state.aggregator.status(&excluded).await;

    let stale = snapshot.stale_keys().join(",");
    let mut response = Json(&snapshot).into_response();
    if !stale.is_empty() {
        if let Ok(value) = HeaderValue::from_str(&stale) {
            response.headers_mut().insert(STALE_HEADER, value);
        }
    }
    response
}

// =============================================================================
// Media controls
// =============================================================================

pub async fn play_pause_handler(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    state.player.toggle_pause().await?;
    Ok(success())
}

pub async fn play_handler(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    state.player.play().await?;
    Ok(success())
}

pub async fn pause_handler(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    state.player.pause().await?;
    Ok(success())
}

pub async fn stop_handler(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    state.player.stop().await?;
    Ok(success())
}

/// Also served as /api/v1/playlist/prev
pub async fn prev_handler(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    state.player.prev().await?;
    Ok(success())
}

/// Also served as /api/v1/playlist/next
pub async fn next_handler(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    state.player.next().await?;
    Ok(success())
}

pub async fn fullscreen_handler(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    state.player.toggle_fullscreen().await?;
    Ok(success())
}

pub async fn volume_handler(
    State(state): State<AppState>,
    Path(value): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let volume: f64 = parse_param("volume", &value)?;
    state.player.set_volume(volume).await?;
    Ok(success())
}

pub async fn mute_handler(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    state.player.toggle_mute().await?;
    Ok(success())
}

#[derive(Debug, Deserialize)]
pub struct SeekRequest {
    pub target: f64,
    pub flag: Option<String>,
}

pub async fn seek_handler(
    State(state): State<AppState>,
    Json(req): Json<SeekRequest>,
) -> ApiResult<impl IntoResponse> {
    let flag = req.flag.as_deref().unwrap_or("relative");
    state.player.seek(req.target, flag).await?;
    Ok(success())
}

// =============================================================================
// Tracks
// =============================================================================

/// GET /api/v1/tracks - Full track list, no deadline
pub async fn tracks_handler(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let tracks = fetch_composite(state.player.as_ref(), &TRACK_LIST).await?;
    Ok(Json(tracks))
}

#[derive(Debug, Deserialize)]
pub struct AddFileRequest {
    pub filename: String,
    pub flag: Option<String>,
}

pub async fn audio_reload_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let id: u64 = parse_param("track id", &id)?;
    state.player.select_audio(id).await?;
    Ok(success())
}

pub async fn audio_cycle_handler(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    state.player.cycle_audio().await?;
    Ok(success())
}

pub async fn audio_add_handler(
    State(state): State<AppState>,
    Json(req): Json<AddFileRequest>,
) -> ApiResult<impl IntoResponse> {
    let flag = req.flag.as_deref().unwrap_or("select");
    state.player.add_audio(&req.filename, flag).await?;
    Ok(success())
}

pub async fn audio_timing_handler(
    State(state): State<AppState>,
    Path(seconds): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let seconds: f64 = parse_param("seconds", &seconds)?;
    state.player.set_audio_delay(seconds).await?;
    Ok(success())
}

pub async fn sub_timing_handler(
    State(state): State<AppState>,
    Path(seconds): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let seconds: f64 = parse_param("seconds", &seconds)?;
    state.player.set_subtitle_delay(seconds).await?;
    Ok(success())
}

pub async fn sub_ass_override_handler(
    State(state): State<AppState>,
    Path(value): Path<String>,
) -> ApiResult<impl IntoResponse> {
    state.player.set("sub-ass-override", json!(value)).await?;
    Ok(success())
}

pub async fn sub_font_size_handler(
    State(state): State<AppState>,
    Path(size): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let size: f64 = parse_param("font size", &size)?;
    state.player.set("sub-font-size", json!(size)).await?;
    Ok(success())
}

pub async fn sub_toggle_visibility_handler(
    State(state): State<AppState>,
) -> ApiResult<impl IntoResponse> {
    state.player.toggle_subtitle_visibility().await?;
    Ok(success())
}

/// Anything but a case-insensitive "true" hides subtitles
pub async fn sub_visibility_handler(
    State(state): State<AppState>,
    Path(value): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let visible = value.eq_ignore_ascii_case("true");
    state.player.set("sub-visibility", json!(visible)).await?;
    Ok(success())
}

pub async fn sub_add_handler(
    State(state): State<AppState>,
    Json(req): Json<AddFileRequest>,
) -> ApiResult<impl IntoResponse> {
    let flag = req.flag.as_deref().unwrap_or("select");
    state.player.add_subtitle(&req.filename, flag).await?;
    Ok(success())
}

pub async fn sub_reload_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let id: u64 = parse_param("track id", &id)?;
    state.player.select_subtitle(id).await?;
    Ok(success())
}

// =============================================================================
// Playlist
// =============================================================================

/// GET /api/v1/playlist - Full playlist, no deadline
pub async fn playlist_handler(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let playlist = fetch_composite(state.player.as_ref(), &PLAYLIST).await?;
    Ok(Json(playlist))
}

#[derive(Debug, Deserialize)]
pub struct PlaylistAddRequest {
    pub filename: String,
    pub flag: Option<String>,
    #[serde(rename = "seekTo")]
    pub seek_to: Option<f64>,
}

pub async fn playlist_add_handler(
    State(state): State<AppState>,
    Json(req): Json<PlaylistAddRequest>,
) -> ApiResult<impl IntoResponse> {
    if media::is_directory(&req.filename).await {
        let files = media::media_files(std::path::Path::new(&req.filename)).await?;
        tracing::info!("Appending {} media files from {}", files.len(), req.filename);
        for file in files {
            state
                .player
                .load(&file.to_string_lossy(), "append-play")
                .await?;
        }
        return Ok(success());
    }

    let flag = req.flag.as_deref().unwrap_or("append-play");
    state.player.load(&req.filename, flag).await?;
    if let Some(position) = req.seek_to.filter(|p| *p != 0.0) {
        state.player.seek(position, "absolute").await?;
    }
    Ok(success())
}

pub async fn playlist_remove_handler(
    State(state): State<AppState>,
    Path(index): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let index: u64 = parse_param("index", &index)?;
    state.player.playlist_remove(index).await?;
    Ok(success())
}

#[derive(Debug, Deserialize)]
pub struct MoveQuery {
    #[serde(rename = "fromIndex")]
    pub from_index: Option<String>,
    #[serde(rename = "toIndex")]
    pub to_index: Option<String>,
}

pub async fn playlist_move_handler(
    State(state): State<AppState>,
    Query(query): Query<MoveQuery>,
) -> ApiResult<impl IntoResponse> {
    let from = query
        .from_index
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::BadRequest("fromIndex query param required!".to_string()))?;
    let to = query
        .to_index
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::BadRequest("toIndex query param required!".to_string()))?;

    let from: u64 = parse_param("fromIndex", &from)?;
    let to: u64 = parse_param("toIndex", &to)?;
    state.player.playlist_move(from, to).await?;
    Ok(success())
}

/// POST /api/v1/playlist/play/{index} - Jump to an entry and return the playlist
pub async fn playlist_play_handler(
    State(state): State<AppState>,
    Path(index): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let index: u64 = parse_param("index", &index)?;
    state.player.playlist_play_index(index).await?;
    let playlist = fetch_composite(state.player.as_ref(), &PLAYLIST).await?;
    Ok(Json(playlist))
}

pub async fn playlist_clear_handler(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    state.player.playlist_clear().await?;
    Ok(success())
}

pub async fn playlist_shuffle_handler(
    State(state): State<AppState>,
) -> ApiResult<impl IntoResponse> {
    state.player.playlist_shuffle().await?;
    Ok(success())
}

// =============================================================================
// Info and host control
// =============================================================================

#[derive(Debug, Serialize)]
pub struct MpvInfoResponse {
    #[serde(rename = "ffmpeg-version")]
    pub ffmpeg_version: PropertyValue,
    #[serde(rename = "mpv-version")]
    pub mpv_version: PropertyValue,
    #[serde(rename = "libass-version")]
    pub libass_version: PropertyValue,
    #[serde(rename = "mpvremoteConfig")]
    pub config: Config,
    #[serde(rename = "mpvremoteVersion")]
    pub version: &'static str,
}

/// Version reads that fail become null
async fn version_property(player: &dyn PlayerHandle, property: &str) -> PropertyValue {
    player.get(property).await.unwrap_or_default()
}

pub async fn mpvinfo_handler(State(state): State<AppState>) -> Json<MpvInfoResponse> {
    let player = state.player.as_ref();
    let (ffmpeg_version, mpv_version, libass_version) = futures::join!(
        version_property(player, "ffmpeg-version"),
        version_property(player, "mpv-version"),
        version_property(player, "libass-version"),
    );
    Json(MpvInfoResponse {
        ffmpeg_version,
        mpv_version,
        libass_version,
        config: state.config.as_ref().clone(),
        version: env!("MPVR_VERSION"),
    })
}

pub async fn computer_handler(
    State(state): State<AppState>,
    Path(action): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let action: ComputerAction = action
        .parse()
        .map_err(|e: crate::system::InvalidAction| ApiError::BadRequest(e.to_string()))?;
    tracing::info!("Computer action requested: {}", action);

    if action.stops_playback() {
        state.player.stop().await?;
    }
    match action {
        ComputerAction::Shutdown => state.system.shutdown().await?,
        ComputerAction::Reboot => state.system.reboot().await?,
        ComputerAction::Quit => {}
        ComputerAction::DisableDisplay => state.system.display_off().await?,
        ComputerAction::EnableDisplay => state.system.display_on().await?,
    }
    Ok(success())
}
