//! Player handle abstraction and the mpv JSON IPC transport
//!
//! Everything above this module talks to the player through [`PlayerHandle`]:
//! property reads, property writes, raw commands and the change-event stream.
//! The control helpers are provided methods so route handlers work against any
//! handle (the real [`mpv::MpvClient`] or a test double).

pub mod mpv;
mod value;

pub use value::{Entry, PropertyValue};

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::broadcast;

use crate::bus::ChangeEvent;

/// Error message mpv uses for properties that exist but currently have no value
pub const PROPERTY_UNAVAILABLE: &str = "property unavailable";

#[derive(Debug, Error)]
pub enum PlayerError {
    /// Property legitimately has no value right now (no file, no subtitle, ...)
    #[error("property unavailable: {0}")]
    Unavailable(String),
    /// mpv rejected the request
    #[error("mpv error: {0}")]
    Mpv(String),
    #[error("response timeout after {0:?}")]
    Timeout(Duration),
    #[error("player disconnected")]
    Disconnected,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed message: {0}")]
    Json(#[from] serde_json::Error),
}

impl PlayerError {
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

pub type PlayerResult<T> = Result<T, PlayerError>;

/// Shared handle; the aggregator, translator and routes all hold a clone
pub type SharedPlayer = Arc<dyn PlayerHandle>;

#[async_trait]
pub trait PlayerHandle: Send + Sync + 'static {
    /// Read one property (`volume`, `playlist/3/title`, ...)
    async fn get(&self, property: &str) -> PlayerResult<PropertyValue>;

    /// Write one property
    async fn set(&self, property: &str, value: Value) -> PlayerResult<()>;

    /// Run a player command and return its `data` payload
    async fn command(&self, name: &str, args: Vec<Value>) -> PlayerResult<Value>;

    /// Ordered stream of change events
    fn subscribe(&self) -> broadcast::Receiver<ChangeEvent>;

    // =========================================================================
    // Controls (built on command/set)
    // =========================================================================

    async fn play(&self) -> PlayerResult<()> {
        self.set("pause", json!(false)).await
    }

    async fn pause(&self) -> PlayerResult<()> {
        self.set("pause", json!(true)).await
    }

    async fn toggle_pause(&self) -> PlayerResult<()> {
        self.command("cycle", vec![json!("pause")]).await.map(drop)
    }

    async fn stop(&self) -> PlayerResult<()> {
        self.command("stop", vec![]).await.map(drop)
    }

    async fn next(&self) -> PlayerResult<()> {
        self.command("playlist-next", vec![json!("weak")])
            .await
            .map(drop)
    }

    async fn prev(&self) -> PlayerResult<()> {
        self.command("playlist-prev", vec![json!("weak")])
            .await
            .map(drop)
    }

    async fn toggle_fullscreen(&self) -> PlayerResult<()> {
        self.command("cycle", vec![json!("fullscreen")])
            .await
            .map(drop)
    }

    async fn set_volume(&self, volume: f64) -> PlayerResult<()> {
        self.set("volume", json!(volume)).await
    }

    async fn toggle_mute(&self) -> PlayerResult<()> {
        self.command("cycle", vec![json!("mute")]).await.map(drop)
    }

    /// `flag` is one of mpv's seek modes (`relative`, `absolute`, ...)
    async fn seek(&self, target: f64, flag: &str) -> PlayerResult<()> {
        self.command("seek", vec![json!(target), json!(flag)])
            .await
            .map(drop)
    }

    /// `flag` is one of mpv's loadfile modes (`replace`, `append-play`, ...)
    async fn load(&self, file: &str, flag: &str) -> PlayerResult<()> {
        self.command("loadfile", vec![json!(file), json!(flag)])
            .await
            .map(drop)
    }

    async fn playlist_remove(&self, index: u64) -> PlayerResult<()> {
        self.command("playlist-remove", vec![json!(index)])
            .await
            .map(drop)
    }

    async fn playlist_move(&self, from: u64, to: u64) -> PlayerResult<()> {
        self.command("playlist-move", vec![json!(from), json!(to)])
            .await
            .map(drop)
    }

    async fn playlist_play_index(&self, index: u64) -> PlayerResult<()> {
        self.command("playlist-play-index", vec![json!(index)])
            .await?;
        self.play().await
    }

    async fn playlist_clear(&self) -> PlayerResult<()> {
        self.command("playlist-clear", vec![]).await.map(drop)
    }

    async fn playlist_shuffle(&self) -> PlayerResult<()> {
        self.command("playlist-shuffle", vec![]).await.map(drop)
    }

    async fn select_audio(&self, id: u64) -> PlayerResult<()> {
        self.set("aid", json!(id)).await
    }

    async fn cycle_audio(&self) -> PlayerResult<()> {
        self.command("cycle", vec![json!("audio")]).await.map(drop)
    }

    async fn add_audio(&self, file: &str, flag: &str) -> PlayerResult<()> {
        self.command("audio-add", vec![json!(file), json!(flag)])
            .await
            .map(drop)
    }

    async fn set_audio_delay(&self, seconds: f64) -> PlayerResult<()> {
        self.set("audio-delay", json!(seconds)).await
    }

    async fn select_subtitle(&self, id: u64) -> PlayerResult<()> {
        self.set("sid", json!(id)).await
    }

    async fn add_subtitle(&self, file: &str, flag: &str) -> PlayerResult<()> {
        self.command("sub-add", vec![json!(file), json!(flag)])
            .await
            .map(drop)
    }

    async fn set_subtitle_delay(&self, seconds: f64) -> PlayerResult<()> {
        self.set("sub-delay", json!(seconds)).await
    }

    async fn toggle_subtitle_visibility(&self) -> PlayerResult<()> {
        self.command("cycle", vec![json!("sub-visibility")])
            .await
            .map(drop)
    }

    /// Show text on the player's OSD; `duration` defaults to mpv's osd-duration
    async fn show_text(&self, text: &str, duration: Option<Duration>) -> PlayerResult<()> {
        let mut args = vec![json!(text)];
        if let Some(duration) = duration {
            args.push(json!(duration.as_millis() as u64));
        }
        self.command("show-text", args).await.map(drop)
    }
}
