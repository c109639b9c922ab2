//! Notification translator
//!
//! Turns player change events into OSD messages, one event at a time and in
//! the order the player emitted them. A new file (`path` change) also resets
//! subtitle and audio delays before announcing the title.

pub mod osd;

pub use osd::{Delivery, OsdDispatcher, OsdKind, OsdMessage, OsdSender};

use serde_json::json;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::bus::ChangeEvent;
use crate::player::{PlayerResult, SharedPlayer};

/// `HH:MM:SS`, each part zero-padded to two digits. Fractions are truncated;
/// negative or non-finite input reads as zero.
pub fn format_time(seconds: f64) -> String {
    let total = if seconds.is_finite() && seconds > 0.0 {
        seconds.trunc() as u64
    } else {
        0
    };
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let secs = total % 60;
    format!("{:02}:{:02}:{:02}", hours, minutes, secs)
}

pub struct NotificationTranslator {
    player: SharedPlayer,
    osd: OsdSender,
}

impl NotificationTranslator {
    pub fn new(player: SharedPlayer, osd: OsdSender) -> Self {
        Self { player, osd }
    }

    /// Handle events until the stream closes or `shutdown` fires
    pub async fn run(self, shutdown: CancellationToken) {
        let mut events = self.player.subscribe();
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    debug!("Notification translator shutting down");
                    break;
                }
                event = events.recv() => match event {
                    Ok(event) => self.handle(event).await,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Notification translator lagged, skipped {} events", skipped);
                    }
                    Err(RecvError::Closed) => {
                        debug!("Player event stream closed");
                        break;
                    }
                },
            }
        }
    }

    pub async fn handle(&self, event: ChangeEvent) {
        let name = event.name().to_string();
        match self.translate(event).await {
            Ok(Some(message)) => {
                self.osd.send(message).await;
            }
            Ok(None) => {}
            Err(e) => warn!("Handling {} change failed: {}", name, e),
        }
    }

    /// Perform the event's side effects and build its OSD message, if any
    pub async fn translate(&self, event: ChangeEvent) -> PlayerResult<Option<OsdMessage>> {
        let (name, value) = match event {
            ChangeEvent::Seek { end, .. } => {
                return Ok(Some(OsdMessage::new(
                    OsdKind::Seek,
                    format!("Seek: {}", format_time(end)),
                )));
            }
            ChangeEvent::Property { name, value } => (name, value),
        };

        let message = match name.as_str() {
            "pause" => {
                let text = if value.as_bool().unwrap_or(false) {
                    "Pause"
                } else {
                    "Play"
                };
                Some(OsdMessage::new(OsdKind::Pause, text))
            }
            "volume" => Some(OsdMessage::new(
                OsdKind::Volume,
                format!("Volume: {}%", value),
            )),
            "mute" => {
                let text = if value.as_bool().unwrap_or(false) {
                    "Mute".to_string()
                } else {
                    let volume = self.player.get("volume").await?;
                    format!("Volume {}", volume)
                };
                Some(OsdMessage::new(OsdKind::Mute, text))
            }
            "path" => match value.non_empty_str() {
                Some(path) => Some(self.file_loaded(path).await?),
                None => None,
            },
            _ => None,
        };
        Ok(message)
    }

    async fn file_loaded(&self, path: &str) -> PlayerResult<OsdMessage> {
        self.player.set("sub-delay", json!(0)).await?;
        self.player.set("audio-delay", json!(0)).await?;

        let title = match self.read_text("media-title").await? {
            Some(title) => title,
            None => self
                .read_text("filename")
                .await?
                .unwrap_or_else(|| path.to_string()),
        };
        Ok(OsdMessage::new(OsdKind::Playing, format!("Playing: {}", title)))
    }

    async fn read_text(&self, property: &str) -> PlayerResult<Option<String>> {
        match self.player.get(property).await {
            Ok(value) => Ok(value.non_empty_str().map(str::to_string)),
            Err(e) if e.is_unavailable() => Ok(None),
            Err(e) => Err(e),
        }
    }
}
