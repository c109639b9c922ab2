//! OSD message queue
//!
//! The translator never awaits the player directly for on-screen text. It
//! pushes [`OsdMessage`]s into a bounded queue drained by one dispatcher task,
//! so a slow or wedged player cannot stall change-event handling. Under
//! pressure, low-value messages are dropped; "Playing" and startup messages
//! wait for room.

use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::player::SharedPlayer;

/// Default queue depth between translator and dispatcher
pub const DEFAULT_QUEUE_CAPACITY: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OsdKind {
    Pause,
    Volume,
    Mute,
    Seek,
    Playing,
    Startup,
}

impl OsdKind {
    /// Superseded by the next message of the same kind, safe to drop
    pub fn is_droppable(self) -> bool {
        matches!(self, Self::Pause | Self::Volume | Self::Mute | Self::Seek)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OsdMessage {
    pub kind: OsdKind,
    pub text: String,
    /// `None` uses the player's own OSD duration
    pub duration: Option<Duration>,
}

impl OsdMessage {
    pub fn new(kind: OsdKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
            duration: None,
        }
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }
}

/// What happened to a message handed to [`OsdSender::send`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Queued,
    /// Queue full with OSD disabled: written to the log instead of queued
    Logged,
    /// Queue full, low-value message discarded
    Dropped,
    /// Dispatcher has stopped
    Closed,
}

/// Producer half; cheap to clone
#[derive(Clone)]
pub struct OsdSender {
    tx: mpsc::Sender<OsdMessage>,
    enabled: bool,
}

impl OsdSender {
    /// Queue a message. Droppable kinds never wait; others wait for capacity.
    /// With OSD disabled nothing is dropped: a message that does not fit is
    /// logged here, as the dispatcher would have.
    pub async fn send(&self, message: OsdMessage) -> Delivery {
        if !message.kind.is_droppable() {
            return match self.tx.send(message).await {
                Ok(()) => Delivery::Queued,
                Err(_) => {
                    debug!("OSD dispatcher stopped, message discarded");
                    Delivery::Closed
                }
            };
        }

        match self.tx.try_send(message) {
            Ok(()) => Delivery::Queued,
            Err(mpsc::error::TrySendError::Full(message)) if !self.enabled => {
                info!("OSD message: {}", message.text);
                Delivery::Logged
            }
            Err(mpsc::error::TrySendError::Full(message)) => {
                debug!("OSD queue full, dropping {:?} message: {}", message.kind, message.text);
                Delivery::Dropped
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("OSD dispatcher stopped, message discarded");
                Delivery::Closed
            }
        }
    }
}

pub struct OsdDispatcher {
    player: SharedPlayer,
    enabled: bool,
    rx: mpsc::Receiver<OsdMessage>,
}

impl OsdDispatcher {
    /// Start the dispatcher task and return the queue's sender
    pub fn spawn(
        player: SharedPlayer,
        enabled: bool,
        capacity: usize,
        shutdown: CancellationToken,
    ) -> OsdSender {
        let (sender, dispatcher) = Self::new(player, enabled, capacity);
        tokio::spawn(dispatcher.run(shutdown));
        sender
    }

    pub fn new(player: SharedPlayer, enabled: bool, capacity: usize) -> (OsdSender, Self) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            OsdSender { tx, enabled },
            Self {
                player,
                enabled,
                rx,
            },
        )
    }

    pub async fn run(mut self, shutdown: CancellationToken) {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    debug!("OSD dispatcher shutting down");
                    break;
                }
                message = self.rx.recv() => match message {
                    Some(message) => self.deliver(message).await,
                    None => break,
                },
            }
        }
    }

    async fn deliver(&self, message: OsdMessage) {
        if !self.enabled {
            info!("OSD message: {}", message.text);
            return;
        }
        if let Err(e) = self.player.show_text(&message.text, message.duration).await {
            warn!("Failed to show OSD message {:?}: {}", message.text, e);
        }
    }
}
