//! mpv-remote - Rust Implementation
//!
//! A remote-control HTTP bridge for a running mpv player.
//!
//! This library provides:
//! - mpv JSON IPC transport over a Unix socket
//! - Deadline-bounded status snapshots with per-key cache fallback
//! - Translation of player change events into on-screen messages
//! - HTTP routes for playback, tracks, playlist and host control

pub mod api;
pub mod bus;
pub mod config;
pub mod notify;
pub mod player;
pub mod snapshot;
pub mod system;

#[cfg(test)]
pub(crate) mod testing;
