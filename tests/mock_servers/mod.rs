//! Mock servers for integration testing
//!
//! Simulates mpv's JSON IPC socket so the real client, aggregator and routes
//! can be exercised without a running player.

pub mod mpv;

pub use mpv::MockMpv;
