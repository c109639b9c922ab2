#![cfg(unix)]
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
//! Integration tests against a mock mpv IPC socket
//!
//! Exercises the real client, the snapshot aggregator, the notification
//! translator and the HTTP routes end to end.

mod mock_servers;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

use mock_servers::MockMpv;
use mpv_remote::api::{self, AppState, STALE_HEADER};
use mpv_remote::bus::ChangeEvent;
use mpv_remote::config::Config;
use mpv_remote::notify::{NotificationTranslator, OsdDispatcher};
use mpv_remote::player::mpv::{MpvClient, MpvOptions};
use mpv_remote::player::{PlayerError, PlayerHandle, PropertyValue, SharedPlayer};
use mpv_remote::snapshot::{Aggregator, SnapshotCache};
use mpv_remote::system::ShellSystemActions;

async fn connect(mock: &MockMpv) -> Arc<MpvClient> {
    let options = MpvOptions {
        response_timeout: Duration::from_secs(2),
        ..MpvOptions::default()
    };
    Arc::new(
        MpvClient::connect(mock.socket_path(), options)
            .await
            .expect("client should connect to mock mpv"),
    )
}

async fn next_event(rx: &mut broadcast::Receiver<ChangeEvent>) -> ChangeEvent {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("event within timeout")
        .expect("bus open")
}

/// Poll until the mock has recorded `count` commands named `name`
async fn wait_for_commands(mock: &MockMpv, name: &str, count: usize) -> Vec<Vec<Value>> {
    for _ in 0..100 {
        let matching: Vec<_> = mock
            .commands()
            .await
            .into_iter()
            .filter(|c| c.first() == Some(&json!(name)))
            .collect();
        if matching.len() >= count {
            return matching;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("mock mpv never received {} x {}", count, name);
}

#[tokio::test]
async fn get_set_and_command_round_trip() {
    let mock = MockMpv::start().await;
    mock.set_property("volume", json!(65)).await;
    let client = connect(&mock).await;

    assert_eq!(client.get("volume").await.unwrap(), PropertyValue::from(65i64));

    client.set_volume(30.0).await.unwrap();
    assert_eq!(mock.property("volume").await, Some(json!(30.0)));

    client.toggle_pause().await.unwrap();
    client.load("/media/film.mkv", "replace").await.unwrap();
    let commands = mock.commands().await;
    assert!(commands.contains(&vec![json!("cycle"), json!("pause")]));
    assert!(commands.contains(&vec![json!("loadfile"), json!("/media/film.mkv"), json!("replace")]));

    mock.stop().await;
}

#[tokio::test]
async fn unavailable_and_failed_requests_are_distinguished() {
    let mock = MockMpv::start().await;
    let client = connect(&mock).await;

    let err = client.get("sub-delay").await.unwrap_err();
    assert!(err.is_unavailable(), "got {:?}", err);

    let err = client.command("fail", vec![]).await.unwrap_err();
    assert!(matches!(err, PlayerError::Mpv(ref m) if m == "invalid parameter"), "got {:?}", err);

    mock.stop().await;
}

#[tokio::test]
async fn property_changes_reach_the_bus_without_initial_values() {
    let mock = MockMpv::start().await;
    mock.set_property("pause", json!(false)).await;
    let client = connect(&mock).await;
    let mut events = client.subscribe();

    mock.change_property("volume", json!(55)).await;
    mock.change_property("pause", json!(true)).await;

    assert_eq!(next_event(&mut events).await, ChangeEvent::property("volume", 55i64));
    assert_eq!(next_event(&mut events).await, ChangeEvent::property("pause", true));

    mock.stop().await;
}

#[tokio::test]
async fn seek_produces_seek_event_with_end_position() {
    let mock = MockMpv::start().await;
    mock.set_property("time-pos", json!(10.0)).await;
    let client = connect(&mock).await;
    let mut events = client.subscribe();

    client.seek(120.0, "absolute").await.unwrap();

    match next_event(&mut events).await {
        ChangeEvent::Seek { end, .. } => assert_eq!(end, 120.0),
        other => panic!("Expected seek event, got {:?}", other),
    }

    mock.stop().await;
}

#[tokio::test]
async fn translator_shows_osd_through_real_client() {
    let mock = MockMpv::start().await;
    mock.set_property("media-title", json!("Sintel")).await;
    let client = connect(&mock).await;
    let player: SharedPlayer = client.clone();
    let shutdown = CancellationToken::new();

    let osd = OsdDispatcher::spawn(player.clone(), true, 8, shutdown.clone());
    let translator = tokio::spawn(NotificationTranslator::new(player, osd).run(shutdown.clone()));
    tokio::time::sleep(Duration::from_millis(50)).await;

    mock.change_property("path", json!("/media/sintel.mkv")).await;
    mock.change_property("volume", json!(40)).await;

    let shown = wait_for_commands(&mock, "show-text", 2).await;
    assert_eq!(shown[0], vec![json!("show-text"), json!("Playing: Sintel")]);
    assert_eq!(shown[1], vec![json!("show-text"), json!("Volume: 40%")]);
    assert_eq!(mock.property("sub-delay").await, Some(json!(0)));
    assert_eq!(mock.property("audio-delay").await, Some(json!(0)));

    shutdown.cancel();
    translator.await.unwrap();
    mock.stop().await;
}

async fn app(mock: &MockMpv, deadline: Duration) -> Router {
    let client = connect(mock).await;
    let player: SharedPlayer = client;
    let config: Config = serde_json::from_value(json!({
        "socket": mock.socket_path().to_string_lossy(),
    }))
    .unwrap();
    let aggregator = Arc::new(Aggregator::new(
        player.clone(),
        Arc::new(SnapshotCache::new()),
        deadline,
    ));
    api::router(AppState::new(
        player,
        aggregator,
        Arc::new(ShellSystemActions::from_env()),
        Arc::new(config),
    ))
}

async fn get_json(app: &Router, uri: &str) -> (StatusCode, Option<String>, Value) {
    let response = app
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let stale = response
        .headers()
        .get(STALE_HEADER)
        .map(|v| v.to_str().unwrap().to_string());
    let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap();
    (status, stale, serde_json::from_slice(&body).unwrap())
}

#[tokio::test]
async fn status_over_http_uses_cache_for_slow_keys() {
    let mock = MockMpv::start().await;
    mock.set_property("pause", json!(true)).await;
    mock.set_property("volume", json!(80)).await;
    mock.set_property("playlist-count", json!(1)).await;
    mock.set_property("playlist/0/filename", json!("/music/track01.flac")).await;
    mock.set_property("playlist/0/current", json!(true)).await;
    let app = app(&mock, Duration::from_millis(300)).await;

    // First request: everything fast, cache fills
    let (status, stale, body) = get_json(&app, "/api/v1/status").await;
    assert_eq!(status, StatusCode::OK);
    assert!(stale.is_none(), "unexpected stale keys {:?}", stale);
    assert_eq!(body["volume"], json!(80));
    assert_eq!(body["playlist"][0]["filename"], json!("track01.flac"));
    assert_eq!(body["metadata"], json!({}));
    assert_eq!(body["sub-ass-override"], json!("no"));

    // Volume now changes but answers too slowly: cached value is served
    mock.set_property("volume", json!(20)).await;
    mock.set_delay("volume", Duration::from_secs(2)).await;
    let (_, stale, body) = get_json(&app, "/api/v1/status?exclude=playlist").await;
    assert_eq!(body["volume"], json!(80));
    assert!(body.get("playlist").is_none());
    assert_eq!(stale.as_deref(), Some("volume"));

    mock.stop().await;
}

#[tokio::test]
async fn playlist_route_over_http() {
    let mock = MockMpv::start().await;
    mock.set_property("playlist-count", json!(2)).await;
    mock.set_property("playlist/0/filename", json!("/a/one.mp4")).await;
    mock.set_property("playlist/1/filename", json!("/a/two.mp4")).await;
    mock.set_property("playlist/1/current", json!(true)).await;
    let app = app(&mock, Duration::from_millis(500)).await;

    let (status, _, body) = get_json(&app, "/api/v1/playlist").await;

    assert_eq!(status, StatusCode::OK);
    let entries = body.as_array().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[1]["filename"], json!("two.mp4"));
    assert_eq!(entries[1]["current"], json!(true));
    assert_eq!(entries[0]["current"], Value::Null);

    mock.stop().await;
}
