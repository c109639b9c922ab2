#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
//! Mock mpv for testing
//!
//! Speaks the line-delimited JSON IPC protocol on a Unix socket

use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;

/// Mock mpv state
#[derive(Debug, Default)]
pub struct MockMpvState {
    pub properties: HashMap<String, Value>,
    /// Observer id per observed property name
    pub observed: HashMap<String, u64>,
    /// Every command received, as sent (`["cycle", "pause"]`, ...)
    pub commands: Vec<Vec<Value>>,
    /// Per-property reply latency
    pub delays: HashMap<String, Duration>,
}

type Shared = Arc<RwLock<MockMpvState>>;

/// Mock mpv IPC server
pub struct MockMpv {
    path: PathBuf,
    state: Shared,
    events: Arc<RwLock<Option<mpsc::Sender<Value>>>>,
    handle: JoinHandle<()>,
    _dir: tempfile::TempDir,
}

impl MockMpv {
    /// Start a mock mpv listening on a socket in a fresh temp dir
    pub async fn start() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mpvsocket");
        let listener = UnixListener::bind(&path).unwrap();

        let state: Shared = Arc::new(RwLock::new(MockMpvState::default()));
        let events: Arc<RwLock<Option<mpsc::Sender<Value>>>> = Arc::new(RwLock::new(None));

        let state_clone = state.clone();
        let events_clone = events.clone();
        let handle = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let (tx, rx) = mpsc::channel(256);
                *events_clone.write().await = Some(tx.clone());
                tokio::spawn(handle_connection(stream, state_clone.clone(), tx, rx));
            }
        });

        Self {
            path,
            state,
            events,
            handle,
            _dir: dir,
        }
    }

    pub fn socket_path(&self) -> &Path {
        &self.path
    }

    pub async fn set_property(&self, name: &str, value: Value) {
        self.state
            .write()
            .await
            .properties
            .insert(name.to_string(), value);
    }

    /// Delay replies for `name` by `delay`
    pub async fn set_delay(&self, name: &str, delay: Duration) {
        self.state
            .write()
            .await
            .delays
            .insert(name.to_string(), delay);
    }

    /// Change a property the way the user would in mpv's window, emitting
    /// `property-change` when the property is observed
    pub async fn change_property(&self, name: &str, value: Value) {
        let observer = {
            let mut state = self.state.write().await;
            state.properties.insert(name.to_string(), value.clone());
            state.observed.get(name).copied()
        };
        if let Some(id) = observer {
            self.emit(json!({"event": "property-change", "id": id, "name": name, "data": value}))
                .await;
        }
    }

    /// Send a raw event to the connected client
    pub async fn emit(&self, event: Value) {
        let sender = self.events.read().await.clone();
        if let Some(sender) = sender {
            let _ = sender.send(event).await;
        }
    }

    pub async fn commands(&self) -> Vec<Vec<Value>> {
        self.state.read().await.commands.clone()
    }

    pub async fn property(&self, name: &str) -> Option<Value> {
        self.state.read().await.properties.get(name).cloned()
    }

    /// Stop the mock server
    pub async fn stop(self) {
        self.handle.abort();
    }
}

/// Handle a single client connection
async fn handle_connection(
    stream: UnixStream,
    state: Shared,
    outgoing: mpsc::Sender<Value>,
    mut outgoing_rx: mpsc::Receiver<Value>,
) {
    let (reader, mut writer) = stream.into_split();

    let writer_task = tokio::spawn(async move {
        while let Some(message) = outgoing_rx.recv().await {
            let line = format!("{}\n", message);
            if writer.write_all(line.as_bytes()).await.is_err() {
                break;
            }
        }
    });

    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let Ok(request) = serde_json::from_str::<Value>(&line) else {
            continue;
        };
        // Requests are answered concurrently, like mpv does for async commands
        let state = state.clone();
        let outgoing = outgoing.clone();
        tokio::spawn(async move {
            for message in process_request(request, &state).await {
                let _ = outgoing.send(message).await;
            }
        });
    }

    writer_task.abort();
}

/// Process one request; returns the reply followed by any events it causes
async fn process_request(request: Value, state: &Shared) -> Vec<Value> {
    let id = request["request_id"].clone();
    let command = request["command"].as_array().cloned().unwrap_or_default();
    let name = command.first().and_then(Value::as_str).unwrap_or_default().to_string();
    let arg = |i: usize| command.get(i).cloned().unwrap_or(Value::Null);

    let reply = |data: Value, error: &str| json!({"request_id": id, "error": error, "data": data});

    match name.as_str() {
        "get_property" => {
            let property = arg(1).as_str().unwrap_or_default().to_string();
            let delay = state.read().await.delays.get(&property).copied();
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            match state.read().await.properties.get(&property) {
                Some(value) => vec![reply(value.clone(), "success")],
                None => vec![json!({"request_id": id, "error": "property unavailable"})],
            }
        }
        "set_property" => {
            let property = arg(1).as_str().unwrap_or_default().to_string();
            let value = arg(2);
            let observer = {
                let mut state = state.write().await;
                state.properties.insert(property.clone(), value.clone());
                state.observed.get(&property).copied()
            };
            let mut out = vec![reply(Value::Null, "success")];
            if let Some(observer) = observer {
                out.push(json!({"event": "property-change", "id": observer, "name": property, "data": value}));
            }
            out
        }
        "observe_property" => {
            let observer = arg(1).as_u64().unwrap_or_default();
            let property = arg(2).as_str().unwrap_or_default().to_string();
            let current = {
                let mut state = state.write().await;
                state.observed.insert(property.clone(), observer);
                state.properties.get(&property).cloned().unwrap_or(Value::Null)
            };
            // mpv reports the current value right after registration
            vec![
                reply(Value::Null, "success"),
                json!({"event": "property-change", "id": observer, "name": property, "data": current}),
            ]
        }
        _ => {
            let mut state = state.write().await;
            state.commands.push(command.clone());
            match name.as_str() {
                "seek" => {
                    let target = arg(1).as_f64().unwrap_or_default();
                    let position = state
                        .properties
                        .get("time-pos")
                        .and_then(Value::as_f64)
                        .unwrap_or_default();
                    let end = if arg(2).as_str() == Some("absolute") {
                        target
                    } else {
                        position + target
                    };
                    state.properties.insert("time-pos".to_string(), json!(end));
                    vec![
                        reply(Value::Null, "success"),
                        json!({"event": "seek"}),
                        json!({"event": "playback-restart"}),
                    ]
                }
                "fail" => vec![json!({"request_id": id, "error": "invalid parameter"})],
                _ => vec![reply(Value::Null, "success")],
            }
        }
    }
}
