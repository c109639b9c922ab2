//! mpv JSON IPC client
//!
//! Speaks mpv's line-delimited JSON protocol over its `--input-ipc-server`
//! socket. One task writes requests, one task reads everything mpv sends and
//! routes replies (matched by `request_id`) to the waiting caller, and one
//! task turns mpv events into [`ChangeEvent`]s on the bus, strictly in the
//! order mpv emitted them.
//!
//! Requests carry their own timeout; there is no retry at this layer.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::{PlayerError, PlayerHandle, PlayerResult, PropertyValue, PROPERTY_UNAVAILABLE};
use crate::bus::{ChangeEvent, EventBus, SharedBus};

/// Properties observed for change notifications
pub const OBSERVED_PROPERTIES: &[&str] = &[
    "pause",
    "volume",
    "mute",
    "path",
    "playlist-count",
    "playlist-pos",
];

const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(5);
/// Outgoing request queue depth
const WRITE_QUEUE: usize = 64;
/// Raw event queue depth between the reader and the event task
const EVENT_QUEUE: usize = 256;

#[derive(Debug, Clone)]
pub struct MpvOptions {
    /// How long a request waits for mpv's reply
    pub response_timeout: Duration,
    /// Capacity of the change-event broadcast channel
    pub bus_capacity: usize,
}

impl Default for MpvOptions {
    fn default() -> Self {
        Self {
            response_timeout: DEFAULT_RESPONSE_TIMEOUT,
            bus_capacity: 256,
        }
    }
}

/// Reply payload: `data` on success, mpv's error string otherwise
type Reply = Result<Value, String>;
type PendingMap = Mutex<HashMap<u64, oneshot::Sender<Reply>>>;

/// Anything mpv writes to the socket
#[derive(Debug, Deserialize)]
struct Incoming {
    #[serde(default)]
    request_id: Option<u64>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    event: Option<String>,
    #[serde(default)]
    name: Option<String>,
}

/// Request side shared between the client and its event task
struct Requester {
    outgoing: mpsc::Sender<String>,
    pending: Arc<PendingMap>,
    next_id: AtomicU64,
    response_timeout: Duration,
}

impl Requester {
    async fn request(&self, command: Vec<Value>) -> PlayerResult<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let line = serde_json::to_string(&json!({ "command": command, "request_id": id }))?;

        let (tx, rx) = oneshot::channel();
        lock_pending(&self.pending).insert(id, tx);

        if self.outgoing.send(line).await.is_err() {
            lock_pending(&self.pending).remove(&id);
            return Err(PlayerError::Disconnected);
        }

        match timeout(self.response_timeout, rx).await {
            Ok(Ok(Ok(data))) => Ok(data),
            Ok(Ok(Err(error))) => Err(PlayerError::Mpv(error)),
            // Sender dropped: reader hit EOF and drained the pending map
            Ok(Err(_)) => Err(PlayerError::Disconnected),
            Err(_) => {
                lock_pending(&self.pending).remove(&id);
                Err(PlayerError::Timeout(self.response_timeout))
            }
        }
    }

    async fn get_property(&self, property: &str) -> PlayerResult<PropertyValue> {
        match self.request(vec![json!("get_property"), json!(property)]).await {
            Ok(data) => Ok(PropertyValue::from(data)),
            Err(PlayerError::Mpv(error)) if error == PROPERTY_UNAVAILABLE => {
                Err(PlayerError::Unavailable(property.to_string()))
            }
            Err(e) => Err(e),
        }
    }
}

fn lock_pending(pending: &PendingMap) -> std::sync::MutexGuard<'_, HashMap<u64, oneshot::Sender<Reply>>> {
    pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Connected mpv instance
pub struct MpvClient {
    requester: Arc<Requester>,
    bus: SharedBus,
    tasks: Vec<JoinHandle<()>>,
}

impl MpvClient {
    /// Connect to mpv's IPC socket
    #[cfg(unix)]
    pub async fn connect(socket: impl AsRef<Path>, options: MpvOptions) -> anyhow::Result<Self> {
        let socket = socket.as_ref();
        let stream = timeout(
            options.response_timeout,
            tokio::net::UnixStream::connect(socket),
        )
        .await
        .map_err(|_| anyhow::anyhow!("Connection timeout: {}", socket.display()))?
        .map_err(|e| anyhow::anyhow!("Cannot connect to mpv at {}: {}", socket.display(), e))?;

        info!("Connected to mpv at {}", socket.display());
        Self::from_stream(stream, options).await
    }

    #[cfg(not(unix))]
    pub async fn connect(socket: impl AsRef<Path>, _options: MpvOptions) -> anyhow::Result<Self> {
        anyhow::bail!(
            "mpv IPC over {} requires a Unix domain socket",
            socket.as_ref().display()
        )
    }

    /// Run the protocol over an already-open stream and register observers
    pub async fn from_stream<S>(stream: S, options: MpvOptions) -> anyhow::Result<Self>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (read_half, write_half) = tokio::io::split(stream);
        let (outgoing, outgoing_rx) = mpsc::channel(WRITE_QUEUE);
        let (events_tx, events_rx) = mpsc::channel(EVENT_QUEUE);
        let pending: Arc<PendingMap> = Arc::new(Mutex::new(HashMap::new()));
        let bus: SharedBus = Arc::new(EventBus::new(options.bus_capacity));

        let requester = Arc::new(Requester {
            outgoing,
            pending: pending.clone(),
            next_id: AtomicU64::new(1),
            response_timeout: options.response_timeout,
        });

        let tasks = vec![
            tokio::spawn(write_loop(write_half, outgoing_rx)),
            tokio::spawn(read_loop(BufReader::new(read_half), pending, events_tx)),
            tokio::spawn(event_loop(events_rx, requester.clone(), bus.clone())),
        ];

        let client = Self {
            requester,
            bus,
            tasks,
        };

        for (i, property) in OBSERVED_PROPERTIES.iter().enumerate() {
            client
                .requester
                .request(vec![json!("observe_property"), json!(i + 1), json!(property)])
                .await
                .map_err(|e| anyhow::anyhow!("Failed to observe {}: {}", property, e))?;
        }
        debug!("Observing {} mpv properties", OBSERVED_PROPERTIES.len());

        Ok(client)
    }

    /// The bus change events are published on
    pub fn bus(&self) -> &SharedBus {
        &self.bus
    }
}

impl Drop for MpvClient {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

#[async_trait]
impl PlayerHandle for MpvClient {
    async fn get(&self, property: &str) -> PlayerResult<PropertyValue> {
        self.requester.get_property(property).await
    }

    async fn set(&self, property: &str, value: Value) -> PlayerResult<()> {
        self.requester
            .request(vec![json!("set_property"), json!(property), value])
            .await
            .map(drop)
    }

    async fn command(&self, name: &str, args: Vec<Value>) -> PlayerResult<Value> {
        let mut command = Vec::with_capacity(args.len() + 1);
        command.push(json!(name));
        command.extend(args);
        self.requester.request(command).await
    }

    fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.bus.subscribe()
    }
}

async fn write_loop<W>(mut writer: W, mut outgoing: mpsc::Receiver<String>)
where
    W: AsyncWrite + Unpin,
{
    while let Some(line) = outgoing.recv().await {
        let result = async {
            writer.write_all(line.as_bytes()).await?;
            writer.write_all(b"\n").await?;
            writer.flush().await
        }
        .await;

        if let Err(e) = result {
            warn!("mpv write failed: {}", e);
            break;
        }
    }
    debug!("mpv writer stopped");
}

async fn read_loop<R>(mut reader: BufReader<R>, pending: Arc<PendingMap>, events: mpsc::Sender<Incoming>)
where
    R: AsyncRead + Unpin,
{
    let mut line = String::new();

    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) => {
                warn!("mpv closed the IPC connection");
                break;
            }
            Ok(_) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                let message: Incoming = match serde_json::from_str(trimmed) {
                    Ok(message) => message,
                    Err(e) => {
                        debug!("Ignoring malformed mpv message ({}): {}", e, trimmed);
                        continue;
                    }
                };

                if message.event.is_some() {
                    if events.send(message).await.is_err() {
                        break;
                    }
                } else if let Some(id) = message.request_id {
                    let waiter = lock_pending(&pending).remove(&id);
                    if let Some(waiter) = waiter {
                        let reply = match message.error.as_deref() {
                            None | Some("success") => Ok(message.data.unwrap_or(Value::Null)),
                            Some(error) => Err(error.to_string()),
                        };
                        let _ = waiter.send(reply);
                    } else {
                        debug!("Reply for unknown or expired request {}", id);
                    }
                }
            }
            Err(e) => {
                warn!("mpv read failed: {}", e);
                break;
            }
        }
    }

    // Dropping the senders fails every waiting request with Disconnected
    lock_pending(&pending).clear();
}

/// Converts raw mpv events into bus events, one at a time
async fn event_loop(mut events: mpsc::Receiver<Incoming>, requester: Arc<Requester>, bus: SharedBus) {
    // mpv reports each observed property once on registration; that is not a change
    let mut initialized: HashSet<String> = HashSet::new();
    let mut seek_start: Option<f64> = None;
    let mut seeking = false;

    while let Some(message) = events.recv().await {
        match message.event.as_deref() {
            Some("property-change") => {
                let Some(name) = message.name else { continue };
                if initialized.insert(name.clone()) {
                    debug!("Initial value for {} ignored", name);
                    continue;
                }
                let value = PropertyValue::from(message.data.unwrap_or(Value::Null));
                bus.publish(ChangeEvent::Property { name, value });
            }
            Some("seek") => {
                seeking = true;
                seek_start = requester.get_property("time-pos").await.ok().and_then(|v| v.as_f64());
            }
            Some("playback-restart") if seeking => {
                seeking = false;
                match requester.get_property("time-pos").await {
                    Ok(position) => {
                        if let Some(end) = position.as_f64() {
                            bus.publish(ChangeEvent::Seek {
                                start: seek_start.take(),
                                end,
                            });
                        }
                    }
                    Err(e) => debug!("Seek end position unavailable: {}", e),
                }
            }
            Some(other) => debug!("mpv event: {}", other),
            None => {}
        }
    }
    debug!("mpv event task stopped");
}
