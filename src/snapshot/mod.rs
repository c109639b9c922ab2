//! Snapshot aggregator - one consistent status object per request
//!
//! Every requested key is fetched by its own task. The aggregator waits for
//! them against a single deadline; keys still outstanding when it fires are
//! answered from the [`SnapshotCache`], or from the key's documented default
//! when nothing was ever cached. Outstanding fetches keep running and refresh
//! the cache for the next request.

pub mod cache;
pub mod composite;
pub mod keys;

pub use cache::{CachedValue, SnapshotCache};
pub use keys::{Fallback, KeySpec, CANONICAL_KEYS};

use futures::stream::{FuturesUnordered, StreamExt};
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::player::{PropertyValue, SharedPlayer};

/// Reference deadline for a status request
pub const DEFAULT_DEADLINE: Duration = Duration::from_millis(500);

/// Where a snapshot value came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    Fresh,
    Cached,
    Default,
}

/// Ordered key → value mapping answered to one status request
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    entries: Vec<(String, PropertyValue, Freshness)>,
}

impl Snapshot {
    pub fn get(&self, key: &str) -> Option<&PropertyValue> {
        self.entries
            .iter()
            .find(|(k, _, _)| k == key)
            .map(|(_, value, _)| value)
    }

    pub fn freshness(&self, key: &str) -> Option<Freshness> {
        self.entries
            .iter()
            .find(|(k, _, _)| k == key)
            .map(|(_, _, freshness)| *freshness)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _, _)| k.as_str())
    }

    /// Keys answered from cache or default: the deadline fired first or the read failed
    pub fn stale_keys(&self) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|(_, _, freshness)| *freshness != Freshness::Fresh)
            .map(|(k, _, _)| k.as_str())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Serialize for Snapshot {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, value, _) in &self.entries {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

/// Parse `?exclude=a,b,c`; blank segments are ignored
pub fn parse_exclude(raw: Option<&str>) -> HashSet<String> {
    raw.map(|raw| {
        raw.split(',')
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .map(str::to_string)
            .collect()
    })
    .unwrap_or_default()
}

pub struct Aggregator {
    player: SharedPlayer,
    cache: Arc<SnapshotCache>,
    deadline: Duration,
}

impl Aggregator {
    pub fn new(player: SharedPlayer, cache: Arc<SnapshotCache>, deadline: Duration) -> Self {
        Self {
            player,
            cache,
            deadline,
        }
    }

    pub fn cache(&self) -> &Arc<SnapshotCache> {
        &self.cache
    }

    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    /// Canonical keys minus `excluded`, bounded by the configured deadline
    pub async fn status(&self, excluded: &HashSet<String>) -> Snapshot {
        let keys: Vec<&str> = CANONICAL_KEYS.iter().map(|spec| spec.key.as_ref()).collect();
        self.snapshot(&keys, excluded, self.deadline).await
    }

    /// Result keys are exactly `requested` minus `excluded`, in request order.
    /// Excluded keys are never read from the player.
    pub async fn snapshot(
        &self,
        requested: &[&str],
        excluded: &HashSet<String>,
        deadline: Duration,
    ) -> Snapshot {
        let deadline_at = Instant::now() + deadline;

        let mut seen = HashSet::new();
        let specs: Vec<KeySpec> = requested
            .iter()
            .filter(|key| !excluded.contains(**key) && seen.insert(**key))
            .map(|key| KeySpec::lookup(key))
            .collect();

        let mut outstanding: FuturesUnordered<_> = specs
            .iter()
            .map(|spec| {
                let key = spec.key.to_string();
                let handle = self.spawn_fetch(spec.clone());
                async move { (key, handle.await) }
            })
            .collect();

        let mut fresh: HashMap<String, PropertyValue> = HashMap::with_capacity(specs.len());
        let expiry = tokio::time::sleep_until(deadline_at);
        tokio::pin!(expiry);

        loop {
            tokio::select! {
                biased;
                next = outstanding.next() => match next {
                    Some((key, Ok(Some(value)))) => {
                        fresh.insert(key, value);
                    }
                    // Read failed; answered like a missed deadline
                    Some((_, Ok(None))) => {}
                    Some((key, Err(e))) => warn!("Fetch task for {} failed: {}", key, e),
                    None => break,
                },
                _ = &mut expiry => {
                    debug!(
                        "Status deadline of {:?} reached with {} keys outstanding",
                        deadline,
                        outstanding.len()
                    );
                    break;
                }
            }
        }

        let entries = specs
            .into_iter()
            .map(|spec| {
                let key = spec.key.to_string();
                if let Some(value) = fresh.remove(&key) {
                    return (key, value, Freshness::Fresh);
                }
                match self.cache.get(&key) {
                    Some(cached) => (key, cached.value, Freshness::Cached),
                    None => {
                        let value = spec.default_value();
                        (key, value, Freshness::Default)
                    }
                }
            })
            .collect();

        Snapshot { entries }
    }

    /// The task owns its handles so it can finish, and fill the cache, after
    /// the request that started it has answered. Only successful reads are
    /// cached; a failed read leaves the last good value in place.
    fn spawn_fetch(&self, spec: KeySpec) -> tokio::task::JoinHandle<Option<PropertyValue>> {
        let player = self.player.clone();
        let cache = self.cache.clone();
        tokio::spawn(async move {
            match spec.fetch(player.as_ref()).await {
                Ok(value) => {
                    cache.update(&spec.key, value.clone());
                    Some(value)
                }
                Err(e) => {
                    warn!("Reading {} failed: {}", spec.key, e);
                    None
                }
            }
        })
    }
}
