//! Last known good value per status key
//!
//! Written by every completed key fetch (including fetches that finish after
//! their request already answered), read when a deadline leaves a key
//! unresolved. Keys are independent: last writer wins per key, and a write to
//! one key never touches another.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::Instant;

use crate::player::PropertyValue;

#[derive(Debug, Clone, PartialEq)]
pub struct CachedValue {
    pub value: PropertyValue,
    /// Monotonic across the whole cache; higher means written later
    pub version: u64,
    pub updated_at: Instant,
}

#[derive(Debug, Default)]
pub struct SnapshotCache {
    entries: RwLock<HashMap<String, CachedValue>>,
    version: AtomicU64,
}

impl SnapshotCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<CachedValue> {
        self.entries
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(key)
            .cloned()
    }

    /// Store `value` for `key`, returning the version assigned to the write
    pub fn update(&self, key: &str, value: PropertyValue) -> u64 {
        let version = self.version.fetch_add(1, Ordering::Relaxed) + 1;
        let entry = CachedValue {
            value,
            version,
            updated_at: Instant::now(),
        };
        self.entries
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(key.to_string(), entry);
        version
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
