// Key-value snapshot store.
//
// The server persists two kinds of records: player progress (no expiry,
// keyed by account) and session snapshots (with a TTL so abandoned colonies
// eventually vanish). `SnapshotStore` is the seam; `MemoryStore` is the
// in-process implementation. A networked backend can slot in behind the
// same trait without touching the session code.
//
// Values are opaque strings — callers serialize with serde_json, keeping
// the store independent of sim types.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

/// Minimal TTL-aware key-value interface.
pub trait SnapshotStore {
    /// Store `value` under `key`, optionally expiring after `ttl`.
    fn put(&mut self, key: &str, value: String, ttl: Option<Duration>);
    /// Fetch a live value. Expired entries read as absent.
    fn get(&mut self, key: &str) -> Option<String>;
    fn delete(&mut self, key: &str);
}

struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

/// In-process store. Expiry is lazy on read plus an explicit `sweep` the
/// server calls on its tick cadence.
#[derive(Default)]
pub struct MemoryStore {
    entries: BTreeMap<String, Entry>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn sweep(&mut self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, e| !e.expired(now));
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl SnapshotStore for MemoryStore {
    fn put(&mut self, key: &str, value: String, ttl: Option<Duration>) {
        self.entries.insert(
            key.to_owned(),
            Entry {
                value,
                expires_at: ttl.map(|t| Instant::now() + t),
            },
        );
    }

    fn get(&mut self, key: &str) -> Option<String> {
        let expired = self
            .entries
            .get(key)
            .is_some_and(|e| e.expired(Instant::now()));
        if expired {
            self.entries.remove(key);
            return None;
        }
        self.entries.get(key).map(|e| e.value.clone())
    }

    fn delete(&mut self, key: &str) {
        self.entries.remove(key);
    }
}

/// Key for one player's persisted progress.
pub fn progress_key(player_key: &str) -> String {
    format!("progress:{player_key}")
}

/// Key for one session's persisted snapshot.
pub fn session_key(code: &str) -> String {
    format!("session:{code}")
}
