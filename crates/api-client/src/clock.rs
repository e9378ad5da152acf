//! Time sources and the persisted session clock.
//!
//! The session clock is the only state shared between independent client
//! instances (one per process, or per tab in a browser host). It holds the
//! epoch-millisecond timestamp of the last refresh under a single key. Reads
//! and writes are plain get/set with no compare-and-swap; the skew margin on
//! the configured windows absorbs the remaining races.

use std::collections::HashMap;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::warn;

/// Wall-clock source in epoch milliseconds.
pub trait TimeSource: Send + Sync {
    fn now_millis(&self) -> i64;
}

/// `chrono::Utc::now()`.
#[derive(Debug, Clone, Copy, Default)]
pub struct WallClock;

impl TimeSource for WallClock {
    fn now_millis(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// Manually driven time, for tests and simulations.
#[derive(Debug, Default)]
pub struct ManualTime {
    now: AtomicI64,
}

impl ManualTime {
    pub fn new(start_millis: i64) -> Self {
        Self {
            now: AtomicI64::new(start_millis),
        }
    }

    pub fn set(&self, millis: i64) {
        self.now.store(millis, Ordering::SeqCst);
    }

    pub fn advance(&self, by: Duration) {
        self.now.fetch_add(by.as_millis() as i64, Ordering::SeqCst);
    }
}

impl TimeSource for ManualTime {
    fn now_millis(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

// ── Key/value stores ────────────────────────────────────────────────────

/// String key/value storage visible to every client that shares it.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> io::Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> io::Result<()>;
    fn remove(&self, key: &str) -> io::Result<()>;
}

/// Process-local store. Clients sharing one `Arc<MemoryStore>` see each
/// other's writes.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.entries.lock().expect("memory store mutex poisoned")
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> io::Result<Option<String>> {
        Ok(self.entries().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> io::Result<()> {
        self.entries().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> io::Result<()> {
        self.entries().remove(key);
        Ok(())
    }
}

/// Directory-backed store: one file per key, shared by every process that
/// points at the same directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(file_name(key))
    }
}

fn file_name(key: &str) -> String {
    key.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> io::Result<Option<String>> {
        match std::fs::read_to_string(self.path_for(key)) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn set(&self, key: &str, value: &str) -> io::Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.path_for(key);
        // Readers must never see a half-written value; each write gets its
        // own temp file so concurrent writers never share one.
        let mut tmp = tempfile::Builder::new()
            .prefix(&format!(".{}.", file_name(key)))
            .suffix(".tmp")
            .tempfile_in(&self.dir)?;
        tmp.write_all(value.as_bytes())?;
        tmp.persist(&path).map_err(|e| e.error)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> io::Result<()> {
        match std::fs::remove_file(self.path_for(key)) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }
}

// ── Session clock ───────────────────────────────────────────────────────

/// Last-refresh timestamp persisted in a [`KeyValueStore`].
///
/// Storage failures never propagate: an unreadable or unparsable value reads
/// as absent and a failed write is logged and skipped.
#[derive(Clone)]
pub struct SessionClock {
    store: Arc<dyn KeyValueStore>,
    key: String,
}

impl SessionClock {
    pub fn new(store: Arc<dyn KeyValueStore>, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn last_refreshed_at(&self) -> Option<i64> {
        let raw = match self.store.get(&self.key) {
            Ok(raw) => raw?,
            Err(e) => {
                warn!("Failed to read session clock '{}': {e}", self.key);
                return None;
            }
        };
        match raw.trim().parse::<i64>() {
            Ok(at) => Some(at),
            Err(_) => {
                warn!("Ignoring unparsable session clock value {raw:?}");
                None
            }
        }
    }

    /// Time since the last refresh, or `None` if no refresh was ever
    /// recorded. A timestamp in the future (another writer's clock running
    /// ahead) counts as zero elapsed.
    pub fn elapsed(&self, now_millis: i64) -> Option<Duration> {
        let last = self.last_refreshed_at()?;
        let elapsed = u64::try_from(now_millis.saturating_sub(last)).unwrap_or(0);
        Some(Duration::from_millis(elapsed))
    }

    pub fn mark_refreshed(&self, at_millis: i64) {
        if let Err(e) = self.store.set(&self.key, &at_millis.to_string()) {
            warn!("Failed to persist session clock '{}': {e}", self.key);
        }
    }

    pub fn clear(&self) {
        if let Err(e) = self.store.remove(&self.key) {
            warn!("Failed to remove session clock '{}': {e}", self.key);
        }
    }
}

impl std::fmt::Debug for SessionClock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionClock")
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}
