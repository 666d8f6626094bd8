//! Key-value caches with per-entry TTL.
//!
//! Values are opaque strings (the resolver stores JSON lists). Two backends:
//! an in-process map, and a JSON file at ~/.portal-geo/cache.json that every
//! process on the host sees. Writes are last-write-wins per key.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// TTLs are clamped to this; longer values overflow `Instant` and epoch millis.
pub const MAX_TTL: Duration = Duration::from_secs(100 * 365 * 24 * 3600);

/// Shared cache used by the resolver.
pub trait LocationCache: Send + Sync {
    /// Returns the value if present and not expired.
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: String, ttl: Duration);
    fn clear(&self);
}

/// A panic while holding the lock leaves the map itself intact.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| {
        log::warn!("cache lock was poisoned; recovering");
        poisoned.into_inner()
    })
}

// ─── In-memory backend ──────────────────────────────────────────

struct MemoryEntry {
    value: String,
    expires_at: Instant,
}

/// Process-wide cache.
#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, MemoryEntry>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live and expired entries (for testing).
    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl LocationCache for MemoryCache {
    fn get(&self, key: &str) -> Option<String> {
        let mut entries = lock(&self.entries);
        let entry = entries.get(key)?;
        if Instant::now() >= entry.expires_at {
            entries.remove(key);
            return None;
        }
        Some(entry.value.clone())
    }

    fn set(&self, key: &str, value: String, ttl: Duration) {
        let now = Instant::now();
        let expires_at = now
            .checked_add(ttl.min(MAX_TTL))
            .or_else(|| now.checked_add(Duration::from_secs(365 * 24 * 3600)))
            .unwrap_or(now);
        lock(&self.entries).insert(key.to_string(), MemoryEntry { value, expires_at });
    }

    fn clear(&self) {
        lock(&self.entries).clear();
    }
}

// ─── File backend ───────────────────────────────────────────────

#[derive(Serialize, Deserialize, Clone)]
struct FileEntry {
    value: String,
    /// Unix epoch millis.
    expires_at: i64,
}

static TMP_SEQ: AtomicU64 = AtomicU64::new(0);

/// JSON file cache. Misses re-read the file so entries written by other
/// processes become visible; writes merge into the current file contents
/// and replace it atomically.
pub struct FileCache {
    path: PathBuf,
    entries: Mutex<HashMap<String, FileEntry>>,
}

impl FileCache {
    /// Load from the default location (~/.portal-geo/cache.json).
    pub fn load() -> Self {
        Self::load_from(Self::default_path())
    }

    pub fn load_from(path: PathBuf) -> Self {
        let entries = Self::read_file(&path).unwrap_or_default();
        Self { path, entries: Mutex::new(entries) }
    }

    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".portal-geo")
            .join("cache.json")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_file(path: &Path) -> Option<HashMap<String, FileEntry>> {
        let data = fs::read_to_string(path).ok()?;
        serde_json::from_str(&data).ok()
    }

    /// Write to a sibling temp file, then rename over the cache file.
    fn persist(&self, entries: &HashMap<String, FileEntry>) {
        if let Some(parent) = self.path.parent() {
            let _ = fs::create_dir_all(parent);
        }
        let json = match serde_json::to_string_pretty(entries) {
            Ok(json) => json,
            Err(e) => {
                log::warn!("could not serialize cache: {}", e);
                return;
            }
        };

        let mut tmp_name = self.path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        tmp_name.push(format!(
            ".{}.{}.tmp",
            std::process::id(),
            TMP_SEQ.fetch_add(1, Ordering::Relaxed)
        ));
        let tmp = self.path.with_file_name(tmp_name);

        let result = fs::write(&tmp, json).and_then(|_| fs::rename(&tmp, &self.path));
        if let Err(e) = result {
            log::warn!("could not write cache file {}: {}", self.path.display(), e);
            let _ = fs::remove_file(&tmp);
        }
    }

    fn live(entry: &FileEntry, now: i64) -> bool {
        now < entry.expires_at
    }
}

impl LocationCache for FileCache {
    fn get(&self, key: &str) -> Option<String> {
        let now = chrono::Utc::now().timestamp_millis();
        let mut entries = lock(&self.entries);

        if let Some(entry) = entries.get(key) {
            if Self::live(entry, now) {
                return Some(entry.value.clone());
            }
        }

        // Another process may have filled it since we loaded
        let on_disk = Self::read_file(&self.path)?;
        let found = on_disk.get(key).filter(|e| Self::live(e, now)).map(|e| e.value.clone());
        *entries = on_disk;
        found
    }

    fn set(&self, key: &str, value: String, ttl: Duration) {
        let now = chrono::Utc::now().timestamp_millis();
        let ttl_ms = i64::try_from(ttl.min(MAX_TTL).as_millis()).unwrap_or(i64::MAX);
        let expires_at = now.saturating_add(ttl_ms);

        let mut entries = lock(&self.entries);
        // Start from the file so keys written by other processes survive
        let mut merged = Self::read_file(&self.path).unwrap_or_default();
        merged.insert(key.to_string(), FileEntry { value, expires_at });
        merged.retain(|_, e| Self::live(e, now));
        self.persist(&merged);
        *entries = merged;
    }

    fn clear(&self) {
        let mut entries = lock(&self.entries);
        entries.clear();
        self.persist(&entries);
    }
}
