//! Key-value cache with per-entry expiry.
//!
//! Values are opaque bytes. Every write replaces the whole value for a key in
//! one step, so a reader sees either the previous value or the new one.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::debug;

use crate::metrics::CacheMetrics;
use crate::paths::{atomic_write, create_exclusive, kv_entry_path};

pub trait KeyValueCache: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Store `value`, replacing any previous one. `None` never expires.
    fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> Result<()>;

    /// Returns whether an entry was removed.
    fn delete(&self, key: &str) -> Result<bool>;

    /// Store `value` only if no live entry exists. Returns whether it was stored.
    fn set_if_absent(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> Result<bool>;

    fn exists(&self, key: &str) -> bool {
        self.get(key).map(|v| v.is_some()).unwrap_or(false)
    }
}

// =============================================================================
// In-memory cache
// =============================================================================

struct MemoryEntry {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

impl MemoryEntry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| now < at)
    }
}

#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, MemoryEntry>>,
    metrics: CacheMetrics,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn metrics(&self) -> &CacheMetrics {
        &self.metrics
    }

    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries.lock().values().filter(|e| e.is_live(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KeyValueCache for MemoryCache {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        let value = match entries.get(key) {
            Some(entry) if entry.is_live(now) => Some(entry.value.clone()),
            Some(_) => {
                entries.remove(key);
                self.metrics.record_expired();
                None
            }
            None => None,
        };
        self.metrics.record_get(value.is_some());
        Ok(value)
    }

    fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> Result<()> {
        let entry = MemoryEntry {
            value: value.to_vec(),
            expires_at: ttl.map(|t| Instant::now() + t),
        };
        self.entries.lock().insert(key.to_string(), entry);
        self.metrics.record_write();
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<bool> {
        let removed = self.entries.lock().remove(key).is_some();
        if removed {
            self.metrics.record_delete();
        }
        Ok(removed)
    }

    fn set_if_absent(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> Result<bool> {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        if entries.get(key).is_some_and(|e| e.is_live(now)) {
            self.metrics.record_contended();
            return Ok(false);
        }
        entries.insert(
            key.to_string(),
            MemoryEntry {
                value: value.to_vec(),
                expires_at: ttl.map(|t| now + t),
            },
        );
        self.metrics.record_write();
        Ok(true)
    }
}

// =============================================================================
// Filesystem cache
// =============================================================================

const NEVER: &str = "never";

/// One file per key. The first line holds the expiry (RFC 3339 or `never`),
/// the rest of the file is the value.
pub struct FsCache {
    cache_root: Arc<Path>,
    /// Serializes check-then-write sequences within this process.
    write_lock: Mutex<()>,
    metrics: CacheMetrics,
}

impl FsCache {
    pub fn new<P: AsRef<Path>>(cache_root: P) -> Result<Self> {
        let cache_root = cache_root.as_ref().to_path_buf();
        std::fs::create_dir_all(&cache_root)
            .map_err(|e| anyhow!("Failed to create cache root {}: {}", cache_root.display(), e))?;
        Ok(Self {
            cache_root: Arc::from(cache_root),
            write_lock: Mutex::new(()),
            metrics: CacheMetrics::default(),
        })
    }

    pub fn cache_root(&self) -> &Path {
        &self.cache_root
    }

    pub fn metrics(&self) -> &CacheMetrics {
        &self.metrics
    }

    fn path(&self, key: &str) -> Result<PathBuf> {
        kv_entry_path(&self.cache_root, key)
    }

    fn write_entry(&self, path: &Path, value: &[u8], ttl: Option<Duration>) -> Result<()> {
        atomic_write(path, &entry_contents(value, ttl)?)?;
        self.metrics.record_write();
        Ok(())
    }

    /// Value of a live entry. Expired entries are removed.
    fn read_live(&self, path: &Path) -> Result<Option<Vec<u8>>> {
        let contents = match std::fs::read(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(anyhow!("Failed to read cache entry {}: {}", path.display(), e)),
        };
        let (expires_at, value) = parse_entry(&contents)
            .ok_or_else(|| anyhow!("Corrupt cache entry {}", path.display()))?;
        if expires_at.is_some_and(|at| at <= Utc::now()) {
            debug!(path = %path.display(), "cache entry expired");
            self.metrics.record_expired();
            let _ = std::fs::remove_file(path);
            return Ok(None);
        }
        Ok(Some(value.to_vec()))
    }
}

fn entry_contents(value: &[u8], ttl: Option<Duration>) -> Result<Vec<u8>> {
    let header = match ttl {
        Some(ttl) => {
            let ttl =
                chrono::Duration::from_std(ttl).map_err(|e| anyhow!("Invalid cache ttl: {}", e))?;
            (Utc::now() + ttl).to_rfc3339()
        }
        None => NEVER.to_string(),
    };
    let mut contents = Vec::with_capacity(header.len() + 1 + value.len());
    contents.extend_from_slice(header.as_bytes());
    contents.push(b'\n');
    contents.extend_from_slice(value);
    Ok(contents)
}

fn parse_entry(contents: &[u8]) -> Option<(Option<DateTime<Utc>>, &[u8])> {
    let split = contents.iter().position(|b| *b == b'\n')?;
    let header = std::str::from_utf8(&contents[..split]).ok()?;
    let expires_at = if header == NEVER {
        None
    } else {
        Some(DateTime::parse_from_rfc3339(header).ok()?.with_timezone(&Utc))
    };
    Some((expires_at, &contents[split + 1..]))
}

impl KeyValueCache for FsCache {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let value = self.read_live(&self.path(key)?)?;
        self.metrics.record_get(value.is_some());
        Ok(value)
    }

    fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> Result<()> {
        let path = self.path(key)?;
        let _guard = self.write_lock.lock();
        self.write_entry(&path, value, ttl)
    }

    fn delete(&self, key: &str) -> Result<bool> {
        let path = self.path(key)?;
        let _guard = self.write_lock.lock();
        match std::fs::remove_file(&path) {
            Ok(()) => {
                self.metrics.record_delete();
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(anyhow!("Failed to delete cache entry {}: {}", path.display(), e)),
        }
    }

    /// Claims the key with an exclusive create, so two processes sharing the
    /// root never both win. An expired entry is evicted and the claim retried
    /// once.
    fn set_if_absent(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> Result<bool> {
        let path = self.path(key)?;
        let contents = entry_contents(value, ttl)?;
        let _guard = self.write_lock.lock();
        for _ in 0..2 {
            if create_exclusive(&path, &contents)? {
                self.metrics.record_write();
                return Ok(true);
            }
            if self.read_live(&path)?.is_some() {
                break;
            }
        }
        self.metrics.record_contended();
        Ok(false)
    }
}
