//! In-memory content cache: mtime-gated lookups with a byte-size bound.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// One cached read. The validation hash is blake3 of the content bytes,
/// kept for diagnostics only; nothing branches on it.
#[derive(Clone, Debug)]
pub struct CacheEntry {
    pub content: Arc<str>,
    pub mtime_ns: i64,
    pub size_bytes: u64,
    pub validation_hash: [u8; 32],
}

struct CacheInner {
    map: HashMap<PathBuf, CacheEntry>,
    total_bytes: u64,
}

/// Per-run content cache shared across concurrent tasks.
///
/// A `get` is a hit only when the stored mtime equals the caller's live mtime;
/// any mismatch is a miss and the caller re-reads. Concurrent `set`s on the
/// same key are last-write-wins: both writers read the same file, so the bytes
/// are identical. After every `set`, entries are evicted oldest-mtime-first
/// until total cached bytes are back under the configured maximum.
pub struct ContentCache {
    max_bytes: u64,
    inner: Mutex<CacheInner>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ContentCache {
    pub fn new(max_bytes: u64) -> Self {
        Self {
            max_bytes,
            inner: Mutex::new(CacheInner {
                map: HashMap::new(),
                total_bytes: 0,
            }),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Look up `path`. Hit only when a stored entry exists and its mtime equals
    /// `live_mtime_ns`; a stale entry is removed and counted as a miss.
    pub fn get(&self, path: &Path, live_mtime_ns: i64) -> Option<CacheEntry> {
        let mut inner = self.inner.lock().unwrap();
        match inner.map.get(path) {
            Some(entry) if entry.mtime_ns == live_mtime_ns => {
                let entry = entry.clone();
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry)
            }
            Some(_) => {
                // File changed on disk since we cached it.
                if let Some(stale) = inner.map.remove(path) {
                    inner.total_bytes -= stale.size_bytes;
                }
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Insert or overwrite the entry for `path`, then evict oldest-mtime-first
    /// while the total exceeds the byte bound.
    pub fn set(&self, path: &Path, content: Arc<str>, mtime_ns: i64) {
        let size_bytes = content.len() as u64;
        let entry = CacheEntry {
            validation_hash: *blake3::hash(content.as_bytes()).as_bytes(),
            content,
            mtime_ns,
            size_bytes,
        };
        let mut inner = self.inner.lock().unwrap();
        if let Some(old) = inner.map.insert(path.to_path_buf(), entry) {
            inner.total_bytes -= old.size_bytes;
        }
        inner.total_bytes += size_bytes;
        while inner.total_bytes > self.max_bytes && !inner.map.is_empty() {
            let oldest = inner
                .map
                .iter()
                .min_by_key(|(_, e)| e.mtime_ns)
                .map(|(p, _)| p.clone());
            if let Some(p) = oldest
                && let Some(evicted) = inner.map.remove(&p)
            {
                inner.total_bytes -= evicted.size_bytes;
            }
        }
    }

    /// Drop every entry (the cleanup side effect of a memory pressure event).
    pub fn clear(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.map.clear();
        inner.total_bytes = 0;
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn total_bytes(&self) -> u64 {
        self.inner.lock().unwrap().total_bytes
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Fraction of lookups served from memory. 0.0 when no lookups happened.
    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits() as f64;
        let total = hits + self.misses() as f64;
        if total == 0.0 { 0.0 } else { hits / total }
    }
}
