//! Bounded in-memory byte cache keyed by normalized remote path.
//!
//! Capacity is enforced in bytes and (optionally) entry count; when either
//! is exceeded the least recently used entries are evicted first. Entries
//! may also expire after a TTL. A value larger than the whole byte budget
//! is never retained.

use bytes::Bytes;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};
use tracing::debug;

use pixsync_core::config::CacheConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheLimits {
    pub max_bytes: u64,
    /// 0 = unlimited
    pub max_entries: usize,
    pub ttl: Option<Duration>,
}

impl CacheLimits {
    pub fn files(cfg: &CacheConfig) -> Self {
        CacheLimits {
            max_bytes: cfg.files_max_mb * 1024 * 1024,
            max_entries: cfg.max_entries,
            ttl: cfg.ttl(),
        }
    }

    pub fn thumbnails(cfg: &CacheConfig) -> Self {
        CacheLimits {
            max_bytes: cfg.thumbnails_max_mb * 1024 * 1024,
            max_entries: cfg.max_entries,
            ttl: cfg.ttl(),
        }
    }
}

struct Entry {
    data: Bytes,
    inserted_at: Instant,
    last_used: u64,
}

#[derive(Default)]
struct Inner {
    entries: HashMap<String, Entry>,
    total_bytes: u64,
    /// Logical clock for recency
    tick: u64,
}

impl Inner {
    fn remove(&mut self, key: &str) -> Option<Entry> {
        let entry = self.entries.remove(key)?;
        self.total_bytes -= entry.data.len() as u64;
        Some(entry)
    }
}

pub struct ByteCache {
    name: &'static str,
    limits: CacheLimits,
    inner: Mutex<Inner>,
}

impl ByteCache {
    pub fn new(name: &'static str, limits: CacheLimits) -> Self {
        ByteCache {
            name,
            limits,
            inner: Mutex::new(Inner::default()),
        }
    }

    pub fn limits(&self) -> CacheLimits {
        self.limits
    }

    /// Look up `key`, refreshing its recency. Expired entries are dropped.
    pub fn get(&self, key: &str) -> Option<Bytes> {
        let mut inner = self.lock();
        let expired = match inner.entries.get(key) {
            None => return None,
            Some(entry) => self.is_expired(entry),
        };
        if expired {
            inner.remove(key);
            debug!(cache = self.name, key = %key, "expired");
            return None;
        }
        inner.tick += 1;
        let tick = inner.tick;
        let entry = inner.entries.get_mut(key)?;
        entry.last_used = tick;
        Some(entry.data.clone())
    }

    pub fn contains(&self, key: &str) -> bool {
        let inner = self.lock();
        inner
            .entries
            .get(key)
            .is_some_and(|entry| !self.is_expired(entry))
    }

    /// Insert or replace `key`, then evict until within limits.
    pub fn put(&self, key: &str, data: Bytes) {
        let size = data.len() as u64;
        let mut inner = self.lock();
        inner.remove(key);
        if size > self.limits.max_bytes {
            debug!(cache = self.name, key = %key, bytes = size, "too large to cache");
            return;
        }

        inner.tick += 1;
        let entry = Entry {
            data,
            inserted_at: Instant::now(),
            last_used: inner.tick,
        };
        inner.entries.insert(key.to_string(), entry);
        inner.total_bytes += size;

        while inner.total_bytes > self.limits.max_bytes
            || (self.limits.max_entries > 0 && inner.entries.len() > self.limits.max_entries)
        {
            let Some(victim) = inner
                .entries
                .iter()
                .min_by_key(|(_, e)| e.last_used)
                .map(|(k, _)| k.clone())
            else {
                break;
            };
            inner.remove(&victim);
            debug!(cache = self.name, key = %victim, "evicted");
        }
    }

    pub fn remove(&self, key: &str) -> bool {
        self.lock().remove(key).is_some()
    }

    /// Drop every entry whose TTL has passed.
    pub fn evict_expired(&self) {
        let mut inner = self.lock();
        let expired: Vec<String> = inner
            .entries
            .iter()
            .filter(|(_, e)| self.is_expired(e))
            .map(|(k, _)| k.clone())
            .collect();
        for key in expired {
            inner.remove(&key);
        }
    }

    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.entries.clear();
        inner.total_bytes = 0;
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    pub fn total_bytes(&self) -> u64 {
        self.lock().total_bytes
    }

    fn is_expired(&self, entry: &Entry) -> bool {
        self.limits
            .ttl
            .is_some_and(|ttl| entry.inserted_at.elapsed() >= ttl)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
