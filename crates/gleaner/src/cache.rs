//! In-memory page cache with TTL expiry.
//!
//! ## LRU eviction
//!
//! When the cache is full, expired entries are dropped first; if none are
//! expired, the least-recently-accessed entry goes.

use crate::fetch::FetchedPage;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Default maximum number of cached pages before LRU eviction.
pub const DEFAULT_MAX_ENTRIES: usize = 256;

/// Default lifetime of a cached page.
pub const DEFAULT_TTL: Duration = Duration::from_secs(15 * 60);

struct CacheEntry {
    page: FetchedPage,
    cached_at: Instant,
    ttl: Duration,
    /// Access order stamp for LRU.
    last_accessed: u64,
}

impl CacheEntry {
    fn is_expired(&self) -> bool {
        self.cached_at.elapsed() >= self.ttl
    }
}

/// Fetched pages keyed by requested URL.
pub struct PageCache {
    entries: HashMap<String, CacheEntry>,
    default_ttl: Duration,
    max_entries: usize,
    clock: u64,
}

impl PageCache {
    pub fn new(default_ttl: Duration, max_entries: usize) -> Self {
        Self {
            entries: HashMap::new(),
            default_ttl,
            max_entries: max_entries.max(1),
            clock: 0,
        }
    }

    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    /// A fresh cached copy of `url`, if any.
    pub fn get(&mut self, url: &str) -> Option<FetchedPage> {
        let stamp = self.tick();
        let entry = self.entries.get_mut(url)?;
        if entry.is_expired() {
            return None;
        }
        entry.last_accessed = stamp;
        Some(entry.page.clone())
    }

    /// Store `page` under `url`, evicting first if the cache is full.
    pub fn put(&mut self, url: &str, page: FetchedPage) {
        if self.entries.len() >= self.max_entries && !self.entries.contains_key(url) {
            self.evict_lru();
        }
        let stamp = self.tick();
        self.entries.insert(
            url.to_string(),
            CacheEntry {
                page,
                cached_at: Instant::now(),
                ttl: self.default_ttl,
                last_accessed: stamp,
            },
        );
    }

    pub fn invalidate(&mut self, url: &str) -> bool {
        self.entries.remove(url).is_some()
    }

    fn evict_lru(&mut self) {
        let before = self.entries.len();
        self.cleanup_expired();
        if self.entries.len() < before {
            return;
        }

        if let Some(lru_url) = self
            .entries
            .iter()
            .min_by_key(|(_, entry)| entry.last_accessed)
            .map(|(url, _)| url.clone())
        {
            tracing::debug!("evicting LRU page: {lru_url}");
            self.entries.remove(&lru_url);
        }
    }

    /// Number of cached pages (including expired).
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn cleanup_expired(&mut self) {
        self.entries.retain(|_, entry| !entry.is_expired());
    }
}

impl Default for PageCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL, DEFAULT_MAX_ENTRIES)
    }
}
