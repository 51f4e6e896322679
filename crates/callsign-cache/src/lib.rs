//! Document cache for Callsign
//!
//! Holds generated directory, dialplan and configuration documents in memory
//! with a per-entry absolute expiry. Expiry is checked lazily on read and a
//! background sweep drops entries nobody asks for again.
//!
//! # Features
//!
//! - Reader/writer locking: lookups proceed concurrently, mutations are exclusive
//! - Invalidation by exact key, by prefix, or by a `*` wildcard pattern
//! - Kind-namespaced keys (see [`keys`])
//!
//! # Example
//!
//! ```
//! use callsign_cache::{keys, XmlCache};
//! use std::time::Duration;
//!
//! let cache = XmlCache::new();
//! cache.set(keys::directory_key("acme.example.com", "1001"), "<document/>", Duration::from_secs(300));
//! assert_eq!(
//!     cache.get("directory:acme.example.com:1001").as_deref(),
//!     Some("<document/>")
//! );
//!
//! let removed = cache.delete_by_pattern(&keys::directory_domain_pattern("acme.example.com"));
//! assert_eq!(removed, 1);
//! ```

pub mod keys;

pub use keys::CacheTtl;

use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug, Clone)]
struct CacheItem {
    value: String,
    expires_at: Instant,
}

impl CacheItem {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Counts reported by [`XmlCache::stats`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub total_items: usize,
    pub expired_items: usize,
    pub active_items: usize,
}

/// In-memory TTL cache of generated documents
#[derive(Debug, Default)]
pub struct XmlCache {
    items: RwLock<HashMap<String, CacheItem>>,
}

impl XmlCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Value for `key` unless missing or expired
    pub fn get(&self, key: &str) -> Option<String> {
        let items = self.items.read();
        let item = items.get(key)?;
        if item.is_expired(Instant::now()) {
            return None;
        }
        Some(item.value.clone())
    }

    /// Store `value` until `ttl` from now, replacing any previous entry
    pub fn set(&self, key: impl Into<String>, value: impl Into<String>, ttl: Duration) {
        let item = CacheItem {
            value: value.into(),
            expires_at: Instant::now() + ttl,
        };
        self.items.write().insert(key.into(), item);
    }

    /// Remove one key; returns whether it was present
    pub fn delete(&self, key: &str) -> bool {
        self.items.write().remove(key).is_some()
    }

    /// Remove every key starting with `prefix`; returns the count removed
    pub fn delete_by_prefix(&self, prefix: &str) -> usize {
        let mut items = self.items.write();
        let before = items.len();
        items.retain(|key, _| !key.starts_with(prefix));
        before - items.len()
    }

    /// Remove every key matching a `*` wildcard pattern; returns the count removed
    pub fn delete_by_pattern(&self, pattern: &str) -> usize {
        let mut items = self.items.write();
        let before = items.len();
        items.retain(|key, _| !match_pattern(pattern, key));
        let removed = before - items.len();
        debug!(pattern, removed, "Cache entries invalidated");
        removed
    }

    /// Drop everything
    pub fn flush(&self) {
        self.items.write().clear();
    }

    pub fn stats(&self) -> CacheStats {
        let items = self.items.read();
        let now = Instant::now();
        let total = items.len();
        let expired = items.values().filter(|item| item.is_expired(now)).count();
        CacheStats {
            total_items: total,
            expired_items: expired,
            active_items: total - expired,
        }
    }

    /// Remove expired entries; returns the count removed
    pub fn purge_expired(&self) -> usize {
        let mut items = self.items.write();
        let now = Instant::now();
        let before = items.len();
        items.retain(|_, item| !item.is_expired(now));
        before - items.len()
    }

    /// Start the periodic expiry sweep
    ///
    /// The task holds only a weak reference and ends once the cache is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let cache: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // First tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(cache) = cache.upgrade() else {
                    break;
                };
                let purged = cache.purge_expired();
                if purged > 0 {
                    debug!(purged, "Cache sweep removed expired entries");
                }
            }
        })
    }
}

/// Wildcard match where `*` spans any substring
///
/// A lone `*` matches everything; a pattern without `*` must equal the key.
/// Otherwise the text before the first `*` must be a prefix, the text after
/// the last `*` a suffix, and the pieces in between must appear in order in
/// what remains.
pub fn match_pattern(pattern: &str, key: &str) -> bool {
    if pattern == "*" {
        return true;
    }

    let parts: Vec<&str> = pattern.split('*').collect();
    if parts.len() == 1 {
        return pattern == key;
    }

    let first = parts[0];
    let last = parts[parts.len() - 1];
    if key.len() < first.len() + last.len() || !key.starts_with(first) || !key.ends_with(last) {
        return false;
    }

    let mut rest = &key[first.len()..key.len() - last.len()];
    for middle in &parts[1..parts.len() - 1] {
        match rest.find(middle) {
            Some(idx) => rest = &rest[idx + middle.len()..],
            None => return false,
        }
    }
    true
}
