//! In-memory TTL cache shared between scan workers
//!
//! Used for catalog resolutions and search-engine keyword guesses. Entries are
//! written once: a concurrent second writer for the same key loses, so a fresh
//! answer is never replaced by a stale one racing behind it.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A cached entry with expiration time
#[derive(Clone)]
struct CacheEntry<T> {
    value: T,
    expires_at: Instant,
}

/// Simple TTL-based cache
pub struct TtlCache<T: Clone + Send + Sync> {
    entries: RwLock<HashMap<String, CacheEntry<T>>>,
    default_ttl: Duration,
}

impl<T: Clone + Send + Sync> TtlCache<T> {
    /// Create a new cache with the specified default TTL
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            default_ttl,
        }
    }

    /// Get a cached value if it exists and hasn't expired
    pub fn get(&self, key: &str) -> Option<T> {
        let entries = self.entries.read();
        entries.get(key).and_then(|entry| {
            if Instant::now() < entry.expires_at {
                Some(entry.value.clone())
            } else {
                None
            }
        })
    }

    /// Insert unless a live entry already exists. Returns the value now cached.
    pub fn insert_if_absent(&self, key: String, value: T) -> T {
        let mut entries = self.entries.write();
        let now = Instant::now();
        if let Some(existing) = entries.get(&key)
            && now < existing.expires_at
        {
            return existing.value.clone();
        }
        entries.insert(
            key,
            CacheEntry {
                value: value.clone(),
                expires_at: now + self.default_ttl,
            },
        );
        value
    }

    /// Remove a cached value
    pub fn remove(&self, key: &str) -> bool {
        self.entries.write().remove(key).is_some()
    }

    /// Drop every entry whose value matches `predicate`; returns how many went
    pub fn remove_where(&self, mut predicate: impl FnMut(&T) -> bool) -> usize {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, entry| !predicate(&entry.value));
        before - entries.len()
    }

    /// Remove all expired entries; returns how many went
    pub fn cleanup_expired(&self) -> usize {
        let mut entries = self.entries.write();
        let before = entries.len();
        let now = Instant::now();
        entries.retain(|_, entry| entry.expires_at > now);
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

/// Shared cache instance type
pub type SharedCache<T> = Arc<TtlCache<T>>;

/// Create a new shared cache
pub fn create_cache<T: Clone + Send + Sync>(default_ttl: Duration) -> SharedCache<T> {
    Arc::new(TtlCache::new(default_ttl))
}
