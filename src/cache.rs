//! Result Cache
//!
//! Local storage for raw query responses, consulted according to the query's
//! [`CachePolicy`](crate::query::CachePolicy). Keys come from
//! [`QueryRequest::cache_key`](crate::transport::QueryRequest::cache_key).

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Storage for cached raw responses
#[async_trait]
pub trait ResultCache: Send + Sync {
    /// Look up a cached response
    async fn get(&self, key: &str) -> Option<Value>;

    /// Store or replace a response
    async fn put(&self, key: String, value: Value);

    /// Drop every entry
    async fn clear(&self);
}

struct CachedEntry {
    value: Value,
    cached_at: DateTime<Utc>,
}

/// In-process cache with an optional maximum entry age
#[derive(Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<String, CachedEntry>>,
    max_age: Option<Duration>,
}

impl MemoryCache {
    /// Create a cache whose entries never expire
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a cache whose entries expire after `max_age`
    pub fn with_max_age(max_age: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            max_age: Some(max_age),
        }
    }

    /// Number of stored entries, including expired ones not yet evicted
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Check if the cache holds no entries
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    fn is_fresh(&self, entry: &CachedEntry, now: DateTime<Utc>) -> bool {
        match self.max_age {
            Some(max_age) => now - entry.cached_at <= max_age,
            None => true,
        }
    }
}

#[async_trait]
impl ResultCache for MemoryCache {
    async fn get(&self, key: &str) -> Option<Value> {
        let now = Utc::now();
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                Some(entry) if self.is_fresh(entry, now) => return Some(entry.value.clone()),
                Some(_) => {}
                None => return None,
            }
        }

        // Expired: evict so the next store starts clean
        self.entries.write().await.remove(key);
        None
    }

    async fn put(&self, key: String, value: Value) {
        let entry = CachedEntry {
            value,
            cached_at: Utc::now(),
        };
        self.entries.write().await.insert(key, entry);
    }

    async fn clear(&self) {
        self.entries.write().await.clear();
    }
}
