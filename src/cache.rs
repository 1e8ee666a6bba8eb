// Reference data cache

use dashmap::DashMap;
use serde_json::Value;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Thread-safe TTL cache for list responses, keyed by table.
///
/// Staff and grade lookups are re-read by every dashboard screen; caching
/// the serialized rows keeps those screens off the provider for a short
/// window. Any mutation of a table drops its entry.
#[derive(Clone)]
pub struct ListCache {
    cache: Arc<DashMap<String, CachedRows>>,

    /// Cache TTL in seconds
    cache_ttl: u64,
}

struct CachedRows {
    rows: Value,
    stored_at: u64,
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs()
}

impl ListCache {
    /// Create a new cache
    pub fn new(cache_ttl: u64) -> Self {
        Self {
            cache: Arc::new(DashMap::new()),
            cache_ttl,
        }
    }

    /// Get the cached rows for a table if the entry is still fresh
    pub fn get(&self, table: &str) -> Option<Value> {
        let entry = self.cache.get(table)?;

        if unix_now().saturating_sub(entry.stored_at) >= self.cache_ttl {
            drop(entry);
            self.cache.remove(table);
            return None;
        }

        Some(entry.rows.clone())
    }

    /// Store the rows for a table
    pub fn put(&self, table: &str, rows: Value) {
        tracing::debug!(table = table, "Caching list response");
        self.cache.insert(
            table.to_string(),
            CachedRows {
                rows,
                stored_at: unix_now(),
            },
        );
    }

    /// Drop a table's entry after a mutation
    pub fn invalidate(&self, table: &str) {
        self.cache.remove(table);
    }
}
