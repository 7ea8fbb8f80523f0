//! In-memory store backend

use crate::{StoreBackend, StoreResult, StoreStats};
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;

/// In-memory store backend.
///
/// Entries live for the lifetime of the backend; nothing is evicted.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: DashMap<String, Vec<u8>>,
    stats: Arc<Mutex<StoreStats>>,
}

impl MemoryBackend {
    /// Create an empty memory backend
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Reset call counters without touching stored data
    pub fn reset_stats(&self) {
        *self.stats.lock() = StoreStats::default();
    }
}

#[async_trait]
impl StoreBackend for MemoryBackend {
    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        let value = self.entries.get(key).map(|entry| entry.value().clone());

        let mut stats = self.stats.lock();
        stats.reads += 1;
        if value.is_some() {
            stats.hits += 1;
        } else {
            stats.misses += 1;
        }

        Ok(value)
    }

    async fn put(&self, key: &str, value: Vec<u8>) -> StoreResult<()> {
        self.entries.insert(key.to_string(), value);
        self.stats.lock().writes += 1;
        Ok(())
    }

    async fn forget(&self, key: &str) -> StoreResult<bool> {
        let removed = self.entries.remove(key).is_some();
        self.stats.lock().deletes += 1;
        Ok(removed)
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        Ok(self.entries.contains_key(key))
    }

    async fn flush(&self) -> StoreResult<()> {
        self.entries.clear();
        Ok(())
    }

    async fn stats(&self) -> StoreResult<StoreStats> {
        let stats = self.stats.lock();
        Ok(StoreStats {
            total_keys: self.entries.len() as u64,
            ..stats.clone()
        })
    }
}
