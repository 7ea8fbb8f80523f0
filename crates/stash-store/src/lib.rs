//! # stash-store
//!
//! Key-value store collaborators for the stash object mapper.
//!
//! A backend only knows about opaque byte values addressed by string keys.
//! [`Store`] sits on top of a backend and speaks in raw attribute maps, the
//! JSON objects that model records are persisted as.
//!
//! ```rust
//! use stash_store::{MemoryBackend, Store};
//! use serde_json::{json, Map};
//!
//! # tokio_test::block_on(async {
//! let store = Store::new(MemoryBackend::new());
//!
//! let mut attrs = Map::new();
//! attrs.insert("name".to_string(), json!("John"));
//! store.write("users:1", &attrs).await.unwrap();
//!
//! let loaded = store.read("users:1").await.unwrap();
//! assert_eq!(loaded, Some(attrs));
//! # });
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

pub mod backends;

pub use backends::*;

/// Store operation errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Stored value under '{0}' is not an attribute map")]
    InvalidRecord(String),
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Attributes in the shape they are persisted: persisted attribute name to
/// store-ready value.
pub type RawAttributes = Map<String, Value>;

/// Core backend trait that all store drivers implement
#[async_trait]
pub trait StoreBackend: Send + Sync {
    /// Get the bytes stored under `key`
    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>>;

    /// Store bytes under `key`, replacing any previous value
    async fn put(&self, key: &str, value: Vec<u8>) -> StoreResult<()>;

    /// Remove `key`, returning whether it was present
    async fn forget(&self, key: &str) -> StoreResult<bool>;

    /// Check if a key exists
    async fn exists(&self, key: &str) -> StoreResult<bool>;

    /// Remove every entry
    async fn flush(&self) -> StoreResult<()>;

    /// Call statistics (if supported)
    async fn stats(&self) -> StoreResult<StoreStats> {
        Ok(StoreStats::default())
    }
}

#[async_trait]
impl<B: StoreBackend + ?Sized> StoreBackend for Arc<B> {
    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        (**self).get(key).await
    }

    async fn put(&self, key: &str, value: Vec<u8>) -> StoreResult<()> {
        (**self).put(key, value).await
    }

    async fn forget(&self, key: &str) -> StoreResult<bool> {
        (**self).forget(key).await
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        (**self).exists(key).await
    }

    async fn flush(&self) -> StoreResult<()> {
        (**self).flush().await
    }

    async fn stats(&self) -> StoreResult<StoreStats> {
        (**self).stats().await
    }
}

/// Store statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    /// Number of `get` calls
    pub reads: u64,
    /// Number of `put` calls
    pub writes: u64,
    /// Number of `forget` calls
    pub deletes: u64,
    pub hits: u64,
    pub misses: u64,
    pub total_keys: u64,
}

impl StoreStats {
    pub fn hit_ratio(&self) -> f64 {
        if self.hits + self.misses == 0 {
            0.0
        } else {
            self.hits as f64 / (self.hits + self.misses) as f64
        }
    }
}

/// Attribute-map facade over a [`StoreBackend`].
///
/// Cheap to clone; clones share the backend.
#[derive(Clone)]
pub struct Store {
    backend: Arc<dyn StoreBackend>,
}

impl Store {
    /// Create a store over the given backend
    pub fn new<B: StoreBackend + 'static>(backend: B) -> Self {
        Self {
            backend: Arc::new(backend),
        }
    }

    /// Create a store over an already shared backend
    pub fn from_arc(backend: Arc<dyn StoreBackend>) -> Self {
        Self { backend }
    }

    /// Fetch the raw attributes stored under `key`
    pub async fn read(&self, key: &str) -> StoreResult<Option<RawAttributes>> {
        match self.backend.get(key).await? {
            Some(bytes) => match serde_json::from_slice::<Value>(&bytes)? {
                Value::Object(attrs) => Ok(Some(attrs)),
                _ => Err(StoreError::InvalidRecord(key.to_string())),
            },
            None => Ok(None),
        }
    }

    /// Persist raw attributes under `key`
    pub async fn write(&self, key: &str, attrs: &RawAttributes) -> StoreResult<()> {
        let bytes = serde_json::to_vec(attrs)?;
        tracing::debug!("Writing {} bytes to '{}'", bytes.len(), key);
        self.backend.put(key, bytes).await
    }

    /// Remove `key`, returning whether it was present
    pub async fn delete(&self, key: &str) -> StoreResult<bool> {
        self.backend.forget(key).await
    }

    /// Check if a key exists
    pub async fn exists(&self, key: &str) -> StoreResult<bool> {
        self.backend.exists(key).await
    }

    /// Remove every entry
    pub async fn clear(&self) -> StoreResult<()> {
        self.backend.flush().await
    }

    pub async fn stats(&self) -> StoreResult<StoreStats> {
        self.backend.stats().await
    }

    /// The shared backend
    pub fn backend(&self) -> &Arc<dyn StoreBackend> {
        &self.backend
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store").finish_non_exhaustive()
    }
}
