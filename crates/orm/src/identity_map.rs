//! Identity Map - one live instance per (model, key)
//!
//! The registry hands out one [`IdentityMap`] per model name, created on
//! first access and kept until the registry is dropped. Each map owns strong
//! handles to its records; entries only come and go through the lifecycle
//! hooks on [`Record`] (save, load, delete, destroy) or an explicit clear.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;

use crate::model::Record;

/// Key to instance mapping for a single model class
#[derive(Debug)]
pub struct IdentityMap {
    model: String,
    entries: Mutex<HashMap<String, Record>>,
}

impl IdentityMap {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Name of the model class this map belongs to
    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn get(&self, key: &str) -> Option<Record> {
        self.entries.lock().get(key).cloned()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.lock().contains_key(key)
    }

    /// Whether `key` currently maps to this exact instance
    pub fn contains(&self, key: &str, record: &Record) -> bool {
        self.entries
            .lock()
            .get(key)
            .is_some_and(|mapped| Record::ptr_eq(mapped, record))
    }

    /// Map `key` to `record`, returning the instance it replaced
    pub fn insert(&self, key: impl Into<String>, record: Record) -> Option<Record> {
        self.entries.lock().insert(key.into(), record)
    }

    /// Map `key` to `record` unless another instance already holds it.
    /// Returns whichever instance is mapped afterwards.
    pub fn insert_if_absent(&self, key: impl Into<String>, record: Record) -> Record {
        self.entries.lock().entry(key.into()).or_insert(record).clone()
    }

    pub fn remove(&self, key: &str) -> Option<Record> {
        self.entries.lock().remove(key)
    }

    /// Remove `key` only if it maps to this exact instance
    pub fn remove_if_same(&self, key: &str, record: &Record) -> bool {
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some(mapped) if Record::ptr_eq(mapped, record) => {
                let removed = entries.remove(key);
                drop(entries);
                drop(removed);
                true
            }
            _ => false,
        }
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries.lock().keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn clear(&self) {
        // Records are dropped after the lock is released.
        let drained = std::mem::take(&mut *self.entries.lock());
        tracing::trace!("Cleared {} entries from {} identity map", drained.len(), self.model);
    }
}

/// Registry of identity maps, keyed by model name
#[derive(Debug, Default)]
pub struct IdentityMapRegistry {
    maps: DashMap<String, Arc<IdentityMap>>,
}

impl IdentityMapRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The map for `model`, created on first access
    pub fn map_for(&self, model: &str) -> Arc<IdentityMap> {
        if let Some(map) = self.maps.get(model) {
            return map.clone();
        }
        self.maps
            .entry(model.to_string())
            .or_insert_with(|| Arc::new(IdentityMap::new(model)))
            .clone()
    }

    /// Empty every map. The maps themselves stay registered.
    pub fn clear(&self) {
        let maps: Vec<Arc<IdentityMap>> = self.maps.iter().map(|entry| entry.value().clone()).collect();
        for map in maps {
            map.clear();
        }
    }

    /// Empty the map for `model`, if it exists
    pub fn clear_model(&self, model: &str) {
        let map = self.maps.get(model).map(|entry| entry.value().clone());
        if let Some(map) = map {
            map.clear();
        }
    }

    /// Names of models whose map has been created
    pub fn models(&self) -> Vec<String> {
        let mut models: Vec<String> = self.maps.iter().map(|entry| entry.key().clone()).collect();
        models.sort();
        models
    }

    /// Number of records held across every map
    pub fn total_entries(&self) -> usize {
        self.maps.iter().map(|entry| entry.value().len()).sum()
    }
}

impl Record {
    /// Register this record in its class's identity map, overwriting any
    /// previous entry for its key, then do the same for embedded records.
    pub fn add_to_identity_map(&self) {
        let class = self.class();
        if !class.uses_identity_map() {
            return;
        }

        let key = self.id();
        tracing::trace!("Adding {}:{} to identity map", class.name(), key);
        let replaced = class.identity_map().insert(key, self.clone());
        drop(replaced);

        if class.has_embedded_lists() {
            for child in self.embedded_objects() {
                child.add_to_identity_map();
            }
        }
    }

    /// Deregister this record (and its embedded records). An entry that
    /// maps the key to a different instance is left alone.
    pub fn remove_from_identity_map(&self) {
        let class = self.class();
        if !class.uses_identity_map() {
            return;
        }

        let key = self.id();
        if class.identity_map().remove_if_same(&key, self) {
            tracing::trace!("Removed {}:{} from identity map", class.name(), key);
        }

        if class.has_embedded_lists() {
            for child in self.embedded_objects() {
                child.remove_from_identity_map();
            }
        }
    }

    /// Drop this record's key from its class's map whatever instance it
    /// maps to. Used once the key is gone from the store.
    pub(crate) fn evict_from_identity_map(&self) {
        let class = self.class();
        if !class.uses_identity_map() {
            return;
        }

        let key = self.id();
        if class.identity_map().remove(&key).is_some() {
            tracing::trace!("Evicted {}:{} from identity map", class.name(), key);
        }

        if class.has_embedded_lists() {
            for child in self.embedded_objects() {
                child.remove_from_identity_map();
            }
        }
    }

    /// Whether the identity map maps this record's key to this instance
    pub fn in_identity_map(&self) -> bool {
        let class = self.class();
        class.uses_identity_map() && class.identity_map().contains(&self.id(), self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_memoizes_maps() {
        let registry = IdentityMapRegistry::new();
        let first = registry.map_for("User");
        let second = registry.map_for("User");

        assert!(Arc::ptr_eq(&first, &second));
        assert!(first.is_empty());
        assert_eq!(first.model(), "User");
        assert_eq!(registry.models(), vec!["User"]);
    }

    #[test]
    fn test_registry_keeps_maps_separate() {
        let registry = IdentityMapRegistry::new();
        let users = registry.map_for("User");
        let skills = registry.map_for("Skill");

        assert!(!Arc::ptr_eq(&users, &skills));
        assert_eq!(registry.models(), vec!["Skill", "User"]);
        assert_eq!(registry.total_entries(), 0);
    }

    #[test]
    fn test_clear_model_on_unknown_model_is_noop() {
        let registry = IdentityMapRegistry::new();
        registry.clear_model("Ghost");
        assert!(registry.models().is_empty());
    }
}
