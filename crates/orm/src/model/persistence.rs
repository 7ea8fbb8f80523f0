//! Persistence operations - save, load, delete, destroy, reload
//!
//! Every operation keeps the identity map in step with the store: records
//! are registered after a successful save or load and deregistered after a
//! delete. No lock is held across a store call or an observer.

use std::sync::Arc;

use serde_json::Value;

use crate::error::{ModelError, ModelResult};
use crate::model::class::ModelClass;
use crate::model::primary_key::KEY_ATTRIBUTE;
use crate::model::record::{IntoAttributes, Record};

impl Record {
    /// Write the record to the store and register it in the identity map
    pub async fn save(&self) -> ModelResult<()> {
        let class = self.class().clone();
        let new_record = self.is_new_record();
        self.ensure_key()?;

        class.lifecycle().trigger_before_save(self, new_record).await?;

        let key = self.store_key();
        let raw = self.to_persisted_form()?;
        class.store().write(&key, &raw).await?;
        tracing::debug!("Saved {} ({})", key, if new_record { "created" } else { "updated" });

        self.mark_persisted();
        self.add_to_identity_map();

        class.lifecycle().trigger_after_save(self, new_record).await
    }

    pub async fn update_attributes(&self, attrs: impl IntoAttributes) -> ModelResult<()> {
        self.bulk_assign(attrs)?;
        self.save().await
    }

    /// Remove the record from the store and its key from the identity map,
    /// whichever instance the key maps to. No observers run.
    pub async fn delete(&self) -> ModelResult<()> {
        let key = self.store_key();
        let existed = self.class().store().delete(&key).await?;
        tracing::debug!("Deleted {} (existed: {})", key, existed);

        self.mark_destroyed();
        self.evict_from_identity_map();
        Ok(())
    }

    /// `delete` wrapped in the destroy observers
    pub async fn destroy(&self) -> ModelResult<()> {
        let class = self.class().clone();
        class.lifecycle().trigger_before_destroy(self).await?;
        self.delete().await?;
        class.lifecycle().trigger_after_destroy(self).await
    }

    /// Refresh the record in place from the store.
    ///
    /// Always reads the store, whether or not the record is cached, and
    /// leaves the record's own identity map entry untouched.
    pub async fn reload(&self) -> ModelResult<()> {
        let class = self.class().clone();
        let key = self.store_key();
        let raw = class
            .store()
            .read(&key)
            .await?
            .ok_or_else(|| ModelError::NotFound(key.clone()))?;
        tracing::debug!("Reloaded {}", key);

        let mut attrs = class.translate_persisted(raw);
        attrs.remove(KEY_ATTRIBUTE);
        self.reset_attributes();
        self.bulk_assign(attrs)
    }
}

impl ModelClass {
    /// Fetch by key, consulting the identity map first.
    ///
    /// A hit returns the cached instance without touching the store. A miss
    /// reads the store, builds the record and registers it together with its
    /// embedded children. If another caller registered the key meanwhile,
    /// that instance is returned instead and nothing else is registered.
    pub async fn get(self: &Arc<Self>, id: &str) -> ModelResult<Option<Record>> {
        if self.uses_identity_map() {
            if let Some(record) = self.identity_map().get(id) {
                tracing::debug!("Identity map hit for {}:{}", self.name(), id);
                return Ok(Some(record));
            }
            tracing::debug!("Identity map miss for {}:{}", self.name(), id);
        }

        let key = self.store_key(id);
        let Some(mut raw) = self.store().read(&key).await? else {
            return Ok(None);
        };
        raw.insert(KEY_ATTRIBUTE.to_string(), Value::String(id.to_string()));

        let record = self.hydrate(raw)?;
        if !self.uses_identity_map() {
            return Ok(Some(record));
        }

        // Only the instance that won the key registers its children.
        let mapped = self.identity_map().insert_if_absent(id, record.clone());
        if Record::ptr_eq(&mapped, &record) && self.has_embedded_lists() {
            for child in record.embedded_objects() {
                child.add_to_identity_map();
            }
        }
        Ok(Some(mapped))
    }

    /// Like [`ModelClass::get`], failing with `NotFound` when nothing is stored
    pub async fn get_or_fail(self: &Arc<Self>, id: &str) -> ModelResult<Record> {
        self.get(id)
            .await?
            .ok_or_else(|| ModelError::NotFound(self.store_key(id)))
    }

    /// `get` for each key, in order
    pub async fn get_multi(self: &Arc<Self>, ids: &[&str]) -> ModelResult<Vec<Option<Record>>> {
        let mut records = Vec::with_capacity(ids.len());
        for id in ids {
            records.push(self.get(id).await?);
        }
        Ok(records)
    }

    /// Whether the store holds a record under `id`. Ignores the identity map.
    pub async fn exists(&self, id: &str) -> ModelResult<bool> {
        Ok(self.store().exists(&self.store_key(id)).await?)
    }

    /// `new` followed by `save`
    pub async fn create(self: &Arc<Self>, attrs: impl IntoAttributes) -> ModelResult<Record> {
        let record = self.new(attrs)?;
        record.save().await?;
        Ok(record)
    }

    /// Delete the record stored under `id`, if any. Returns whether one was found.
    pub async fn delete(self: &Arc<Self>, id: &str) -> ModelResult<bool> {
        match self.get(id).await? {
            Some(record) => {
                record.delete().await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Destroy the record stored under `id`, if any. Returns whether one was found.
    pub async fn destroy(self: &Arc<Self>, id: &str) -> ModelResult<bool> {
        match self.get(id).await? {
            Some(record) => {
                record.destroy().await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
