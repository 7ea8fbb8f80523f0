use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::error::ModelResult;
use crate::model::record::Record;

/// Hooks around persistence of one model class.
///
/// Every hook defaults to `Ok(())`. An error from a `*ing` hook aborts the
/// operation before the store is touched.
#[async_trait]
pub trait ModelObserver: Send + Sync {
    async fn creating(&self, _record: &Record) -> ModelResult<()> {
        Ok(())
    }

    async fn created(&self, _record: &Record) -> ModelResult<()> {
        Ok(())
    }

    async fn updating(&self, _record: &Record) -> ModelResult<()> {
        Ok(())
    }

    async fn updated(&self, _record: &Record) -> ModelResult<()> {
        Ok(())
    }

    async fn saving(&self, _record: &Record) -> ModelResult<()> {
        Ok(())
    }

    async fn saved(&self, _record: &Record) -> ModelResult<()> {
        Ok(())
    }

    async fn destroying(&self, _record: &Record) -> ModelResult<()> {
        Ok(())
    }

    async fn destroyed(&self, _record: &Record) -> ModelResult<()> {
        Ok(())
    }
}

#[derive(Clone, Copy)]
enum Hook {
    Creating,
    Created,
    Updating,
    Updated,
    Saving,
    Saved,
    Destroying,
    Destroyed,
}

#[derive(Default)]
pub struct ModelLifecycle {
    observers: RwLock<Vec<Arc<dyn ModelObserver>>>,
}

impl ModelLifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_observer(&self, observer: Arc<dyn ModelObserver>) {
        self.observers.write().push(observer);
    }

    pub fn has_observers(&self) -> bool {
        !self.observers.read().is_empty()
    }

    // creating|updating -> saving
    pub async fn trigger_before_save(&self, record: &Record, new_record: bool) -> ModelResult<()> {
        let first = if new_record { Hook::Creating } else { Hook::Updating };
        self.trigger(first, record).await?;
        self.trigger(Hook::Saving, record).await
    }

    // saved -> created|updated
    pub async fn trigger_after_save(&self, record: &Record, new_record: bool) -> ModelResult<()> {
        self.trigger(Hook::Saved, record).await?;
        let last = if new_record { Hook::Created } else { Hook::Updated };
        self.trigger(last, record).await
    }

    pub async fn trigger_before_destroy(&self, record: &Record) -> ModelResult<()> {
        self.trigger(Hook::Destroying, record).await
    }

    pub async fn trigger_after_destroy(&self, record: &Record) -> ModelResult<()> {
        self.trigger(Hook::Destroyed, record).await
    }

    async fn trigger(&self, hook: Hook, record: &Record) -> ModelResult<()> {
        // Snapshot so no lock is held while observers run.
        let observers: Vec<Arc<dyn ModelObserver>> = self.observers.read().clone();
        for observer in observers {
            match hook {
                Hook::Creating => observer.creating(record).await?,
                Hook::Created => observer.created(record).await?,
                Hook::Updating => observer.updating(record).await?,
                Hook::Updated => observer.updated(record).await?,
                Hook::Saving => observer.saving(record).await?,
                Hook::Saved => observer.saved(record).await?,
                Hook::Destroying => observer.destroying(record).await?,
                Hook::Destroyed => observer.destroyed(record).await?,
            }
        }
        Ok(())
    }
}
