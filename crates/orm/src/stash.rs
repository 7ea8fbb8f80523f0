//! The mapper context: configuration, default store, identity maps and
//! plugin registrations shared by every model class defined through it.

use std::sync::Arc;

use stash_store::{MemoryBackend, Store};

use crate::config::StashConfig;
use crate::identity_map::{IdentityMap, IdentityMapRegistry};
use crate::model::{ModelClass, ModelClassBuilder};
use crate::plugins::{Plugin, PluginRegistrar};

#[derive(Debug)]
pub struct Stash {
    config: StashConfig,
    store: Store,
    identity_maps: Arc<IdentityMapRegistry>,
    registrar: PluginRegistrar,
}

impl Stash {
    /// Context with default configuration over a fresh in-memory store
    pub fn new() -> Self {
        Self::with_config(StashConfig::default())
    }

    pub fn with_config(config: StashConfig) -> Self {
        Self::with_store(config, Store::new(MemoryBackend::new()))
    }

    pub fn with_store(config: StashConfig, store: Store) -> Self {
        tracing::debug!(
            "Creating stash (identity map: {}, key prefix: {:?})",
            config.get_identity_map(),
            config.get_key_prefix()
        );
        Self {
            config,
            store,
            identity_maps: Arc::new(IdentityMapRegistry::new()),
            registrar: PluginRegistrar::new(),
        }
    }

    pub fn config(&self) -> &StashConfig {
        &self.config
    }

    /// Default store for classes that do not bring their own
    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn identity_maps(&self) -> &Arc<IdentityMapRegistry> {
        &self.identity_maps
    }

    /// Identity map of the model named `model`
    pub fn identity_map(&self, model: &str) -> Arc<IdentityMap> {
        self.identity_maps.map_for(model)
    }

    pub fn registrar(&self) -> &PluginRegistrar {
        &self.registrar
    }

    /// Start defining a model class. `build()` registers it with this context.
    pub fn model(&self, name: impl Into<String>) -> ModelClassBuilder<'_> {
        ModelClassBuilder::new(self, name)
    }

    /// Register a plugin and apply it to every model class, present and future.
    /// Returns `false` if a plugin with that name is already registered.
    pub fn plugin(&self, plugin: Plugin) -> bool {
        self.registrar.register_plugin(Arc::new(plugin))
    }

    /// Registered model classes, in registration order
    pub fn models(&self) -> Vec<Arc<ModelClass>> {
        self.registrar.models()
    }

    /// Registered plugins, in registration order
    pub fn plugins(&self) -> Vec<Arc<Plugin>> {
        self.registrar.plugins()
    }

    /// Empty the identity map of every model class
    pub fn clear_identity_maps(&self) {
        self.identity_maps.clear();
    }
}

impl Default for Stash {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_models_listed_in_registration_order() {
        let stash = Stash::new();
        stash.model("User").build();
        stash.model("Skill").build();

        let names: Vec<String> = stash.models().iter().map(|m| m.name().to_string()).collect();
        assert_eq!(names, vec!["User", "Skill"]);
    }

    #[test]
    fn test_duplicate_plugin_is_ignored() {
        let stash = Stash::new();
        assert!(stash.plugin(Plugin::builder("audit").build()));
        assert!(!stash.plugin(Plugin::builder("audit").build()));
        assert_eq!(stash.plugins().len(), 1);
    }

    #[tokio::test]
    async fn test_clear_identity_maps() {
        let stash = Stash::new();
        let user = stash.model("User").build();
        user.create(json!({"id": "1"})).await.unwrap();
        assert_eq!(stash.identity_map("User").len(), 1);

        stash.clear_identity_maps();
        assert!(stash.identity_map("User").is_empty());
        assert_eq!(stash.identity_maps().models(), vec!["User"]);
    }
}
