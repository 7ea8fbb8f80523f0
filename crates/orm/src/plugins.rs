//! Plugins - capability bundles applied uniformly to every model class
//!
//! A plugin contributes two named tables of functions: class-level methods
//! and instance-level methods. The [`PluginRegistrar`] applies every plugin
//! to every model class exactly once, in plugin registration order, no
//! matter whether the class or the plugin was registered first.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;

use crate::error::ModelResult;
use crate::model::{ModelClass, Record};

/// Class-level capability: receives the class and call arguments
pub type ClassMethod = Arc<dyn Fn(&Arc<ModelClass>, &[Value]) -> ModelResult<Value> + Send + Sync>;

/// Instance-level capability: receives the record and call arguments
pub type InstanceMethod = Arc<dyn Fn(&Record, &[Value]) -> ModelResult<Value> + Send + Sync>;

/// Table of named class- and instance-level function slots
#[derive(Clone, Default)]
pub struct CapabilitySet {
    class_methods: HashMap<String, ClassMethod>,
    instance_methods: HashMap<String, InstanceMethod>,
}

impl CapabilitySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_class_method(&mut self, name: impl Into<String>, method: ClassMethod) {
        self.class_methods.insert(name.into(), method);
    }

    pub fn insert_instance_method(&mut self, name: impl Into<String>, method: InstanceMethod) {
        self.instance_methods.insert(name.into(), method);
    }

    pub fn class_method(&self, name: &str) -> Option<ClassMethod> {
        self.class_methods.get(name).cloned()
    }

    pub fn instance_method(&self, name: &str) -> Option<InstanceMethod> {
        self.instance_methods.get(name).cloned()
    }

    pub fn class_method_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.class_methods.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn instance_method_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.instance_methods.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn is_empty(&self) -> bool {
        self.class_methods.is_empty() && self.instance_methods.is_empty()
    }

    /// Union `other` into this set; entries from `other` win on name collision
    pub fn merge(&mut self, other: &CapabilitySet) {
        for (name, method) in &other.class_methods {
            self.class_methods.insert(name.clone(), method.clone());
        }
        for (name, method) in &other.instance_methods {
            self.instance_methods.insert(name.clone(), method.clone());
        }
    }
}

impl fmt::Debug for CapabilitySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapabilitySet")
            .field("class_methods", &self.class_method_names())
            .field("instance_methods", &self.instance_method_names())
            .finish()
    }
}

/// A named, reusable bundle of capabilities
#[derive(Debug, Clone)]
pub struct Plugin {
    name: String,
    capabilities: CapabilitySet,
}

impl Plugin {
    pub fn builder(name: impl Into<String>) -> PluginBuilder {
        PluginBuilder {
            name: name.into(),
            capabilities: CapabilitySet::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capabilities(&self) -> &CapabilitySet {
        &self.capabilities
    }
}

/// Builder for [`Plugin`]
pub struct PluginBuilder {
    name: String,
    capabilities: CapabilitySet,
}

impl PluginBuilder {
    pub fn class_method<F>(mut self, name: impl Into<String>, method: F) -> Self
    where
        F: Fn(&Arc<ModelClass>, &[Value]) -> ModelResult<Value> + Send + Sync + 'static,
    {
        self.capabilities.insert_class_method(name, Arc::new(method));
        self
    }

    pub fn instance_method<F>(mut self, name: impl Into<String>, method: F) -> Self
    where
        F: Fn(&Record, &[Value]) -> ModelResult<Value> + Send + Sync + 'static,
    {
        self.capabilities.insert_instance_method(name, Arc::new(method));
        self
    }

    pub fn build(self) -> Plugin {
        Plugin {
            name: self.name,
            capabilities: self.capabilities,
        }
    }
}

#[derive(Default)]
struct RegistrarState {
    models: Vec<Arc<ModelClass>>,
    plugins: Vec<Arc<Plugin>>,
}

/// Ordered lists of registered model classes and plugins.
///
/// Both lists sit behind one lock so a class and a plugin registered
/// concurrently still meet exactly once.
#[derive(Default)]
pub struct PluginRegistrar {
    state: Mutex<RegistrarState>,
}

impl PluginRegistrar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a model class and apply every registered plugin to it.
    /// Returns `false` if the class was already registered.
    pub fn register_model(&self, model: Arc<ModelClass>) -> bool {
        let mut state = self.state.lock();
        if state.models.iter().any(|m| Arc::ptr_eq(m, &model)) {
            tracing::warn!("Model '{}' is already registered", model.name());
            return false;
        }

        for plugin in &state.plugins {
            model.apply_plugin(plugin);
        }
        state.models.push(model);
        true
    }

    /// Add a plugin and apply it to every registered model class.
    /// Returns `false` if a plugin with the same name was already registered.
    pub fn register_plugin(&self, plugin: Arc<Plugin>) -> bool {
        let mut state = self.state.lock();
        if state.plugins.iter().any(|p| p.name() == plugin.name()) {
            tracing::warn!("Plugin '{}' is already registered", plugin.name());
            return false;
        }

        for model in &state.models {
            model.apply_plugin(&plugin);
        }
        tracing::debug!(
            "Registered plugin '{}' on {} model(s)",
            plugin.name(),
            state.models.len()
        );
        state.plugins.push(plugin);
        true
    }

    pub fn models(&self) -> Vec<Arc<ModelClass>> {
        self.state.lock().models.clone()
    }

    pub fn plugins(&self) -> Vec<Arc<Plugin>> {
        self.state.lock().plugins.clone()
    }
}

impl fmt::Debug for PluginRegistrar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("PluginRegistrar")
            .field(
                "models",
                &state.models.iter().map(|m| m.name().to_string()).collect::<Vec<_>>(),
            )
            .field(
                "plugins",
                &state.plugins.iter().map(|p| p.name().to_string()).collect::<Vec<_>>(),
            )
            .finish()
    }
}
