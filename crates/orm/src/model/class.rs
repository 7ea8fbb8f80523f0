//! Model classes - runtime descriptors shared by all their records
//!
//! A [`ModelClass`] is defined once through [`ModelClassBuilder`] (obtained
//! from [`crate::Stash::model`]) and shared as `Arc<ModelClass>`. It owns the
//! attribute schema, embedded list declarations, dedicated writers,
//! capability tables and lifecycle observers of one model.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;
use stash_store::{RawAttributes, Store};

use crate::error::{ModelError, ModelResult};
use crate::identity_map::{IdentityMap, IdentityMapRegistry};
use crate::model::attribute::{AttributeDefinition, AttributeOptions};
use crate::model::embedded::EmbeddedList;
use crate::model::lifecycle::{ModelLifecycle, ModelObserver};
use crate::model::primary_key::{model_namespace, KeyGenerator, UuidKeyGenerator, KEY_ATTRIBUTE};
use crate::model::record::{Attributes, IntoAttributes, Record};
use crate::model::types::AttributeType;
use crate::plugins::{CapabilitySet, ClassMethod, InstanceMethod, Plugin};
use crate::stash::Stash;

/// Dedicated attribute writer, used by bulk assignment instead of `write`
pub type Writer = Arc<dyn Fn(&Record, Value) -> ModelResult<()> + Send + Sync>;

#[derive(Default)]
struct ClassCapabilities {
    /// Defined on the class itself; wins over plugin entries
    own: CapabilitySet,
    /// Union of applied plugins, in application order
    plugins: CapabilitySet,
    applied: Vec<String>,
}

pub struct ModelClass {
    name: String,
    namespace: String,
    key_prefix: Option<String>,
    identity_map_enabled: bool,
    store: Store,
    identity_maps: Arc<IdentityMapRegistry>,
    key_generator: Arc<dyn KeyGenerator>,
    attributes: RwLock<BTreeMap<String, Arc<AttributeDefinition>>>,
    embedded_lists: RwLock<Vec<EmbeddedList>>,
    writers: RwLock<HashMap<String, Writer>>,
    capabilities: RwLock<ClassCapabilities>,
    lifecycle: ModelLifecycle,
}

impl ModelClass {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Store namespace, `"users"` for `User` unless overridden
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn key_generator(&self) -> Arc<dyn KeyGenerator> {
        self.key_generator.clone()
    }

    /// Store key of the record with key `id`
    pub fn store_key(&self, id: &str) -> String {
        match &self.key_prefix {
            Some(prefix) => format!("{}:{}:{}", prefix, self.namespace, id),
            None => format!("{}:{}", self.namespace, id),
        }
    }

    pub fn uses_identity_map(&self) -> bool {
        self.identity_map_enabled
    }

    /// This class's identity map; the same map for the registry's lifetime
    pub fn identity_map(&self) -> Arc<IdentityMap> {
        self.identity_maps.map_for(&self.name)
    }

    // Attribute schema

    /// Declare (or re-declare) an attribute. Existing records are unaffected.
    pub fn define_attribute(
        &self,
        name: impl Into<String>,
        attribute_type: AttributeType,
        options: AttributeOptions,
    ) -> Arc<AttributeDefinition> {
        let definition = Arc::new(AttributeDefinition::new(name, attribute_type, options));
        self.attributes
            .write()
            .insert(definition.name().to_string(), definition.clone());
        definition
    }

    pub fn attribute(&self, name: &str) -> Option<Arc<AttributeDefinition>> {
        self.attributes.read().get(name).cloned()
    }

    /// Every declared attribute, ordered by name
    pub fn attributes(&self) -> Vec<Arc<AttributeDefinition>> {
        self.attributes.read().values().cloned().collect()
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.attributes.read().contains_key(name)
    }

    pub fn define_writer<F>(&self, name: impl Into<String>, writer: F)
    where
        F: Fn(&Record, Value) -> ModelResult<()> + Send + Sync + 'static,
    {
        self.writers.write().insert(name.into(), Arc::new(writer));
    }

    pub fn writer(&self, name: &str) -> Option<Writer> {
        self.writers.read().get(name).cloned()
    }

    // Embedded lists

    /// Declare an embedded list of `model` records under `name`
    pub fn embed_list(&self, name: impl Into<String>, model: &Arc<ModelClass>) {
        let list = EmbeddedList::new(name, model.clone());
        let mut lists = self.embedded_lists.write();
        match lists.iter_mut().find(|existing| existing.name() == list.name()) {
            Some(existing) => *existing = list,
            None => lists.push(list),
        }
    }

    pub fn embedded_list(&self, name: &str) -> Option<EmbeddedList> {
        self.embedded_lists
            .read()
            .iter()
            .find(|list| list.name() == name)
            .cloned()
    }

    /// Embedded list declarations, in declaration order
    pub fn embedded_lists(&self) -> Vec<EmbeddedList> {
        self.embedded_lists.read().clone()
    }

    pub fn has_embedded_lists(&self) -> bool {
        !self.embedded_lists.read().is_empty()
    }

    // Lifecycle

    pub fn observe(&self, observer: Arc<dyn ModelObserver>) {
        self.lifecycle.register_observer(observer);
    }

    pub fn lifecycle(&self) -> &ModelLifecycle {
        &self.lifecycle
    }

    // Capabilities

    pub fn define_class_method<F>(&self, name: impl Into<String>, method: F)
    where
        F: Fn(&Arc<ModelClass>, &[Value]) -> ModelResult<Value> + Send + Sync + 'static,
    {
        self.capabilities
            .write()
            .own
            .insert_class_method(name, Arc::new(method));
    }

    pub fn define_instance_method<F>(&self, name: impl Into<String>, method: F)
    where
        F: Fn(&Record, &[Value]) -> ModelResult<Value> + Send + Sync + 'static,
    {
        self.capabilities
            .write()
            .own
            .insert_instance_method(name, Arc::new(method));
    }

    pub fn class_method(&self, name: &str) -> Option<ClassMethod> {
        let capabilities = self.capabilities.read();
        capabilities
            .own
            .class_method(name)
            .or_else(|| capabilities.plugins.class_method(name))
    }

    pub fn instance_method(&self, name: &str) -> Option<InstanceMethod> {
        let capabilities = self.capabilities.read();
        capabilities
            .own
            .instance_method(name)
            .or_else(|| capabilities.plugins.instance_method(name))
    }

    /// Merged view of every capability this class responds to
    pub fn capabilities(&self) -> CapabilitySet {
        let capabilities = self.capabilities.read();
        let mut merged = capabilities.plugins.clone();
        merged.merge(&capabilities.own);
        merged
    }

    /// Names of the plugins applied to this class, in application order
    pub fn applied_plugins(&self) -> Vec<String> {
        self.capabilities.read().applied.clone()
    }

    /// Merge a plugin's tables into this class. Returns `false` if a plugin
    /// of that name was already applied.
    pub fn apply_plugin(&self, plugin: &Plugin) -> bool {
        let mut capabilities = self.capabilities.write();
        if capabilities.applied.iter().any(|name| name == plugin.name()) {
            return false;
        }
        capabilities.plugins.merge(plugin.capabilities());
        capabilities.applied.push(plugin.name().to_string());
        tracing::trace!("Applied plugin '{}' to {}", plugin.name(), self.name);
        true
    }

    /// Call a class-level capability
    pub fn call(self: &Arc<Self>, name: &str, args: &[Value]) -> ModelResult<Value> {
        let method = self
            .class_method(name)
            .ok_or_else(|| ModelError::capability_not_defined(&self.name, name))?;
        method(self, args)
    }

    pub fn responds_to(&self, name: &str) -> bool {
        self.class_method(name).is_some()
    }

    // Construction

    /// Fresh, unsaved record: defaults, then `attrs`, then a generated key
    /// if none was given. Nothing is registered in the identity map.
    #[allow(clippy::new_ret_no_self)]
    pub fn new(self: &Arc<Self>, attrs: impl IntoAttributes) -> ModelResult<Record> {
        let record = Record::allocate(self.clone());
        record.initialize_attributes();
        record.bulk_assign(attrs)?;
        record.ensure_key()?;
        Ok(record)
    }

    /// Record built from a persisted-form payload (including `id`),
    /// flagged as persisted and registered in the identity map.
    pub fn load(self: &Arc<Self>, raw: RawAttributes) -> ModelResult<Record> {
        let record = self.hydrate(raw)?;
        record.add_to_identity_map();
        Ok(record)
    }

    /// Build a persisted record, embedded children included, without
    /// registering anything
    pub(crate) fn hydrate(self: &Arc<Self>, raw: RawAttributes) -> ModelResult<Record> {
        let record = Record::allocate(self.clone());
        record.initialize_attributes();
        record.assign_detached(self.translate_persisted(raw))?;
        record.ensure_key()?;
        record.mark_persisted();
        Ok(record)
    }

    /// Rename persisted (abbreviated) keys back to attribute names
    pub(crate) fn translate_persisted(&self, raw: RawAttributes) -> Attributes {
        let renames: HashMap<String, String> = self
            .attributes
            .read()
            .values()
            .filter(|definition| definition.persisted_name() != definition.name())
            .map(|definition| (definition.persisted_name().to_string(), definition.name().to_string()))
            .collect();
        if renames.is_empty() {
            return raw;
        }

        raw.into_iter()
            .map(|(key, value)| match renames.get(&key) {
                Some(name) => (name.clone(), value),
                None => (key, value),
            })
            .collect()
    }
}

impl fmt::Debug for ModelClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelClass")
            .field("name", &self.name)
            .field("namespace", &self.namespace)
            .field("attributes", &self.attributes.read().keys().collect::<Vec<_>>())
            .field(
                "embedded_lists",
                &self
                    .embedded_lists
                    .read()
                    .iter()
                    .map(|list| list.name().to_string())
                    .collect::<Vec<_>>(),
            )
            .field("plugins", &self.capabilities.read().applied)
            .finish()
    }
}

/// Builder for [`ModelClass`]; `build` registers the class with the
/// context's plugin registrar.
pub struct ModelClassBuilder<'a> {
    stash: &'a Stash,
    name: String,
    namespace: Option<String>,
    store: Option<Store>,
    key_generator: Arc<dyn KeyGenerator>,
    attributes: Vec<(String, AttributeType, AttributeOptions)>,
    embedded_lists: Vec<(String, Arc<ModelClass>)>,
    writers: Vec<(String, Writer)>,
    capabilities: CapabilitySet,
    observers: Vec<Arc<dyn ModelObserver>>,
}

impl<'a> ModelClassBuilder<'a> {
    pub(crate) fn new(stash: &'a Stash, name: impl Into<String>) -> Self {
        Self {
            stash,
            name: name.into(),
            namespace: None,
            store: None,
            key_generator: Arc::new(UuidKeyGenerator),
            attributes: Vec::new(),
            embedded_lists: Vec::new(),
            writers: Vec::new(),
            capabilities: CapabilitySet::new(),
            observers: Vec::new(),
        }
    }

    pub fn attribute(self, name: impl Into<String>, attribute_type: AttributeType) -> Self {
        self.attribute_with(name, attribute_type, AttributeOptions::new())
    }

    pub fn attribute_with(
        mut self,
        name: impl Into<String>,
        attribute_type: AttributeType,
        options: AttributeOptions,
    ) -> Self {
        self.attributes.push((name.into(), attribute_type, options));
        self
    }

    pub fn key_generator<K: KeyGenerator + 'static>(mut self, generator: K) -> Self {
        self.key_generator = Arc::new(generator);
        self
    }

    /// Use `store` instead of the context's default store
    pub fn store(mut self, store: Store) -> Self {
        self.store = Some(store);
        self
    }

    /// Override the store namespace derived from the class name
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn embedded_list(mut self, name: impl Into<String>, model: &Arc<ModelClass>) -> Self {
        self.embedded_lists.push((name.into(), model.clone()));
        self
    }

    pub fn writer<F>(mut self, name: impl Into<String>, writer: F) -> Self
    where
        F: Fn(&Record, Value) -> ModelResult<()> + Send + Sync + 'static,
    {
        self.writers.push((name.into(), Arc::new(writer)));
        self
    }

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

    pub fn observer<O: ModelObserver + 'static>(mut self, observer: O) -> Self {
        self.observers.push(Arc::new(observer));
        self
    }

    pub fn build(self) -> Arc<ModelClass> {
        let config = self.stash.config();
        let namespace = self.namespace.unwrap_or_else(|| model_namespace(&self.name));

        let mut attributes = BTreeMap::new();
        attributes.insert(
            KEY_ATTRIBUTE.to_string(),
            Arc::new(AttributeDefinition::new(
                KEY_ATTRIBUTE,
                AttributeType::String,
                AttributeOptions::new(),
            )),
        );
        for (name, attribute_type, options) in self.attributes {
            let definition = AttributeDefinition::new(name, attribute_type, options);
            attributes.insert(definition.name().to_string(), Arc::new(definition));
        }

        let lifecycle = ModelLifecycle::new();
        for observer in self.observers {
            lifecycle.register_observer(observer);
        }

        let class = Arc::new(ModelClass {
            name: self.name,
            namespace,
            key_prefix: config.get_key_prefix().clone(),
            identity_map_enabled: *config.get_identity_map(),
            store: self.store.unwrap_or_else(|| self.stash.store().clone()),
            identity_maps: self.stash.identity_maps().clone(),
            key_generator: self.key_generator,
            attributes: RwLock::new(attributes),
            embedded_lists: RwLock::new(
                self.embedded_lists
                    .into_iter()
                    .map(|(name, model)| EmbeddedList::new(name, model))
                    .collect(),
            ),
            writers: RwLock::new(self.writers.into_iter().collect()),
            capabilities: RwLock::new(ClassCapabilities {
                own: self.capabilities,
                ..Default::default()
            }),
            lifecycle,
        });

        tracing::debug!("Defined model {} (namespace '{}')", class.name, class.namespace);
        self.stash.registrar().register_model(class.clone());
        class
    }
}
