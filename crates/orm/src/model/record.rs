//! Records - shared handles to model instances
//!
//! A [`Record`] is cheap to clone; every clone points at the same instance.
//! Identity is allocation identity ([`Record::ptr_eq`]), which is what the
//! identity map guarantees for lookups by key.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use stash_store::RawAttributes;

use crate::error::{ModelError, ModelResult};
use crate::model::class::ModelClass;
use crate::model::primary_key::{is_valid_key, KEY_ATTRIBUTE};

/// In-memory attribute mapping, keyed by attribute name
pub type Attributes = Map<String, Value>;

/// Anything that can be bulk-assigned onto a record.
///
/// `None` (a JSON null, `()` or `Option::None`) means "nothing to assign".
pub trait IntoAttributes {
    fn into_attributes(self) -> ModelResult<Option<Attributes>>;
}

impl IntoAttributes for Attributes {
    fn into_attributes(self) -> ModelResult<Option<Attributes>> {
        Ok(Some(self))
    }
}

impl IntoAttributes for Option<Attributes> {
    fn into_attributes(self) -> ModelResult<Option<Attributes>> {
        Ok(self)
    }
}

impl IntoAttributes for () {
    fn into_attributes(self) -> ModelResult<Option<Attributes>> {
        Ok(None)
    }
}

impl IntoAttributes for Value {
    fn into_attributes(self) -> ModelResult<Option<Attributes>> {
        match self {
            Value::Null => Ok(None),
            Value::Object(map) => Ok(Some(map)),
            other => Err(ModelError::coercion(
                "attributes",
                format!("expected an object, got {}", other),
            )),
        }
    }
}

#[derive(Debug)]
struct RecordState {
    attributes: HashMap<String, Value>,
    embedded: HashMap<String, Vec<Record>>,
    new_record: bool,
    destroyed: bool,
}

struct RecordInner {
    class: Arc<ModelClass>,
    state: RwLock<RecordState>,
}

/// Shared handle to one model instance
#[derive(Clone)]
pub struct Record {
    inner: Arc<RecordInner>,
}

impl Record {
    /// Blank instance of `class`: no attributes, flagged as new.
    pub(crate) fn allocate(class: Arc<ModelClass>) -> Self {
        Self {
            inner: Arc::new(RecordInner {
                class,
                state: RwLock::new(RecordState {
                    attributes: HashMap::new(),
                    embedded: HashMap::new(),
                    new_record: true,
                    destroyed: false,
                }),
            }),
        }
    }

    /// Whether both handles point at the same instance
    pub fn ptr_eq(a: &Record, b: &Record) -> bool {
        Arc::ptr_eq(&a.inner, &b.inner)
    }

    pub fn class(&self) -> &Arc<ModelClass> {
        &self.inner.class
    }

    /// The record's key, or an empty string if none was assigned yet
    pub fn id(&self) -> String {
        match self.read(KEY_ATTRIBUTE) {
            Some(Value::String(id)) => id,
            Some(other) => other.to_string(),
            None => String::new(),
        }
    }

    /// Store key, e.g. `"users:1"`
    pub fn store_key(&self) -> String {
        self.class().store_key(&self.id())
    }

    /// Coerced value of `name`; `None` when unset or null
    pub fn read(&self, name: &str) -> Option<Value> {
        self.inner
            .state
            .read()
            .attributes
            .get(name)
            .filter(|value| !value.is_null())
            .cloned()
    }

    /// Read `name` and deserialize it into `T`
    pub fn read_as<T: DeserializeOwned>(&self, name: &str) -> ModelResult<Option<T>> {
        self.read(name)
            .map(serde_json::from_value)
            .transpose()
            .map_err(ModelError::from)
    }

    /// Coerce and store `value` under a declared attribute
    pub fn write(&self, name: &str, value: impl Into<Value>) -> ModelResult<()> {
        let class = self.class();
        let definition = class
            .attribute(name)
            .ok_or_else(|| ModelError::attribute_not_defined(class.name(), name))?;
        let coerced = definition.from_store(value.into())?;

        self.inner
            .state
            .write()
            .attributes
            .insert(name.to_string(), coerced);
        Ok(())
    }

    /// Whether `name` holds a non-blank value
    pub fn present(&self, name: &str) -> bool {
        match self.read(name) {
            None | Some(Value::Bool(false)) => false,
            Some(Value::String(s)) => !s.trim().is_empty(),
            Some(Value::Array(items)) => !items.is_empty(),
            Some(Value::Object(map)) => !map.is_empty(),
            Some(_) => true,
        }
    }

    /// Snapshot of every attribute that currently holds a value
    pub fn attributes(&self) -> Attributes {
        let state = self.inner.state.read();
        let mut names: Vec<&String> = state.attributes.keys().collect();
        names.sort();
        names
            .into_iter()
            .filter_map(|name| {
                state.attributes.get(name).filter(|v| !v.is_null()).map(|v| (name.clone(), v.clone()))
            })
            .collect()
    }

    /// Assign many values at once.
    ///
    /// Each key goes to the class's dedicated writer of that name if there
    /// is one, else to the embedded list of that name, else to the declared
    /// attribute. Unknown keys are skipped.
    ///
    /// Embedded children are built through their class's `load`, which
    /// registers them in the identity map.
    pub fn bulk_assign(&self, attrs: impl IntoAttributes) -> ModelResult<()> {
        self.assign(attrs, true)
    }

    /// Bulk assignment that leaves embedded children unregistered, for
    /// records that are registered only once fully built.
    pub(crate) fn assign_detached(&self, attrs: impl IntoAttributes) -> ModelResult<()> {
        self.assign(attrs, false)
    }

    fn assign(&self, attrs: impl IntoAttributes, register_children: bool) -> ModelResult<()> {
        let Some(attrs) = attrs.into_attributes()? else {
            return Ok(());
        };

        let class = self.class().clone();
        for (name, value) in attrs {
            if let Some(writer) = class.writer(&name) {
                writer(self, value)?;
            } else if let Some(list) = class.embedded_list(&name) {
                let children = list.load_children(value, register_children)?;
                self.inner.state.write().embedded.insert(name, children);
            } else if class.attribute(&name).is_some() {
                self.write(&name, value)?;
            } else {
                tracing::trace!("Skipping unknown attribute '{}' on {}", name, class.name());
            }
        }
        Ok(())
    }

    /// Store-ready form: no `id`, no virtual attributes, persisted names,
    /// embedded lists as arrays of the children's forms.
    pub fn to_persisted_form(&self) -> ModelResult<RawAttributes> {
        let class = self.class();
        let (values, embedded) = {
            let state = self.inner.state.read();
            (state.attributes.clone(), state.embedded.clone())
        };

        let mut raw = RawAttributes::new();
        for definition in class.attributes() {
            if definition.name() == KEY_ATTRIBUTE || definition.is_virtual() {
                continue;
            }
            let value = values.get(definition.name()).cloned().unwrap_or(Value::Null);
            raw.insert(definition.persisted_name().to_string(), definition.to_store(value)?);
        }

        for list in class.embedded_lists() {
            let children = embedded.get(list.name()).map(Vec::as_slice).unwrap_or_default();
            raw.insert(list.name().to_string(), list.dump_children(children)?);
        }
        Ok(raw)
    }

    /// Persisted form of an embedded child, which carries its own `id`
    pub(crate) fn to_embedded_form(&self) -> ModelResult<RawAttributes> {
        let mut raw = self.to_persisted_form()?;
        raw.insert(KEY_ATTRIBUTE.to_string(), Value::String(self.id()));
        Ok(raw)
    }

    /// Children of the embedded list `name`
    pub fn embedded(&self, name: &str) -> Vec<Record> {
        self.inner
            .state
            .read()
            .embedded
            .get(name)
            .cloned()
            .unwrap_or_default()
    }

    /// Replace the children of the embedded list `name`
    pub fn set_embedded(&self, name: &str, children: Vec<Record>) -> ModelResult<()> {
        let class = self.class();
        let list = class
            .embedded_list(name)
            .ok_or_else(|| ModelError::attribute_not_defined(class.name(), name))?;
        if let Some(stranger) = children.iter().find(|child| !list.accepts(child)) {
            return Err(ModelError::coercion(
                name,
                format!(
                    "expected {} records, got {}",
                    list.model_class().name(),
                    stranger.class().name()
                ),
            ));
        }

        self.inner.state.write().embedded.insert(name.to_string(), children);
        Ok(())
    }

    /// Append one child to the embedded list `name`
    pub fn push_embedded(&self, name: &str, child: Record) -> ModelResult<()> {
        let mut children = self.embedded(name);
        children.push(child);
        self.set_embedded(name, children)
    }

    /// Children of every embedded list, in declaration order
    pub fn embedded_objects(&self) -> Vec<Record> {
        let lists = self.class().embedded_lists();
        if lists.is_empty() {
            return Vec::new();
        }

        let state = self.inner.state.read();
        lists
            .iter()
            .filter_map(|list| state.embedded.get(list.name()))
            .flat_map(|children| children.iter().cloned())
            .collect()
    }

    pub fn is_new_record(&self) -> bool {
        self.inner.state.read().new_record
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.state.read().destroyed
    }

    pub fn is_persisted(&self) -> bool {
        let state = self.inner.state.read();
        !state.new_record && !state.destroyed
    }

    /// Call an instance-level capability provided by the class or a plugin
    pub fn call(&self, name: &str, args: &[Value]) -> ModelResult<Value> {
        let method = self
            .class()
            .instance_method(name)
            .ok_or_else(|| ModelError::capability_not_defined(self.class().name(), name))?;
        method(self, args)
    }

    pub fn responds_to(&self, name: &str) -> bool {
        self.class().instance_method(name).is_some()
    }

    /// Set every defaulted attribute to its (freshly evaluated) default
    pub(crate) fn initialize_attributes(&self) {
        let defaults: Vec<(String, Value)> = self
            .class()
            .attributes()
            .iter()
            .filter_map(|definition| {
                definition
                    .default_value()
                    .map(|value| (definition.name().to_string(), value))
            })
            .collect();

        let mut state = self.inner.state.write();
        for (name, value) in defaults {
            state.attributes.insert(name, value);
        }
    }

    /// Drop every attribute except `id` and every embedded child, then
    /// re-apply defaults
    pub(crate) fn reset_attributes(&self) {
        {
            let mut state = self.inner.state.write();
            let id = state.attributes.remove(KEY_ATTRIBUTE);
            state.attributes.clear();
            state.embedded.clear();
            if let Some(id) = id {
                state.attributes.insert(KEY_ATTRIBUTE.to_string(), id);
            }
        }
        self.initialize_attributes();
    }

    /// Assign a key from the class generator unless one is already set
    pub(crate) fn ensure_key(&self) -> ModelResult<()> {
        if is_valid_key(&self.id()) {
            return Ok(());
        }
        let key = self.class().key_generator().next_key(self);
        if !is_valid_key(&key) {
            return Err(ModelError::MissingPrimaryKey);
        }
        self.inner
            .state
            .write()
            .attributes
            .insert(KEY_ATTRIBUTE.to_string(), Value::String(key));
        Ok(())
    }

    /// Flag this record and its embedded children as persisted
    pub(crate) fn mark_persisted(&self) {
        {
            let mut state = self.inner.state.write();
            state.new_record = false;
            state.destroyed = false;
        }
        for child in self.embedded_objects() {
            child.mark_persisted();
        }
    }

    pub(crate) fn mark_destroyed(&self) {
        self.inner.state.write().destroyed = true;
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.read();
        f.debug_struct("Record")
            .field("class", &self.inner.class.name())
            .field("id", &state.attributes.get(KEY_ATTRIBUTE))
            .field("new_record", &state.new_record)
            .field("destroyed", &state.destroyed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_into_attributes() {
        assert!(().into_attributes().unwrap().is_none());
        assert!(Value::Null.into_attributes().unwrap().is_none());
        assert!(Option::<Attributes>::None.into_attributes().unwrap().is_none());

        let attrs = json!({"name": "Ann"}).into_attributes().unwrap().unwrap();
        assert_eq!(attrs.get("name"), Some(&json!("Ann")));

        assert!(json!([1, 2]).into_attributes().is_err());
    }
}
