//! Attribute definitions - the per-class schema of named, typed values

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::error::{ModelError, ModelResult};
use crate::model::types::AttributeType;

/// Default applied to an attribute when an instance is constructed
#[derive(Clone)]
pub enum AttributeDefault {
    Value(Value),
    /// Evaluated once per instance, at construction time
    Computed(Arc<dyn Fn() -> Value + Send + Sync>),
}

impl AttributeDefault {
    pub fn evaluate(&self) -> Value {
        match self {
            AttributeDefault::Value(value) => value.clone(),
            AttributeDefault::Computed(compute) => compute(),
        }
    }
}

impl fmt::Debug for AttributeDefault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeDefault::Value(value) => f.debug_tuple("Value").field(value).finish(),
            AttributeDefault::Computed(_) => f.write_str("Computed(..)"),
        }
    }
}

/// Options accepted when declaring an attribute
#[derive(Debug, Clone, Default)]
pub struct AttributeOptions {
    pub default: Option<AttributeDefault>,
    /// Virtual attributes are never persisted
    pub is_virtual: bool,
    /// Name used in the persisted form instead of the attribute name
    pub abbr: Option<String>,
}

impl AttributeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(AttributeDefault::Value(value.into()));
        self
    }

    pub fn default_with<F>(mut self, compute: F) -> Self
    where
        F: Fn() -> Value + Send + Sync + 'static,
    {
        self.default = Some(AttributeDefault::Computed(Arc::new(compute)));
        self
    }

    pub fn virtual_attribute(mut self) -> Self {
        self.is_virtual = true;
        self
    }

    pub fn abbr(mut self, persisted_name: impl Into<String>) -> Self {
        self.abbr = Some(persisted_name.into());
        self
    }
}

/// Immutable attribute descriptor shared by every instance of a class
#[derive(Debug, Clone)]
pub struct AttributeDefinition {
    name: String,
    attribute_type: AttributeType,
    options: AttributeOptions,
}

impl AttributeDefinition {
    pub fn new(name: impl Into<String>, attribute_type: AttributeType, options: AttributeOptions) -> Self {
        Self {
            name: name.into(),
            attribute_type,
            options,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn attribute_type(&self) -> &AttributeType {
        &self.attribute_type
    }

    /// Key under which the value appears in the persisted form
    pub fn persisted_name(&self) -> &str {
        self.options.abbr.as_deref().unwrap_or(&self.name)
    }

    pub fn is_virtual(&self) -> bool {
        self.options.is_virtual
    }

    pub fn default_value(&self) -> Option<Value> {
        self.options.default.as_ref().map(AttributeDefault::evaluate)
    }

    /// Store-to-memory conversion. A null value falls back to the default.
    pub fn from_store(&self, value: Value) -> ModelResult<Value> {
        let value = self.or_default(value);
        self.attribute_type
            .from_store(value)
            .map_err(|message| ModelError::coercion(&self.name, message))
    }

    /// Memory-to-store conversion. A null value falls back to the default.
    pub fn to_store(&self, value: Value) -> ModelResult<Value> {
        let value = self.or_default(value);
        self.attribute_type
            .to_store(value)
            .map_err(|message| ModelError::coercion(&self.name, message))
    }

    fn or_default(&self, value: Value) -> Value {
        match (&value, &self.options.default) {
            (Value::Null, Some(default)) => default.evaluate(),
            _ => value,
        }
    }
}
