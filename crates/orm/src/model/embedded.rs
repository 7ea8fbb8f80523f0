//! Embedded lists - child records owned by, and persisted inside, a parent
//!
//! Children keep their own identity: they are registered in their own
//! class's identity map, but they have no store key of their own. In the
//! parent's persisted form a list appears under its name as an array of the
//! children's persisted forms, each carrying the child's `id`.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::error::{ModelError, ModelResult};
use crate::model::class::ModelClass;
use crate::model::record::Record;

/// Declaration of an embedded list on a model class
#[derive(Clone)]
pub struct EmbeddedList {
    name: String,
    model: Arc<ModelClass>,
}

impl EmbeddedList {
    pub fn new(name: impl Into<String>, model: Arc<ModelClass>) -> Self {
        Self {
            name: name.into(),
            model,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Class of the embedded records
    pub fn model_class(&self) -> &Arc<ModelClass> {
        &self.model
    }

    /// Whether `record` is an instance of this list's class
    pub fn accepts(&self, record: &Record) -> bool {
        Arc::ptr_eq(record.class(), &self.model)
    }

    /// Build persisted children from a nested payload. With `register`
    /// they go through the load path and land in their identity map.
    pub(crate) fn load_children(&self, value: Value, register: bool) -> ModelResult<Vec<Record>> {
        match value {
            Value::Null => Ok(Vec::new()),
            Value::Array(items) => items
                .into_iter()
                .map(|item| match item {
                    Value::Object(raw) if register => self.model.load(raw),
                    Value::Object(raw) => self.model.hydrate(raw),
                    other => Err(ModelError::coercion(
                        &self.name,
                        format!("expected an object for each {}, got {}", self.model.name(), other),
                    )),
                })
                .collect(),
            other => Err(ModelError::coercion(
                &self.name,
                format!("expected a list, got {}", other),
            )),
        }
    }

    pub(crate) fn dump_children(&self, children: &[Record]) -> ModelResult<Value> {
        let dumped = children
            .iter()
            .map(|child| child.to_embedded_form().map(Value::Object))
            .collect::<ModelResult<Vec<Value>>>()?;
        Ok(Value::Array(dumped))
    }
}

impl fmt::Debug for EmbeddedList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmbeddedList")
            .field("name", &self.name)
            .field("model", &self.model.name())
            .finish()
    }
}
