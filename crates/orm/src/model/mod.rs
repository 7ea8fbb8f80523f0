//! Model System - classes, records and their persistence
//!
//! - `types`: Attribute types and coercion
//! - `attribute`: Attribute definitions and options
//! - `primary_key`: Key generation and store namespaces
//! - `class`: Model class descriptors and their builder
//! - `record`: Shared record handles and the attribute store
//! - `embedded`: Embedded lists of owned child records
//! - `lifecycle`: Persistence observers
//! - `persistence`: Save, load, delete, destroy, reload and lookups

pub mod types;
pub mod attribute;
pub mod primary_key;
pub mod class;
pub mod record;
pub mod embedded;
pub mod lifecycle;
pub mod persistence;

// Re-export main types and traits for convenience
pub use types::{AttributeType, TypeCoercion};
pub use attribute::{AttributeDefault, AttributeDefinition, AttributeOptions};
pub use primary_key::{is_valid_key, model_namespace, KeyGenerator, UuidKeyGenerator, KEY_ATTRIBUTE};
pub use class::{ModelClass, ModelClassBuilder, Writer};
pub use record::{Attributes, IntoAttributes, Record};
pub use embedded::EmbeddedList;
pub use lifecycle::{ModelLifecycle, ModelObserver};
