//! # stash-orm: identity-mapped object mapper for key-value stores
//!
//! Model classes are defined at runtime through a [`Stash`] context and
//! persist their records as JSON objects in a [`Store`]. Each class keeps an
//! identity map so that repeated lookups of one key return the same
//! [`Record`] instance, and plugins add capabilities to every class.
//!
//! ```
//! use serde_json::json;
//! use stash_orm::{AttributeType, Stash};
//!
//! # tokio_test::block_on(async {
//! let stash = Stash::new();
//! let user = stash.model("User").attribute("name", AttributeType::String).build();
//!
//! let ann = user.create(json!({"id": "1", "name": "Ann"})).await.unwrap();
//! let found = user.get("1").await.unwrap().unwrap();
//! assert!(stash_orm::Record::ptr_eq(&ann, &found));
//! # });
//! ```

pub mod config;
pub mod error;
pub mod identity_map;
pub mod model;
pub mod plugins;
pub mod stash;

// Re-export core traits and types
pub use config::*;
pub use error::*;
pub use identity_map::*;
pub use model::*;
pub use plugins::*;
pub use stash::*;

pub use stash_store::{MemoryBackend, RawAttributes, Store, StoreBackend, StoreError, StoreStats};
