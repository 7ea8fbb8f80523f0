//! Identity map behaviour across save, get, load, delete, destroy and reload

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use stash_orm::{
    AttributeOptions, AttributeType, MemoryBackend, ModelClass, ModelError, RawAttributes, Record,
    Stash, StashConfig, Store, StoreBackend, StoreStats,
};
use stash_store::StoreResult;
use tokio::sync::Barrier;

struct Fixture {
    stash: Stash,
    backend: Arc<MemoryBackend>,
    user: Arc<ModelClass>,
    skill: Arc<ModelClass>,
}

impl Fixture {
    fn new() -> Self {
        Self::with_config(StashConfig::default())
    }

    fn with_config(config: StashConfig) -> Self {
        let backend = Arc::new(MemoryBackend::new());
        let stash = Stash::with_store(config, Store::new(backend.clone()));

        let skill = stash
            .model("Skill")
            .attribute("name", AttributeType::String)
            .build();
        let user = stash
            .model("User")
            .attribute("name", AttributeType::String)
            .attribute_with(
                "skills_count",
                AttributeType::Integer,
                AttributeOptions::new().default_value(0),
            )
            .embedded_list("skills", &skill)
            .build();

        Self {
            stash,
            backend,
            user,
            skill,
        }
    }

    async fn reads(&self) -> u64 {
        self.stash.store().stats().await.unwrap().reads
    }
}

#[tokio::test]
async fn save_registers_the_exact_instance() {
    let fx = Fixture::new();
    let ann = fx.user.new(json!({"id": "1", "name": "Ann"})).unwrap();

    ann.save().await.unwrap();

    let mapped = fx.user.identity_map().get("1").expect("registered");
    assert!(Record::ptr_eq(&mapped, &ann));
    assert!(ann.in_identity_map());
    assert_eq!(fx.backend.len(), 1);
}

#[tokio::test]
async fn get_hit_does_not_touch_the_store() {
    let fx = Fixture::new();
    let ann = fx.user.create(json!({"id": "1", "name": "Ann"})).await.unwrap();
    fx.backend.reset_stats();

    for _ in 0..3 {
        let found = fx.user.get("1").await.unwrap().unwrap();
        assert!(Record::ptr_eq(&found, &ann));
    }
    assert_eq!(fx.reads().await, 0);
}

#[tokio::test]
async fn get_miss_reads_once_then_caches() {
    let fx = Fixture::new();
    fx.user.create(json!({"id": "1", "name": "Ann"})).await.unwrap();
    fx.stash.clear_identity_maps();
    fx.backend.reset_stats();

    let first = fx.user.get("1").await.unwrap().unwrap();
    let second = fx.user.get("1").await.unwrap().unwrap();

    assert!(Record::ptr_eq(&first, &second));
    assert_eq!(first.read("name"), Some(json!("Ann")));
    assert!(first.is_persisted());
    assert_eq!(fx.reads().await, 1);
}

#[tokio::test]
async fn get_multi_preserves_order() {
    let fx = Fixture::new();
    fx.user.create(json!({"id": "1", "name": "Ann"})).await.unwrap();
    fx.user.create(json!({"id": "2", "name": "Bob"})).await.unwrap();

    let found = fx.user.get_multi(&["2", "missing", "1"]).await.unwrap();
    let names: Vec<Option<serde_json::Value>> = found
        .iter()
        .map(|record| record.as_ref().and_then(|r| r.read("name")))
        .collect();
    assert_eq!(names, vec![Some(json!("Bob")), None, Some(json!("Ann"))]);
}

#[tokio::test]
async fn delete_and_destroy_deregister() {
    let fx = Fixture::new();
    let ann = fx.user.create(json!({"id": "1"})).await.unwrap();
    let bob = fx.user.create(json!({"id": "2"})).await.unwrap();

    ann.delete().await.unwrap();
    bob.destroy().await.unwrap();

    let map = fx.user.identity_map();
    assert!(!map.contains_key("1"));
    assert!(!map.contains_key("2"));
    assert!(ann.is_destroyed());
    assert!(!fx.user.exists("1").await.unwrap());
    assert!(fx.backend.is_empty());
}

#[tokio::test]
async fn class_level_destroy_goes_through_get() {
    let fx = Fixture::new();
    let ann = fx.user.create(json!({"id": "1"})).await.unwrap();

    assert!(fx.user.destroy("1").await.unwrap());
    assert!(ann.is_destroyed());
    assert!(fx.user.get("1").await.unwrap().is_none());
}

#[tokio::test]
async fn reload_always_reads_the_store_once() {
    let fx = Fixture::new();
    let ann = fx.user.create(json!({"id": "1", "name": "Ann"})).await.unwrap();
    ann.write("name", "Unsaved").unwrap();
    fx.backend.reset_stats();

    ann.reload().await.unwrap();

    assert_eq!(fx.reads().await, 1);
    assert_eq!(ann.read("name"), Some(json!("Ann")));
    assert!(ann.in_identity_map());
}

#[tokio::test]
async fn reload_leaves_identity_map_entry_alone() {
    let fx = Fixture::new();
    fx.user.create(json!({"id": "1", "name": "Ann"})).await.unwrap();
    fx.stash.clear_identity_maps();

    let detached = fx.user.new(json!({"id": "1"})).unwrap();
    detached.reload().await.unwrap();

    assert_eq!(detached.read("name"), Some(json!("Ann")));
    assert!(!detached.in_identity_map());
    assert!(fx.user.identity_map().is_empty());
}

#[tokio::test]
async fn removal_spares_a_different_instance() {
    let fx = Fixture::new();
    let first = fx.user.create(json!({"id": "1"})).await.unwrap();
    let second = fx.user.new(json!({"id": "1"})).unwrap();
    second.save().await.unwrap();

    // `second` now owns the key; removing `first` must not evict it.
    first.remove_from_identity_map();
    assert!(second.in_identity_map());
    assert!(!first.in_identity_map());

    second.remove_from_identity_map();
    assert!(fx.user.identity_map().is_empty());
}

#[tokio::test]
async fn load_registers_the_record() {
    let fx = Fixture::new();
    let mut raw = stash_orm::RawAttributes::new();
    raw.insert("id".to_string(), json!("1"));

    let loaded = fx.user.load(raw).unwrap();

    assert!(loaded.in_identity_map());
    let mapped = fx.user.identity_map().get("1").unwrap();
    assert!(Record::ptr_eq(&mapped, &loaded));
    assert!(loaded.is_persisted());
}

#[tokio::test]
async fn saving_a_parent_registers_embedded_children() {
    let fx = Fixture::new();
    let rust = fx.skill.new(json!({"id": "s1", "name": "Rust"})).unwrap();
    let ann = fx.user.new(json!({"id": "1", "name": "Ann"})).unwrap();
    ann.push_embedded("skills", rust.clone()).unwrap();

    ann.save().await.unwrap();

    assert!(rust.in_identity_map());
    assert!(rust.is_persisted());
    assert!(!fx.backend.is_empty());
    assert!(!fx.skill.exists("s1").await.unwrap());
}

#[tokio::test]
async fn destroying_a_parent_deregisters_embedded_children() {
    let fx = Fixture::new();
    let ann = fx
        .user
        .create(json!({"id": "1", "skills": [{"id": "s1", "name": "Rust"}]}))
        .await
        .unwrap();
    let skills = ann.embedded("skills");
    assert_eq!(skills.len(), 1);
    assert!(skills[0].in_identity_map());

    ann.destroy().await.unwrap();

    assert!(!fx.user.identity_map().contains_key("1"));
    assert!(!fx.skill.identity_map().contains_key("s1"));
}

#[tokio::test]
async fn getting_a_parent_registers_children_from_the_store() {
    let fx = Fixture::new();
    fx.user
        .create(json!({"id": "1", "skills": [{"id": "s1", "name": "Rust"}, {"id": "s2", "name": "Go"}]}))
        .await
        .unwrap();
    fx.stash.clear_identity_maps();

    let ann = fx.user.get("1").await.unwrap().unwrap();

    assert!(ann.in_identity_map());
    assert_eq!(fx.skill.identity_map().keys(), vec!["s1", "s2"]);
    let children = ann.embedded_objects();
    assert_eq!(children[1].read("name"), Some(json!("Go")));
    assert!(children.iter().all(Record::in_identity_map));
}

#[tokio::test]
async fn disabled_identity_map_always_reads_the_store() {
    let fx = Fixture::with_config(StashConfig::builder().without_identity_map().build_config());
    let ann = fx.user.create(json!({"id": "1", "name": "Ann"})).await.unwrap();
    fx.backend.reset_stats();

    let found = fx.user.get("1").await.unwrap().unwrap();

    assert!(!Record::ptr_eq(&found, &ann));
    assert!(!ann.in_identity_map());
    assert!(fx.user.identity_map().is_empty());
    assert_eq!(fx.reads().await, 1);
}

#[tokio::test]
async fn concurrent_misses_share_one_instance() {
    let fx = Fixture::new();
    fx.user.create(json!({"id": "1", "name": "Ann"})).await.unwrap();
    fx.stash.clear_identity_maps();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let user = fx.user.clone();
            tokio::spawn(async move { user.get("1").await.unwrap().unwrap() })
        })
        .collect();

    let mut records = Vec::new();
    for handle in handles {
        records.push(handle.await.unwrap());
    }
    assert!(records.windows(2).all(|pair| Record::ptr_eq(&pair[0], &pair[1])));
    assert_eq!(fx.user.identity_map().len(), 1);
}

#[tokio::test]
async fn deleting_a_stale_copy_evicts_the_key() {
    let fx = Fixture::new();
    let live = fx.user.create(json!({"id": "1", "name": "Ann"})).await.unwrap();
    let stale = fx.user.new(json!({"id": "1"})).unwrap();

    stale.delete().await.unwrap();

    assert!(!fx.user.identity_map().contains_key("1"));
    assert!(!live.in_identity_map());
    assert!(fx.user.get("1").await.unwrap().is_none());
}

#[tokio::test]
async fn destroying_a_stale_copy_evicts_the_key() {
    let fx = Fixture::new();
    fx.user.create(json!({"id": "1"})).await.unwrap();
    let stale = fx.user.new(json!({"id": "1"})).unwrap();

    stale.destroy().await.unwrap();

    assert!(fx.user.identity_map().is_empty());
    assert!(!fx.user.exists("1").await.unwrap());
}

#[tokio::test]
async fn failed_get_registers_nothing() {
    let fx = Fixture::new();
    let mut raw = RawAttributes::new();
    raw.insert("skills".to_string(), json!([{"id": "s1", "name": "Rust"}]));
    raw.insert("skills_count".to_string(), json!("not-an-int"));
    fx.stash
        .store()
        .write(&fx.user.store_key("1"), &raw)
        .await
        .unwrap();

    match fx.user.get("1").await {
        Err(ModelError::Coercion { attribute, .. }) => assert_eq!(attribute, "skills_count"),
        other => panic!("Expected coercion error, got {:?}", other),
    }
    assert!(fx.user.identity_map().is_empty());
    assert!(fx.skill.identity_map().is_empty());
}

/// Memory backend whose reads wait for each other once the gate is open
struct GatedBackend {
    inner: MemoryBackend,
    gate: AtomicBool,
    barrier: Barrier,
}

impl GatedBackend {
    fn new(readers: usize) -> Self {
        Self {
            inner: MemoryBackend::new(),
            gate: AtomicBool::new(false),
            barrier: Barrier::new(readers),
        }
    }
}

#[async_trait]
impl StoreBackend for GatedBackend {
    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        let value = self.inner.get(key).await?;
        if self.gate.load(Ordering::SeqCst) {
            self.barrier.wait().await;
        }
        Ok(value)
    }

    async fn put(&self, key: &str, value: Vec<u8>) -> StoreResult<()> {
        self.inner.put(key, value).await
    }

    async fn forget(&self, key: &str) -> StoreResult<bool> {
        self.inner.forget(key).await
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        self.inner.exists(key).await
    }

    async fn flush(&self) -> StoreResult<()> {
        self.inner.flush().await
    }

    async fn stats(&self) -> StoreResult<StoreStats> {
        self.inner.stats().await
    }
}

#[tokio::test]
async fn concurrent_misses_keep_the_winners_children() {
    let backend = Arc::new(GatedBackend::new(2));
    let stash = Stash::with_store(StashConfig::default(), Store::new(backend.clone()));
    let skill = stash.model("Skill").attribute("name", AttributeType::String).build();
    let user = stash.model("User").embedded_list("skills", &skill).build();
    user.create(json!({"id": "1", "skills": [{"id": "s1", "name": "Rust"}]}))
        .await
        .unwrap();
    stash.clear_identity_maps();
    backend.gate.store(true, Ordering::SeqCst);

    let handles: Vec<_> = (0..2)
        .map(|_| {
            let user = user.clone();
            tokio::spawn(async move { user.get("1").await.unwrap().unwrap() })
        })
        .collect();
    let mut parents = Vec::new();
    for handle in handles {
        parents.push(handle.await.unwrap());
    }
    backend.gate.store(false, Ordering::SeqCst);

    assert!(Record::ptr_eq(&parents[0], &parents[1]));
    let child = parents[0].embedded("skills").remove(0);
    assert!(child.in_identity_map());
    let mapped = skill.identity_map().get("s1").unwrap();
    assert!(Record::ptr_eq(&mapped, &child));
    assert_eq!(stash.identity_maps().total_entries(), 2);
}

#[tokio::test]
async fn hooks_on_a_class_without_embedded_lists_touch_only_the_record() {
    let fx = Fixture::new();
    let rust = fx.skill.new(json!({"id": "s1", "name": "Rust"})).unwrap();
    assert!(!fx.skill.has_embedded_lists());
    assert!(rust.embedded_objects().is_empty());

    rust.add_to_identity_map();
    assert!(rust.in_identity_map());
    assert_eq!(fx.stash.identity_maps().total_entries(), 1);

    rust.remove_from_identity_map();
    assert!(!rust.in_identity_map());
    assert_eq!(fx.stash.identity_maps().total_entries(), 0);
}
