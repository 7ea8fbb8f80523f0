//! Walk through the identity map lifecycle with a user and embedded skills.
//!
//! Run with `RUST_LOG=stash_orm=debug` to see cache hits, misses and store calls.

use serde_json::json;
use stash_orm::{AttributeOptions, AttributeType, Plugin, Record, Stash, StashConfig};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let stash = Stash::with_config(StashConfig::from_env()?);
    stash.plugin(
        Plugin::builder("display")
            .instance_method("display", |record, _| {
                Ok(json!(format!("{} #{}", record.class().name(), record.id())))
            })
            .build(),
    );

    let skill = stash.model("Skill").attribute("name", AttributeType::String).build();
    let user = stash
        .model("User")
        .attribute("name", AttributeType::String)
        .attribute_with("twitter", AttributeType::String, AttributeOptions::new().abbr("tw"))
        .embedded_list("skills", &skill)
        .build();

    let ann = user
        .create(json!({"id": "1", "name": "Ann", "twitter": "@ann", "skills": [{"name": "Rust"}]}))
        .await?;
    println!("created {}", ann.call("display", &[])?);

    let found = user.get_or_fail("1").await?;
    println!("same instance after get: {}", Record::ptr_eq(&ann, &found));

    stash.clear_identity_maps();
    let fresh = user.get_or_fail("1").await?;
    println!("same instance after clear: {}", Record::ptr_eq(&ann, &fresh));
    println!("skills registered: {:?}", skill.identity_map().keys());

    fresh.destroy().await?;
    println!(
        "after destroy: {} users, {} skills mapped",
        user.identity_map().len(),
        skill.identity_map().len()
    );
    Ok(())
}
