use criterion::{black_box, criterion_group, criterion_main, Criterion};
use serde_json::json;
use stash_orm::{AttributeType, Stash};
use tokio::runtime::Runtime;

fn bench_get(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let stash = Stash::new();
    let user = stash.model("User").attribute("name", AttributeType::String).build();

    rt.block_on(async {
        for i in 0..1000 {
            user.create(json!({"id": i.to_string(), "name": format!("user {}", i)}))
                .await
                .unwrap();
        }
    });

    let mut group = c.benchmark_group("identity_map_get");

    group.bench_function("hit", |b| {
        b.iter(|| rt.block_on(user.get(black_box("500"))).unwrap())
    });

    group.bench_function("miss", |b| {
        b.iter(|| {
            stash.clear_identity_maps();
            rt.block_on(user.get(black_box("500"))).unwrap()
        })
    });

    group.finish();
}

fn bench_registration(c: &mut Criterion) {
    let stash = Stash::new();
    let skill = stash.model("Skill").attribute("name", AttributeType::String).build();
    let user = stash.model("User").embedded_list("skills", &skill).build();

    let skills: Vec<_> = (0..10).map(|i| json!({"id": format!("s{}", i), "name": "Rust"})).collect();
    let record = user.new(json!({"id": "1", "skills": skills})).unwrap();

    c.bench_function("add_and_remove_with_children", |b| {
        b.iter(|| {
            record.add_to_identity_map();
            record.remove_from_identity_map();
        })
    });
}

criterion_group!(benches, bench_get, bench_registration);
criterion_main!(benches);
