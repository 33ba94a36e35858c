use cardstore_core::{canonicalize, compute_content_hash};
use criterion::{criterion_group, criterion_main, Criterion};
use serde_json::{json, Value};
use std::hint::black_box;

fn company_profile(sections: usize) -> Value {
    let offerings: Vec<Value> = (0..sections)
        .map(|i| {
            json!({
                "name": format!("offering-{i}"),
                "tier": i % 3,
                "price": 49.0 + i as f64,
                "tags": ["b2b", "analytics", "self-serve"],
            })
        })
        .collect();
    json!({
        "name": "Acme Analytics",
        "industry": "B2B SaaS",
        "values": ["clarity", "speed", "candor"],
        "offerings": offerings,
        "tone": { "formality": 0.4, "humor": false },
    })
}

fn bench_content_hash(c: &mut Criterion) {
    let small = company_profile(4);
    let large = company_profile(256);

    c.bench_function("content/canonicalize_small", |b| {
        b.iter(|| black_box(canonicalize(black_box(&small))));
    });
    c.bench_function("content/hash_small", |b| {
        b.iter(|| black_box(compute_content_hash(black_box(&small))));
    });
    c.bench_function("content/hash_large", |b| {
        b.iter(|| black_box(compute_content_hash(black_box(&large))));
    });
}

criterion_group!(benches, bench_content_hash);
criterion_main!(benches);
