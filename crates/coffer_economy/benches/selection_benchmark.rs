//! Benchmark for chest selection and opening.
//!
//! Run with: cargo bench --package coffer_economy --bench selection_benchmark

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use coffer_economy::{
    Catalog, Currency, EconomyConfig, EconomySystem, FixedPoint, MemoryLedger, MemoryStore,
    RngSource,
};

const CATALOG: &str = include_str!("../../../data/catalog.toml");

fn benchmark_single_selection(c: &mut Criterion) {
    let catalog = Catalog::from_toml_str(CATALOG).expect("shipped catalog");
    let chest = catalog.chest_by_name("premium").expect("premium chest");
    let table = catalog.resolve_candidates(chest).expect("premium pool");
    let mut rng = RngSource::seeded(1);

    c.bench_function("single_selection", |b| {
        b.iter(|| black_box(table.select(&mut rng)));
    });
}

fn benchmark_million_selections(c: &mut Criterion) {
    let catalog = Catalog::from_toml_str(CATALOG).expect("shipped catalog");
    let chest = catalog.chest_by_name("basic").expect("basic chest");
    let table = catalog.resolve_candidates(chest).expect("basic pool");
    let mut rng = RngSource::seeded(2);

    let mut group = c.benchmark_group("million_selections");
    group.throughput(Throughput::Elements(1_000_000));
    group.sample_size(10);

    group.bench_function("1M_selections", |b| {
        b.iter(|| {
            for _ in 0..1_000_000u32 {
                black_box(table.select(&mut rng)).ok();
            }
        });
    });

    group.finish();
}

fn benchmark_open_chest(c: &mut Criterion) {
    let catalog = Arc::new(Catalog::from_toml_str(CATALOG).expect("shipped catalog"));
    let config = EconomyConfig {
        rng_seed: Some(3),
        ..EconomyConfig::default()
    };
    let system = EconomySystem::new(
        catalog,
        Arc::new(MemoryStore::new()),
        Arc::new(MemoryLedger::new()),
        config,
    );
    let player = system.ensure_player("bench", None).expect("player");
    system
        .credit(player.id, Currency::Coins, FixedPoint::from_whole(u64::from(u32::MAX)))
        .expect("credit");

    c.bench_function("open_chest_basic", |b| {
        b.iter(|| black_box(system.open_chest(black_box("bench"), black_box("basic"))));
    });
}

criterion_group!(
    benches,
    benchmark_single_selection,
    benchmark_million_selections,
    benchmark_open_chest
);
criterion_main!(benches);
