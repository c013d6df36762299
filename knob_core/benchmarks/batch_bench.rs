use criterion::{black_box, criterion_group, criterion_main, Criterion};
use knob_core::{KnobCatalogConfig, KnobRegistry};
use knob_runtime::UpdateRequest;

fn batch_update_benchmark(c: &mut Criterion) {
    let registry = KnobRegistry::from_config(&KnobCatalogConfig::builtin()).registry;
    let cities = registry.system("cities").expect("cities").clone();
    let request = UpdateRequest::default()
        .with("industrial_development", "0.9")
        .with("research_facility_priority", "max")
        .with("tourism_investment", "75%")
        .with("cultural_development", "+0.01")
        .with("nonexistent", "0.5");

    c.bench_function("cities_mixed_batch", |b| {
        b.iter(|| {
            let outcome = cities.update(black_box(&request));
            black_box(outcome.applied_count);
        });
    });

    c.bench_function("cities_snapshot", |b| {
        b.iter(|| black_box(cities.snapshot()));
    });
}

criterion_group!(benches, batch_update_benchmark);
criterion_main!(benches);
