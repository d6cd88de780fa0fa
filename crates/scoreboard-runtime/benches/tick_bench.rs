//! Benchmarks for the tick path.
//!
//! Run with: cargo bench -p scoreboard-runtime --bench tick_bench
//!
//! Performance budgets:
//! - Steady tick, 100 viewers, nothing changed: < 100µs
//! - Tick with a title transition, 100 viewers: < 1ms
//! - Cached route lookup: < 200ns

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use scoreboard_core::{
    BackendCapabilities, Definitions, FrameDef, LocationMatchDef, RoutingRuleDef, TemplateDef,
    ViewerId,
};
use scoreboard_runtime::{MemoryBackend, PanelContext, StaticPopulation};
use std::hint::black_box;
use std::sync::Arc;

// =============================================================================
// Helper Functions
// =============================================================================

fn definitions() -> Definitions {
    let mut lobby = TemplateDef::new("lobby")
        .title(FrameDef::timed("§6Welcome", 1))
        .title(FrameDef::timed("§eEnjoy!", 1));
    for row in 1..=15 {
        lobby = lobby.row(row, vec![FrameDef::text(format!("§7Row {row}: some status text"))]);
    }
    Definitions {
        templates: vec![
            lobby,
            TemplateDef::new("still").title(FrameDef::text("Still")),
        ],
        rules: vec![
            RoutingRuleDef::new(LocationMatchDef::Exact("quiet".into()), ["still"]),
            RoutingRuleDef::new(LocationMatchDef::Pattern("hub-\\d+".into()), ["lobby"]),
        ],
        ..Definitions::default()
    }
}

fn populated(viewers: u128, location: &str) -> PanelContext {
    let backend = Arc::new(MemoryBackend::new(BackendCapabilities::baseline()));
    let population = Arc::new(StaticPopulation::new());
    let ctx = PanelContext::builder(backend, population.clone())
        .definitions(definitions())
        .build();
    for id in 0..viewers {
        let viewer = ViewerId::from_u128(id);
        population.join(viewer, location);
        ctx.viewer_joined(viewer);
    }
    ctx
}

// =============================================================================
// Tick Benchmarks
// =============================================================================

fn bench_tick(c: &mut Criterion) {
    let mut group = c.benchmark_group("tick");

    for viewers in [10u128, 100, 1000] {
        group.throughput(Throughput::Elements(viewers as u64));

        let steady = populated(viewers, "quiet");
        group.bench_with_input(BenchmarkId::new("steady", viewers), &steady, |b, ctx| {
            b.iter(|| black_box(ctx.tick()))
        });

        let animated = populated(viewers, "hub-1");
        group.bench_with_input(BenchmarkId::new("animated", viewers), &animated, |b, ctx| {
            b.iter(|| black_box(ctx.tick()))
        });
    }

    group.finish();
}

// =============================================================================
// Routing Benchmarks
// =============================================================================

fn bench_routing(c: &mut Criterion) {
    let mut group = c.benchmark_group("routing");
    let ctx = populated(0, "quiet");
    let registry = ctx.registry();
    registry.route_for("hub-7");

    group.bench_function("cached", |b| {
        b.iter(|| black_box(registry.route_for(black_box("hub-7"))))
    });
    group.bench_function("cold", |b| {
        b.iter(|| {
            registry.invalidate();
            black_box(registry.route_for(black_box("hub-7")))
        })
    });

    group.finish();
}

criterion_group!(benches, bench_tick, bench_routing);
criterion_main!(benches);
