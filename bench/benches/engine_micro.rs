//! Engine microbenchmarks using Criterion.
//!
//! These benchmarks measure the core storage and scheduling operations in
//! isolation:
//! - Component allocate/free churn
//! - Chain and polymorphic queries
//! - Schedule computation

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use rand::seq::SliceRandom;

use cadence_bench::{bench_world, components::*};
use cadence_engine::{
    ecs::ComponentRef,
    tasks::{Dependency, TaskDefinition, TaskGraph, Tick},
};

// =============================================================================
// Pool Churn Benchmarks
// =============================================================================

fn bench_pool_churn(c: &mut Criterion) {
    let mut group = c.benchmark_group("pool_churn");

    for count in [100u16, 1_000, 10_000] {
        group.throughput(Throughput::Elements(count as u64));

        // Fill the pool, then drain it in allocation order.
        group.bench_with_input(BenchmarkId::new("fill_drain", count), &count, |b, &n| {
            let mut world = bench_world(n);
            let host = world.create_host();
            b.iter(|| {
                let refs: Vec<ComponentRef> = (0..n)
                    .map(|_| world.attach::<Position>(host).unwrap())
                    .collect();
                for r in refs {
                    world.free(r);
                }
            });
        });

        // Same churn, but freeing in random order to exercise the roster swap.
        group.bench_with_input(BenchmarkId::new("random_drain", count), &count, |b, &n| {
            let mut world = bench_world(n);
            let host = world.create_host();
            let mut rng = rand::thread_rng();
            b.iter(|| {
                let mut refs: Vec<ComponentRef> = (0..n)
                    .map(|_| world.attach::<Position>(host).unwrap())
                    .collect();
                refs.shuffle(&mut rng);
                for r in refs {
                    world.free(r);
                }
            });
        });

        // Deferred destruction: mark everything, then one flush.
        group.bench_with_input(BenchmarkId::new("mark_flush", count), &count, |b, &n| {
            let mut world = bench_world(n);
            let host = world.create_host();
            b.iter(|| {
                let refs: Vec<ComponentRef> = (0..n)
                    .map(|_| world.attach::<Position>(host).unwrap())
                    .collect();
                for r in refs {
                    world.mark_for_destroy(r);
                }
                world.flush_destroys();
            });
        });
    }

    group.finish();
}

// =============================================================================
// Query Benchmarks
// =============================================================================

fn bench_queries(c: &mut Criterion) {
    let mut group = c.benchmark_group("queries");

    for count in [100u16, 1_000] {
        group.throughput(Throughput::Elements(count as u64));

        // Walk one host's chain of a single type.
        group.bench_with_input(BenchmarkId::new("find_all", count), &count, |b, &n| {
            let mut world = bench_world(n);
            let host = world.create_host();
            for _ in 0..n {
                world.attach::<Position>(host).unwrap();
            }
            let mut sink = Vec::new();
            b.iter(|| {
                sink.clear();
                world.find_all::<Position>(host, &mut sink);
                black_box(sink.len())
            });
        });

        // Polymorphic walk across the collider hierarchy.
        group.bench_with_input(
            BenchmarkId::new("find_all_implementing", count),
            &count,
            |b, &n| {
                let mut world = bench_world(n);
                let host = world.create_host();
                for i in 0..n {
                    if i % 2 == 0 {
                        world.attach::<SphereCollider>(host).unwrap();
                    } else {
                        world.attach::<BoxCollider>(host).unwrap();
                    }
                }
                let mut sink = Vec::new();
                b.iter(|| {
                    sink.clear();
                    world.find_all_implementing::<Collider>(host, &mut sink);
                    black_box(sink.len())
                });
            },
        );

        // World-wide live iteration, the task-function access pattern.
        group.bench_with_input(BenchmarkId::new("live_iter", count), &count, |b, &n| {
            let mut world = bench_world(n);
            let host = world.create_host();
            for _ in 0..n {
                world.attach::<Velocity>(host).unwrap();
            }
            b.iter(|| black_box(world.live::<Velocity>().count()));
        });
    }

    group.finish();
}

// =============================================================================
// Scheduler Benchmarks
// =============================================================================

fn bench_schedule(c: &mut Criterion) {
    let mut group = c.benchmark_group("schedule");

    fn noop(_: &mut cadence_engine::World) {}

    // Names for a linear dependency chain; leaked once, reused per iteration.
    fn chain_names(n: usize) -> &'static [String] {
        Box::leak(
            (0..n)
                .map(|i| format!("Task{}", i))
                .collect::<Vec<_>>()
                .into_boxed_slice(),
        )
    }

    for count in [10usize, 100] {
        group.throughput(Throughput::Elements(count as u64));

        group.bench_with_input(BenchmarkId::new("linear_chain", count), &count, |b, &n| {
            let names = chain_names(n);
            b.iter(|| {
                let mut graph = TaskGraph::new();
                for (i, name) in names.iter().enumerate() {
                    let mut def = TaskDefinition::new(name.as_str(), noop);
                    if i > 0 {
                        let previous = Dependency::new(names[i - 1].as_str());
                        def = def.with_contract(move |c| c.execute_after(previous));
                    }
                    graph.register(def);
                }
                black_box(graph.schedule(Tick::GAMEPLAY).unwrap().len())
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_pool_churn, bench_queries, bench_schedule);
criterion_main!(benches);
