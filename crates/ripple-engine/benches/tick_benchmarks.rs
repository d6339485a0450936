//! Tick throughput benchmarks.
//!
//! Measures the cost of one tick for the shapes that dominate real graphs:
//!
//! - **Idle:** no timers, no events; only the phase bookkeeping.
//! - **Fan-in:** many events folded into elements of one entity.
//! - **Chain:** a change at the root walking down a deep linear chain, with
//!   many keys per entity.
//!
//! Run with: `cargo bench --bench tick_benchmarks`

use chrono::{DateTime, Duration, TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use ripple_engine::prelude::*;

// ---------------------------------------------------------------------------
// Benchmark entities
// ---------------------------------------------------------------------------

static READINGS: EventChannel<(u32, i64)> = EventChannel::new("READINGS");
static LATEST: EntityKey<u32, i64> = EntityKey::new("LATEST");

/// `upstream + 1`, for the same key.
struct Increment(EntityKey<u32, i64>);

impl SimpleElementManager<u32, i64> for Increment {
    fn update(
        &self,
        key: &u32,
        previous: Option<&i64>,
        _ctx: &UpdateContext,
        toolbox: &mut Toolbox<'_>,
    ) -> UpdateResult<i64> {
        match toolbox.state(&self.0, key) {
            Some(value) => UpdateResult::maybe(previous, value + 1),
            None => UpdateResult::NotReady,
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn start() -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000, 0).unwrap()
}

/// `LATEST` followed by a chain of `depth` increment entities.
fn chain_engine(depth: usize) -> Engine {
    let mut builder = EngineBuilder::new().channel(&READINGS).event_to_entity(
        &READINGS,
        &LATEST,
        |(key, _)| *key,
        |(_, value)| *value,
    );
    let mut previous = LATEST;
    for level in 0..depth {
        let next: EntityKey<u32, i64> =
            EntityKey::new(Box::leak(format!("LEVEL_{level}").into_boxed_str()));
        builder = builder.simple_entity(&next, Increment(previous), &[previous.erased()]);
        previous = next;
    }
    builder.build().unwrap()
}

/// Inject one reading per key and run a tick.
fn seed(engine: &mut Engine, keys: u32, value: i64, time: DateTime<Utc>) {
    for key in 0..keys {
        engine.inject_event(&READINGS, (key, value)).unwrap();
    }
    engine.run_once(time).unwrap();
}

// ---------------------------------------------------------------------------
// Benchmark 1: Idle tick
// ---------------------------------------------------------------------------

fn bench_idle_tick(c: &mut Criterion) {
    let mut engine = chain_engine(8);
    let mut time = start();
    seed(&mut engine, 1_000, 0, time);

    c.bench_function("idle_tick_8x1k", |b| {
        b.iter(|| {
            time += Duration::milliseconds(1);
            black_box(engine.run_once(time).unwrap());
        });
    });
}

// ---------------------------------------------------------------------------
// Benchmark 2: Event fan-in
// ---------------------------------------------------------------------------

fn bench_event_fan_in(c: &mut Criterion) {
    let mut group = c.benchmark_group("event_fan_in");

    for events in [100u32, 1_000, 10_000] {
        group.bench_with_input(BenchmarkId::from_parameter(events), &events, |b, &events| {
            let mut engine = chain_engine(0);
            let mut time = start();
            let mut value = 0;
            b.iter(|| {
                value += 1;
                time += Duration::milliseconds(1);
                for i in 0..events {
                    engine.inject_event(&READINGS, (i % 64, value)).unwrap();
                }
                black_box(engine.run_once(time).unwrap());
            });
        });
    }

    group.finish();
}

// ---------------------------------------------------------------------------
// Benchmark 3: Change propagation down a chain
// ---------------------------------------------------------------------------

fn bench_chain_propagation(c: &mut Criterion) {
    let mut group = c.benchmark_group("chain_propagation");

    for depth in [4usize, 16, 64] {
        group.bench_with_input(BenchmarkId::from_parameter(depth), &depth, |b, &depth| {
            let mut engine = chain_engine(depth);
            let mut time = start();
            seed(&mut engine, 100, 0, time);
            let mut value = 0;
            b.iter(|| {
                value += 1;
                time += Duration::milliseconds(1);
                seed(&mut engine, 100, value, time);
                black_box(engine.last_diagnostics().updates_invoked);
            });
        });
    }

    group.finish();
}

// ---------------------------------------------------------------------------
// Criterion groups and main
// ---------------------------------------------------------------------------

criterion_group!(
    benches,
    bench_idle_tick,
    bench_event_fan_in,
    bench_chain_propagation,
);
criterion_main!(benches);
