//! Benchmarks for store reads and transactional writes.
//!
//! Run with: cargo bench -p lattice-store

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::hint::black_box;

use lattice_store::reactive::Effect;
use lattice_store::{create_store, Node, Value};

fn list_of(count: usize) -> Node {
    Node::from_values((0..count).map(|i| Value::from(i as i64)))
}

// ---------------------------------------------------------------------------
// Reads
// ---------------------------------------------------------------------------

fn bench_reads(c: &mut Criterion) {
    let mut group = c.benchmark_group("store/read");

    for count in [100usize, 1_000, 10_000] {
        group.throughput(Throughput::Elements(count as u64));
        let (store, _set_store) = create_store(list_of(count));

        group.bench_with_input(BenchmarkId::new("untracked", count), &count, |b, &count| {
            b.iter(|| {
                for index in 0..count {
                    black_box(store.get(index));
                }
            })
        });

        // Cells materialized by the first tracked run are reused afterwards
        let view = store.clone();
        let effect = Effect::new_lazy(move || {
            for index in 0..count {
                black_box(view.get(index));
            }
        });
        group.bench_with_input(BenchmarkId::new("tracked", count), &count, |b, _| {
            b.iter(|| effect.execute())
        });
    }

    group.finish();
}

// ---------------------------------------------------------------------------
// Writes
// ---------------------------------------------------------------------------

fn bench_writes(c: &mut Criterion) {
    let mut group = c.benchmark_group("store/write");

    for watchers in [0usize, 10, 100] {
        let (store, set_store) = create_store(Node::from_pairs([("count", 0)]));
        let effects: Vec<Effect> = (0..watchers)
            .map(|_| {
                let view = store.clone();
                Effect::new(move || {
                    black_box(view.get("count"));
                })
            })
            .collect();

        let mut next = 0i64;
        group.bench_with_input(BenchmarkId::new("set", watchers), &watchers, |b, _| {
            b.iter(|| {
                next += 1;
                set_store.update(|s| s.set("count", next));
            })
        });
        drop(effects);
    }

    let (store, set_store) = create_store(list_of(1_000));
    let view = store.clone();
    let _length = Effect::new(move || {
        black_box(view.len());
    });
    group.bench_function("push_pop", |b| {
        b.iter(|| {
            set_store.update(|s| {
                s.push(1);
                s.pop()
            })
        })
    });

    group.finish();
}

criterion_group!(benches, bench_reads, bench_writes);
criterion_main!(benches);
