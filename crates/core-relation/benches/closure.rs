//! Transitive-closure throughput on relation sizes typical of enumeration.

use core_event::Event;
use core_relation::EventMatrix;
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};

fn chain_matrix(n: i32) -> EventMatrix {
    let elems: Vec<Event> = (0..n).map(|i| Event::new(i % 4, i / 4)).collect();
    let mut m = EventMatrix::new(elems.clone());
    for pair in elems.windows(2) {
        m.add_edge(pair[0], pair[1]);
    }
    // A few cross edges so the closure is not a pure chain.
    for i in (0..n - 8).step_by(7) {
        m.add_edge(elems[i as usize], elems[(i + 8) as usize]);
    }
    m
}

fn bench_closure(c: &mut Criterion) {
    let mut group = c.benchmark_group("trans_closure");
    for n in [16, 64, 128] {
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, &n| {
            b.iter_batched(
                || chain_matrix(n),
                |mut m| m.trans_closure(),
                criterion::BatchSize::SmallInput,
            );
        });
    }
    group.finish();
}

criterion_group!(benches, bench_closure);
criterion_main!(benches);
