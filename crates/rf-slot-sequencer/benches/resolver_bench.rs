//! Payline Resolver Benchmarks
//!
//! Template scoring cost per round: single descriptors and a full result.

use std::hint::black_box;

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use rf_slot_sequencer::{
    AnticipationPlan, Grid, PaylineResolver, SymbolRules, WinDescriptor, WinlineSet,
};

fn grid() -> Grid {
    Grid::from_rows(vec![
        vec![4, 4, 4, 4, 7],
        vec![11, 1, 1, 8, 12],
        vec![12, 3, 12, 6, 9],
    ])
    .unwrap()
}

fn wins(count: usize) -> Vec<WinDescriptor> {
    let pool = [
        WinDescriptor::new(1, 4, 4),
        WinDescriptor::new(0, 4, 5),
        WinDescriptor::new(7, 4, 3),
        WinDescriptor::new(0, 1, 2),
        WinDescriptor::new(13, 1, 3),
    ];
    pool.iter().cycle().take(count).cloned().collect()
}

fn bench_resolve_single(c: &mut Criterion) {
    let resolver = PaylineResolver::new(SymbolRules::default(), WinlineSet::standard_5x3());
    let grid = grid();

    c.bench_function("resolve_exact", |b| {
        let win = WinDescriptor::new(1, 4, 4);
        b.iter(|| black_box(resolver.resolve(black_box(&grid), black_box(&win))))
    });

    c.bench_function("resolve_bidirectional", |b| {
        let win = WinDescriptor::new(0, 1, 2);
        b.iter(|| black_box(resolver.resolve(black_box(&grid), black_box(&win))))
    });
}

fn bench_resolve_all(c: &mut Criterion) {
    let mut group = c.benchmark_group("resolve_all");
    let resolver = PaylineResolver::new(SymbolRules::default(), WinlineSet::standard_5x3());
    let grid = grid();

    for &count in &[1usize, 5, 20] {
        group.throughput(Throughput::Elements(count as u64));
        let wins = wins(count);
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, _| {
            b.iter(|| black_box(resolver.resolve_all(black_box(&grid), black_box(&wins))))
        });
    }

    group.finish();
}

fn bench_anticipation_plan(c: &mut Criterion) {
    let rules = SymbolRules::default();
    let grid = grid();
    c.bench_function("anticipation_plan", |b| {
        b.iter(|| black_box(AnticipationPlan::from_grid(black_box(&grid), &rules)))
    });
}

criterion_group!(benches, bench_resolve_single, bench_resolve_all, bench_anticipation_plan);
criterion_main!(benches);
