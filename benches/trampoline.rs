//! Benchmarks for the two evaluation pipelines.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use delimit::state::{get, get_state, put, put_state, run_state, run_state_expr, Get, Put};
use delimit::{Cont, Expr};

fn bench_cont_bind_chain(c: &mut Criterion) {
    c.bench_function("cont_bind_chain_100", |b| {
        b.iter(|| {
            let mut m: Cont<u64, u64> = Cont::of(0);
            for _ in 0..100 {
                m = m.bind(|a| Cont::of(a + 1));
            }
            black_box(m.run())
        })
    });
}

fn bench_expr_bind_chain(c: &mut Criterion) {
    c.bench_function("expr_bind_chain_1000", |b| {
        b.iter(|| {
            let mut e = Expr::perform(Get::<u64>::new());
            for _ in 0..1_000 {
                e = e.bind(|a| Expr::of(a + 1));
            }
            black_box(run_state_expr(0u64, e))
        })
    });
}

fn bench_state_handle(c: &mut Criterion) {
    c.bench_function("run_state_get_put_100", |b| {
        b.iter(|| {
            let mut m = get::<u64>();
            for _ in 0..100 {
                m = m.bind(|s| put(s + 1).then(get::<u64>()));
            }
            black_box(run_state(0u64, m))
        })
    });
}

fn bench_state_fused(c: &mut Criterion) {
    c.bench_function("run_state_fused_get_put", |b| {
        b.iter(|| {
            let m = get_state(|s: u64| put_state(s + 1, get::<u64>()));
            black_box(run_state(black_box(41u64), m))
        })
    });
}

fn bench_expr_state(c: &mut Criterion) {
    c.bench_function("run_state_expr_get_put", |b| {
        b.iter(|| {
            let m = Expr::perform(Get::<u64>::new())
                .bind(|s| Expr::perform(Put::new(s + 1)).then(Expr::perform(Get::<u64>::new())));
            black_box(run_state_expr(black_box(41u64), m))
        })
    });
}

criterion_group!(
    benches,
    bench_cont_bind_chain,
    bench_expr_bind_chain,
    bench_state_handle,
    bench_state_fused,
    bench_expr_state
);
criterion_main!(benches);
