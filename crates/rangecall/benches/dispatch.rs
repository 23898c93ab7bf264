//! Dispatch benchmarks (criterion): full marshalling round trips over large
//! ragged columns, single- and multi-output.

use criterion::{criterion_group, criterion_main, Criterion};

use rangecall::{ArgValue, Engine, RangeData, Registry};

const ROWS: usize = 1_000_000;
const LEADING_NAN: usize = 1_000;

fn ragged_column() -> Vec<f64> {
    let mut cells = vec![f64::NAN; LEADING_NAN];
    cells.extend((0..ROWS - LEADING_NAN).map(|i| 100.0 + (i % 500) as f64 * 0.25));
    cells
}

fn bench_dispatch(c: &mut Criterion) {
    let mut engine = Engine::new(Registry::with_builtins());
    let column = ragged_column();

    let mut group = c.benchmark_group("dispatch");
    group.sample_size(20);

    group.bench_function("sma_1m", |b| {
        b.iter(|| {
            let args = [
                ArgValue::Range(RangeData::from_column(column.clone())),
                ArgValue::Number(30.0),
            ];
            engine.call("sma", &args).unwrap()
        })
    });

    group.bench_function("macd_1m", |b| {
        b.iter(|| {
            let args = [ArgValue::Range(RangeData::from_column(column.clone()))];
            engine.call("macd", &args).unwrap()
        })
    });

    group.finish();
}

criterion_group!(benches, bench_dispatch);
criterion_main!(benches);
