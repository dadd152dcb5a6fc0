//! ASOF join throughput over generated trade/quote tables.

use std::hint::black_box;
use std::sync::Arc;

use arrow_array::{Float64Array, Int64Array, RecordBatch, StringArray};
use arrow_schema::{DataType, Field, Schema};
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use rill_core::cursor::Record;
use rill_core::exec::ExecutionContext;
use rill_core::join::AsofJoinLightCursorFactory;
use rill_core::table::{MemTable, MemTableFactory};

const SYMBOLS: &[&str] = &["AAPL", "GOOG", "MSFT", "AMZN", "NVDA", "META", "TSLA", "AMD"];

fn market_table(rows: usize, stride: i64, value_base: f64) -> MemTable {
    let schema = Arc::new(Schema::new(vec![
        Field::new("ts", DataType::Int64, false),
        Field::new("sym", DataType::Utf8, false),
        Field::new("value", DataType::Float64, false),
    ]));
    let timestamps: Vec<i64> = (0..rows).map(|i| i as i64 * stride).collect();
    let symbols: Vec<&str> = (0..rows).map(|i| SYMBOLS[i % SYMBOLS.len()]).collect();
    let values: Vec<f64> = (0..rows).map(|i| value_base + i as f64).collect();
    let batch = RecordBatch::try_new(
        schema,
        vec![
            Arc::new(Int64Array::from(timestamps)) as _,
            Arc::new(StringArray::from(symbols)) as _,
            Arc::new(Float64Array::from(values)) as _,
        ],
    )
    .unwrap();
    MemTable::new(batch, Some(0))
}

fn bench_asof_join(c: &mut Criterion) {
    let mut group = c.benchmark_group("asof_join_light");

    for &rows in &[1_000usize, 10_000] {
        group.throughput(Throughput::Elements(rows as u64));
        group.bench_with_input(BenchmarkId::new("join", rows), &rows, |b, &rows| {
            // Quotes are 4x denser than trades and slightly ahead of them.
            let mut factory = AsofJoinLightCursorFactory::from_key_columns(
                Box::new(MemTableFactory::new(market_table(rows, 40, 100.0))),
                Box::new(MemTableFactory::new(market_table(rows * 4, 10, 99.0))),
                &[(1, 1)],
                Some(1_000),
            )
            .unwrap();

            b.iter(|| {
                let mut ctx = ExecutionContext::new();
                let cursor = factory.cursor(&mut ctx).unwrap();
                let mut matched = 0u64;
                while cursor.advance().unwrap() {
                    let row = cursor.record();
                    if row.has_slave() {
                        matched += 1;
                    }
                    black_box(row.long(0));
                }
                black_box(matched)
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_asof_join);
criterion_main!(benches);
