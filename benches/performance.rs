use std::sync::Arc;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use reltab_core::table::data_rows;
use reltab_core::{Header, MemTable, Row, TableRef, Value};
use reltab_io::MemoryStorage;
use reltab_operators::{distinct, interval_lookup, IntervalSpec, Sort};

fn make_table(rows: usize) -> TableRef {
    let data: Vec<Row> = (0..rows)
        .map(|i| {
            let k = (i * 7919) % 1000;
            vec![
                Value::Int(k as i64),
                Value::Text(format!("group-{}", i % 16)),
                Value::Float((i % 10) as f64),
            ]
        })
        .collect();
    MemTable::new(Header::from_iter(["key", "group", "value"]), data).into_ref()
}

fn bench_sort(c: &mut Criterion) {
    let table = make_table(50_000);
    let mut group = c.benchmark_group("sort");
    group.sample_size(10);

    group.bench_function("in_memory", |b| {
        b.iter(|| {
            let sorted = Sort::new(Arc::clone(&table)).key("key").buffer_rows(1_000_000).cache(false);
            data_rows(&sorted).unwrap().len()
        })
    });

    for buffer in [1_000usize, 5_000] {
        group.bench_with_input(BenchmarkId::new("spilled", buffer), &buffer, |b, &buffer| {
            b.iter(|| {
                let sorted = Sort::new(Arc::clone(&table))
                    .key("key")
                    .buffer_rows(buffer)
                    .fan_in(8)
                    .cache(false)
                    .storage(Arc::new(MemoryStorage::new()));
                data_rows(&sorted).unwrap().len()
            })
        });
    }
    group.finish();
}

fn bench_distinct(c: &mut Criterion) {
    let table = make_table(20_000);
    c.bench_function("distinct_whole_rows", |b| {
        b.iter(|| data_rows(&distinct(Arc::clone(&table))).unwrap().len())
    });
}

fn bench_interval_search(c: &mut Criterion) {
    let rows: Vec<Row> = (0..10_000i64)
        .map(|i| vec![Value::Int(i * 3), Value::Int(i * 3 + 10), Value::Int(i)])
        .collect();
    let table = MemTable::new(Header::from_iter(["start", "stop", "id"]), rows);
    let index = interval_lookup(&table, &IntervalSpec::default(), Some("id".into())).unwrap();
    c.bench_function("interval_search", |b| {
        b.iter(|| (0..1_000i64).map(|q| index.search(q * 29, q * 29 + 5).len()).sum::<usize>())
    });
}

criterion_group!(benches, bench_sort, bench_distinct, bench_interval_search);
criterion_main!(benches);
