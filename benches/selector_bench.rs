//! Criterion benchmarks for the selector engine and the query pipeline.
//!
//! Run:
//!   cargo bench
//!   cargo bench -- selector   # one group

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use genql::selector;
use genql::value::{Map, Value};
use genql::{Query, QueryOptions};

// ── Data builders ─────────────────────────────────────────────────────────────

/// 100 flat product objects: {id, name, price, in_stock}.
fn products(n: usize) -> Value {
    let rows: Vec<Value> = (0..n)
        .map(|i| {
            let mut m = Map::new();
            m.insert("id".to_string(), Value::from(i));
            m.insert("name".to_string(), Value::from(format!("Product {i}")));
            m.insert("price".to_string(), Value::from(10.0 + i as f64 * 2.5));
            m.insert("in_stock".to_string(), Value::Bool(i % 2 == 0));
            Value::object(m)
        })
        .collect();
    let mut root = Map::new();
    root.insert("products".to_string(), Value::array(rows));
    Value::object(root)
}

fn document(n: usize) -> Map {
    match products(n) {
        Value::Object(map) => map.as_ref().clone(),
        _ => unreachable!(),
    }
}

// ── Benchmarks ────────────────────────────────────────────────────────────────

fn bench_selector(c: &mut Criterion) {
    let mut group = c.benchmark_group("selector");
    let data = products(100);

    group.bench_function("simple_key", |b| {
        b.iter(|| selector::evaluate(black_box(&data), "products").unwrap())
    });
    group.bench_function("key_over_array", |b| {
        b.iter(|| selector::evaluate(black_box(&data), "products.price").unwrap())
    });
    group.bench_function("pipe_reshape", |b| {
        b.iter(|| selector::evaluate(black_box(&data), "products{id, name}").unwrap())
    });
    group.bench_function("dimension_slice", |b| {
        b.iter(|| selector::evaluate(black_box(&data), "products[(10:60)]").unwrap())
    });
    group.bench_function("distinct_top_fn", |b| {
        b.iter(|| selector::evaluate(black_box(&data), "distinct=>products.in_stock").unwrap())
    });
    group.finish();
}

fn bench_queries(c: &mut Criterion) {
    let mut group = c.benchmark_group("query");
    for n in [10usize, 100, 1000] {
        group.bench_with_input(BenchmarkId::new("filter_project", n), &n, |b, &n| {
            let data = document(n);
            b.iter(|| {
                let mut query = Query::new(
                    black_box(data.clone()),
                    "SELECT id, name FROM products WHERE in_stock = true",
                    QueryOptions::new(),
                )
                .unwrap();
                query.exec().unwrap()
            })
        });
        group.bench_with_input(BenchmarkId::new("group_aggregate", n), &n, |b, &n| {
            let data = document(n);
            b.iter(|| {
                let mut query = Query::new(
                    black_box(data.clone()),
                    "SELECT in_stock, COUNT(*) c, AVG(price) p FROM products GROUP BY in_stock",
                    QueryOptions::new(),
                )
                .unwrap();
                query.exec().unwrap()
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_selector, bench_queries);
criterion_main!(benches);
