use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use griddle::index::schema::{FieldOptions, Schema};
use griddle::{Document, FieldValue, Filter, IndexManager, ManagerConfig, SearchQuery, Sort};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn schema() -> Schema {
    Schema::builder()
        .add_text_field("title", FieldOptions::default())
        .add_text_field("description", FieldOptions::default())
        .add_text_field("category", FieldOptions::keyword())
        .add_integer_field("price", FieldOptions::default())
        .build()
        .unwrap()
}

fn make_doc(i: usize) -> Document {
    Document::new()
        .with("id", i as i64)
        .with("title", format!("Laptop Gaming Product {}", i))
        .with(
            "description",
            format!("High performance gaming laptop description {}", i),
        )
        .with("category", "electronics")
        .with("price", FieldValue::Integer((100 + i * 10) as i64))
}

/// Bulk-load `num_docs` through a single writer, bypassing the queue.
fn seeded_manager(num_docs: usize) -> Arc<IndexManager> {
    let manager = IndexManager::in_memory(schema(), ManagerConfig::default()).unwrap();
    let index = manager.index();
    let mut writer = index.acquire_writer().unwrap();
    for i in 0..num_docs {
        index.add_document(&mut writer, &make_doc(i)).unwrap();
    }
    writer.commit().unwrap();
    writer.finish().unwrap();
    manager.refresh_searcher().unwrap();
    manager
}

fn bench_query(c: &mut Criterion) {
    let manager = seeded_manager(5000);

    let mut group = c.benchmark_group("query");
    group.throughput(Throughput::Elements(5000));

    group.bench_function("text_only", |b| {
        b.iter(|| manager.search(&SearchQuery::text("laptop"), None, &[], 10))
    });

    group.bench_function("filter_range", |b| {
        let filter = Filter::Range {
            field: "price".to_string(),
            min: FieldValue::Integer(200),
            max: FieldValue::Integer(800),
        };
        b.iter(|| manager.search(&SearchQuery::text("laptop"), Some(&filter), &[], 10))
    });

    group.bench_function("filter_plus_sort", |b| {
        let filter = Filter::Range {
            field: "price".to_string(),
            min: FieldValue::Integer(200),
            max: FieldValue::Integer(800),
        };
        let sort = [Sort::asc("price")];
        b.iter(|| manager.search(&SearchQuery::text("laptop"), Some(&filter), &sort, 10))
    });

    group.finish();
}

fn bench_enqueue(c: &mut Criterion) {
    let mut group = c.benchmark_group("enqueue");
    group.throughput(Throughput::Elements(1000));

    group.bench_function("add_1k", |b| {
        b.iter_batched(
            || IndexManager::in_memory(schema(), ManagerConfig::default()).unwrap(),
            |manager| {
                for i in 0..1000 {
                    manager.add(make_doc(i));
                }
                manager
            },
            criterion::BatchSize::PerIteration,
        )
    });

    group.bench_function("remove_1k", |b| {
        b.iter_batched(
            || IndexManager::in_memory(schema(), ManagerConfig::default()).unwrap(),
            |manager| {
                for i in 0..1000 {
                    manager.remove(i);
                }
                manager
            },
            criterion::BatchSize::PerIteration,
        )
    });

    group.finish();
}

fn bench_drain(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("drain");
    group.sample_size(10);

    for batch_size in [10, 100] {
        group.bench_with_input(
            BenchmarkId::new("add_then_drain", batch_size),
            &batch_size,
            |b, &size| {
                b.iter_batched(
                    || {
                        let temp = TempDir::new().unwrap();
                        let manager = IndexManager::open_in_dir(
                            temp.path(),
                            schema(),
                            ManagerConfig::default().with_poll_interval(Duration::from_millis(5)),
                        )
                        .unwrap();
                        (temp, manager)
                    },
                    |(temp, manager)| {
                        runtime.block_on(async {
                            manager.start().unwrap();
                            for i in 0..size {
                                manager.add(make_doc(i));
                            }
                            manager.wait_for_drain(Duration::from_secs(60)).await;
                            manager.stop().await;
                        });
                        drop(temp);
                    },
                    criterion::BatchSize::SmallInput,
                )
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_query, bench_enqueue, bench_drain);
criterion_main!(benches);
