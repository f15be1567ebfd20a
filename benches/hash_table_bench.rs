use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::prelude::*;

use std::sync::Arc;
use talusdb::storage::buffer::{BufferPool, BufferPoolInstance};
use talusdb::ExtendibleHashTable;

// Create temporary db for benchmarking
fn create_bench_buffer_pool(pool_size: usize) -> Arc<BufferPoolInstance> {
    let temp_file = tempfile::NamedTempFile::new().unwrap();
    let path = temp_file.path().to_str().unwrap().to_string();
    let buffer_pool = Arc::new(BufferPoolInstance::new(pool_size, path).unwrap());

    // Keep the temp file alive
    std::mem::forget(temp_file);

    buffer_pool
}

fn buffer_pool_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("BufferPool");

    for size in [10, 100].iter() {
        group.bench_with_input(BenchmarkId::new("fetch_resident", size), size, |b, &size| {
            let buffer_pool = create_bench_buffer_pool(size);

            let mut page_ids = Vec::new();
            for i in 0..size {
                let (page, page_id) = buffer_pool.new_page().unwrap();
                page.write().data[0] = i as u8;
                buffer_pool.unpin_page(page_id, true).unwrap();
                page_ids.push(page_id);
            }

            b.iter(|| {
                for &page_id in &page_ids {
                    let page = buffer_pool.fetch_page(page_id).unwrap();
                    {
                        let _page_guard = page.read();
                    }
                    buffer_pool.unpin_page(page_id, false).unwrap();
                }
            });
        });
    }

    group.finish();
}

fn hash_table_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("ExtendibleHashTable");

    group.bench_function("insert_10k", |b| {
        b.iter_with_setup(
            || {
                let buffer_pool = create_bench_buffer_pool(256);
                ExtendibleHashTable::<i32, i32>::new(buffer_pool).unwrap()
            },
            |table| {
                for key in 0..10_000 {
                    table.insert(key, key).unwrap();
                }
            },
        );
    });

    group.bench_function("get_value_random", |b| {
        let buffer_pool = create_bench_buffer_pool(256);
        let table = ExtendibleHashTable::<i32, i32>::new(buffer_pool).unwrap();
        for key in 0..10_000 {
            table.insert(key, key).unwrap();
        }

        let mut rng = rand::thread_rng();
        let probes: Vec<i32> = (0..1_000).map(|_| rng.gen_range(0..10_000)).collect();

        b.iter(|| {
            for key in &probes {
                table.get_value(key).unwrap();
            }
        });
    });

    group.finish();
}

criterion_group!(benches, buffer_pool_benchmark, hash_table_benchmark);
criterion_main!(benches);
