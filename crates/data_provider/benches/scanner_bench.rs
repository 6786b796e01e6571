use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use data_provider::batch::assemble;
use data_provider::{Nesting, SlotHeader};
use serde_json::{json, Value};

/// Benchmarks for the two-phase scanner pipeline.
///
/// This measures:
/// 1. Flat slots: one dense row, one id, and one sparse-value row per record
/// 2. Sequence slots: the same leaf kinds wrapped in one and two sequence levels
///
/// To run these, use:
/// ```bash
/// cargo bench --bench scanner_bench
/// ```

/// All tests sweep across batch sizes from 64 to 16K records.
const SIZES: [usize; 4] = [64, 512, 4_096, 16_384];

const DENSE_DIM: usize = 16;

fn flat_headers() -> Vec<SlotHeader> {
    vec![
        SlotHeader::dense(DENSE_DIM),
        SlotHeader::index(1_000),
        SlotHeader::sparse_value(10_000),
    ]
}

fn nested_headers() -> Vec<SlotHeader> {
    vec![
        SlotHeader::dense(DENSE_DIM).with_nesting(Nesting::Sequence),
        SlotHeader::sparse(10_000).with_nesting(Nesting::SubSequence),
    ]
}

/// Helper function to build `size` flat records with predictable values.
fn make_flat_records(size: usize) -> Vec<Value> {
    (0..size)
        .map(|i| {
            let dense: Vec<f32> = (0..DENSE_DIM).map(|d| (i + d) as f32 * 0.5).collect();
            let pairs: Vec<Value> = (0..8).map(|k| json!([(i * 8 + k) % 10_000, 1.0])).collect();
            json!([dense, i % 1_000, pairs])
        })
        .collect()
}

/// Helper function to build `size` nested records: 4 timesteps each, and
/// 3 sub-sequences of 2 timesteps for the sparse slot.
fn make_nested_records(size: usize) -> Vec<Value> {
    (0..size)
        .map(|i| {
            let steps: Vec<Vec<f32>> = (0..4).map(|t| vec![(i + t) as f32; DENSE_DIM]).collect();
            let subs: Vec<Vec<Vec<usize>>> = (0..3)
                .map(|s| (0..2).map(|t| vec![(i + s + t) % 10_000]).collect())
                .collect();
            json!([steps, subs])
        })
        .collect()
}

fn bench_flat(c: &mut Criterion) {
    let mut group = c.benchmark_group("Flat Slots");
    let headers = flat_headers();
    for &size in &SIZES {
        let records = make_flat_records(size);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::new("assemble", size), &records, |b, records| {
            b.iter(|| {
                let batch = assemble(&headers, records, records.len()).unwrap();
                black_box(batch)
            })
        });
    }
    group.finish();
}

fn bench_nested(c: &mut Criterion) {
    let mut group = c.benchmark_group("Sequence Slots");
    let headers = nested_headers();
    for &size in &SIZES {
        let records = make_nested_records(size);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::new("assemble", size), &records, |b, records| {
            b.iter(|| {
                let batch = assemble(&headers, records, records.len()).unwrap();
                black_box(batch)
            })
        });
    }
    group.finish();
}

criterion_group!(
    name = benches;
    config = Criterion::default()
        .warm_up_time(std::time::Duration::from_secs(2))
        .measurement_time(std::time::Duration::from_secs(5))
        .sample_size(50);
    targets = bench_flat, bench_nested
);
criterion_main!(benches);
