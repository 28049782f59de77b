//! Criterion benchmarks for row-block scheduling.
//!
//! Measures the cost of walking a full image through `for_each_update`,
//! including the `read_rows` copies out of an interleaved `FloatImage`, with
//! the packets discarded instead of written to a socket.
//!
//! Run with:
//! ```bash
//! cargo bench --package tev-core --bench chunking_bench
//! ```

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use tev_core::chunking::{for_each_update, RowBlocks, DEFAULT_BUDGET_FLOATS};
use tev_core::image::FloatImage;
use tev_core::layers::Layer;

fn make_layers(width: usize, height: usize) -> Vec<Layer> {
    let color = FloatImage::from_fn(width, height, 4, |c, r, ch| (c ^ r) as f32 + ch as f32);
    let depth = FloatImage::filled(width, height, 1, 1.0);
    vec![Layer::new("color", Arc::new(color)), Layer::new("depth", Arc::new(depth))]
}

/// Benchmarks scheduling a two-layer image at several resolutions.
fn bench_schedule(c: &mut Criterion) {
    let mut group = c.benchmark_group("for_each_update");
    for (width, height) in [(256usize, 256usize), (1920, 1080)] {
        let layers = make_layers(width, height);
        group.throughput(Throughput::Elements((width * height * 5) as u64));
        group.bench_with_input(
            BenchmarkId::new("resolution", format!("{width}x{height}")),
            &layers,
            |b, layers| {
                b.iter(|| {
                    let mut total = 0usize;
                    for_each_update::<()>(
                        "bench",
                        black_box(layers),
                        width,
                        height,
                        &[4, 1],
                        DEFAULT_BUDGET_FLOATS,
                        |u| {
                            total += u.data.len();
                            Ok(())
                        },
                    )
                    .expect("schedule must succeed");
                    total
                })
            },
        );
    }
    group.finish();
}

/// Benchmarks plain block iteration for a tall image with a small stride.
fn bench_row_blocks(c: &mut Criterion) {
    c.bench_function("row_blocks_100k_rows", |b| {
        b.iter(|| RowBlocks::with_stride(black_box(100_000), black_box(7)).count())
    });
}

criterion_group!(benches, bench_schedule, bench_row_blocks);
criterion_main!(benches);
