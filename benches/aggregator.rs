//! Criterion benchmarks for the aggregation and rasterization hot path.
//!
//! One refresh pass converts every sample appended since the previous pass
//! into pixel columns and repaints them; this has to keep up with
//! acquisition rates of 30 kHz across tens of channels.
//!
//! Run with: cargo bench --bench aggregator

use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use lfpscope::{DisplayBuffer, DisplayCanvas, DisplaySettings, DrawMethod, SignalBatch};

const SAMPLE_RATE: f32 = 30_000.0;
const BLOCK: usize = 3000;

fn bench_canvas(channels: usize, method: DrawMethod) -> (lfpscope::SharedDisplayBuffer, DisplayCanvas) {
    let mut settings = DisplaySettings::default();
    settings.draw_method = method;
    let buffer = DisplayBuffer::new_shared();
    let mut canvas = DisplayCanvas::new(buffer.clone(), settings);
    assert!(canvas.resize_buffer(channels, SAMPLE_RATE));
    canvas.resized(1920);
    canvas.begin_animation();
    (buffer, canvas)
}

fn block(channels: usize) -> Vec<Vec<f32>> {
    let samples: Vec<f32> = (0..BLOCK).map(|i| (i as f32 * 0.013).sin() * 100.0).collect();
    vec![samples; channels]
}

/// Refresh throughput across channel counts, min/max drawing.
fn refresh_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("refresh_min_max");
    group.measurement_time(Duration::from_secs(8));

    for channels in [4usize, 16, 64] {
        let (buffer, mut canvas) = bench_canvas(channels, DrawMethod::MinMax);
        let data = block(channels);
        group.throughput(Throughput::Elements((BLOCK * channels) as u64));
        group.bench_with_input(
            BenchmarkId::new("refresh", channels),
            &channels,
            |b, _| {
                b.iter(|| {
                    buffer
                        .lock()
                        .push_batch(&SignalBatch::new(SAMPLE_RATE, data.clone()))
                        .unwrap();
                    black_box(canvas.refresh());
                });
            },
        );
    }
    group.finish();
}

/// The histogram drawing mode is the expensive one; keep an eye on it.
fn supersampled_refresh(c: &mut Criterion) {
    let mut group = c.benchmark_group("refresh_supersampled");
    group.measurement_time(Duration::from_secs(8));

    let (buffer, mut canvas) = bench_canvas(16, DrawMethod::Supersampled);
    let data = block(16);
    group.throughput(Throughput::Elements((BLOCK * 16) as u64));
    group.bench_function("refresh", |b| {
        b.iter(|| {
            buffer
                .lock()
                .push_batch(&SignalBatch::new(SAMPLE_RATE, data.clone()))
                .unwrap();
            black_box(canvas.refresh());
        });
    });
    group.finish();
}

criterion_group!(benches, refresh_throughput, supersampled_refresh);
criterion_main!(benches);
