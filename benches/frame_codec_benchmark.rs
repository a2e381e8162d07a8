use criterion::{black_box, criterion_group, criterion_main, Criterion};

use arkbeam::{chunk, Frame};

// Modify time limit here
const BENCHMARK_TIME_LIMIT: std::time::Duration =
    std::time::Duration::from_secs(10);

fn generate_data(size: usize) -> Vec<u8> {
    let mut rng = fastrand::Rng::with_seed(7);
    (0..size).map(|_| rng.u8(..)).collect()
}

/// Benchmarks chunking a file into frames and the per-frame encode/decode
/// that runs once per displayed or captured symbol.
fn bench_frame_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_codec");
    group.measurement_time(BENCHMARK_TIME_LIMIT);

    let inputs = [("small", 4096), ("medium", 262144), ("large", 4194304)];
    for (name, size) in inputs.iter() {
        let data = generate_data(*size);
        group.bench_function(format!("chunk:{}", name), |b| {
            b.iter(|| {
                chunk(black_box(&data), "bench.bin", 2214)
                    .expect("chunk returned an error")
            });
        });
    }

    let file = chunk(&generate_data(2048), "bench.bin", 2214)
        .expect("chunk returned an error");
    let frame = file.frames[0].clone();
    let encoded = frame.encode();

    group.bench_function("encode", |b| b.iter(|| black_box(&frame).encode()));
    group.bench_function("decode", |b| {
        b.iter(|| Frame::decode(black_box(&encoded)).expect("decode failed"))
    });

    group.finish();
}

criterion_group!(benches, bench_frame_codec);
criterion_main!(benches);
