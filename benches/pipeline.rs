use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use optical_barcode::capture::{AcquireRequest, CameraCapability, FrameSample, LiveStream, SyntheticCamera};
use optical_barcode::decoding::{DecodeBackend, Ean13Backend, Ean13Decoder};
use optical_barcode::extraction::{BinarySignal, SignalExtractor};

const CODE: &str = "4006381333931";

// (name, width, height, module width in pixels)
const GEOMETRIES: &[(&str, u32, u32, u32)] = &[
    ("320x240", 320, 240, 2),
    ("640x480", 640, 480, 4),
    ("1280x720", 1280, 720, 8),
];

fn render(width: u32, height: u32, module_px: u32, code: Option<&str>) -> Option<FrameSample> {
    let camera = SyntheticCamera::new().with_geometry(width, height, module_px);
    if let Some(code) = code {
        camera.show(code);
    }
    let mut stream = LiveStream::new(camera.acquire(&AcquireRequest::any()).ok()?);
    stream.pull_frame().ok().flatten()
}

fn benchmark_backend(c: &mut Criterion) {
    let mut group = c.benchmark_group("ean13_backend");
    let backend = Ean13Backend::default();

    for &(name, width, height, module_px) in GEOMETRIES {
        if let Some(frame) = render(width, height, module_px, Some(CODE)) {
            group.bench_with_input(BenchmarkId::new("hit", name), &frame, |b, frame| {
                b.iter(|| backend.decode(black_box(frame)))
            });
        }
        if let Some(frame) = render(width, height, module_px, None) {
            group.bench_with_input(BenchmarkId::new("empty", name), &frame, |b, frame| {
                b.iter(|| backend.decode(black_box(frame)))
            });
        }
    }
    group.finish();
}

fn benchmark_stages(c: &mut Criterion) {
    let Some(frame) = render(320, 240, 1, Some(CODE)) else {
        return;
    };
    let extractor = SignalExtractor::default();
    let decoder = Ean13Decoder::new();
    let signal: BinarySignal = extractor.extract(&frame);

    c.bench_function("extract_center_line", |b| {
        b.iter(|| extractor.extract(black_box(&frame)))
    });
    c.bench_function("decode_signal", |b| {
        b.iter(|| decoder.decode(black_box(&signal)))
    });
}

criterion_group!(benches, benchmark_backend, benchmark_stages);
criterion_main!(benches);
