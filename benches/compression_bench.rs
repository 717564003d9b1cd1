use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use img_migrate::compressor::{compress, downscale_to_fit, Preset};
use img_migrate::fetch::reencode;
use std::io::Cursor;

fn test_image(width: u32, height: u32) -> DynamicImage {
    let img = RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, ((x ^ y) % 256) as u8])
    });
    DynamicImage::ImageRgb8(img)
}

fn encoded(width: u32, height: u32, format: ImageFormat) -> Vec<u8> {
    let mut buf = Cursor::new(Vec::new());
    test_image(width, height).write_to(&mut buf, format).unwrap();
    buf.into_inner()
}

fn bench_preset_selection(c: &mut Criterion) {
    c.bench_function("preset_selection", |b| {
        b.iter(|| Preset::for_input_size(black_box(2 * 1024 * 1024)).target())
    });
}

fn bench_downscale(c: &mut Criterion) {
    let mut group = c.benchmark_group("downscale");

    for size in [Small, Medium, Large].iter() {
        let (width, height) = match size {
            Small => (800, 600),
            Medium => (1920, 1080),
            Large => (3840, 2160),
        };
        let img = test_image(width, height);

        group.bench_with_input(
            BenchmarkId::new("fit_1920", format!("{}x{}", width, height)),
            &img,
            |b, img| {
                b.iter(|| {
                    let mut img = img.clone();
                    downscale_to_fit(black_box(&mut img), black_box(1920));
                })
            },
        );
    }

    group.finish();
}

fn bench_compress(c: &mut Criterion) {
    let mut group = c.benchmark_group("compress");
    group.sample_size(10);

    for (name, format) in [("bmp", ImageFormat::Bmp), ("png", ImageFormat::Png)] {
        let bytes = encoded(1280, 960, format);
        let target = Preset::for_input_size(bytes.len() as u64).target();

        group.bench_with_input(BenchmarkId::new("auto_preset", name), &bytes, |b, bytes| {
            b.iter(|| compress(black_box(bytes), black_box(&target)))
        });
    }

    group.finish();
}

fn bench_reencode(c: &mut Criterion) {
    let bytes = encoded(1280, 960, ImageFormat::Png);

    c.bench_function("reencode_fallback", |b| {
        b.iter(|| reencode(black_box(&bytes)))
    });
}

enum ImageSize {
    Small,
    Medium,
    Large,
}

use ImageSize::*;

criterion_group!(
    benches,
    bench_preset_selection,
    bench_downscale,
    bench_compress,
    bench_reencode
);
criterion_main!(benches);
