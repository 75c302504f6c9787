use criterion::{Criterion, black_box, criterion_group, criterion_main};
use image::{GrayImage, Luma};
use rust_omr::RasterImage;
use rust_omr::utils::binarization::{adaptive_binarize, otsu_binarize, threshold_binarize};

fn gradient(width: u32, height: u32) -> RasterImage {
    RasterImage::new(GrayImage::from_fn(width, height, |x, y| {
        Luma([((x * 7 + y * 3) % 256) as u8])
    }))
}

fn bench_otsu_binarize_medium(c: &mut Criterion) {
    let raster = gradient(640, 480);
    c.bench_function("otsu_binarize_640x480", |b| {
        b.iter(|| otsu_binarize(black_box(&raster)))
    });
}

fn bench_otsu_binarize_page(c: &mut Criterion) {
    let raster = gradient(1241, 1755);
    c.bench_function("otsu_binarize_1241x1755", |b| {
        b.iter(|| otsu_binarize(black_box(&raster)))
    });
}

fn bench_adaptive_binarize_roi(c: &mut Criterion) {
    let raster = gradient(434, 438);
    c.bench_function("adaptive_binarize_434x438", |b| {
        b.iter(|| adaptive_binarize(black_box(&raster), black_box(51), black_box(10)))
    });
}

fn bench_threshold_binarize_page(c: &mut Criterion) {
    let raster = gradient(1241, 1755);
    c.bench_function("threshold_binarize_1241x1755", |b| {
        b.iter(|| threshold_binarize(black_box(&raster), black_box(100)))
    });
}

criterion_group!(
    benches,
    bench_otsu_binarize_medium,
    bench_otsu_binarize_page,
    bench_adaptive_binarize_roi,
    bench_threshold_binarize_page
);
criterion_main!(benches);
