use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use rust_omr::config::TemplateConfig;
use rust_omr::tools::load_gray;
use rust_omr::tools::synth::{SynthSheet, rotate_page};
use rust_omr::{OptionLabel, Recognizer};
mod common;

fn bench_synthetic_sheets(c: &mut Criterion) {
    let template = TemplateConfig::default();
    let recognizer = Recognizer::default();
    let mut group = c.benchmark_group("recognize_synthetic");
    group.sample_size(10);

    let marked = SynthSheet::new(0.5)
        .mark_all(&template, OptionLabel::B)
        .render(&template);
    group.bench_function("markers_150dpi", |b| {
        b.iter(|| recognizer.recognize(black_box(&marked)))
    });

    let skewed = rotate_page(
        &SynthSheet::new(0.5)
            .without_markers()
            .with_rules()
            .mark_all(&template, OptionLabel::D)
            .render(&template),
        2.0,
    );
    group.bench_function("deskew_150dpi", |b| {
        b.iter(|| recognizer.recognize(black_box(&skewed)))
    });

    group.finish();
}

/// Benchmark end-to-end recognition on scanned sheets
fn bench_dataset_sheets(c: &mut Criterion) {
    let mut group = c.benchmark_group("recognize_dataset");
    group.sample_size(10);

    let (image_root, images) = common::collect_dataset_images();
    if !image_root.exists() || images.is_empty() {
        println!("Warning: No sheet images found at {:?}", image_root);
        return;
    }

    let recognizer = Recognizer::default();
    for path in images {
        let img_name = path
            .strip_prefix(&image_root)
            .unwrap_or(&path)
            .to_string_lossy()
            .into_owned();
        let raster = match load_gray(&path) {
            Ok(raster) => raster,
            Err(err) => {
                println!("Warning: Failed to load {}: {}", path.display(), err);
                continue;
            }
        };
        group.bench_with_input(BenchmarkId::new("recognize", &img_name), &raster, |b, raster| {
            b.iter(|| recognizer.recognize(black_box(raster)))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_synthetic_sheets, bench_dataset_sheets);
criterion_main!(benches);
