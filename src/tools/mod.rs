use crate::config::TemplateConfig;
use crate::models::{Classification, OptionLabel, RasterImage};
use crate::pipeline::SheetAnalysis;
use image::{GenericImageView, Rgb, RgbImage};
use imageproc::drawing::draw_hollow_circle_mut;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Synthetic sheet rendering for tests and benches
pub mod synth;

fn max_dim_from_env() -> Option<u32> {
    match env::var("OMR_MAX_DIM") {
        Ok(value) => match value.trim().parse::<u32>() {
            Ok(0) => None,
            Ok(v) => Some(v),
            Err(_) => None,
        },
        Err(_) => None,
    }
}

/// Load an image as a grayscale raster, downscaled to `OMR_MAX_DIM` when set.
pub fn load_gray<P: AsRef<Path>>(path: P) -> Result<RasterImage, image::ImageError> {
    let img = image::open(path)?;
    let img = match max_dim_from_env() {
        Some(max_dim) if img.dimensions().0.max(img.dimensions().1) > max_dim => {
            img.resize(max_dim, max_dim, image::imageops::FilterType::Triangle)
        }
        _ => img,
    };
    Ok(RasterImage::from_dynamic(&img))
}

/// Summary statistics for grayscale data.
#[derive(Debug, Clone, Copy)]
pub struct GrayStats {
    /// Minimum grayscale value.
    pub min: u8,
    /// Maximum grayscale value.
    pub max: u8,
    /// Average grayscale value.
    pub avg: u8,
}

/// Compute min/max/avg for a raster.
pub fn grayscale_stats(raster: &RasterImage) -> GrayStats {
    let gray = raster.as_raw();
    let mut min = u8::MAX;
    let mut max = u8::MIN;
    let mut sum: u64 = 0;
    for &v in gray {
        min = min.min(v);
        max = max.max(v);
        sum += v as u64;
    }
    let avg = if gray.is_empty() {
        0
    } else {
        (sum / gray.len() as u64) as u8
    };
    GrayStats { min, max, avg }
}

/// Draw the located grid over the calibrated raster: green for the chosen
/// option, yellow for every option of a double-marked question, red otherwise.
pub fn render_overlay(analysis: &SheetAnalysis, template: &TemplateConfig) -> RgbImage {
    let base = analysis.calibration.raster.as_gray();
    let mut canvas = RgbImage::from_fn(base.width(), base.height(), |x, y| {
        let v = base.get_pixel(x, y)[0];
        Rgb([v, v, v])
    });
    let radius = (template.bubble_radius * analysis.calibration.frame.scale()).round().max(2.0) as i32;

    for question in &analysis.grid.questions {
        let classification = analysis
            .result
            .question(question.question)
            .unwrap_or(Classification::Blank);
        for bubble in &question.bubbles {
            let color = match classification {
                Classification::Double => Rgb([230, 200, 0]),
                Classification::Answer(label) if label == bubble.sample.label => Rgb([0, 200, 0]),
                _ => Rgb([220, 0, 0]),
            };
            let center = (bubble.center.x.round() as i32, bubble.center.y.round() as i32);
            draw_hollow_circle_mut(&mut canvas, center, radius, color);
            draw_hollow_circle_mut(&mut canvas, center, radius + 1, color);
        }
    }
    canvas
}

/// One-line answer string, `.` for blank and `*` for double
pub fn answer_line(analysis: &SheetAnalysis) -> String {
    analysis
        .result
        .questions
        .iter()
        .map(|q| match q.classification {
            Classification::Answer(label) => label.as_str().chars().next().unwrap_or('?'),
            Classification::Blank => '.',
            Classification::Double => '*',
        })
        .collect()
}

/// Default dataset root from environment variables.
pub fn dataset_root_from_env() -> PathBuf {
    env::var("OMR_DATASET_ROOT")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("benches/images/sheets"))
}

/// Default bench limit from environment variables.
///
/// Returns `None` (full dataset) when `OMR_BENCH_LIMIT` is unset or set to `0`.
pub fn bench_limit_from_env() -> Option<usize> {
    match env::var("OMR_BENCH_LIMIT") {
        Ok(value) => value
            .parse::<usize>()
            .ok()
            .and_then(|v| if v == 0 { None } else { Some(v) }),
        Err(_) => None,
    }
}

/// Load the answer key stored next to a sheet image (`<stem>.key`).
///
/// The key is one character per question (`A`-`E`, `.` blank, `*` double),
/// whitespace ignored. Returns `None` if the file is missing or malformed.
pub fn load_answer_key<P: AsRef<Path>>(image_path: P) -> Option<Vec<Classification>> {
    let content = fs::read_to_string(image_path.as_ref().with_extension("key")).ok()?;
    content
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| match c {
            '.' => Some(Classification::Blank),
            '*' => Some(Classification::Double),
            c => {
                let index = (c.to_ascii_uppercase() as usize).checked_sub('A' as usize)?;
                OptionLabel::from_index(index).map(Classification::Answer)
            }
        })
        .collect()
}

/// Iterate dataset image paths with an optional limit.
pub fn dataset_iter<P: AsRef<Path>>(root: P, limit: Option<usize>) -> impl Iterator<Item = PathBuf> {
    let mut images = collect_images(root.as_ref());
    images.sort();
    if let Some(limit) = limit {
        images.truncate(limit);
    }
    images.into_iter()
}

fn collect_images(root: &Path) -> Vec<PathBuf> {
    let mut stack = vec![root.to_path_buf()];
    let mut images = Vec::new();

    while let Some(dir) = stack.pop() {
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(_) => continue,
        };

        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
                continue;
            }
            if let Some(ext) = path.extension() {
                let ext = ext.to_string_lossy().to_lowercase();
                if matches!(ext.as_str(), "png" | "jpg" | "jpeg" | "bmp" | "tif" | "tiff") {
                    images.push(path);
                }
            }
        }
    }

    images
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::{SystemTime, UNIX_EPOCH};

    static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

    fn temp_dir() -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock before UNIX epoch")
            .as_nanos();
        let sequence = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
        let dir = env::temp_dir().join(format!("rust_omr_tools_{nanos}_{sequence}"));
        fs::create_dir_all(&dir).expect("failed to create temp dir");
        dir
    }

    #[test]
    fn answer_key_parses_letters_blanks_and_doubles() {
        let dir = temp_dir();
        fs::write(dir.join("sheet.key"), "AbE.\n*C").unwrap();
        let key = load_answer_key(dir.join("sheet.png")).unwrap();
        assert_eq!(
            key,
            vec![
                Classification::Answer(OptionLabel::A),
                Classification::Answer(OptionLabel::B),
                Classification::Answer(OptionLabel::E),
                Classification::Blank,
                Classification::Double,
                Classification::Answer(OptionLabel::C),
            ]
        );
        fs::write(dir.join("bad.key"), "AZ").unwrap();
        assert!(load_answer_key(dir.join("bad.png")).is_none());
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn dataset_iter_walks_nested_dirs_sorted() {
        let dir = temp_dir();
        fs::create_dir_all(dir.join("b")).unwrap();
        fs::write(dir.join("b/2.jpg"), b"").unwrap();
        fs::write(dir.join("1.png"), b"").unwrap();
        fs::write(dir.join("notes.txt"), b"").unwrap();
        let found: Vec<PathBuf> = dataset_iter(&dir, None).collect();
        assert_eq!(found, vec![dir.join("1.png"), dir.join("b/2.jpg")]);
        assert_eq!(dataset_iter(&dir, Some(1)).count(), 1);
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn grayscale_stats_of_flat_raster() {
        let raster = RasterImage::new(image::GrayImage::from_pixel(4, 4, image::Luma([77])));
        let stats = grayscale_stats(&raster);
        assert_eq!((stats.min, stats.max, stats.avg), (77, 77, 77));
    }
}
