use crate::models::{BitMatrix, RasterImage};
use crate::utils::integral::IntegralImage;
use image::{GrayImage, Luma};
use imageproc::contrast::otsu_level;

/// Convert a raster to a dark-pixel mask using Otsu's thresholding method
pub fn otsu_binarize(raster: &RasterImage) -> BitMatrix {
    threshold_binarize(raster, otsu_threshold(raster))
}

/// Otsu's optimal global threshold; pixels `< threshold` are the dark class.
///
/// A single-valued raster has no dark class and yields 1 (only 0 is dark).
pub fn otsu_threshold(raster: &RasterImage) -> u8 {
    // imageproc's level is the last intensity of the dark class
    otsu_level(raster.as_gray()).saturating_add(1)
}

/// Simple global threshold binarization (`pixel < threshold` is dark)
pub fn threshold_binarize(raster: &RasterImage, threshold: u8) -> BitMatrix {
    let width = raster.width() as usize;
    let gray = raster.as_raw();
    BitMatrix::from_fn(width, raster.height() as usize, |x, y| {
        gray[y * width + x] < threshold
    })
}

/// Local-mean binarization: a pixel is dark when it is more than `offset`
/// below the mean of the `block x block` window around it.
///
/// `imageproc::contrast::adaptive_threshold` has no offset, which the QR
/// attempts need to keep paper noise white.
///
/// Returns a black (0) on white (255) raster, the form barcode readers expect.
pub fn adaptive_binarize(raster: &RasterImage, block: u32, offset: i32) -> RasterImage {
    let (width, height) = raster.dimensions();
    let (w, h) = (width as usize, height as usize);
    let gray = raster.as_raw();
    let integral = IntegralImage::of_intensity(gray, w, h);
    let half = (block.max(3) / 2) as usize;

    let out = GrayImage::from_fn(width, height, |x, y| {
        let (x, y) = (x as usize, y as usize);
        let x0 = x.saturating_sub(half);
        let y0 = y.saturating_sub(half);
        let x1 = (x + half + 1).min(w);
        let y1 = (y + half + 1).min(h);
        let area = ((x1 - x0) * (y1 - y0)) as i64;
        let mean = integral.sum(x0, y0, x1, y1) as i64 / area;
        let pixel = gray[y * w + x] as i64;
        if pixel < mean - offset as i64 {
            Luma([0])
        } else {
            Luma([255])
        }
    });
    RasterImage::new(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold_binarize() {
        let raster = RasterImage::from_raw(2, 2, vec![100, 150, 200, 50]).unwrap();
        let binary = threshold_binarize(&raster, 128);

        assert!(binary.get(0, 0)); // 100 < 128
        assert!(!binary.get(1, 0)); // 150 >= 128
        assert!(!binary.get(0, 1)); // 200 >= 128
        assert!(binary.get(1, 1)); // 50 < 128
    }

    #[test]
    fn test_otsu_binarize() {
        let mut gray = vec![50u8; 50];
        gray.extend(vec![200u8; 50]);
        let raster = RasterImage::from_raw(10, 10, gray).unwrap();

        let threshold = otsu_threshold(&raster);
        assert!(threshold > 50 && threshold <= 200);

        let binary = otsu_binarize(&raster);
        assert!(binary.get(0, 0)); // Dark
        assert!(!binary.get(0, 7)); // Light
    }

    #[test]
    fn test_otsu_splits_bimodal_page() {
        // Paper around 230, ink around 40, a little noise on each
        let raster = RasterImage::new(GrayImage::from_fn(40, 40, |x, y| {
            let noise = ((x * 7 + y * 13) % 9) as u8;
            Luma([if x < 10 { 36 + noise } else { 226 + noise }])
        }));
        let threshold = otsu_threshold(&raster);
        assert!(threshold > 44 && threshold <= 226, "{threshold}");
        assert_eq!(otsu_binarize(&raster).count_set(), 400);
    }

    #[test]
    fn test_otsu_uniform_image_marks_nothing_dark() {
        let raster = RasterImage::from_raw(4, 4, vec![128u8; 16]).unwrap();
        assert_eq!(otsu_binarize(&raster).count_set(), 0);
    }

    #[test]
    fn test_adaptive_binarize_follows_local_mean() {
        // Left half lit, right half in shadow; a dark dot in each
        let mut raster = GrayImage::from_fn(20, 10, |x, _| Luma([if x < 10 { 220 } else { 90 }]));
        raster.put_pixel(4, 5, Luma([150]));
        raster.put_pixel(15, 5, Luma([30]));
        let out = adaptive_binarize(&RasterImage::new(raster), 7, 2);

        assert_eq!(out.get(4, 5), 0);
        assert_eq!(out.get(15, 5), 0);
        assert_eq!(out.get(2, 2), 255);
        assert_eq!(out.get(17, 2), 255);
    }
}
