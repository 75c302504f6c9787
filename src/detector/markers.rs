//! Fiducial marker extraction.
//!
//! Markers are solid squares near the four corners of the answer grid. The
//! raster is binarized, cleaned with a 3x3 close and open, split into
//! connected components, and every component passing the size/shape filter
//! is assigned to a quadrant. The largest candidate of each quadrant wins.

use crate::config::{CalibrationConfig, MarkerThreshold, TemplateConfig};
use crate::detector::components::{Component, find_components};
use crate::models::{BitMatrix, Point, RasterImage};
use crate::utils::binarization::{otsu_binarize, threshold_binarize};
use imageproc::distance_transform::Norm;
use log::debug;

/// Quadrant order used throughout: top-left, top-right, bottom-left, bottom-right
pub const QUADRANT_NAMES: [&str; 4] = ["top-left", "top-right", "bottom-left", "bottom-right"];

/// Result of a marker search
#[derive(Debug, Clone, Default)]
pub struct MarkerSearch {
    /// Every component that passed the size and shape filter
    pub candidates: Vec<Component>,
    /// Selected marker per quadrant (TL, TR, BL, BR)
    pub quadrants: [Option<Component>; 4],
}

impl MarkerSearch {
    /// Number of quadrants holding a marker
    pub fn found(&self) -> usize {
        self.quadrants.iter().filter(|q| q.is_some()).count()
    }

    /// Centroids in TL, TR, BL, BR order when all four quadrants are filled
    pub fn corners(&self) -> Option<[Point; 4]> {
        let [tl, tr, bl, br] = &self.quadrants;
        Some([
            tl.as_ref()?.centroid,
            tr.as_ref()?.centroid,
            bl.as_ref()?.centroid,
            br.as_ref()?.centroid,
        ])
    }
}

/// Binarize, clean and label dark regions of `raster`
pub fn dark_regions(raster: &RasterImage, threshold: MarkerThreshold) -> Vec<Component> {
    let binary = match threshold {
        MarkerThreshold::Otsu => otsu_binarize(raster),
        MarkerThreshold::Fixed(t) => threshold_binarize(raster, t),
    };
    let mask = binary.to_luma();
    let closed = imageproc::morphology::close(&mask, Norm::LInf, 1);
    let cleaned = imageproc::morphology::open(&closed, Norm::LInf, 1);
    find_components(&BitMatrix::from_luma(&cleaned))
}

/// Locate the four fiducial markers
pub fn find_markers(
    raster: &RasterImage,
    template: &TemplateConfig,
    config: &CalibrationConfig,
) -> MarkerSearch {
    let (width, height) = raster.dimensions();
    let scale = template.resolution_scale(width, height);
    let area_scale = scale * scale;
    let min_area = config.min_marker_area * area_scale;
    let max_area = config.max_marker_area * area_scale;

    let candidates: Vec<Component> = dark_regions(raster, config.threshold)
        .into_iter()
        .filter(|c| {
            let area = c.area as f32;
            area >= min_area
                && area <= max_area
                && (config.min_aspect..=config.max_aspect).contains(&c.aspect())
                && c.fill_ratio() >= config.min_fill
        })
        .collect();

    let split_x = width as f32 * config.split_x;
    let split_y = height as f32 * config.split_y;
    let mut quadrants: [Option<Component>; 4] = [None; 4];
    for c in &candidates {
        let left = c.centroid.x < split_x;
        let top = c.centroid.y < split_y;
        let slot = match (top, left) {
            (true, true) => 0,
            (true, false) => 1,
            (false, true) => 2,
            (false, false) => 3,
        };
        match &quadrants[slot] {
            Some(existing) if existing.area >= c.area => {}
            _ => quadrants[slot] = Some(*c),
        }
    }

    debug!(
        "marker search: {} candidates (area {:.0}..{:.0}), {} quadrants filled",
        candidates.len(),
        min_area,
        max_area,
        quadrants.iter().filter(|q| q.is_some()).count()
    );
    for (name, q) in QUADRANT_NAMES.iter().zip(quadrants.iter()) {
        if let Some(c) = q {
            debug!(
                "  {name}: centroid=({:.1}, {:.1}) area={}",
                c.centroid.x, c.centroid.y, c.area
            );
        }
    }

    MarkerSearch {
        candidates,
        quadrants,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};

    fn page_with_squares(width: u32, height: u32, squares: &[(u32, u32, u32)]) -> RasterImage {
        let mut gray = GrayImage::from_pixel(width, height, Luma([235]));
        for &(cx, cy, side) in squares {
            for y in cy - side / 2..cy + side / 2 {
                for x in cx - side / 2..cx + side / 2 {
                    gray.put_pixel(x, y, Luma([20]));
                }
            }
        }
        RasterImage::new(gray)
    }

    #[test]
    fn test_finds_four_markers_at_half_resolution() {
        // 150 DPI page, markers 30 px wide
        let raster = page_with_squares(
            1240,
            1754,
            &[(42, 1153, 30), (1198, 1153, 30), (42, 1698, 30), (1198, 1698, 30)],
        );
        let search = find_markers(&raster, &TemplateConfig::default(), &CalibrationConfig::default());
        assert_eq!(search.found(), 4);
        let corners = search.corners().unwrap();
        assert!(corners[0].distance(&Point::new(41.5, 1152.5)) < 1.0);
        assert!(corners[3].distance(&Point::new(1197.5, 1697.5)) < 1.0);
    }

    #[test]
    fn test_larger_candidate_wins_quadrant() {
        let raster = page_with_squares(
            1240,
            1754,
            &[
                (42, 1153, 30),
                (300, 1000, 40),
                (1198, 1153, 30),
                (42, 1698, 30),
                (1198, 1698, 30),
            ],
        );
        let search = find_markers(&raster, &TemplateConfig::default(), &CalibrationConfig::default());
        assert_eq!(search.candidates.len(), 5);
        let tl = search.quadrants[0].unwrap();
        assert!(tl.centroid.distance(&Point::new(299.5, 999.5)) < 1.0);
    }

    #[test]
    fn test_missing_quadrant_and_filters() {
        // Too small, too large, elongated; plus only three real markers
        let mut raster = page_with_squares(
            1240,
            1754,
            &[(42, 1153, 30), (1198, 1153, 30), (42, 1698, 30), (600, 300, 8), (600, 600, 120)],
        );
        let mut gray = raster.clone().into_gray();
        for y in 1690..1700 {
            for x in 1100..1160 {
                gray.put_pixel(x, y, Luma([20]));
            }
        }
        raster = RasterImage::new(gray);
        let search = find_markers(&raster, &TemplateConfig::default(), &CalibrationConfig::default());
        assert_eq!(search.found(), 3);
        assert!(search.quadrants[3].is_none());
        assert!(search.corners().is_none());
    }
}
