//! Calibration: map template coordinates onto the raster.
//!
//! With all four markers present the page is rectified by the homography from
//! the marker centroids to the canonical marker rectangle, so template units
//! become pixels one-to-one. Without markers the page is only deskewed from
//! its line structure and template units are scaled by the page size.

use crate::config::{CalibrationConfig, DeskewConfig, MarkerFallback, TemplateConfig};
use crate::detector::lines::{detect_segments, estimate_skew};
use crate::detector::markers::find_markers;
use crate::error::RecognitionError;
use crate::models::{Point, RasterImage, Rect};
use crate::utils::geometry::{PerspectiveTransform, rotate_expanded, warp_perspective};
use log::{debug, info, warn};

/// Affine map from canonical template units (relative to the top-left
/// marker) to pixels of the calibrated raster
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridFrame {
    /// Pixel position of the canonical origin
    pub origin: Point,
    /// Pixels per canonical unit, horizontally
    pub scale_x: f32,
    /// Pixels per canonical unit, vertically
    pub scale_y: f32,
}

impl GridFrame {
    /// Unit scale anchored at the raster origin, used for rectified rasters
    pub fn unit() -> Self {
        Self {
            origin: Point::new(0.0, 0.0),
            scale_x: 1.0,
            scale_y: 1.0,
        }
    }

    /// Canonical point to pixel coordinates
    pub fn to_pixel(&self, canonical: Point) -> Point {
        Point::new(
            self.origin.x + canonical.x * self.scale_x,
            self.origin.y + canonical.y * self.scale_y,
        )
    }

    /// Mean isotropic scale for lengths that have no direction
    pub fn scale(&self) -> f32 {
        (self.scale_x + self.scale_y) / 2.0
    }

    /// The marker-bounded rectangle in pixels
    pub fn marker_rect(&self, template: &TemplateConfig) -> Rect {
        let (w, h) = template.rectified_size();
        Rect::from_corners(
            self.to_pixel(Point::new(0.0, 0.0)),
            self.to_pixel(Point::new(w as f32, h as f32)),
        )
    }
}

/// How the raster was brought into template alignment
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Alignment {
    /// Rectified through the four marker centroids (TL, TR, BL, BR)
    Markers([Point; 4]),
    /// Markers missing; rotated by this many degrees of measured skew
    Deskewed(f64),
    /// Markers missing and no usable rotation was measured
    Unaligned,
}

/// Output of [`calibrate`]
#[derive(Debug, Clone)]
pub struct CalibrationResult {
    /// Marker centroid per quadrant (TL, TR, BL, BR) in input coordinates
    pub markers: [Option<Point>; 4],
    /// Rectified raster, or the (possibly rotated) input when unaligned
    pub raster: RasterImage,
    /// Template-to-pixel mapping for `raster`
    pub frame: GridFrame,
    /// Alignment method
    pub alignment: Alignment,
    /// Dimensions of the input before calibration
    pub input_size: (u32, u32),
}

impl CalibrationResult {
    /// True when the fiducial markers drove the rectification
    pub fn aligned_by_markers(&self) -> bool {
        matches!(self.alignment, Alignment::Markers(_))
    }

    /// Number of quadrants in which a marker was found
    pub fn markers_found(&self) -> usize {
        self.markers.iter().filter(|m| m.is_some()).count()
    }

    /// Width/height ratio of the content the grid is located in
    pub fn observed_aspect(&self) -> f32 {
        match self.alignment {
            Alignment::Markers(_) => self.raster.width() as f32 / self.raster.height() as f32,
            _ => self.input_size.0 as f32 / self.input_size.1 as f32,
        }
    }

    /// Width/height ratio the template predicts for [`Self::observed_aspect`]
    pub fn expected_aspect(&self, template: &TemplateConfig) -> f32 {
        match self.alignment {
            Alignment::Markers(_) => {
                let (w, h) = template.rectified_size();
                w as f32 / h as f32
            }
            _ => template.reference_width / template.reference_height,
        }
    }
}

/// Result of the line-based rotation fallback
#[derive(Debug, Clone)]
pub struct Deskewed {
    /// Rotated raster, or the input unchanged
    pub raster: RasterImage,
    /// Applied rotation, `None` when skipped
    pub angle: Option<f64>,
    /// Offset of the input frame inside the output canvas
    pub padding: Point,
}

/// Correct page rotation from its line structure. Never corrects perspective
/// or scale.
pub fn deskew(raster: &RasterImage, template: &TemplateConfig, config: &DeskewConfig) -> Deskewed {
    let scale = template.resolution_scale(raster.width(), raster.height());
    let segments = detect_segments(raster, config, scale);
    match estimate_skew(&segments, config) {
        Some(angle) => {
            info!("deskew: rotating by {angle:.2} deg from {} segments", segments.len());
            let rotated = rotate_expanded(raster, angle);
            Deskewed {
                raster: rotated.raster,
                angle: Some(angle),
                padding: rotated.padding,
            }
        }
        None => Deskewed {
            raster: raster.clone(),
            angle: None,
            padding: Point::new(0.0, 0.0),
        },
    }
}

/// Locate the markers and bring `raster` into template alignment
pub fn calibrate(
    raster: &RasterImage,
    template: &TemplateConfig,
    config: &CalibrationConfig,
) -> Result<CalibrationResult, RecognitionError> {
    let input_size = raster.dimensions();
    let search = find_markers(raster, template, config);
    let markers = search.quadrants.map(|q| q.map(|c| c.centroid));

    if let Some(corners) = search.corners() {
        let (rw, rh) = template.rectified_size();
        let rectified = PerspectiveTransform::from_points(&corners, &template.rectified_corners())
            .and_then(|t| warp_perspective(raster, &t, rw, rh));
        match rectified {
            Some(rectified) => {
                debug!("calibration: rectified to {rw}x{rh}");
                return Ok(CalibrationResult {
                    markers,
                    raster: rectified,
                    frame: GridFrame::unit(),
                    alignment: Alignment::Markers(corners),
                    input_size,
                });
            }
            None => warn!("calibration: marker quadrilateral is degenerate"),
        }
    }

    let found = search.found();
    if config.fallback == MarkerFallback::Fail {
        return Err(RecognitionError::MarkersNotFound { found });
    }
    warn!("calibration: {found} of 4 markers found, falling back to deskew");

    let deskewed = deskew(raster, template, &config.deskew);
    let (w, h) = input_size;
    let scale_x = w as f32 / template.reference_width;
    let scale_y = h as f32 / template.reference_height;
    let tl = template.markers[0];
    let frame = GridFrame {
        origin: Point::new(
            tl.x * scale_x + deskewed.padding.x,
            tl.y * scale_y + deskewed.padding.y,
        ),
        scale_x,
        scale_y,
    };
    Ok(CalibrationResult {
        markers,
        raster: deskewed.raster,
        frame,
        alignment: deskewed.angle.map_or(Alignment::Unaligned, Alignment::Deskewed),
        input_size,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use image::{GrayImage, Luma};

    fn blank_page() -> RasterImage {
        RasterImage::new(GrayImage::from_pixel(620, 877, Luma([240])))
    }

    #[test]
    fn test_frame_maps_canonical_units() {
        let frame = GridFrame {
            origin: Point::new(10.0, 20.0),
            scale_x: 0.5,
            scale_y: 0.25,
        };
        assert_eq!(frame.to_pixel(Point::new(100.0, 100.0)), Point::new(60.0, 45.0));
        assert!((frame.scale() - 0.375).abs() < 1e-6);
        let rect = GridFrame::unit().marker_rect(&TemplateConfig::default());
        assert_eq!(rect.max, Point::new(2313.0, 1091.0));
    }

    #[test]
    fn test_missing_markers_fail_when_fallback_disabled() {
        let config = CalibrationConfig {
            fallback: MarkerFallback::Fail,
            ..CalibrationConfig::default()
        };
        let err = calibrate(&blank_page(), &TemplateConfig::default(), &config).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MarkersNotFound);
    }

    #[test]
    fn test_missing_markers_fall_back_to_scaled_frame() {
        let template = TemplateConfig::default();
        let result = calibrate(&blank_page(), &template, &CalibrationConfig::default()).unwrap();
        assert!(!result.aligned_by_markers());
        assert_eq!(result.alignment, Alignment::Unaligned);
        assert_eq!(result.markers_found(), 0);
        assert_eq!(result.raster.dimensions(), (620, 877));
        let origin = result.frame.origin;
        assert!((origin.x - 83.0 * 620.0 / 2481.0).abs() < 1e-3);
        assert!((origin.y - 2306.0 * 877.0 / 3509.0).abs() < 1e-3);
        let aspect_gap = (result.observed_aspect() - result.expected_aspect(&template)).abs();
        assert!(aspect_gap < 0.01);
    }
}
