//! Line-segment extraction for rotation estimation.
//!
//! Canny edges feed a Hough accumulator; every peak line within the angle band
//! of the page axes is then walked across the edge map to recover the actual
//! segments (minimum length, bridging small gaps). Each segment's angle comes
//! from a principal-axis fit of its edge pixels, so the result is not limited
//! to the accumulator's one-degree resolution.

use crate::config::DeskewConfig;
use crate::models::{Point, RasterImage};
use crate::utils::stats::median;
use image::GrayImage;
use imageproc::hough::{LineDetectionOptions, PolarLine, detect_lines};
use log::debug;

/// Perpendicular search band around a Hough line, pixels
const BAND_PX: i32 = 2;
/// Non-maximum suppression radius in accumulator cells
const SUPPRESSION_RADIUS: u32 = 8;

/// A straight run of edge pixels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineSegment {
    /// First edge pixel along the line
    pub start: Point,
    /// Last edge pixel along the line
    pub end: Point,
    /// Deviation from the nearest page axis, degrees; positive descends to the right
    pub skew_deg: f64,
}

impl LineSegment {
    /// Euclidean length
    pub fn length(&self) -> f32 {
        self.start.distance(&self.end)
    }
}

/// Extract near-horizontal and near-vertical segments. Lengths and vote
/// thresholds in `config` are at reference resolution and multiplied by `scale`.
pub fn detect_segments(raster: &RasterImage, config: &DeskewConfig, scale: f32) -> Vec<LineSegment> {
    let edges = imageproc::edges::canny(raster.as_gray(), config.canny_low, config.canny_high);
    let options = LineDetectionOptions {
        vote_threshold: (config.vote_threshold * scale).round().max(1.0) as u32,
        suppression_radius: SUPPRESSION_RADIUS,
    };
    let band = config.angle_band;
    let lines: Vec<PolarLine> = detect_lines(&edges, options)
        .into_iter()
        .filter(|l| {
            let a = l.angle_in_degrees as f64;
            // Normal angle: 90 is a horizontal line, 0/180 a vertical one
            (a - 90.0).abs() <= band || a <= band || a >= 180.0 - band
        })
        .collect();

    let min_len = (config.min_line_length * scale).max(2.0);
    let max_gap = (config.max_line_gap * scale).max(1.0).round() as usize;

    let mut segments = Vec::new();
    for line in &lines {
        for seg in walk_line(&edges, line, max_gap) {
            if seg.length() >= min_len && seg.skew_deg.abs() <= band {
                segments.push(seg);
            }
        }
    }
    debug!(
        "line detection: {} hough peaks in band, {} segments >= {:.0}px",
        lines.len(),
        segments.len(),
        min_len
    );
    segments
}

/// Robust rotation estimate: median skew of the segments, clamped.
///
/// `None` when there are fewer than `min_lines` segments or the median is
/// below `min_angle`, meaning no rotation should be applied.
pub fn estimate_skew(segments: &[LineSegment], config: &DeskewConfig) -> Option<f64> {
    if segments.len() < config.min_lines {
        debug!(
            "deskew skipped: {} segments, need {}",
            segments.len(),
            config.min_lines
        );
        return None;
    }
    let angles: Vec<f64> = segments.iter().map(|s| s.skew_deg).collect();
    let angle = median(&angles)?;
    if angle.abs() < config.min_angle {
        debug!("deskew skipped: median angle {angle:.3} deg is negligible");
        return None;
    }
    Some(angle.clamp(-config.max_angle, config.max_angle))
}

/// Walk `line` across the edge map, splitting into runs at gaps above `max_gap`
fn walk_line(edges: &GrayImage, line: &PolarLine, max_gap: usize) -> Vec<LineSegment> {
    let (w, h) = edges.dimensions();
    let theta = (line.angle_in_degrees as f64).to_radians();
    let (sin, cos) = theta.sin_cos();
    let (nx, ny) = (cos, sin);
    let (dx, dy) = (-sin, cos);
    let (px, py) = (line.r as f64 * nx, line.r as f64 * ny);
    let reach = ((w as f64).hypot(h as f64)).ceil() as i64;

    let mut segments = Vec::new();
    let mut run: Vec<(f64, f64)> = Vec::new();
    let mut misses = 0usize;

    for t in -reach..=reach {
        let cx = px + t as f64 * dx;
        let cy = py + t as f64 * dy;
        let hit = (0..=BAND_PX).find_map(|k| {
            // Nearest offsets first: 0, +1, -1, +2, -2
            [k, -k].into_iter().find_map(|o| {
                let x = (cx + o as f64 * nx).round();
                let y = (cy + o as f64 * ny).round();
                if x < 0.0 || y < 0.0 || x >= w as f64 || y >= h as f64 {
                    return None;
                }
                (edges.get_pixel(x as u32, y as u32)[0] > 0).then_some((x, y))
            })
        });

        match hit {
            Some(p) => {
                run.push(p);
                misses = 0;
            }
            None if !run.is_empty() => {
                misses += 1;
                if misses > max_gap {
                    segments.extend(fit_segment(&run));
                    run.clear();
                    misses = 0;
                }
            }
            None => {}
        }
    }
    segments.extend(fit_segment(&run));
    segments
}

/// Principal-axis fit of a run of pixels
fn fit_segment(points: &[(f64, f64)]) -> Option<LineSegment> {
    if points.len() < 2 {
        return None;
    }
    let n = points.len() as f64;
    let mx = points.iter().map(|p| p.0).sum::<f64>() / n;
    let my = points.iter().map(|p| p.1).sum::<f64>() / n;
    let (mut sxx, mut syy, mut sxy) = (0.0, 0.0, 0.0);
    for &(x, y) in points {
        sxx += (x - mx) * (x - mx);
        syy += (y - my) * (y - my);
        sxy += (x - mx) * (y - my);
    }
    let axis = 0.5 * (2.0 * sxy).atan2(sxx - syy).to_degrees();
    let skew = if axis > 45.0 {
        axis - 90.0
    } else if axis < -45.0 {
        axis + 90.0
    } else {
        axis
    };

    let first = points[0];
    let last = points[points.len() - 1];
    Some(LineSegment {
        start: Point::new(first.0 as f32, first.1 as f32),
        end: Point::new(last.0 as f32, last.1 as f32),
        skew_deg: skew,
    })
}
