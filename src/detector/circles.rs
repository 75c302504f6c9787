//! Circle detection by gradient voting.
//!
//! Every pixel with a strong gradient votes towards its darker side at every
//! radius in range. The outer edge of a bubble outline and of a filled bubble
//! both face the centre, so smoothed accumulator peaks are circle centres;
//! the inner edge of an outline votes outwards and spreads thin. Peaks are
//! accepted greedily by score with a minimum centre distance, then dropped
//! when their edge ring is weak compared with the best circle.

use crate::models::{Point, Rect};
use image::{GrayImage, ImageBuffer, Luma};
use imageproc::gradients::{horizontal_scharr, vertical_scharr};
use log::debug;

/// Detection parameters in pixels of the raster being searched
#[derive(Debug, Clone, PartialEq)]
pub struct CircleParams {
    /// Smallest radius voted for
    pub min_radius: f32,
    /// Largest radius voted for
    pub max_radius: f32,
    /// Minimum distance between accepted centres
    pub min_distance: f32,
    /// Gradient magnitude threshold, fraction of the strongest gradient
    pub gradient_fraction: f32,
    /// Peak threshold, fraction of the strongest smoothed peak
    pub min_vote_fraction: f32,
    /// Edge ring response threshold, fraction of the strongest accepted ring
    pub min_ring_fraction: f32,
    /// Accumulator smoothing sigma
    pub sigma: f32,
}

/// A detected circle
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Circle {
    /// Centre in raster coordinates
    pub center: Point,
    /// Radius with the strongest edge response
    pub radius: f32,
    /// Smoothed accumulator value at the centre
    pub score: f32,
}

/// Deposit a vote spread bilinearly over the four neighbouring cells
#[inline]
fn bilinear_add(accum: &mut [f32], w: usize, x: f32, y: f32, weight: f32) {
    let x0 = x.floor() as usize;
    let y0 = y.floor() as usize;
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;
    let base = y0 * w + x0;
    accum[base] += weight * (1.0 - fx) * (1.0 - fy);
    accum[base + 1] += weight * fx * (1.0 - fy);
    accum[base + w] += weight * (1.0 - fx) * fy;
    accum[base + w + 1] += weight * fx * fy;
}

/// Gradient magnitudes and unit directions
struct Gradients {
    width: usize,
    mag: Vec<f32>,
    dir: Vec<(f32, f32)>,
    max: f32,
}

impl Gradients {
    fn of(gray: &GrayImage) -> Self {
        let gx = horizontal_scharr(gray);
        let gy = vertical_scharr(gray);
        let n = gray.width() as usize * gray.height() as usize;
        let mut mag = Vec::with_capacity(n);
        let mut dir = Vec::with_capacity(n);
        let mut max = 0.0f32;
        for (a, b) in gx.as_raw().iter().zip(gy.as_raw()) {
            let (x, y) = (*a as f32, *b as f32);
            let m = x.hypot(y);
            max = max.max(m);
            mag.push(m);
            dir.push(if m > 0.0 { (x / m, y / m) } else { (0.0, 0.0) });
        }
        Self {
            width: gray.width() as usize,
            mag,
            dir,
            max,
        }
    }

    fn magnitude_at(&self, x: f32, y: f32) -> f32 {
        let (xi, yi) = (x.round(), y.round());
        if xi < 0.0 || yi < 0.0 || xi as usize >= self.width {
            return 0.0;
        }
        self.mag
            .get(yi as usize * self.width + xi as usize)
            .copied()
            .unwrap_or(0.0)
    }
}

/// Detect circles whose centres fall inside `region`.
///
/// Results are sorted by score, strongest first.
pub fn detect_circles(gray: &GrayImage, region: Rect, params: &CircleParams) -> Vec<Circle> {
    let region = region.clamp_to(gray.width(), gray.height());
    // Vote sources may sit up to max_radius outside the region
    let pad = params.max_radius.ceil() + 2.0;
    let window = region.expand(pad).clamp_to(gray.width(), gray.height());
    let (x0, y0) = (window.min.x as u32, window.min.y as u32);
    let (w, h) = (
        (window.max.x as u32).saturating_sub(x0),
        (window.max.y as u32).saturating_sub(y0),
    );
    if w < 4 || h < 4 {
        return Vec::new();
    }
    let crop = image::imageops::crop_imm(gray, x0, y0, w, h).to_image();
    let offset = Point::new(x0 as f32, y0 as f32);

    let grad = Gradients::of(&crop);
    if grad.max < 1e-6 {
        return Vec::new();
    }
    let threshold = params.gradient_fraction * grad.max;

    let (wu, hu) = (w as usize, h as usize);
    let mut accum = vec![0.0f32; wu * hu];
    let (xmax, ymax) = ((w - 1) as f32, (h - 1) as f32);
    for y in 0..hu {
        for x in 0..wu {
            let idx = y * wu + x;
            let mag = grad.mag[idx];
            if mag < threshold {
                continue;
            }
            let (dx, dy) = grad.dir[idx];
            let sign = dark_side(&crop, x, y, dx, dy);
            let mut r = params.min_radius;
            while r <= params.max_radius {
                let vx = x as f32 + sign * dx * r;
                let vy = y as f32 + sign * dy * r;
                if vx >= 0.0 && vx < xmax && vy >= 0.0 && vy < ymax {
                    bilinear_add(&mut accum, wu, vx, vy, mag);
                }
                r += 1.0;
            }
        }
    }

    let Some(accum) = ImageBuffer::<Luma<f32>, Vec<f32>>::from_raw(w, h, accum) else {
        return Vec::new();
    };
    let smoothed = imageproc::filter::gaussian_blur_f32(&accum, params.sigma.max(0.5));
    let votes = smoothed.as_raw();
    let peak = votes.iter().copied().fold(0.0f32, f32::max);
    if peak < 1e-6 {
        return Vec::new();
    }
    let floor = params.min_vote_fraction * peak;

    // 3x3 local maxima above the floor, centre inside the region
    let mut peaks: Vec<(usize, usize, f32)> = Vec::new();
    for y in 1..hu - 1 {
        for x in 1..wu - 1 {
            let v = votes[y * wu + x];
            if v < floor {
                continue;
            }
            let is_max = (-1i32..=1).all(|oy| {
                (-1i32..=1).all(|ox| {
                    let n = ((y as i32 + oy) as usize) * wu + (x as i32 + ox) as usize;
                    n == y * wu + x || votes[n] < v || (votes[n] == v && n > y * wu + x)
                })
            });
            let centre = Point::new(x as f32, y as f32).translate(offset.x, offset.y);
            if is_max && region.contains(&centre) {
                peaks.push((x, y, v));
            }
        }
    }
    peaks.sort_by(|a, b| b.2.total_cmp(&a.2));

    let min_dist_sq = params.min_distance * params.min_distance;
    let mut accepted: Vec<(Circle, f32)> = Vec::new();
    for (x, y, score) in peaks {
        let local = Point::new(x as f32, y as f32);
        if accepted
            .iter()
            .any(|(c, _)| c.center.distance_squared(&local) < min_dist_sq)
        {
            continue;
        }
        let (radius, response) = strongest_radius(&grad, local, params);
        accepted.push((
            Circle {
                center: local,
                radius,
                score,
            },
            response,
        ));
    }

    let best_ring = accepted.iter().map(|(_, r)| *r).fold(0.0f32, f32::max);
    let ring_floor = params.min_ring_fraction * best_ring;
    let candidates = accepted.len();
    let circles: Vec<Circle> = accepted
        .into_iter()
        .filter(|(_, response)| *response >= ring_floor)
        .map(|(mut c, _)| {
            c.center = c.center.translate(offset.x, offset.y);
            c
        })
        .collect();

    debug!(
        "circle detection: {} of {candidates} peaks accepted in {:.0}x{:.0} region (r {:.1}..{:.1})",
        circles.len(),
        region.width(),
        region.height(),
        params.min_radius,
        params.max_radius
    );
    circles
}

/// +1 when the darker neighbour of `(x, y)` lies along `(dx, dy)`, else -1
fn dark_side(gray: &GrayImage, x: usize, y: usize, dx: f32, dy: f32) -> f32 {
    let at = |sign: f32| {
        let sx = (x as f32 + sign * dx).round().clamp(0.0, (gray.width() - 1) as f32);
        let sy = (y as f32 + sign * dy).round().clamp(0.0, (gray.height() - 1) as f32);
        gray.get_pixel(sx as u32, sy as u32)[0]
    };
    if at(1.0) < at(-1.0) { 1.0 } else { -1.0 }
}

/// Radius whose ring of samples around `center` has the largest summed
/// gradient, with that sum
fn strongest_radius(grad: &Gradients, center: Point, params: &CircleParams) -> (f32, f32) {
    const RAYS: usize = 16;
    let mut best = (params.min_radius, f32::MIN);
    let mut r = params.min_radius;
    while r <= params.max_radius {
        let response: f32 = (0..RAYS)
            .map(|i| {
                let (s, c) = (i as f32 * std::f32::consts::TAU / RAYS as f32).sin_cos();
                grad.magnitude_at(center.x + c * r, center.y + s * r)
            })
            .sum();
        if response > best.1 {
            best = (r, response);
        }
        r += 1.0;
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> CircleParams {
        CircleParams {
            min_radius: 7.0,
            max_radius: 14.0,
            min_distance: 22.0,
            gradient_fraction: 0.15,
            min_vote_fraction: 0.25,
            min_ring_fraction: 0.3,
            sigma: 1.0,
        }
    }

    /// Bright page with ring outlines and optionally filled discs
    fn bubbles(w: u32, h: u32, centres: &[(f32, f32, bool)], radius: f32) -> GrayImage {
        GrayImage::from_fn(w, h, |x, y| {
            let dark = centres.iter().any(|&(cx, cy, filled)| {
                let d = (x as f32 - cx).hypot(y as f32 - cy);
                if filled { d <= radius } else { (d - radius).abs() <= 1.0 }
            });
            Luma([if dark { 40 } else { 235 }])
        })
    }

    #[test]
    fn test_finds_rings_and_filled_discs() {
        let centres: Vec<(f32, f32, bool)> = (0..5)
            .flat_map(|row| (0..5).map(move |col| (30.0 + col as f32 * 30.0, 30.0 + row as f32 * 30.0, (row + col) % 3 == 0)))
            .collect();
        let img = bubbles(180, 180, &centres, 10.0);
        let region = Rect::from_corners(Point::new(0.0, 0.0), Point::new(180.0, 180.0));
        let circles = detect_circles(&img, region, &params());
        assert_eq!(circles.len(), centres.len());
        for &(cx, cy, _) in &centres {
            let nearest = circles
                .iter()
                .map(|c| c.center.distance(&Point::new(cx, cy)))
                .fold(f32::MAX, f32::min);
            assert!(nearest < 2.0, "no circle near ({cx}, {cy})");
        }
        assert!(circles.iter().all(|c| (c.radius - 10.0).abs() <= 2.0));
    }

    #[test]
    fn test_region_limits_centres() {
        let centres = [(40.0, 40.0, false), (120.0, 40.0, false)];
        let img = bubbles(160, 80, &centres, 10.0);
        let region = Rect::from_corners(Point::new(0.0, 0.0), Point::new(80.0, 80.0));
        let circles = detect_circles(&img, region, &params());
        assert_eq!(circles.len(), 1);
        assert!(circles[0].center.distance(&Point::new(40.0, 40.0)) < 2.0);
    }

    #[test]
    fn test_flat_image_has_no_circles() {
        let img = GrayImage::from_pixel(64, 64, Luma([200]));
        let region = Rect::from_corners(Point::new(0.0, 0.0), Point::new(64.0, 64.0));
        assert!(detect_circles(&img, region, &params()).is_empty());
    }
}
