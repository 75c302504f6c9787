/// Geometry utilities: homographies, resampling warps and rotation
use crate::models::{Point, RasterImage};
use image::GrayImage;
use rayon::prelude::*;

/// Perspective transformation matrix (3x3, row-major, `h33 = 1`)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PerspectiveTransform {
    m: [[f64; 3]; 3],
}

impl PerspectiveTransform {
    /// Create transform from 4 source points to 4 destination points
    pub fn from_points(src: &[Point; 4], dst: &[Point; 4]) -> Option<Self> {
        // Direct linear transform with h33 fixed to 1
        let mut a = [[0.0f64; 8]; 8];
        let mut b = [0.0f64; 8];

        for i in 0..4 {
            let (sx, sy) = (src[i].x as f64, src[i].y as f64);
            let (dx, dy) = (dst[i].x as f64, dst[i].y as f64);

            let row = i * 2;
            a[row] = [sx, sy, 1.0, 0.0, 0.0, 0.0, -dx * sx, -dx * sy];
            b[row] = dx;
            a[row + 1] = [0.0, 0.0, 0.0, sx, sy, 1.0, -dy * sx, -dy * sy];
            b[row + 1] = dy;
        }

        solve_linear_system(&a, &b).map(|h| Self {
            m: [[h[0], h[1], h[2]], [h[3], h[4], h[5]], [h[6], h[7], 1.0]],
        })
    }

    /// Identity mapping
    pub fn identity() -> Self {
        Self {
            m: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
        }
    }

    /// Transform a point using this perspective matrix
    pub fn transform(&self, p: &Point) -> Point {
        let (x, y) = self.apply(p.x as f64, p.y as f64);
        Point::new(x as f32, y as f32)
    }

    #[inline]
    fn apply(&self, x: f64, y: f64) -> (f64, f64) {
        let m = &self.m;
        let w = m[2][0] * x + m[2][1] * y + m[2][2];
        if w.abs() < 1e-12 {
            return (f64::NAN, f64::NAN);
        }
        (
            (m[0][0] * x + m[0][1] * y + m[0][2]) / w,
            (m[1][0] * x + m[1][1] * y + m[1][2]) / w,
        )
    }

    /// Inverse mapping, `None` when the matrix is singular
    pub fn inverse(&self) -> Option<Self> {
        let m = &self.m;
        let c00 = m[1][1] * m[2][2] - m[1][2] * m[2][1];
        let c01 = m[1][2] * m[2][0] - m[1][0] * m[2][2];
        let c02 = m[1][0] * m[2][1] - m[1][1] * m[2][0];
        let det = m[0][0] * c00 + m[0][1] * c01 + m[0][2] * c02;
        if det.abs() < 1e-12 {
            return None;
        }
        let inv = [
            [
                c00,
                m[0][2] * m[2][1] - m[0][1] * m[2][2],
                m[0][1] * m[1][2] - m[0][2] * m[1][1],
            ],
            [
                c01,
                m[0][0] * m[2][2] - m[0][2] * m[2][0],
                m[0][2] * m[1][0] - m[0][0] * m[1][2],
            ],
            [
                c02,
                m[0][1] * m[2][0] - m[0][0] * m[2][1],
                m[0][0] * m[1][1] - m[0][1] * m[1][0],
            ],
        ];
        let scale = inv[2][2];
        let norm = if scale.abs() > 1e-12 { scale } else { det };
        let mut out = [[0.0; 3]; 3];
        for (r, row) in inv.iter().enumerate() {
            for (c, v) in row.iter().enumerate() {
                out[r][c] = v / norm;
            }
        }
        Some(Self { m: out })
    }
}

/// Solve 8x8 linear system using Gaussian elimination
#[allow(clippy::needless_range_loop)]
fn solve_linear_system(a: &[[f64; 8]; 8], b: &[f64; 8]) -> Option<[f64; 8]> {
    let mut a = *a;
    let mut b = *b;
    let n = 8;

    for i in 0..n {
        // Partial pivot
        let mut max_val = a[i][i].abs();
        let mut max_row = i;
        for k in (i + 1)..n {
            if a[k][i].abs() > max_val {
                max_val = a[k][i].abs();
                max_row = k;
            }
        }

        if max_val < 1e-10 {
            return None;
        }

        if max_row != i {
            a.swap(i, max_row);
            b.swap(i, max_row);
        }

        for k in (i + 1)..n {
            let factor = a[k][i] / a[i][i];
            b[k] -= factor * b[i];
            for j in i..n {
                a[k][j] -= factor * a[i][j];
            }
        }
    }

    // Back substitution
    let mut x = [0.0f64; 8];
    for i in (0..n).rev() {
        let mut sum = b[i];
        for j in (i + 1)..n {
            sum -= a[i][j] * x[j];
        }
        x[i] = sum / a[i][i];
    }

    Some(x)
}

/// Resample `raster` into a `width x height` output, where `map` sends each
/// output pixel to its source location. Bilinear, border replicated.
pub fn warp_with<F>(raster: &RasterImage, width: u32, height: u32, map: F) -> RasterImage
where
    F: Fn(f64, f64) -> (f64, f64) + Sync,
{
    let w = width as usize;
    let mut pixels = vec![0u8; w * height as usize];
    if w > 0 {
        pixels.par_chunks_mut(w).enumerate().for_each(|(y, row)| {
            for (x, out) in row.iter_mut().enumerate() {
                let (sx, sy) = map(x as f64, y as f64);
                let value = if sx.is_finite() && sy.is_finite() {
                    raster.sample_bilinear(sx as f32, sy as f32)
                } else {
                    raster.get_clamped(0, 0) as f32
                };
                *out = value.round().clamp(0.0, 255.0) as u8;
            }
        });
    }
    match GrayImage::from_raw(width, height, pixels) {
        Some(gray) => RasterImage::new(gray),
        None => RasterImage::new(GrayImage::new(width, height)),
    }
}

/// Apply `transform` (source -> destination) to produce a `width x height` raster
pub fn warp_perspective(
    raster: &RasterImage,
    transform: &PerspectiveTransform,
    width: u32,
    height: u32,
) -> Option<RasterImage> {
    let inverse = transform.inverse()?;
    Some(warp_with(raster, width, height, |x, y| inverse.apply(x, y)))
}

/// Output of [`rotate_expanded`]
#[derive(Debug, Clone)]
pub struct Rotated {
    /// Rotated raster on the enlarged canvas
    pub raster: RasterImage,
    /// Shift of the content relative to the input frame, `(new - old) / 2`
    pub padding: Point,
}

/// Rotate content by `-angle_deg` about the image centre, enlarging the canvas
/// so nothing is cropped.
///
/// `angle_deg` is the measured skew: the angle of a nominally horizontal line,
/// positive when it descends to the right. Rotating by its negative levels it.
pub fn rotate_expanded(raster: &RasterImage, angle_deg: f64) -> Rotated {
    let (w, h) = (raster.width() as f64, raster.height() as f64);
    let (sin, cos) = angle_deg.to_radians().sin_cos();
    let new_w = (w * cos.abs() + h * sin.abs()).round().max(1.0);
    let new_h = (w * sin.abs() + h * cos.abs()).round().max(1.0);
    let (cx_in, cy_in) = (w / 2.0, h / 2.0);
    let (cx_out, cy_out) = (new_w / 2.0, new_h / 2.0);

    let rotated = warp_with(raster, new_w as u32, new_h as u32, |x, y| {
        let dx = x - cx_out;
        let dy = y - cy_out;
        (cos * dx - sin * dy + cx_in, sin * dx + cos * dy + cy_in)
    });

    Rotated {
        raster: rotated,
        padding: Point::new(((new_w - w) / 2.0) as f32, ((new_h - h) / 2.0) as f32),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn square() -> [Point; 4] {
        [
            Point::new(0.0, 0.0),
            Point::new(100.0, 0.0),
            Point::new(100.0, 100.0),
            Point::new(0.0, 100.0),
        ]
    }

    #[test]
    fn test_perspective_transform_scales() {
        let dst = [
            Point::new(0.0, 0.0),
            Point::new(50.0, 0.0),
            Point::new(50.0, 50.0),
            Point::new(0.0, 50.0),
        ];
        let t = PerspectiveTransform::from_points(&square(), &dst).unwrap();
        let p = t.transform(&Point::new(50.0, 50.0));
        assert!((p.x - 25.0).abs() < 1e-3);
        assert!((p.y - 25.0).abs() < 1e-3);
    }

    #[test]
    fn test_perspective_maps_corners_and_inverts() {
        let dst = [
            Point::new(12.0, 7.0),
            Point::new(130.0, 20.0),
            Point::new(118.0, 140.0),
            Point::new(3.0, 109.0),
        ];
        let t = PerspectiveTransform::from_points(&square(), &dst).unwrap();
        for (s, d) in square().iter().zip(dst.iter()) {
            assert!(t.transform(s).distance(d) < 1e-3);
        }
        let inv = t.inverse().unwrap();
        let p = Point::new(37.0, 81.0);
        assert!(inv.transform(&t.transform(&p)).distance(&p) < 1e-3);
    }

    #[test]
    fn test_degenerate_points_have_no_transform() {
        let collapsed = [Point::new(1.0, 1.0); 4];
        assert!(PerspectiveTransform::from_points(&square(), &collapsed).is_none());
    }

    #[test]
    fn test_warp_identity_preserves_pixels() {
        let raster = RasterImage::new(GrayImage::from_fn(8, 6, |x, y| Luma([(x * 30 + y) as u8])));
        let out = warp_perspective(&raster, &PerspectiveTransform::identity(), 8, 6).unwrap();
        assert_eq!(out, raster);
    }

    #[test]
    fn test_rotate_expanded_grows_canvas() {
        let raster = RasterImage::new(GrayImage::from_pixel(100, 50, Luma([200])));
        let rotated = rotate_expanded(&raster, 90.0);
        assert_eq!(rotated.raster.dimensions(), (50, 100));
        assert!((rotated.padding.x + 25.0).abs() < 1e-3);

        let rotated = rotate_expanded(&raster, 10.0);
        assert!(rotated.raster.width() > 100 && rotated.raster.height() > 50);
        // Border replication keeps the background uniform
        assert_eq!(rotated.raster.get(0, 0), 200);
    }

    #[test]
    fn test_rotation_levels_a_sloped_line() {
        // Dark line descending 5 degrees to the right
        let slope = 5f64.to_radians().tan();
        let raster = RasterImage::new(GrayImage::from_fn(200, 100, |x, y| {
            let line_y = 50.0 + (x as f64 - 100.0) * slope;
            Luma([if (y as f64 - line_y).abs() < 1.5 { 0 } else { 255 }])
        }));
        let rotated = rotate_expanded(&raster, 5.0);
        let r = &rotated.raster;
        let cy = r.height() / 2;
        // After levelling, the line stays on the centre row across the width
        for x in [r.width() / 2 - 60, r.width() / 2, r.width() / 2 + 60] {
            assert!(r.get(x, cy) < 128, "expected dark at x={x}");
        }
    }
}
