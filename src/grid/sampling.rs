use crate::models::{Point, RasterImage};
use crate::utils::integral::IntegralImage;

/// Dark-pixel percentage over square windows, backed by a summed-area table
/// so every window costs four lookups regardless of size.
#[derive(Debug, Clone)]
pub struct DarknessSampler {
    dark: IntegralImage,
}

impl DarknessSampler {
    /// Pixels strictly below `dark_threshold` count as dark
    pub fn new(raster: &RasterImage, dark_threshold: u8) -> Self {
        let (w, h) = raster.dimensions();
        Self {
            dark: IntegralImage::of_dark_mask(raster.as_raw(), w as usize, h as usize, dark_threshold),
        }
    }

    /// True when the window of half-side `half` around `center` lies fully inside
    pub fn window_fits(&self, center: Point, half: f32) -> bool {
        center.x - half >= 0.0
            && center.y - half >= 0.0
            && center.x + half < self.dark.width() as f32
            && center.y + half < self.dark.height() as f32
    }

    /// Percentage (0..=100) of dark pixels in the window, clipped to the
    /// raster. An empty window measures 0.
    pub fn darkness(&self, center: Point, half: f32) -> f32 {
        let clip = |v: f32, max: usize| (v.round().max(0.0) as usize).min(max);
        let x0 = clip(center.x - half, self.dark.width());
        let y0 = clip(center.y - half, self.dark.height());
        let x1 = clip(center.x + half, self.dark.width());
        let y1 = clip(center.y + half, self.dark.height());
        if x1 <= x0 || y1 <= y0 {
            return 0.0;
        }
        let area = ((x1 - x0) * (y1 - y0)) as f32;
        self.dark.sum(x0, y0, x1, y1) as f32 * 100.0 / area
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};

    #[test]
    fn test_darkness_percentage() {
        // Left half dark
        let raster = RasterImage::new(GrayImage::from_fn(40, 40, |x, _| Luma([if x < 20 { 30 } else { 220 }])));
        let sampler = DarknessSampler::new(&raster, 160);
        assert!((sampler.darkness(Point::new(20.0, 20.0), 10.0) - 50.0).abs() < 1e-3);
        assert_eq!(sampler.darkness(Point::new(5.0, 20.0), 4.0), 100.0);
        assert_eq!(sampler.darkness(Point::new(35.0, 20.0), 4.0), 0.0);
    }

    #[test]
    fn test_window_clipping() {
        let raster = RasterImage::new(GrayImage::from_pixel(10, 10, Luma([0])));
        let sampler = DarknessSampler::new(&raster, 160);
        assert!(!sampler.window_fits(Point::new(1.0, 5.0), 3.0));
        assert!(sampler.window_fits(Point::new(5.0, 5.0), 3.0));
        assert_eq!(sampler.darkness(Point::new(1.0, 5.0), 3.0), 100.0);
        assert_eq!(sampler.darkness(Point::new(-20.0, 5.0), 3.0), 0.0);
    }
}
