use image::{DynamicImage, GrayImage};

/// Immutable 8-bit intensity raster.
///
/// Every pipeline stage consumes a `&RasterImage` and produces a new one;
/// there is no mutable access to the pixels once constructed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RasterImage {
    gray: GrayImage,
}

impl RasterImage {
    /// Wrap an existing grayscale buffer
    pub fn new(gray: GrayImage) -> Self {
        Self { gray }
    }

    /// Build from raw row-major luminance bytes; `None` if the length does not match
    pub fn from_raw(width: u32, height: u32, pixels: Vec<u8>) -> Option<Self> {
        GrayImage::from_raw(width, height, pixels).map(Self::new)
    }

    /// Convert any decoded image to luminance
    pub fn from_dynamic(image: &DynamicImage) -> Self {
        Self::new(image.to_luma8())
    }

    /// Decode an encoded image (PNG, JPEG, ...) from memory
    pub fn decode(bytes: &[u8]) -> Result<Self, image::ImageError> {
        let image = image::load_from_memory(bytes)?;
        Ok(Self::from_dynamic(&image))
    }

    /// Raster width in pixels
    pub fn width(&self) -> u32 {
        self.gray.width()
    }

    /// Raster height in pixels
    pub fn height(&self) -> u32 {
        self.gray.height()
    }

    /// `(width, height)`
    pub fn dimensions(&self) -> (u32, u32) {
        self.gray.dimensions()
    }

    /// Intensity at (x, y); panics when out of bounds like `GrayImage::get_pixel`
    #[inline]
    pub fn get(&self, x: u32, y: u32) -> u8 {
        self.gray.get_pixel(x, y)[0]
    }

    /// Intensity with coordinates clamped to the nearest edge pixel
    #[inline]
    pub fn get_clamped(&self, x: i64, y: i64) -> u8 {
        let cx = x.clamp(0, self.width() as i64 - 1) as u32;
        let cy = y.clamp(0, self.height() as i64 - 1) as u32;
        self.get(cx, cy)
    }

    /// Bilinear sample at a sub-pixel location, replicating the border
    pub fn sample_bilinear(&self, x: f32, y: f32) -> f32 {
        let x0 = x.floor();
        let y0 = y.floor();
        let fx = x - x0;
        let fy = y - y0;
        let (x0, y0) = (x0 as i64, y0 as i64);

        let p00 = self.get_clamped(x0, y0) as f32;
        let p10 = self.get_clamped(x0 + 1, y0) as f32;
        let p01 = self.get_clamped(x0, y0 + 1) as f32;
        let p11 = self.get_clamped(x0 + 1, y0 + 1) as f32;

        let top = p00 + (p10 - p00) * fx;
        let bottom = p01 + (p11 - p01) * fx;
        top + (bottom - top) * fy
    }

    /// Borrow the underlying buffer for `image`/`imageproc` operators
    pub fn as_gray(&self) -> &GrayImage {
        &self.gray
    }

    /// Raw row-major pixel bytes
    pub fn as_raw(&self) -> &[u8] {
        self.gray.as_raw()
    }

    /// Unwrap into the underlying buffer
    pub fn into_gray(self) -> GrayImage {
        self.gray
    }
}

impl From<GrayImage> for RasterImage {
    fn from(gray: GrayImage) -> Self {
        Self::new(gray)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_raw_checks_length() {
        assert!(RasterImage::from_raw(2, 2, vec![0, 1, 2, 3]).is_some());
        assert!(RasterImage::from_raw(2, 2, vec![0, 1, 2]).is_none());
    }

    #[test]
    fn test_bilinear_replicates_border() {
        let raster = RasterImage::from_raw(2, 2, vec![0, 100, 100, 200]).unwrap();
        assert!((raster.sample_bilinear(0.5, 0.5) - 100.0).abs() < 1e-3);
        assert!((raster.sample_bilinear(-5.0, -5.0) - 0.0).abs() < 1e-3);
        assert!((raster.sample_bilinear(9.0, 9.0) - 200.0).abs() < 1e-3);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(RasterImage::decode(b"definitely not an image").is_err());
    }
}
