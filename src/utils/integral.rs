/// Summed-area table over a `width x height` grid.
///
/// Stored with a zero row and column in front, so `sum` needs no edge cases.
#[derive(Debug, Clone)]
pub struct IntegralImage {
    width: usize,
    height: usize,
    table: Vec<u64>,
}

impl IntegralImage {
    /// Build from per-pixel values produced by `value(x, y)`
    pub fn from_fn<F: Fn(usize, usize) -> u64>(width: usize, height: usize, value: F) -> Self {
        let stride = width + 1;
        let mut table = vec![0u64; stride * (height + 1)];
        for y in 0..height {
            let mut row_sum = 0u64;
            for x in 0..width {
                row_sum += value(x, y);
                table[(y + 1) * stride + x + 1] = table[y * stride + x + 1] + row_sum;
            }
        }
        Self {
            width,
            height,
            table,
        }
    }

    /// Integral of raw intensities
    pub fn of_intensity(pixels: &[u8], width: usize, height: usize) -> Self {
        Self::from_fn(width, height, |x, y| pixels[y * width + x] as u64)
    }

    /// Integral of the indicator `pixel < threshold`
    pub fn of_dark_mask(pixels: &[u8], width: usize, height: usize, threshold: u8) -> Self {
        Self::from_fn(width, height, |x, y| (pixels[y * width + x] < threshold) as u64)
    }

    /// Grid width
    pub fn width(&self) -> usize {
        self.width
    }

    /// Grid height
    pub fn height(&self) -> usize {
        self.height
    }

    /// Sum over the half-open box `[x0, x1) x [y0, y1)`, clipped to the grid
    pub fn sum(&self, x0: usize, y0: usize, x1: usize, y1: usize) -> u64 {
        let x1 = x1.min(self.width);
        let y1 = y1.min(self.height);
        if x0 >= x1 || y0 >= y1 {
            return 0;
        }
        let stride = self.width + 1;
        let a = self.table[y0 * stride + x0];
        let b = self.table[y0 * stride + x1];
        let c = self.table[y1 * stride + x0];
        let d = self.table[y1 * stride + x1];
        d + a - b - c
    }
}
