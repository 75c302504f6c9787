//! Contrast normalization: contrast-limited adaptive histogram equalization
//! followed by a gamma lookup table.

use crate::config::NormalizeConfig;
use crate::models::RasterImage;
use image::{GrayImage, Luma};
use rayon::prelude::*;

/// Normalize a raster for darkness measurement. Geometry is unchanged.
pub fn normalize(raster: &RasterImage, config: &NormalizeConfig) -> RasterImage {
    if !config.enabled {
        return raster.clone();
    }
    let equalized = clahe(raster, config.clip_limit, config.tiles_x, config.tiles_y);
    apply_gamma(&equalized, config.gamma)
}

/// Contrast-limited adaptive histogram equalization over a
/// `tiles_x x tiles_y` grid, bilinearly blending the four nearest tile maps.
pub fn clahe(raster: &RasterImage, clip_limit: f32, tiles_x: u32, tiles_y: u32) -> RasterImage {
    let (width, height) = raster.dimensions();
    if width == 0 || height == 0 {
        return raster.clone();
    }
    let tiles_x = tiles_x.clamp(1, width) as usize;
    let tiles_y = tiles_y.clamp(1, height) as usize;
    let (w, h) = (width as usize, height as usize);
    let tile_w = w.div_ceil(tiles_x);
    let tile_h = h.div_ceil(tiles_y);
    let gray = raster.as_raw();

    let luts: Vec<[u8; 256]> = (0..tiles_x * tiles_y)
        .into_par_iter()
        .map(|i| {
            let (tx, ty) = (i % tiles_x, i / tiles_x);
            let x0 = (tx * tile_w).min(w);
            let y0 = (ty * tile_h).min(h);
            let x1 = (x0 + tile_w).min(w);
            let y1 = (y0 + tile_h).min(h);
            tile_lut(gray, w, x0, y0, x1, y1, clip_limit)
        })
        .collect();

    let mut out = vec![0u8; w * h];
    out.par_chunks_mut(w).enumerate().for_each(|(y, row)| {
        let fy = (y as f32 + 0.5) / tile_h as f32 - 0.5;
        let ty0 = fy.floor().max(0.0) as usize;
        let ty1 = (ty0 + 1).min(tiles_y - 1);
        let wy = (fy - ty0 as f32).clamp(0.0, 1.0);

        for (x, out) in row.iter_mut().enumerate() {
            let fx = (x as f32 + 0.5) / tile_w as f32 - 0.5;
            let tx0 = fx.floor().max(0.0) as usize;
            let tx1 = (tx0 + 1).min(tiles_x - 1);
            let wx = (fx - tx0 as f32).clamp(0.0, 1.0);
            let tx0 = tx0.min(tiles_x - 1);
            let ty0 = ty0.min(tiles_y - 1);

            let v = gray[y * w + x] as usize;
            let tl = luts[ty0 * tiles_x + tx0][v] as f32;
            let tr = luts[ty0 * tiles_x + tx1][v] as f32;
            let bl = luts[ty1 * tiles_x + tx0][v] as f32;
            let br = luts[ty1 * tiles_x + tx1][v] as f32;
            let top = tl + (tr - tl) * wx;
            let bottom = bl + (br - bl) * wx;
            *out = (top + (bottom - top) * wy).round().clamp(0.0, 255.0) as u8;
        }
    });

    match GrayImage::from_raw(width, height, out) {
        Some(gray) => RasterImage::new(gray),
        None => raster.clone(),
    }
}

/// Clipped-histogram equalization map for one tile
fn tile_lut(
    gray: &[u8],
    stride: usize,
    x0: usize,
    y0: usize,
    x1: usize,
    y1: usize,
    clip_limit: f32,
) -> [u8; 256] {
    let mut lut = [0u8; 256];
    let area = (x1 - x0) * (y1 - y0);
    if area == 0 {
        for (i, v) in lut.iter_mut().enumerate() {
            *v = i as u8;
        }
        return lut;
    }

    let mut histogram = [0u32; 256];
    for y in y0..y1 {
        for &p in &gray[y * stride + x0..y * stride + x1] {
            histogram[p as usize] += 1;
        }
    }

    // Clip and spread the excess evenly, remainder over the first bins
    let clip = ((clip_limit * area as f32 / 256.0) as u32).max(1);
    let mut excess = 0u32;
    for count in histogram.iter_mut() {
        if *count > clip {
            excess += *count - clip;
            *count = clip;
        }
    }
    let share = excess / 256;
    let remainder = (excess % 256) as usize;
    for (i, count) in histogram.iter_mut().enumerate() {
        *count += share + u32::from(i < remainder);
    }

    let scale = 255.0 / area as f32;
    let mut cdf = 0u32;
    for (i, count) in histogram.iter().enumerate() {
        cdf += count;
        lut[i] = (cdf as f32 * scale).round().min(255.0) as u8;
    }
    lut
}

/// Remap intensities through `255 * (v / 255)^(1 / gamma)`
pub fn apply_gamma(raster: &RasterImage, gamma: f32) -> RasterImage {
    let inv = 1.0 / gamma;
    let mut lut = [0u8; 256];
    for (i, v) in lut.iter_mut().enumerate() {
        *v = (255.0 * (i as f32 / 255.0).powf(inv)).round().clamp(0.0, 255.0) as u8;
    }
    let mapped = imageproc::map::map_colors(raster.as_gray(), |Luma([v])| Luma([lut[v as usize]]));
    RasterImage::new(mapped)
}
