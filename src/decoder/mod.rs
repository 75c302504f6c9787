//! Identity code decoding
//!
//! The sheet's identity is printed as a QR code. Decoding walks an ordered
//! list of attempts, each a region selector plus one preprocessing step, and
//! stops at the first attempt that yields non-empty text. Attempts share
//! nothing; a failed attempt leaves no state behind.

use crate::config::{IdentityConfig, RoiFraction};
use crate::models::{DecodeAttempt, IdentityCode, Preprocess, RasterImage, RegionSelector};
use crate::normalize::clahe;
use crate::utils::binarization::adaptive_binarize;
use image::imageops::{self, FilterType};
use log::{debug, info};
use std::borrow::Cow;

/// Ordered multi-attempt QR reader
#[derive(Debug, Clone)]
pub struct IdentityDecoder {
    config: IdentityConfig,
}

impl IdentityDecoder {
    /// Create a decoder
    pub fn new(config: IdentityConfig) -> Self {
        Self { config }
    }

    /// Run the attempts in order; `None` when every attempt came back empty
    pub fn decode(&self, raster: &RasterImage) -> Option<IdentityCode> {
        if !self.config.enabled {
            return None;
        }
        for attempt in &self.config.attempts {
            let Some(prepared) = self.prepare(raster, attempt) else {
                debug!("identity: attempt {attempt} skipped");
                continue;
            };
            match decode_qr(&prepared) {
                Some(text) => {
                    let code = IdentityCode::new(text, &self.config.format, attempt);
                    info!(
                        "identity: decoded {:?} via {attempt} (valid: {})",
                        code.text, code.valid
                    );
                    return Some(code);
                }
                None => debug!("identity: attempt {attempt} found nothing"),
            }
        }
        debug!("identity: no attempt decoded a code");
        None
    }

    /// Apply an attempt's region and preprocessing; `None` when the attempt
    /// does not apply to this raster
    pub fn prepare<'a>(&self, raster: &'a RasterImage, attempt: &DecodeAttempt) -> Option<Cow<'a, RasterImage>> {
        let region = match attempt.region {
            RegionSelector::Full => Cow::Borrowed(raster),
            RegionSelector::Roi => Cow::Owned(crop_fraction(raster, &self.config.roi)?),
        };
        let prepared = match attempt.preprocess {
            Preprocess::None => region,
            Preprocess::Enhance => Cow::Owned(clahe(
                &region,
                self.config.enhance_clip_limit,
                self.config.enhance_tiles,
                self.config.enhance_tiles,
            )),
            Preprocess::Binarize => Cow::Owned(adaptive_binarize(
                &region,
                self.config.adaptive_block,
                self.config.adaptive_offset,
            )),
            Preprocess::Scale(factor) => {
                let w = (region.width() as f32 * factor) as u32;
                let h = (region.height() as f32 * factor) as u32;
                if w < self.config.min_scaled_side || h < self.config.min_scaled_side {
                    return None;
                }
                Cow::Owned(RasterImage::new(imageops::resize(
                    region.as_gray(),
                    w,
                    h,
                    FilterType::Triangle,
                )))
            }
        };
        Some(prepared)
    }
}

impl Default for IdentityDecoder {
    fn default() -> Self {
        Self::new(IdentityConfig::default())
    }
}

/// Crop the fractional region, `None` when it is empty
fn crop_fraction(raster: &RasterImage, roi: &RoiFraction) -> Option<RasterImage> {
    let (w, h) = (raster.width() as f32, raster.height() as f32);
    let x0 = (w * roi.x_min.clamp(0.0, 1.0)) as u32;
    let x1 = (w * roi.x_max.clamp(0.0, 1.0)) as u32;
    let y0 = (h * roi.y_min.clamp(0.0, 1.0)) as u32;
    let y1 = (h * roi.y_max.clamp(0.0, 1.0)) as u32;
    if x1 <= x0 || y1 <= y0 {
        return None;
    }
    let crop = imageops::crop_imm(raster.as_gray(), x0, y0, x1 - x0, y1 - y0).to_image();
    Some(RasterImage::new(crop))
}

/// Decode the first readable QR code in `raster`
pub fn decode_qr(raster: &RasterImage) -> Option<String> {
    let (w, h) = raster.dimensions();
    let gray = raster.as_raw();
    let stride = w as usize;
    let mut prepared = rqrr::PreparedImage::prepare_from_greyscale(w as usize, h as usize, |x, y| {
        gray[y * stride + x]
    });
    prepared
        .detect_grids()
        .into_iter()
        .filter_map(|grid| grid.decode().ok())
        .map(|(_meta, text)| text)
        .find(|text| !text.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};

    fn page() -> RasterImage {
        RasterImage::new(GrayImage::from_pixel(400, 600, Luma([230])))
    }

    #[test]
    fn test_blank_page_has_no_identity() {
        assert!(IdentityDecoder::default().decode(&page()).is_none());
    }

    #[test]
    fn test_roi_crop_follows_fractions() {
        let decoder = IdentityDecoder::default();
        let attempt = DecodeAttempt::new(RegionSelector::Roi, Preprocess::None);
        let page = page();
        let roi = decoder.prepare(&page, &attempt).unwrap();
        assert_eq!(roi.dimensions(), (140, 150));
    }

    #[test]
    fn test_small_scaled_attempt_is_skipped() {
        let decoder = IdentityDecoder::default();
        let small = RasterImage::new(GrayImage::from_pixel(150, 150, Luma([230])));
        let half = DecodeAttempt::new(RegionSelector::Full, Preprocess::Scale(0.5));
        assert!(decoder.prepare(&small, &half).is_none());
        let page = page();
        let large = decoder.prepare(&page, &half).unwrap();
        assert_eq!(large.dimensions(), (200, 300));
    }

    #[test]
    fn test_disabled_decoder_does_nothing() {
        let decoder = IdentityDecoder::new(IdentityConfig {
            enabled: false,
            ..IdentityConfig::default()
        });
        assert!(decoder.decode(&page()).is_none());
    }
}
