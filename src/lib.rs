//! RustOMR - answer sheet recognition
//!
//! Reads scanned or photographed multiple-choice answer sheets: locates the
//! four calibration markers, rectifies the page, finds the 90-question bubble
//! grid, classifies every question as a letter, blank or double mark, and
//! decodes the sheet's QR identity code.
//!
//! ```no_run
//! let bytes = std::fs::read("sheet.jpg").unwrap();
//! let result = rust_omr::recognize_bytes(&bytes).unwrap();
//! println!("{} answered", result.counts.answered);
//! ```

#![warn(missing_docs)]
#![allow(clippy::missing_docs_in_private_items)]

/// Answer classification rules
pub mod classifier;
/// Interfaces for person lookup, result storage and code issuing
pub mod collab;
/// Recognizer configuration and JSON loading
pub mod config;
/// QR identity decoding
pub mod decoder;
/// Calibration: markers, rectification, deskew and circle detection
pub mod detector;
/// Error types
pub mod error;
/// Bubble localization strategies
pub mod grid;
/// Core data structures (RasterImage, SheetResult, Point, etc.)
pub mod models;
/// Contrast and illumination normalization
pub mod normalize;
/// End-to-end recognition
pub mod pipeline;
/// Dataset helpers, overlays and synthetic sheets for tools and benches
pub mod tools;
/// Utility functions (binarization, geometry, integral images, statistics)
pub mod utils;

pub use config::{ConfigError, RecognizerConfig};
pub use error::{ErrorKind, GridFailure, RecognitionError};
pub use models::{
    Classification, IdentityCode, OptionLabel, Point, QuestionResult, RasterImage, SheetCounts,
    SheetResult, StrategyKind,
};
pub use pipeline::{Recognizer, SheetAnalysis};

/// Recognize a sheet with the default configuration
pub fn recognize(raster: &RasterImage) -> Result<SheetResult, RecognitionError> {
    Recognizer::default().recognize(raster)
}

/// Decode encoded image bytes (PNG, JPEG, ...) and recognize them with the
/// default configuration
pub fn recognize_bytes(bytes: &[u8]) -> Result<SheetResult, RecognitionError> {
    Recognizer::default().recognize_bytes(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};

    #[test]
    fn test_blank_page_falls_back_to_fixed_grid() {
        // No markers and no bubbles: deskew leaves the page alone and the
        // fixed grid samples empty paper everywhere
        let raster = RasterImage::new(GrayImage::from_pixel(620, 877, Luma([240])));
        let result = recognize(&raster).unwrap();
        assert_eq!(result.strategy, StrategyKind::Fixed);
        assert!(!result.aligned_by_markers);
        assert_eq!(result.counts.blank, 90);
        assert!(result.identity.is_none());
        assert!(!result.warnings.is_empty());
    }

    #[test]
    fn test_empty_bytes_fail_to_decode() {
        assert_eq!(recognize_bytes(&[]).unwrap_err().kind(), ErrorKind::DecodeFailure);
    }
}
