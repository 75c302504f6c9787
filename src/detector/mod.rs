//! Page geometry: marker search, rectification and the deskew fallback
//!
//! - Connected-component labelling of dark regions
//! - Fiducial marker selection per quadrant
//! - Line-segment skew estimation for pages without markers
//! - Circle detection for the detected-grid strategy

/// Marker rectification and deskew into a [`calibration::GridFrame`]
pub mod calibration;
/// Gradient-voting circle detection
pub mod circles;
/// 8-connected component labelling with shape statistics
pub mod components;
/// Hough line segments and skew estimation
pub mod lines;
/// Fiducial marker search
pub mod markers;

pub use calibration::{Alignment, CalibrationResult, GridFrame, calibrate, deskew};
