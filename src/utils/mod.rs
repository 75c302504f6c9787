//! Utility functions for image processing
//!
//! - Binarization (Otsu, fixed cutoff, local mean)
//! - Geometry (homographies, resampling warps, rotation)
//! - Summed-area tables for window counts
//! - Small statistics helpers

pub mod binarization;
pub mod geometry;
pub mod integral;
pub mod stats;
