//! Bubble localization strategies
//!
//! Both strategies turn a calibrated, normalized sheet into one group of five
//! darkness samples per question. The pipeline tries them in configured order
//! and classifies the first complete grid.

/// Circle detection with structural validation
pub mod detected;
/// Nominal template coordinates with local search
pub mod fixed;
/// Windowed dark-pixel percentage
pub mod sampling;

pub use detected::DetectedGrid;
pub use fixed::FixedGrid;
pub use sampling::DarknessSampler;

use crate::config::{RecognizerConfig, TemplateConfig};
use crate::detector::CalibrationResult;
use crate::error::GridFailure;
use crate::models::{BubbleSample, OPTION_COUNT, Point, RasterImage, StrategyKind};

/// A sampled bubble and where it was sampled
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocatedBubble {
    /// Darkness measurement
    pub sample: BubbleSample,
    /// Sampling centre in calibrated raster coordinates
    pub center: Point,
}

/// The five bubbles of one question, in option order
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuestionSamples {
    /// Question number, 1-based
    pub question: u16,
    /// Bubbles A..E
    pub bubbles: [LocatedBubble; OPTION_COUNT],
}

impl QuestionSamples {
    /// Darkness samples without positions
    pub fn samples(&self) -> [BubbleSample; OPTION_COUNT] {
        self.bubbles.map(|b| b.sample)
    }
}

/// Complete grid produced by a strategy
#[derive(Debug, Clone, Default)]
pub struct GridLocation {
    /// One entry per template question
    pub questions: Vec<QuestionSamples>,
    /// Non-fatal anomalies to surface in the result
    pub warnings: Vec<String>,
}

/// Everything a strategy may look at
#[derive(Debug, Clone, Copy)]
pub struct SheetView<'a> {
    /// Calibration output, including the un-normalized calibrated raster
    pub calibration: &'a CalibrationResult,
    /// Contrast-normalized calibrated raster used for darkness
    pub normalized: &'a RasterImage,
    /// Template geometry
    pub template: &'a TemplateConfig,
}

/// A way of locating all template bubbles on a calibrated sheet
pub trait LocalizationStrategy: Send + Sync {
    /// Which strategy this is, reported in the result
    fn kind(&self) -> StrategyKind;

    /// Locate and sample every bubble, or explain why the grid is unusable
    fn locate(&self, sheet: &SheetView<'_>) -> Result<GridLocation, GridFailure>;
}

/// Build the configured strategies in the order they should be tried
pub fn strategies_from_config(config: &RecognizerConfig) -> Vec<Box<dyn LocalizationStrategy>> {
    config
        .strategies
        .iter()
        .map(|kind| -> Box<dyn LocalizationStrategy> {
            match kind {
                StrategyKind::Detected => Box::new(DetectedGrid::new(
                    config.detected_grid.clone(),
                    config.sampling.clone(),
                )),
                StrategyKind::Fixed => Box::new(FixedGrid::new(
                    config.fixed_grid.clone(),
                    config.sampling.clone(),
                )),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategies_follow_config_order() {
        let mut config = RecognizerConfig::default();
        let kinds: Vec<_> = strategies_from_config(&config).iter().map(|s| s.kind()).collect();
        assert_eq!(kinds, vec![StrategyKind::Detected, StrategyKind::Fixed]);

        config.strategies = vec![StrategyKind::Fixed];
        let kinds: Vec<_> = strategies_from_config(&config).iter().map(|s| s.kind()).collect();
        assert_eq!(kinds, vec![StrategyKind::Fixed]);
    }
}
