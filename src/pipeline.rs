//! Recognition pipeline.
//!
//! raw raster -> calibration -> normalization -> first successful
//! localization strategy -> classification, with the identity decoder run on
//! the raw raster and merged into the result. Structural failures surface as
//! typed errors; there is no partial result.

use crate::classifier::{QuestionStats, classify_stats};
use crate::config::{ConfigError, RecognizerConfig};
use crate::decoder::IdentityDecoder;
use crate::detector::{CalibrationResult, calibrate};
use crate::error::{GridFailure, RecognitionError};
use crate::grid::{GridLocation, LocalizationStrategy, SheetView, strategies_from_config};
use crate::models::{QuestionResult, RasterImage, SheetResult, StrategyKind};
use crate::normalize::normalize;
use log::{debug, info, warn};
use rayon::prelude::*;
use std::time::Instant;

/// Everything computed for one sheet, for diagnostics and overlays
#[derive(Debug, Clone)]
pub struct SheetAnalysis {
    /// Final result
    pub result: SheetResult,
    /// Calibration output; `raster` is what bubble centres refer to
    pub calibration: CalibrationResult,
    /// Grid that was classified
    pub grid: GridLocation,
    /// Per-question statistics, parallel to `grid.questions`
    pub stats: Vec<QuestionStats>,
    /// Strategies that were tried before the successful one, with their failure
    pub rejected: Vec<(StrategyKind, GridFailure)>,
}

/// Configured recognizer; cheap to share across threads
pub struct Recognizer {
    config: RecognizerConfig,
    strategies: Vec<Box<dyn LocalizationStrategy>>,
    identity: IdentityDecoder,
}

impl Recognizer {
    /// Validate `config` and build its strategies
    pub fn new(config: RecognizerConfig) -> Result<Self, ConfigError> {
        let strategies = strategies_from_config(&config);
        Self::with_strategies(config, strategies)
    }

    /// Use explicit localization strategies, tried in the given order
    pub fn with_strategies(
        config: RecognizerConfig,
        strategies: Vec<Box<dyn LocalizationStrategy>>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        if strategies.is_empty() {
            return Err(ConfigError::Invalid(
                "at least one localization strategy is required".to_string(),
            ));
        }
        let identity = IdentityDecoder::new(config.identity.clone());
        Ok(Self {
            config,
            strategies,
            identity,
        })
    }

    /// Active configuration
    pub fn config(&self) -> &RecognizerConfig {
        &self.config
    }

    /// Recognize one sheet
    pub fn recognize(&self, raster: &RasterImage) -> Result<SheetResult, RecognitionError> {
        self.analyze(raster).map(|analysis| analysis.result)
    }

    /// Decode encoded image bytes, then recognize
    pub fn recognize_bytes(&self, bytes: &[u8]) -> Result<SheetResult, RecognitionError> {
        let raster = RasterImage::decode(bytes)?;
        self.recognize(&raster)
    }

    /// Recognize independent sheets in parallel; one failure does not affect
    /// the others
    pub fn recognize_batch(&self, rasters: &[RasterImage]) -> Vec<Result<SheetResult, RecognitionError>> {
        rasters.par_iter().map(|r| self.recognize(r)).collect()
    }

    /// Recognize and keep the intermediate data
    pub fn analyze(&self, raster: &RasterImage) -> Result<SheetAnalysis, RecognitionError> {
        let start = Instant::now();
        let (width, height) = raster.dimensions();
        let min = self.config.min_image_side;
        if width < min || height < min {
            return Err(RecognitionError::ImageTooSmall { width, height, min });
        }

        let template = &self.config.template;
        let calibration = calibrate(raster, template, &self.config.calibration)?;
        let normalized = normalize(&calibration.raster, &self.config.normalize);
        let view = SheetView {
            calibration: &calibration,
            normalized: &normalized,
            template,
        };

        let mut rejected = Vec::new();
        let mut located = None;
        for strategy in &self.strategies {
            match strategy.locate(&view) {
                Ok(grid) => {
                    debug!("strategy {} located {} questions", strategy.kind(), grid.questions.len());
                    located = Some((strategy.kind(), grid));
                    break;
                }
                Err(failure) => {
                    warn!("strategy {} failed: {failure}", strategy.kind());
                    rejected.push((strategy.kind(), failure));
                }
            }
        }
        let Some((strategy, grid)) = located else {
            let failure = rejected
                .pop()
                .map(|(_, f)| f)
                .unwrap_or(GridFailure::OutOfBounds);
            return Err(RecognitionError::GridMismatch(failure));
        };

        let stats: Vec<QuestionStats> = grid
            .questions
            .iter()
            .map(|q| QuestionStats::of(&q.samples()))
            .collect();
        let questions = grid
            .questions
            .iter()
            .zip(&stats)
            .map(|(q, s)| QuestionResult {
                question: q.question,
                classification: classify_stats(s, &self.config.classifier),
            })
            .collect();

        let identity = self.identity.decode(raster);
        let aligned = calibration.aligned_by_markers();
        let mut result = SheetResult::new(questions, identity, strategy, aligned);
        if !aligned {
            result.warnings.push(format!(
                "{} of 4 calibration markers found; page was deskewed only",
                calibration.markers_found()
            ));
        }
        for (kind, failure) in &rejected {
            result.warnings.push(format!("{kind} grid rejected: {failure}"));
        }
        result.warnings.extend(grid.warnings.iter().cloned());
        result.elapsed = start.elapsed();

        info!(
            "sheet recognized via {strategy} grid in {:.1}ms: {} answered, {} blank, {} double",
            result.elapsed.as_secs_f64() * 1000.0,
            result.counts.answered,
            result.counts.blank,
            result.counts.double
        );

        Ok(SheetAnalysis {
            result,
            calibration,
            grid,
            stats,
            rejected,
        })
    }
}

impl Default for Recognizer {
    fn default() -> Self {
        let config = RecognizerConfig::default();
        Self {
            strategies: strategies_from_config(&config),
            identity: IdentityDecoder::new(config.identity.clone()),
            config,
        }
    }
}
