//! Fixed-grid strategy: template coordinates plus a bounded local search.
//!
//! Each nominal bubble centre is projected through the calibration frame, then
//! offsets on a step grid around it are sampled and the darkest window wins.
//! The search absorbs residual misalignment left after calibration.

use super::{GridLocation, LocalizationStrategy, LocatedBubble, QuestionSamples, SheetView};
use crate::config::{FixedGridConfig, SamplingConfig};
use crate::error::GridFailure;
use crate::grid::sampling::DarknessSampler;
use crate::models::{BubbleSample, OptionLabel, Point, StrategyKind};
use log::{debug, warn};

/// Nominal-coordinate localization with local search
#[derive(Debug, Clone)]
pub struct FixedGrid {
    config: FixedGridConfig,
    sampling: SamplingConfig,
}

impl FixedGrid {
    /// Create the strategy
    pub fn new(config: FixedGridConfig, sampling: SamplingConfig) -> Self {
        Self { config, sampling }
    }
}

impl Default for FixedGrid {
    fn default() -> Self {
        Self::new(FixedGridConfig::default(), SamplingConfig::default())
    }
}

/// Symmetric offsets `-range..=range` spaced by `step`
fn offsets(range: f32, step: f32) -> Vec<f32> {
    let n = (range / step).floor().max(0.0) as i32;
    (-n..=n).map(|i| i as f32 * step).collect()
}

impl LocalizationStrategy for FixedGrid {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Fixed
    }

    fn locate(&self, sheet: &SheetView<'_>) -> Result<GridLocation, GridFailure> {
        let calibration = sheet.calibration;
        let template = sheet.template;
        let mut warnings = Vec::new();

        let observed = calibration.observed_aspect();
        let expected = calibration.expected_aspect(template);
        let divergence = (observed / expected - 1.0).abs();
        if divergence > self.config.aspect_fail {
            return Err(GridFailure::AspectRatio { divergence });
        }
        if divergence > self.config.aspect_warn {
            let message = format!(
                "aspect ratio {observed:.3} diverges {:.0}% from the template's {expected:.3}",
                divergence * 100.0
            );
            warn!("fixed grid: {message}");
            warnings.push(message);
        }

        let frame = calibration.frame;
        let scale = frame.scale();
        let half = self.sampling.window_factor * template.bubble_radius * scale;
        let step = (self.config.search_step * scale).max(1.0);
        let dxs = offsets(self.config.search_x * frame.scale_x, step);
        let dys = offsets(self.config.search_y * frame.scale_y, step);
        let sampler = DarknessSampler::new(sheet.normalized, self.sampling.dark_threshold);

        let mut questions = Vec::with_capacity(template.question_count());
        for column in 0..template.columns() {
            for row in 0..template.rows() {
                let question = template.question_number(column, row);
                let mut bubbles = Vec::with_capacity(OptionLabel::ALL.len());
                for label in OptionLabel::ALL {
                    let nominal = frame.to_pixel(template.bubble_center(column, row, label.index()));
                    let (center, darkness) = dys
                        .iter()
                        .flat_map(|&dy| dxs.iter().map(move |&dx| nominal.translate(dx, dy)))
                        .filter(|c| sampler.window_fits(*c, half))
                        .map(|c| (c, sampler.darkness(c, half)))
                        // First maximum in scan order
                        .fold(None, |best: Option<(Point, f32)>, cand| match best {
                            Some(b) if b.1 >= cand.1 => Some(b),
                            _ => Some(cand),
                        })
                        .ok_or(GridFailure::OutOfBounds)?;
                    bubbles.push(LocatedBubble {
                        sample: BubbleSample::new(question, label, darkness),
                        center,
                    });
                }
                let bubbles = bubbles.try_into().map_err(|_| GridFailure::OutOfBounds)?;
                questions.push(QuestionSamples { question, bubbles });
            }
        }

        debug!(
            "fixed grid: sampled {} questions, window half-side {half:.1}px, {}x{} offsets",
            questions.len(),
            dxs.len(),
            dys.len()
        );
        Ok(GridLocation { questions, warnings })
    }
}
