//! Answer classification from five darkness samples.
//!
//! A graduated decision combining absolute darkness with relative and
//! statistical signals: faint or partial fills still resolve to a letter while
//! two comparably dark bubbles resolve to a double mark. First match wins:
//!
//! 1. blank when nothing is dark enough or nothing stands out,
//! 2. double when the top two are both marked and close,
//! 3. a letter when the best bubble is separated from the rest,
//! 4. blank otherwise.

use crate::config::ClassifierConfig;
use crate::models::{BubbleSample, Classification, OPTION_COUNT, OptionLabel};
use crate::utils::stats::{mean, std_dev};
use serde::Serialize;

/// Summary statistics the rules are evaluated on
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct QuestionStats {
    /// Darkest option
    pub best: OptionLabel,
    /// Darkness of `best`
    pub best_darkness: f32,
    /// Darkness of the runner-up
    pub second_darkness: f32,
    /// `best_darkness - second_darkness`
    pub diff: f32,
    /// Mean darkness over all options
    pub mean: f32,
    /// Population standard deviation over all options
    pub std: f32,
}

impl QuestionStats {
    /// Compute statistics; ties keep the earlier option as best
    pub fn of(samples: &[BubbleSample; OPTION_COUNT]) -> Self {
        let mut sorted = *samples;
        sorted.sort_by(|a, b| b.darkness.total_cmp(&a.darkness));
        let values = samples.map(|s| s.darkness);
        Self {
            best: sorted[0].label,
            best_darkness: sorted[0].darkness,
            second_darkness: sorted[1].darkness,
            diff: sorted[0].darkness - sorted[1].darkness,
            mean: mean(&values),
            std: std_dev(&values),
        }
    }

    /// z-score of `darkness`, 0 when the samples have no spread
    pub fn z(&self, darkness: f32) -> f32 {
        if self.std > f32::EPSILON {
            (darkness - self.mean) / self.std
        } else {
            0.0
        }
    }
}

/// Classify one question
pub fn classify(samples: &[BubbleSample; OPTION_COUNT], config: &ClassifierConfig) -> Classification {
    classify_stats(&QuestionStats::of(samples), config)
}

/// Apply the decision rules to precomputed statistics
pub fn classify_stats(stats: &QuestionStats, config: &ClassifierConfig) -> Classification {
    let QuestionStats {
        best,
        best_darkness: b,
        second_darkness: s,
        diff,
        std,
        ..
    } = *stats;

    if b < config.blank_floor || (std < config.min_std && diff < config.min_diff) {
        return Classification::Blank;
    }

    let both_marked = b >= config.marked && s >= config.marked - config.double_tolerance;
    let both_outliers = std > config.double_min_std
        && stats.z(b) > config.double_z
        && stats.z(s) > config.double_z;
    if (both_marked || both_outliers) && diff < config.double_delta {
        return Classification::Double;
    }

    let clear = diff >= config.clear_delta;
    let moderate = b >= config.marked && diff >= config.moderate_delta;
    let faint = b < config.marked && b >= config.faint_ratio * s && diff >= config.min_diff;
    let outlier = std >= config.min_std && diff >= config.min_diff && stats.z(b) >= config.outlier_z;
    if clear || moderate || faint || outlier || b >= config.marked {
        return Classification::Answer(best);
    }

    Classification::Blank
}

#[cfg(test)]
mod tests {
    use super::*;

    fn samples(values: [f32; 5]) -> [BubbleSample; 5] {
        std::array::from_fn(|i| BubbleSample::new(1, OptionLabel::ALL[i], values[i]))
    }

    fn run(values: [f32; 5]) -> Classification {
        classify(&samples(values), &ClassifierConfig::default())
    }

    #[test]
    fn test_clear_mark() {
        assert_eq!(run([10.0, 10.0, 47.0, 9.0, 10.0]), Classification::Answer(OptionLabel::C));
    }

    #[test]
    fn test_empty_question_is_blank() {
        assert_eq!(run([10.0, 9.5, 10.2, 9.8, 10.1]), Classification::Blank);
        // Some spread but nothing reaches the floor
        assert_eq!(run([3.0, 14.0, 2.0, 1.0, 6.0]), Classification::Blank);
    }

    #[test]
    fn test_two_marks_are_double() {
        assert_eq!(run([45.0, 10.0, 42.0, 10.0, 9.0]), Classification::Double);
        // Runner-up within tolerance below the marked threshold
        assert_eq!(run([32.0, 26.0, 10.0, 10.0, 10.0]), Classification::Double);
    }

    #[test]
    fn test_double_needs_small_gap() {
        // Both marked but far apart: the darker one wins
        assert_eq!(run([70.0, 35.0, 10.0, 10.0, 10.0]), Classification::Answer(OptionLabel::A));
    }

    #[test]
    fn test_moderate_mark() {
        // Gap below the clear delta, but the best is confidently marked
        assert_eq!(run([10.0, 12.0, 10.0, 33.0, 24.0]), Classification::Answer(OptionLabel::D));
        // Same gap with the runner-up also marked is a double
        assert_eq!(run([10.0, 12.0, 10.0, 36.0, 30.0]), Classification::Double);
    }

    #[test]
    fn test_faint_mark() {
        // Below the marked threshold but twice the runner-up
        assert_eq!(run([8.0, 8.0, 8.0, 8.0, 17.0]), Classification::Answer(OptionLabel::E));
    }

    #[test]
    fn test_statistical_outlier() {
        // Best is not twice the second, but clearly above the rest
        assert_eq!(run([12.0, 16.0, 12.0, 12.0, 20.0]), Classification::Answer(OptionLabel::E));
    }

    #[test]
    fn test_ties_keep_first_option() {
        let stats = QuestionStats::of(&samples([40.0, 40.0, 10.0, 10.0, 10.0]));
        assert_eq!(stats.best, OptionLabel::A);
        assert_eq!(stats.diff, 0.0);
        assert_eq!(classify_stats(&stats, &ClassifierConfig::default()), Classification::Double);
    }

    #[test]
    fn test_extreme_inputs() {
        assert_eq!(run([0.0, 0.0, 0.0, 100.0, 0.0]), Classification::Answer(OptionLabel::D));
        assert_eq!(run([90.0, 0.0, 90.0, 0.0, 0.0]), Classification::Double);
        assert_eq!(run([0.0; 5]), Classification::Blank);
    }

    #[test]
    fn test_thresholds_are_configurable() {
        let strict = ClassifierConfig {
            blank_floor: 50.0,
            ..ClassifierConfig::default()
        };
        assert_eq!(
            classify(&samples([10.0, 10.0, 47.0, 9.0, 10.0]), &strict),
            Classification::Blank
        );
    }
}
