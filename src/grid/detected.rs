//! Detected-grid strategy: find the printed circles, then validate structure.
//!
//! Circles are detected inside the marker rectangle, sorted by y and chained
//! into rows wherever consecutive centres are vertically close. The template
//! must be matched exactly: the configured number of rows, each holding one
//! circle per option per column. Anything else is a structural failure, never
//! a partial grid.

use super::{GridLocation, LocalizationStrategy, LocatedBubble, QuestionSamples, SheetView};
use crate::config::{DetectedGridConfig, SamplingConfig, TemplateConfig};
use crate::detector::GridFrame;
use crate::detector::circles::{Circle, CircleParams, detect_circles};
use crate::error::GridFailure;
use crate::grid::sampling::DarknessSampler;
use crate::models::{BubbleSample, OPTION_COUNT, OptionLabel, Point, StrategyKind};
use log::debug;

/// Circle-detection localization
#[derive(Debug, Clone)]
pub struct DetectedGrid {
    config: DetectedGridConfig,
    sampling: SamplingConfig,
}

impl DetectedGrid {
    /// Create the strategy
    pub fn new(config: DetectedGridConfig, sampling: SamplingConfig) -> Self {
        Self { config, sampling }
    }

    /// Circles inside the marker rectangle, markers themselves excluded
    pub fn grid_circles(&self, sheet: &SheetView<'_>) -> Vec<Circle> {
        let frame = sheet.calibration.frame;
        let template = sheet.template;
        let s = frame.scale();
        let params = CircleParams {
            min_radius: self.config.min_radius * s,
            max_radius: self.config.max_radius * s,
            min_distance: self.config.min_distance * s,
            gradient_fraction: self.config.gradient_fraction,
            min_vote_fraction: self.config.min_vote_fraction,
            min_ring_fraction: self.config.min_ring_fraction,
            sigma: (2.0 * s).max(1.0),
        };
        let region = frame.marker_rect(template).expand(self.config.margin * s);
        let corners = marker_corners(&frame, template);
        let keep_out = template.marker_size * s;

        detect_circles(sheet.calibration.raster.as_gray(), region, &params)
            .into_iter()
            .filter(|c| corners.iter().all(|m| m.distance(&c.center) > keep_out))
            .collect()
    }
}

impl Default for DetectedGrid {
    fn default() -> Self {
        Self::new(DetectedGridConfig::default(), SamplingConfig::default())
    }
}

fn marker_corners(frame: &GridFrame, template: &TemplateConfig) -> [Point; 4] {
    let (w, h) = template.rectified_size();
    let (w, h) = (w as f32, h as f32);
    [
        Point::new(0.0, 0.0),
        Point::new(w, 0.0),
        Point::new(0.0, h),
        Point::new(w, h),
    ]
    .map(|p| frame.to_pixel(p))
}

/// Chain circles (sorted by y) into rows of vertically adjacent centres,
/// each row sorted by x
pub fn group_rows(mut circles: Vec<Circle>, threshold: f32) -> Vec<Vec<Circle>> {
    circles.sort_by(|a, b| a.center.y.total_cmp(&b.center.y));
    let mut rows: Vec<Vec<Circle>> = Vec::new();
    for c in circles {
        match rows.last_mut() {
            Some(row) if row.last().is_some_and(|p| c.center.y - p.center.y < threshold) => row.push(c),
            _ => rows.push(vec![c]),
        }
    }
    for row in &mut rows {
        row.sort_by(|a, b| a.center.x.total_cmp(&b.center.x));
    }
    rows
}

impl LocalizationStrategy for DetectedGrid {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Detected
    }

    fn locate(&self, sheet: &SheetView<'_>) -> Result<GridLocation, GridFailure> {
        self.assemble(sheet, self.grid_circles(sheet))
    }
}

impl DetectedGrid {
    /// Validate detected circles against the template and sample them.
    ///
    /// Rows are numbered top to bottom, groups of five left to right; the
    /// group in column `c` of row `r` is question `c * rows + r + 1`.
    pub fn assemble(&self, sheet: &SheetView<'_>, circles: Vec<Circle>) -> Result<GridLocation, GridFailure> {
        let template = sheet.template;
        let s = sheet.calibration.frame.scale();

        if circles.len() < self.config.min_circles {
            return Err(GridFailure::TooFewCircles {
                found: circles.len(),
                required: self.config.min_circles,
            });
        }

        let rows = group_rows(circles, self.config.row_threshold * s);
        if rows.len() != template.rows() {
            return Err(GridFailure::RowCount {
                found: rows.len(),
                expected: template.rows(),
            });
        }
        let per_row = template.columns() * OPTION_COUNT;
        if let Some((row, r)) = rows.iter().enumerate().find(|(_, r)| r.len() != per_row) {
            return Err(GridFailure::RowSize {
                row,
                found: r.len(),
                expected: per_row,
            });
        }

        let sampler = DarknessSampler::new(sheet.normalized, self.sampling.dark_threshold);
        let half = self.sampling.window_factor * template.bubble_radius * s;
        let mut questions = Vec::with_capacity(template.question_count());
        for (row_index, row) in rows.iter().enumerate() {
            for (column, group) in row.chunks(OPTION_COUNT).enumerate() {
                let question = template.question_number(column, row_index);
                let bubbles: [LocatedBubble; OPTION_COUNT] = std::array::from_fn(|i| {
                    let center = group[i].center;
                    LocatedBubble {
                        sample: BubbleSample::new(question, OptionLabel::ALL[i], sampler.darkness(center, half)),
                        center,
                    }
                });
                questions.push(QuestionSamples { question, bubbles });
            }
        }
        questions.sort_by_key(|q| q.question);

        debug!("detected grid: {} rows x {per_row} circles validated", rows.len());
        Ok(GridLocation {
            questions,
            warnings: Vec::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::{Alignment, CalibrationResult};
    use crate::models::RasterImage;
    use image::{GrayImage, Luma};

    fn circle(x: f32, y: f32) -> Circle {
        Circle {
            center: Point::new(x, y),
            radius: 10.0,
            score: 1.0,
        }
    }

    #[test]
    fn test_group_rows_chains_by_y() {
        let circles = vec![
            circle(50.0, 102.0),
            circle(10.0, 100.0),
            circle(30.0, 160.0),
            circle(90.0, 98.0),
            circle(20.0, 163.0),
        ];
        let rows = group_rows(circles, 30.0);
        assert_eq!(rows.len(), 2);
        let xs: Vec<f32> = rows[0].iter().map(|c| c.center.x).collect();
        assert_eq!(xs, vec![10.0, 50.0, 90.0]);
        assert_eq!(rows[1].len(), 2);
    }

    #[test]
    fn test_group_rows_empty() {
        assert!(group_rows(Vec::new(), 30.0).is_empty());
    }

    /// Rectified sheet with the given (column, row, option) bubbles filled
    fn rectified(filled: &[(usize, usize, usize)]) -> CalibrationResult {
        let t = TemplateConfig::default();
        let (w, h) = t.rectified_size();
        let centres: Vec<Point> = filled.iter().map(|&(c, r, o)| t.bubble_center(c, r, o)).collect();
        let raster = RasterImage::new(GrayImage::from_fn(w, h, |x, y| {
            let p = Point::new(x as f32, y as f32);
            let dark = centres.iter().any(|c| c.distance(&p) <= t.bubble_radius);
            Luma([if dark { 30 } else { 240 }])
        }));
        CalibrationResult {
            markers: [None; 4],
            input_size: raster.dimensions(),
            raster,
            frame: GridFrame::unit(),
            alignment: Alignment::Markers([Point::default(); 4]),
        }
    }

    /// Every template bubble as a circle, row by row, left to right
    fn template_circles(t: &TemplateConfig) -> Vec<Circle> {
        let mut circles = Vec::new();
        for row in 0..t.rows() {
            for column in 0..t.columns() {
                for option in 0..OPTION_COUNT {
                    let p = t.bubble_center(column, row, option);
                    circles.push(circle(p.x, p.y));
                }
            }
        }
        circles
    }

    #[test]
    fn test_assemble_numbers_columns_then_rows() {
        let template = TemplateConfig::default();
        let cal = rectified(&[(1, 4, 3), (5, 14, 0), (0, 0, 4)]);
        let view = SheetView {
            calibration: &cal,
            normalized: &cal.raster,
            template: &template,
        };
        let mut circles = template_circles(&template);
        circles.reverse();
        let grid = DetectedGrid::default().assemble(&view, circles).unwrap();

        assert_eq!(grid.questions.len(), 90);
        assert!(grid.questions.iter().map(|q| q.question).eq(1..=90));

        let darkest = |question: u16| {
            let q = &grid.questions[question as usize - 1];
            q.samples()
                .iter()
                .max_by(|a, b| a.darkness.total_cmp(&b.darkness))
                .map(|b| b.label)
        };
        assert_eq!(darkest(20), Some(OptionLabel::D));
        assert_eq!(darkest(90), Some(OptionLabel::A));
        assert_eq!(darkest(1), Some(OptionLabel::E));

        let q20 = &grid.questions[19];
        for (i, bubble) in q20.bubbles.iter().enumerate() {
            assert_eq!(bubble.sample.label, OptionLabel::ALL[i]);
            assert_eq!(bubble.sample.question, 20);
            assert_eq!(bubble.center, template.bubble_center(1, 4, i));
        }
        assert!(q20.bubbles[3].sample.darkness > 40.0);
        assert!(q20.bubbles[2].sample.darkness < 5.0);
    }

    #[test]
    fn test_assemble_requires_minimum_circles() {
        let template = TemplateConfig::default();
        let cal = rectified(&[]);
        let view = SheetView {
            calibration: &cal,
            normalized: &cal.raster,
            template: &template,
        };
        let grid = DetectedGrid::default();
        let circles = template_circles(&template);

        let few: Vec<Circle> = circles.iter().copied().take(399).collect();
        assert_eq!(
            grid.assemble(&view, few).unwrap_err(),
            GridFailure::TooFewCircles {
                found: 399,
                required: 400
            }
        );
        // Enough circles, but rows 13 and 14 are incomplete or missing
        let enough: Vec<Circle> = circles.iter().copied().take(400).collect();
        assert_eq!(
            grid.assemble(&view, enough).unwrap_err(),
            GridFailure::RowCount {
                found: 14,
                expected: 15
            }
        );
    }

    #[test]
    fn test_assemble_rejects_short_row() {
        let template = TemplateConfig::default();
        let cal = rectified(&[]);
        let view = SheetView {
            calibration: &cal,
            normalized: &cal.raster,
            template: &template,
        };
        let mut circles = template_circles(&template);
        // Row 4, third column, option B
        circles.remove(4 * 30 + 2 * OPTION_COUNT + 1);
        assert_eq!(
            DetectedGrid::default().assemble(&view, circles).unwrap_err(),
            GridFailure::RowSize {
                row: 4,
                found: 29,
                expected: 30
            }
        );
    }
}
