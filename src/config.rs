//! Immutable recognizer configuration.
//!
//! Every geometric value is expressed in reference-resolution pixels (the
//! template page at 300 DPI) and scaled at runtime to the raster being
//! processed. Thresholds are tunable per template and scan source.

use crate::models::{DecodeAttempt, IdentityFormat, Point, StrategyKind};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Errors raised while loading or validating a configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Reading the configuration file failed
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    /// The file is not valid configuration JSON
    #[error("failed to parse config: {0}")]
    Json(#[from] serde_json::Error),
    /// A value is out of its allowed range
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Top-level configuration handed to [`crate::Recognizer::new`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecognizerConfig {
    /// Canonical template coordinates
    pub template: TemplateConfig,
    /// Marker detection, rectification and deskew fallback
    pub calibration: CalibrationConfig,
    /// Contrast normalization
    pub normalize: NormalizeConfig,
    /// Darkness measurement
    pub sampling: SamplingConfig,
    /// Fixed-grid strategy
    pub fixed_grid: FixedGridConfig,
    /// Detected-grid strategy
    pub detected_grid: DetectedGridConfig,
    /// Localization strategies in the order they are tried
    pub strategies: Vec<StrategyKind>,
    /// Answer classification thresholds
    pub classifier: ClassifierConfig,
    /// Identity code decoding
    pub identity: IdentityConfig,
    /// Smallest accepted raster side in pixels
    pub min_image_side: u32,
}

impl Default for RecognizerConfig {
    fn default() -> Self {
        Self {
            template: TemplateConfig::default(),
            calibration: CalibrationConfig::default(),
            normalize: NormalizeConfig::default(),
            sampling: SamplingConfig::default(),
            fixed_grid: FixedGridConfig::default(),
            detected_grid: DetectedGridConfig::default(),
            strategies: vec![StrategyKind::Detected, StrategyKind::Fixed],
            classifier: ClassifierConfig::default(),
            identity: IdentityConfig::default(),
            min_image_side: 200,
        }
    }
}

impl RecognizerConfig {
    /// Parse a (possibly partial) JSON configuration; missing fields keep defaults
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a JSON configuration file
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Pretty-printed JSON
    pub fn to_json_pretty(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Check value ranges that would otherwise make recognition meaningless
    pub fn validate(&self) -> Result<(), ConfigError> {
        let t = &self.template;
        ensure(t.reference_width > 0.0 && t.reference_height > 0.0, "reference size must be positive")?;
        ensure(!t.column_x.is_empty() && !t.row_y.is_empty(), "template needs columns and rows")?;
        ensure(t.bubble_radius > 0.0 && t.option_spacing > 0.0, "bubble geometry must be positive")?;
        let (rw, rh) = t.rectified_size();
        ensure(rw > 0 && rh > 0, "markers must span a positive rectangle")?;

        let c = &self.calibration;
        ensure(c.min_marker_area < c.max_marker_area, "marker area range is empty")?;
        ensure(c.min_aspect < c.max_aspect, "marker aspect range is empty")?;
        ensure(
            (0.0..1.0).contains(&c.split_x) && (0.0..1.0).contains(&c.split_y),
            "quadrant splits must be fractions",
        )?;

        let n = &self.normalize;
        ensure(n.gamma > 0.0, "gamma must be positive")?;
        ensure(n.tiles_x > 0 && n.tiles_y > 0, "tile grid must be non-empty")?;

        ensure(self.sampling.window_factor > 0.0, "window factor must be positive")?;
        ensure(self.fixed_grid.search_step > 0.0, "search step must be positive")?;

        let d = &self.detected_grid;
        ensure(0.0 < d.min_radius && d.min_radius < d.max_radius, "circle radius range is empty")?;
        ensure(
            d.min_distance > 0.0 && d.min_distance < t.option_spacing,
            "circle spacing must be positive and below the option spacing",
        )?;

        ensure(!self.strategies.is_empty(), "at least one localization strategy is required")?;
        ensure(
            !self.identity.enabled || !self.identity.attempts.is_empty(),
            "identity decoding needs at least one attempt",
        )?;
        Ok(())
    }
}

fn ensure(condition: bool, message: &str) -> Result<(), ConfigError> {
    if condition {
        Ok(())
    } else {
        Err(ConfigError::Invalid(message.to_string()))
    }
}

/// Canonical template geometry shared with the sheet generator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplateConfig {
    /// Reference page width (A4 at 300 DPI)
    pub reference_width: f32,
    /// Reference page height
    pub reference_height: f32,
    /// Marker centroids on the reference page: TL, TR, BL, BR
    pub markers: [Point; 4],
    /// Printed marker side length
    pub marker_size: f32,
    /// X of option A for each column, relative to the TL marker
    pub column_x: Vec<f32>,
    /// Y of each row, relative to the TL marker
    pub row_y: Vec<f32>,
    /// Distance between neighbouring options
    pub option_spacing: f32,
    /// Printed bubble radius
    pub bubble_radius: f32,
}

impl Default for TemplateConfig {
    fn default() -> Self {
        Self {
            reference_width: 2481.0,
            reference_height: 3509.0,
            markers: [
                Point::new(83.0, 2306.0),
                Point::new(2396.0, 2306.0),
                Point::new(83.0, 3397.0),
                Point::new(2396.0, 3397.0),
            ],
            marker_size: 60.0,
            column_x: vec![97.0, 479.0, 863.0, 1245.0, 1631.0, 2013.0],
            row_y: (0..15).map(|k| 126.0 + 60.0 * k as f32).collect(),
            option_spacing: 61.0,
            bubble_radius: 19.0,
        }
    }
}

impl TemplateConfig {
    /// Size of the marker-bounded canonical rectangle
    pub fn rectified_size(&self) -> (u32, u32) {
        let [tl, tr, bl, _] = self.markers;
        let w = (tr.x - tl.x).round();
        let h = (bl.y - tl.y).round();
        (w.max(0.0) as u32, h.max(0.0) as u32)
    }

    /// Marker centroids mapped into the canonical rectangle
    pub fn rectified_corners(&self) -> [Point; 4] {
        let (w, h) = self.rectified_size();
        let (w, h) = (w as f32, h as f32);
        [
            Point::new(0.0, 0.0),
            Point::new(w, 0.0),
            Point::new(0.0, h),
            Point::new(w, h),
        ]
    }

    /// Questions on the sheet (columns x rows)
    pub fn question_count(&self) -> usize {
        self.column_x.len() * self.row_y.len()
    }

    /// Rows per column
    pub fn rows(&self) -> usize {
        self.row_y.len()
    }

    /// Number of question columns
    pub fn columns(&self) -> usize {
        self.column_x.len()
    }

    /// Question number for a column/row cell: `col * rows + row + 1`
    pub fn question_number(&self, column: usize, row: usize) -> u16 {
        (column * self.rows() + row + 1) as u16
    }

    /// Canonical centre of `option` (0 = A) for a column/row cell
    pub fn bubble_center(&self, column: usize, row: usize, option: usize) -> Point {
        Point::new(
            self.column_x[column] + option as f32 * self.option_spacing,
            self.row_y[row],
        )
    }

    /// Resolution scale of a raster relative to the reference page
    pub fn resolution_scale(&self, width: u32, height: u32) -> f32 {
        (width as f32 / self.reference_width).max(height as f32 / self.reference_height)
    }
}

/// How the calibration binarizes before looking for markers
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkerThreshold {
    /// Automatic global threshold
    Otsu,
    /// Fixed cutoff, pixels below are dark
    Fixed(u8),
}

/// What to do when the four markers cannot be found
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkerFallback {
    /// Correct rotation from page lines and continue
    Deskew,
    /// Report `MarkersNotFound`
    Fail,
}

/// Marker detection parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    /// Binarization used for marker extraction
    pub threshold: MarkerThreshold,
    /// Smallest marker pixel area at reference resolution
    pub min_marker_area: f32,
    /// Largest marker pixel area at reference resolution
    pub max_marker_area: f32,
    /// Lower bound of bounding box width / height
    pub min_aspect: f32,
    /// Upper bound of bounding box width / height
    pub max_aspect: f32,
    /// Minimum share of the bounding box covered by the component
    pub min_fill: f32,
    /// Left/right quadrant split as a fraction of the width
    pub split_x: f32,
    /// Top/bottom quadrant split as a fraction of the height
    pub split_y: f32,
    /// Behaviour when markers are missing
    pub fallback: MarkerFallback,
    /// Line-based rotation fallback
    pub deskew: DeskewConfig,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            threshold: MarkerThreshold::Otsu,
            min_marker_area: 1500.0,
            max_marker_area: 12000.0,
            min_aspect: 0.7,
            max_aspect: 1.4,
            min_fill: 0.6,
            split_x: 0.5,
            split_y: 0.8,
            fallback: MarkerFallback::Deskew,
            deskew: DeskewConfig::default(),
        }
    }
}

/// Line-based deskew parameters; lengths at reference resolution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeskewConfig {
    /// Canny low hysteresis threshold
    pub canny_low: f32,
    /// Canny high hysteresis threshold
    pub canny_high: f32,
    /// Minimum accumulator votes for a line
    pub vote_threshold: f32,
    /// Shortest accepted segment
    pub min_line_length: f32,
    /// Largest gap bridged inside a segment
    pub max_line_gap: f32,
    /// Accepted deviation from horizontal/vertical, degrees
    pub angle_band: f64,
    /// Fewer segments than this skips the rotation
    pub min_lines: usize,
    /// Median angles below this (degrees) are not corrected
    pub min_angle: f64,
    /// Correction is clamped to this many degrees
    pub max_angle: f64,
}

impl Default for DeskewConfig {
    fn default() -> Self {
        Self {
            canny_low: 50.0,
            canny_high: 150.0,
            vote_threshold: 100.0,
            min_line_length: 200.0,
            max_line_gap: 10.0,
            angle_band: 15.0,
            min_lines: 5,
            min_angle: 0.3,
            max_angle: 10.0,
        }
    }
}

/// CLAHE + gamma parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizeConfig {
    /// Skip normalization entirely when false
    pub enabled: bool,
    /// Histogram clip limit, in multiples of the mean bin height
    pub clip_limit: f32,
    /// Tiles across
    pub tiles_x: u32,
    /// Tiles down
    pub tiles_y: u32,
    /// Gamma; values above 1 brighten midtones
    pub gamma: f32,
}

impl Default for NormalizeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            clip_limit: 2.0,
            tiles_x: 8,
            tiles_y: 8,
            gamma: 1.2,
        }
    }
}

/// Darkness measurement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    /// Pixels below this intensity count as dark
    pub dark_threshold: u8,
    /// Sampling window half-side as a multiple of the bubble radius
    pub window_factor: f32,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            dark_threshold: 160,
            window_factor: 1.3,
        }
    }
}

/// Fixed-grid local search; distances in canonical units
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FixedGridConfig {
    /// Horizontal search half-range
    pub search_x: f32,
    /// Vertical search half-range
    pub search_y: f32,
    /// Step between search offsets
    pub search_step: f32,
    /// Aspect divergence that is logged and reported as a warning
    pub aspect_warn: f32,
    /// Aspect divergence at which the strategy refuses the raster
    pub aspect_fail: f32,
}

impl Default for FixedGridConfig {
    fn default() -> Self {
        Self {
            search_x: 10.0,
            search_y: 20.0,
            search_step: 4.0,
            aspect_warn: 0.20,
            aspect_fail: 0.50,
        }
    }
}

/// Circle detection and row organization; distances in canonical units
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectedGridConfig {
    /// Smallest circle radius
    pub min_radius: f32,
    /// Largest circle radius
    pub max_radius: f32,
    /// Minimum distance between accepted centres
    pub min_distance: f32,
    /// Fewer circles than this fails the strategy
    pub min_circles: usize,
    /// Centres closer than this vertically share a row
    pub row_threshold: f32,
    /// Margin around the marker rectangle still searched
    pub margin: f32,
    /// Gradient magnitude (fraction of the maximum) that casts votes
    pub gradient_fraction: f32,
    /// Peak votes (fraction of the strongest peak) to accept a circle
    pub min_vote_fraction: f32,
    /// Edge ring response (fraction of the strongest circle) to keep a circle
    pub min_ring_fraction: f32,
}

impl Default for DetectedGridConfig {
    fn default() -> Self {
        Self {
            min_radius: 14.0,
            max_radius: 28.0,
            // Three quarters of the option spacing
            min_distance: 45.0,
            min_circles: 400,
            row_threshold: 30.0,
            margin: 40.0,
            gradient_fraction: 0.15,
            min_vote_fraction: 0.25,
            min_ring_fraction: 0.3,
        }
    }
}

/// Answer classification thresholds, darkness in percent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Best darkness below this is always blank
    pub blank_floor: f32,
    /// Spread below this (with a small diff) means nothing is marked
    pub min_std: f32,
    /// Smallest best-minus-second gap that carries any signal
    pub min_diff: f32,
    /// Darkness that counts as a confident mark
    pub marked: f32,
    /// How far below `marked` the runner-up may sit and still be a double
    pub double_tolerance: f32,
    /// Gaps below this between two marked bubbles mean a double mark
    pub double_delta: f32,
    /// Spread required by the statistical double-mark rule
    pub double_min_std: f32,
    /// z-score both top bubbles must exceed for the statistical double rule
    pub double_z: f32,
    /// Gap that alone identifies the answer
    pub clear_delta: f32,
    /// Gap that identifies a marked (>= `marked`) answer
    pub moderate_delta: f32,
    /// best / second ratio identifying a faint but distinct answer
    pub faint_ratio: f32,
    /// z-score identifying the best bubble as an outlier
    pub outlier_z: f32,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            blank_floor: 15.0,
            min_std: 1.2,
            min_diff: 1.2,
            marked: 30.0,
            double_tolerance: 5.0,
            double_delta: 8.0,
            double_min_std: 3.0,
            double_z: 1.0,
            clear_delta: 10.0,
            moderate_delta: 4.0,
            faint_ratio: 2.0,
            outlier_z: 1.5,
        }
    }
}

/// Region of interest as fractions of the raster
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RoiFraction {
    /// Left edge
    pub x_min: f32,
    /// Right edge
    pub x_max: f32,
    /// Top edge
    pub y_min: f32,
    /// Bottom edge
    pub y_max: f32,
}

/// Identity decoder parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Run the decoder at all
    pub enabled: bool,
    /// Expected structure of the decoded text
    pub format: IdentityFormat,
    /// Ordered attempts, first non-empty decode wins
    pub attempts: Vec<DecodeAttempt>,
    /// Where the template prints the code
    pub roi: RoiFraction,
    /// Adaptive binarization window (pixels)
    pub adaptive_block: u32,
    /// Adaptive binarization offset below the local mean
    pub adaptive_offset: i32,
    /// Scaled attempts producing a side below this are skipped
    pub min_scaled_side: u32,
    /// CLAHE clip limit for the enhanced attempt
    pub enhance_clip_limit: f32,
    /// CLAHE tiles per side for the enhanced attempt
    pub enhance_tiles: u32,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            format: IdentityFormat::default(),
            attempts: DecodeAttempt::default_order(),
            roi: RoiFraction {
                x_min: 0.65,
                x_max: 1.0,
                y_min: 0.0,
                y_max: 0.25,
            },
            adaptive_block: 11,
            adaptive_offset: 2,
            min_scaled_side: 100,
            enhance_clip_limit: 2.0,
            enhance_tiles: 8,
        }
    }
}
