//! Synthetic answer sheets drawn in the template coordinate system.
//!
//! Used by tests and benches to produce pages with known answers, optionally
//! without markers, rotated, or seen in perspective.

use crate::config::TemplateConfig;
use crate::models::{OptionLabel, Point, RasterImage};
use crate::utils::geometry::{PerspectiveTransform, warp_perspective, warp_with};
use image::{GrayImage, Luma};
use imageproc::drawing::{draw_filled_circle_mut, draw_filled_rect_mut, draw_hollow_circle_mut};
use imageproc::rect::Rect as PixelRect;
use std::collections::BTreeMap;

const PAPER: Luma<u8> = Luma([245]);
const INK: Luma<u8> = Luma([20]);
const OUTLINE: Luma<u8> = Luma([90]);

/// A QR symbol to stamp on the page, as its module matrix
#[derive(Debug, Clone, PartialEq)]
pub struct QrStamp {
    /// Modules per side
    pub width: usize,
    /// Row-major module colours, `true` = dark
    pub modules: Vec<bool>,
    /// Top-left corner on the reference page, quiet zone excluded
    pub origin: Point,
    /// Module side on the reference page
    pub module_size: f32,
}

/// Page description
#[derive(Debug, Clone)]
pub struct SynthSheet {
    /// Output pixels per reference pixel
    pub scale: f32,
    /// Print the four fiducial markers
    pub markers: bool,
    /// Print a page frame and header rules
    pub rules: bool,
    /// Filled options per question
    pub marks: BTreeMap<u16, Vec<OptionLabel>>,
    /// Intensity of filled bubbles
    pub fill: u8,
    /// Identity code symbol
    pub qr: Option<QrStamp>,
    /// Bubbles left unprinted
    pub missing: Vec<(u16, OptionLabel)>,
}

impl SynthSheet {
    /// Empty sheet with markers at `scale` (0.5 = 150 DPI)
    pub fn new(scale: f32) -> Self {
        Self {
            scale,
            markers: true,
            rules: false,
            marks: BTreeMap::new(),
            fill: 40,
            qr: None,
            missing: Vec::new(),
        }
    }

    /// Fill `label` on `question`
    pub fn mark(mut self, question: u16, label: OptionLabel) -> Self {
        self.marks.entry(question).or_default().push(label);
        self
    }

    /// Fill `label` on every question of `template`
    pub fn mark_all(mut self, template: &TemplateConfig, label: OptionLabel) -> Self {
        for q in 1..=template.question_count() as u16 {
            self = self.mark(q, label);
        }
        self
    }

    /// Omit the fiducial markers
    pub fn without_markers(mut self) -> Self {
        self.markers = false;
        self
    }

    /// Print long straight rules usable for skew estimation
    pub fn with_rules(mut self) -> Self {
        self.rules = true;
        self
    }

    /// Leave one bubble outline unprinted
    pub fn without_bubble(mut self, question: u16, label: OptionLabel) -> Self {
        self.missing.push((question, label));
        self
    }

    /// Stamp a QR symbol
    pub fn with_qr(mut self, stamp: QrStamp) -> Self {
        self.qr = Some(stamp);
        self
    }

    /// Rasterize the page
    pub fn render(&self, template: &TemplateConfig) -> RasterImage {
        let s = self.scale;
        let w = (template.reference_width * s).round() as u32;
        let h = (template.reference_height * s).round() as u32;
        let mut img = GrayImage::from_pixel(w, h, PAPER);

        let rect = |img: &mut GrayImage, x: f32, y: f32, rw: f32, rh: f32, color: Luma<u8>| {
            let r = PixelRect::at((x * s).round() as i32, (y * s).round() as i32)
                .of_size(((rw * s).round() as u32).max(1), ((rh * s).round() as u32).max(1));
            draw_filled_rect_mut(img, r, color);
        };

        if self.rules {
            let (pw, ph) = (template.reference_width, template.reference_height);
            let t = 4.0;
            rect(&mut img, 40.0, 40.0, pw - 80.0, t, INK);
            rect(&mut img, 40.0, ph - 44.0, pw - 80.0, t, INK);
            rect(&mut img, 40.0, 40.0, t, ph - 80.0, INK);
            rect(&mut img, pw - 44.0, 40.0, t, ph - 80.0, INK);
            for y in [400.0, 800.0, 1200.0, 1600.0, 2000.0] {
                rect(&mut img, 150.0, y, pw - 300.0, t, INK);
            }
        }

        if self.markers {
            let m = template.marker_size;
            for c in template.markers {
                rect(&mut img, c.x - m / 2.0, c.y - m / 2.0, m, m, INK);
            }
        }

        let origin = template.markers[0];
        let radius = template.bubble_radius * s;
        let ring = (2.0 * s).round().max(1.0) as i32;
        for column in 0..template.columns() {
            for row in 0..template.rows() {
                let question = template.question_number(column, row);
                let filled = self.marks.get(&question);
                for label in OptionLabel::ALL {
                    if self.missing.contains(&(question, label)) {
                        continue;
                    }
                    let c = template
                        .bubble_center(column, row, label.index())
                        .translate(origin.x, origin.y)
                        .scale(s, s);
                    let center = (c.x.round() as i32, c.y.round() as i32);
                    let r = radius.round() as i32;
                    for k in 0..ring {
                        draw_hollow_circle_mut(&mut img, center, r - k, OUTLINE);
                    }
                    if filled.is_some_and(|f| f.contains(&label)) {
                        draw_filled_circle_mut(&mut img, center, r, Luma([self.fill]));
                    }
                }
            }
        }

        if let Some(qr) = &self.qr {
            let m = qr.module_size;
            for (i, dark) in qr.modules.iter().enumerate() {
                if *dark {
                    let (mx, my) = ((i % qr.width) as f32, (i / qr.width) as f32);
                    rect(&mut img, qr.origin.x + mx * m, qr.origin.y + my * m, m, m, Luma([0]));
                }
            }
        }

        RasterImage::new(img)
    }
}

/// Rotate page content by `skew_deg` about the centre without enlarging the
/// canvas; horizontal lines then descend to the right for positive angles
pub fn rotate_page(raster: &RasterImage, skew_deg: f64) -> RasterImage {
    let (sin, cos) = skew_deg.to_radians().sin_cos();
    let (cx, cy) = (raster.width() as f64 / 2.0, raster.height() as f64 / 2.0);
    warp_with(raster, raster.width(), raster.height(), |x, y| {
        let (dx, dy) = (x - cx, y - cy);
        (cos * dx + sin * dy + cx, -sin * dx + cos * dy + cy)
    })
}

/// Re-project the page so its corners land on `corners` (TL, TR, BL, BR);
/// returns the image and the page-to-image transform
pub fn project_page(raster: &RasterImage, corners: [Point; 4]) -> Option<(RasterImage, PerspectiveTransform)> {
    let (w, h) = (raster.width() as f32, raster.height() as f32);
    let page = [
        Point::new(0.0, 0.0),
        Point::new(w, 0.0),
        Point::new(0.0, h),
        Point::new(w, h),
    ];
    let transform = PerspectiveTransform::from_points(&page, &corners)?;
    let warped = warp_perspective(raster, &transform, raster.width(), raster.height())?;
    Some((warped, transform))
}
