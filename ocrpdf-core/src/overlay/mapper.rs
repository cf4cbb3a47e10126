use glam::DVec2;

use crate::{
    analysis::bbox::Bbox,
    consts::*,
    diagnostics::Diagnostics,
    layout::element::{CoordSpace, TextRun},
};

/// Rounds to one decimal place, half up.
pub fn round1(value: f64) -> f64 {
    (0.5 + 10.0 * value).floor() / 10.0
}

/// Converts run boxes from hOCR pixels to PDF points.
#[derive(Debug, Clone)]
pub enum CoordinateMapper {
    /// Linear mapping from the OCR page box onto the output page.
    Scaled { ocr_size: DVec2, page_size: DVec2 },
    /// Degraded placement used when the markup has no usable page box:
    /// every run starts at a fixed left edge and successive runs step down
    /// from the top of the page.
    Fallback {
        page_height: f64,
        points_per_pixel: f64,
        placed: usize,
    },
}

impl CoordinateMapper {
    pub fn new(
        page_bbox: Option<Bbox>,
        page_size: DVec2,
        scan_dpi: u32,
        diag: &mut Diagnostics,
    ) -> Self {
        match page_bbox {
            Some(bbox) if !bbox.is_degenerate() => CoordinateMapper::Scaled {
                ocr_size: DVec2::new(bbox.width(), bbox.height()),
                page_size,
            },
            other => {
                if other.is_some() {
                    diag.error("page bounding box has no area, using fallback placement");
                }
                CoordinateMapper::Fallback {
                    page_height: page_size.y,
                    points_per_pixel: POINTS_PER_INCH / f64::from(scan_dpi),
                    placed: 0,
                }
            }
        }
    }

    /// Maps one pixel-space point. Only meaningful for the scaled mapping.
    pub fn map_point(ocr_size: DVec2, page_size: DVec2, point: DVec2) -> DVec2 {
        DVec2::new(
            round1(point.x * page_size.x / ocr_size.x),
            round1(page_size.y - point.y * page_size.y / ocr_size.y),
        )
    }

    /// Maps the box of `run` in place. A run that is already in page space
    /// is left untouched and `false` is returned.
    pub fn map_run(&mut self, run: &mut TextRun) -> bool {
        if run.is_mapped() {
            return false;
        }

        run.bbox = match self {
            CoordinateMapper::Scaled {
                ocr_size,
                page_size,
            } => Bbox::from_corners(
                Self::map_point(*ocr_size, *page_size, run.bbox.min),
                Self::map_point(*ocr_size, *page_size, run.bbox.max),
            ),
            CoordinateMapper::Fallback {
                page_height,
                points_per_pixel,
                placed,
            } => {
                let top = *page_height - FALLBACK_LINE_STEP * *placed as f64;
                let right = FALLBACK_LEFT + round1(run.bbox.width() * *points_per_pixel);
                *placed += 1;
                Bbox::new(
                    DVec2::new(FALLBACK_LEFT, top - FALLBACK_LINE_STEP),
                    DVec2::new(right, top),
                )
            }
        };
        run.space = CoordSpace::Page;
        true
    }

    pub fn map_all(&mut self, runs: &mut [TextRun], diag: &mut Diagnostics) {
        for run in runs.iter_mut() {
            if !self.map_run(run) {
                diag.warn(format!("run `{}` is already mapped, left as is", run.text));
            }
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, CoordinateMapper::Fallback { .. })
    }
}
