use std::path::Path;

use ab_glyph::{Font, FontVec};
use snafu::ResultExt;
use tracing::*;

use crate::{
    consts::PROBE_FONT_SIZE,
    diagnostics::Diagnostics,
    error::{FontReadSnafu, FontSnafu, OcrPdfError},
    hocr::extract::Extraction,
    layout::element::{PendingPlacement, Rotation, TextRun},
};

pub const REASON_DEGENERATE_RUN: &str = "degenerate run box";
pub const REASON_ZERO_SIZE: &str = "zero size placement";
pub const REASON_ZERO_RENDERED: &str = "zero rendered width";
pub const REASON_BELOW_MIN: &str = "font below minimum";
pub const REASON_ABOVE_MAX: &str = "font above maximum";

/// Measures how wide a string is when set in the output font.
pub trait TextMeasure {
    /// Advance width of `text` at `font_size` points, in points.
    fn text_width(&self, text: &str, font_size: f64) -> f64;
}

/// Probe context backed by the TrueType font that is embedded in the PDF.
pub struct GlyphMeasure {
    font: FontVec,
}

impl GlyphMeasure {
    pub fn from_file(path: &Path) -> Result<Self, OcrPdfError> {
        let bytes = std::fs::read(path).context(FontReadSnafu {
            path: path.to_string_lossy().to_string(),
        })?;
        let font = FontVec::try_from_vec(bytes).context(FontSnafu {})?;
        info!("loaded probe font {}", path.display());
        Ok(Self { font })
    }
}

impl TextMeasure for GlyphMeasure {
    fn text_width(&self, text: &str, font_size: f64) -> f64 {
        let Some(units_per_em) = self.font.units_per_em() else {
            return 0.0;
        };

        // pdf viewers apply no kerning to a plain text object
        let advance: f32 = text
            .chars()
            .map(|c| self.font.h_advance_unscaled(self.font.glyph_id(c)))
            .sum();

        f64::from(advance) * font_size / f64::from(units_per_em)
    }
}

/// Rounds to two decimal places, half up.
pub fn round2(value: f64) -> f64 {
    (0.5 + 100.0 * value).floor() / 100.0
}

/// Admissible font size range; an unset side admits anything.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SizeBounds {
    pub min: Option<f64>,
    pub max: Option<f64>,
}

/// Why a group of runs was not turned into a placement.
#[derive(Debug, Clone, PartialEq)]
pub struct Discard {
    pub reason: &'static str,
    pub detail: String,
    /// Geometry problems are errors; size bounds are ordinary noise rejection.
    pub is_error: bool,
}

/// Derives font size and orientation of each group from its geometry.
pub struct Estimator<'m> {
    measure: &'m dyn TextMeasure,
    bounds: SizeBounds,
}

impl<'m> Estimator<'m> {
    pub fn new(measure: &'m dyn TextMeasure, bounds: SizeBounds) -> Self {
        Self { measure, bounds }
    }

    /// Resolves every group of mapped runs. Runs with an empty box are
    /// dropped first; groups that cannot be sized are dropped whole.
    pub fn estimate(&self, extraction: &Extraction, diag: &mut Diagnostics) -> Vec<PendingPlacement> {
        let mut placements = Vec::with_capacity(extraction.groups.len());

        for group in &extraction.groups {
            let runs = group
                .iter()
                .copied()
                .filter(|&index| {
                    let run = &extraction.runs[index];
                    if run.bbox.is_degenerate() {
                        diag.error(format!(
                            "run `{}` has a zero width or height box, dropped",
                            run.text
                        ));
                        diag.discard(REASON_DEGENERATE_RUN, 1);
                        return false;
                    }
                    true
                })
                .collect::<Vec<_>>();

            if runs.is_empty() {
                continue;
            }

            match self.resolve(&extraction.runs, &runs) {
                Ok(placement) => placements.push(placement),
                Err(discard) => {
                    if discard.is_error {
                        diag.error(&discard.detail);
                    } else {
                        debug!("{}", discard.detail);
                    }
                    diag.discard(discard.reason, runs.len());
                }
            }
        }

        placements
    }

    /// Sizes one group of runs given by index into `all`.
    pub fn resolve(&self, all: &[TextRun], group: &[usize]) -> Result<PendingPlacement, Discard> {
        let members = group.iter().map(|&index| &all[index]);

        let mut box_width = 0.0;
        let mut box_height = 0.0;
        let mut rendered = 0.0;
        let mut chars = 0;
        for run in members {
            box_width += run.bbox.width().max(0.0);
            box_height += run.bbox.height().max(0.0);
            rendered += self.measure.text_width(&run.text, PROBE_FONT_SIZE);
            chars += run.text.chars().count();
        }
        let text = || {
            group
                .iter()
                .map(|&index| all[index].text.as_str())
                .collect::<Vec<_>>()
                .join(" ")
        };

        if box_width <= 0.0 || box_height <= 0.0 {
            return Err(Discard {
                reason: REASON_ZERO_SIZE,
                detail: format!("placement `{}` has no width or height, dropped", text()),
                is_error: true,
            });
        }
        if rendered <= 0.0 {
            return Err(Discard {
                reason: REASON_ZERO_RENDERED,
                detail: format!("font renders `{}` with no width, dropped", text()),
                is_error: true,
            });
        }

        let (rotation, scale) = if box_height / box_width > 1.0 && chars > 3 {
            (Rotation::Vertical, box_height / rendered)
        } else {
            (Rotation::Horizontal, box_width / rendered)
        };
        let font_size = round2(PROBE_FONT_SIZE * scale);

        if let Some(min) = self.bounds.min {
            if font_size < min {
                return Err(Discard {
                    reason: REASON_BELOW_MIN,
                    detail: format!("`{}` at {font_size}pt below minimum {min}pt", text()),
                    is_error: false,
                });
            }
        }
        if let Some(max) = self.bounds.max {
            if font_size > max {
                return Err(Discard {
                    reason: REASON_ABOVE_MAX,
                    detail: format!("`{}` at {font_size}pt above maximum {max}pt", text()),
                    is_error: false,
                });
            }
        }

        Ok(PendingPlacement {
            runs: group.to_vec(),
            font_size,
            rotation,
        })
    }
}
