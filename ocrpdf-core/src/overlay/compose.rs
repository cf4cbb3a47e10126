use tracing::*;

use crate::{
    diagnostics::Diagnostics,
    hocr::extract::Extraction,
    layout::element::{PendingPlacement, Rotation, TextOp},
    overlay::filter::{Admission, LineFilter},
};

/// Text operations resolved for one page.
#[derive(Debug, Default)]
pub struct Composition {
    pub ops: Vec<TextOp>,
    pub placed: usize,
}

/// Turns placements into text operations, consulting `filter` once per line.
///
/// Runs of rejected lines are skipped and tallied under the rejection
/// reason. Admitted run texts are collected into their line's kept words.
pub fn compose(
    extraction: &mut Extraction,
    placements: &[PendingPlacement],
    filter: &dyn LineFilter,
    debug: bool,
    diag: &mut Diagnostics,
) -> Composition {
    let mut composition = Composition::default();

    for placement in placements {
        for &index in &placement.runs {
            let run = &extraction.runs[index];
            let line = &mut extraction.lines[run.line];

            if let Admission::Reject(reason) = line.verdict_with(|text| filter.check(text)) {
                debug!("run `{}` skipped: {reason}", run.text);
                diag.discard(reason, 1);
                continue;
            }
            line.kept_words.push(run.text.clone());

            let mut x = run.bbox.min.x;
            if placement.rotation == Rotation::Vertical {
                x += run.bbox.width() / 2.0;
            }

            composition.ops.push(TextOp {
                text: format!("{} ", run.text),
                x,
                y: run.bbox.min.y,
                font_size: placement.font_size,
                rotation: placement.rotation,
                visible: debug,
            });
            composition.placed += 1;
        }
    }

    composition
}

/// Kept words of each admitted line, one transcript line per line group.
pub fn kept_lines(extraction: &Extraction) -> Vec<String> {
    extraction
        .lines
        .iter()
        .filter(|line| !line.kept_words.is_empty())
        .map(|line| line.kept_words.join(" "))
        .collect()
}
