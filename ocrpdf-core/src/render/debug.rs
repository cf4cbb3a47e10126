use std::path::Path;

use ab_glyph::{FontVec, PxScale};
use glam::DVec2;
use image::Rgb;
use imageproc::{
    drawing::{draw_hollow_rect_mut, draw_text_mut},
    rect::Rect,
};
use snafu::ResultExt;
use tracing::*;

use crate::{
    analysis::bbox::Bbox,
    error::{ImageReadSnafu, ImageWriteSnafu, OcrPdfError},
    hocr::extract::Extraction,
};

const BOX_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
const GROUP_COLOR: Rgb<u8> = Rgb([0, 160, 0]);
const LABEL_COLOR: Rgb<u8> = Rgb([0, 0, 255]);
const LABEL_SIZE: f64 = 14.0;

/// Draws the pixel boxes of every extracted run onto a copy of `source`.
/// Groups of several runs are outlined as a whole and labelled with their
/// index.
///
/// Must run before the boxes are mapped to page space.
pub fn draw_boxes(
    source: &Path,
    extraction: &Extraction,
    font: Option<&FontVec>,
    output: &Path,
) -> Result<(), OcrPdfError> {
    let mut image = image::open(source)
        .context(ImageReadSnafu {
            path: source.to_string_lossy().to_string(),
        })?
        .to_rgb8();
    let limit = DVec2::new(f64::from(image.width()), f64::from(image.height()));

    for (group_no, group) in extraction.groups.iter().enumerate() {
        let boxes = group
            .iter()
            .map(|&index| &extraction.runs[index])
            .filter(|run| !run.is_mapped())
            .map(|run| run.bbox.clamp(DVec2::ZERO, limit))
            .filter(|bbox| !bbox.is_degenerate())
            .collect::<Vec<_>>();
        let Some(extent) = boxes.iter().copied().reduce(|a, b| a.union(&b)) else {
            continue;
        };

        for bbox in &boxes {
            draw_hollow_rect_mut(&mut image, rect(bbox), BOX_COLOR);
        }
        if boxes.len() > 1 {
            draw_hollow_rect_mut(&mut image, rect(&extent), GROUP_COLOR);
        }

        if let Some(font) = font {
            draw_text_mut(
                &mut image,
                LABEL_COLOR,
                extent.min.x as i32,
                (extent.min.y - LABEL_SIZE).max(0.0) as i32,
                PxScale::from(LABEL_SIZE as f32),
                font,
                &group_no.to_string(),
            );
        }
    }

    image.save(output).context(ImageWriteSnafu {
        path: output.to_string_lossy().to_string(),
    })?;
    info!("wrote box overlay {}", output.display());
    Ok(())
}

fn rect(bbox: &Bbox) -> Rect {
    Rect::at(bbox.min.x as i32, bbox.min.y as i32)
        .of_size(bbox.width().ceil() as u32, bbox.height().ceil() as u32)
}
