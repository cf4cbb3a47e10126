use std::path::Path;

use pdfium_render::prelude::*;
use snafu::ResultExt;
use tracing::*;

use crate::{
    consts::*,
    error::{ImageReadSnafu, OcrPdfError, PdfiumSnafu},
    layout::{element::TextOp, page::Page},
};

/// Replays resolved pages through pdfium. Makes no layout decisions.
pub struct PdfWriter {
    pdfium: Pdfium,
}

impl PdfWriter {
    /// Binds pdfium from `PDFIUM_DYNAMIC_LIB_PATH`, or the system library
    /// when the variable is unset.
    pub fn new() -> Result<Self, OcrPdfError> {
        let bindings = match std::env::var(PDFIUM_LIB_PATH_ENV_NAME) {
            Ok(pdfium_lib_path) => Pdfium::bind_to_library(
                Pdfium::pdfium_platform_library_name_at_path(&pdfium_lib_path),
            ),
            Err(_) => {
                debug!("{PDFIUM_LIB_PATH_ENV_NAME} unset, binding system pdfium");
                Pdfium::bind_to_system_library()
            }
        }
        .context(PdfiumSnafu {
            stage: "load-dyn-lib",
        })?;

        Ok(Self {
            pdfium: Pdfium::new(bindings),
        })
    }

    /// Writes every page to `output`, draining their pending text operations.
    pub fn write(&self, pages: &mut [Page], font: &Path, output: &Path) -> Result<(), OcrPdfError> {
        let mut document = self
            .pdfium
            .create_new_pdf()
            .context(PdfiumSnafu { stage: "create" })?;
        let font = document
            .fonts_mut()
            .load_true_type_from_file(font, false)
            .context(PdfiumSnafu { stage: "load-font" })?;

        for page in pages.iter_mut() {
            let ops = page.take_ops();
            info!(
                "writing page {} ({} x {} pt, {} text ops)",
                page.page_no,
                page.width,
                page.height,
                ops.len()
            );

            let background = image::open(&page.background).context(ImageReadSnafu {
                path: page.background.to_string_lossy().to_string(),
            })?;
            let image_object = PdfPageImageObject::new_with_width(
                &document,
                &background,
                PdfPoints::new(page.width as f32),
            )
            .context(PdfiumSnafu { stage: "image" })?;

            let text_objects = ops
                .iter()
                .map(|op| text_object(&document, font, op))
                .collect::<Result<Vec<_>, _>>()?;

            let mut pdf_page = document
                .pages_mut()
                .create_page_at_end(PdfPagePaperSize::from_points(
                    PdfPoints::new(page.width as f32),
                    PdfPoints::new(page.height as f32),
                ))
                .context(PdfiumSnafu { stage: "page" })?;

            let objects = pdf_page.objects_mut();
            objects
                .add_image_object(image_object)
                .context(PdfiumSnafu { stage: "image" })?;
            for object in text_objects {
                objects
                    .add_text_object(object)
                    .context(PdfiumSnafu { stage: "text" })?;
            }
        }

        document
            .save_to_file(output)
            .context(PdfiumSnafu { stage: "save" })?;
        info!("wrote {} pages to {}", pages.len(), output.display());
        Ok(())
    }
}

fn text_object<'a>(
    document: &PdfDocument<'a>,
    font: PdfFontToken,
    op: &TextOp,
) -> Result<PdfPageTextObject<'a>, OcrPdfError> {
    let mut object =
        PdfPageTextObject::new(document, &op.text, font, PdfPoints::new(op.font_size as f32))
            .context(PdfiumSnafu { stage: "text" })?;

    let fill = if op.visible {
        PdfColor::new(255, 0, 0, 255)
    } else {
        PdfColor::new(0, 0, 0, 0)
    };
    object
        .set_fill_color(fill)
        .context(PdfiumSnafu { stage: "text" })?;

    let degrees = op.rotation.degrees();
    if degrees != 0.0 {
        object
            .rotate_counter_clockwise_degrees(degrees as f32)
            .context(PdfiumSnafu { stage: "rotate" })?;
    }
    object
        .translate(PdfPoints::new(op.x as f32), PdfPoints::new(op.y as f32))
        .context(PdfiumSnafu { stage: "translate" })?;

    Ok(object)
}
