use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use ab_glyph::FontVec;
use glam::DVec2;
use roxmltree::Document;
use serde::Serialize;
use snafu::ResultExt;
use tracing::*;

use crate::{
    config::*,
    consts::POINTS_PER_INCH,
    diagnostics::Diagnostics,
    error::{ImageReadSnafu, IoSnafu, MarkupSnafu, OcrPdfError, ReportSnafu},
    hocr::{
        extract::{extract, Extraction},
        normalize::{decode, normalize, parsing_options},
    },
    layout::page::{Page, PageStats},
    overlay::{
        compose::{compose, kept_lines},
        filter::{AdmitAll, LineFilter},
        mapper::CoordinateMapper,
        metrics::{Estimator, GlyphMeasure, SizeBounds, TextMeasure},
    },
    render::{debug::draw_boxes, pdf::PdfWriter},
};

use self::tools::{derived_path, CleanTask, OcrTask, Programs, ScaleTask, Task};

pub mod tools;

/// Turns scanned images into PDF pages carrying an invisible text layer.
///
/// Images are processed as they are added, strictly in order. The
/// transcript and the diagnostic log accumulate for the lifetime of the
/// pipeline.
pub struct OcrPdf {
    config: OcrConfig,
    programs: Programs,
    measure: Box<dyn TextMeasure>,
    pages: Vec<Page>,
    transcript: Vec<String>,
    diag: Diagnostics,
}

#[derive(Serialize)]
struct PageReport<'a> {
    page: usize,
    width: f64,
    height: f64,
    source: &'a Path,
    background: &'a Path,
    #[serde(flatten)]
    stats: &'a PageStats,
}

impl OcrPdf {
    /// Loads the configured font once; it measures every placement.
    pub fn new(config: OcrConfig) -> Result<Self, OcrPdfError> {
        let font = config.resolve_font()?;
        let measure = GlyphMeasure::from_file(&font)?;
        Ok(Self::with_measure(config, Box::new(measure)))
    }

    pub fn with_measure(config: OcrConfig, measure: Box<dyn TextMeasure>) -> Self {
        Self {
            config,
            programs: Programs::default(),
            measure,
            pages: Vec::new(),
            transcript: Vec::new(),
            diag: Diagnostics::new(),
        }
    }

    pub fn with_programs(mut self, programs: Programs) -> Self {
        self.programs = programs;
        self
    }

    pub fn config(&self) -> &OcrConfig {
        &self.config
    }

    pub fn pages(&self) -> &[Page] {
        &self.pages
    }

    pub fn set_engine(&mut self, value: &str) -> Result<(), OcrPdfError> {
        self.config.engine = value.parse()?;
        Ok(())
    }

    pub fn set_granularity(&mut self, value: &str) -> Result<(), OcrPdfError> {
        self.config.granularity = value.parse()?;
        Ok(())
    }

    pub fn set_dpi(&mut self, value: &str) -> Result<(), OcrPdfError> {
        self.config.scan_dpi = parse_dpi(value)?;
        Ok(())
    }

    pub fn set_output_dpi(&mut self, value: &str) -> Result<(), OcrPdfError> {
        self.config.output_dpi = parse_dpi(value)?;
        Ok(())
    }

    /// `None` clears the bound.
    pub fn set_min_font(&mut self, value: Option<&str>) -> Result<(), OcrPdfError> {
        let min = value.map(parse_font_size).transpose()?;
        if let (Some(min), Some(max)) = (min, self.config.max_font_size) {
            if min > max {
                return Err(OcrPdfError::config(
                    "min font",
                    format!("{min} above maximum {max}"),
                ));
            }
        }
        self.config.min_font_size = min;
        Ok(())
    }

    /// `None` clears the bound.
    pub fn set_max_font(&mut self, value: Option<&str>) -> Result<(), OcrPdfError> {
        let max = value.map(parse_font_size).transpose()?;
        if let (Some(min), Some(max)) = (self.config.min_font_size, max) {
            if min > max {
                return Err(OcrPdfError::config(
                    "max font",
                    format!("{max} below minimum {min}"),
                ));
            }
        }
        self.config.max_font_size = max;
        Ok(())
    }

    pub fn set_quality(&mut self, value: &str) -> Result<(), OcrPdfError> {
        self.config.quality = parse_quality(value)?;
        Ok(())
    }

    pub fn set_workdir(&mut self, value: &str) -> Result<(), OcrPdfError> {
        check_workdir(value)?;
        self.config.workdir = value.to_string();
        Ok(())
    }

    /// `None` disables preprocessing.
    pub fn set_clean(&mut self, options: Option<&str>) -> Result<(), OcrPdfError> {
        if let Some(options) = options {
            check_safe("clean options", options)?;
        }
        self.config.clean_options = options.map(str::to_string);
        Ok(())
    }

    pub fn set_suffix(&mut self, value: &str) -> Result<(), OcrPdfError> {
        check_safe("suffix", value)?;
        self.config.suffix = sanitize_suffix(value);
        Ok(())
    }

    pub fn set_debug(&mut self, debug: bool) {
        self.config.debug = debug;
    }

    pub fn set_filter(&mut self, filter: Option<Arc<dyn LineFilter>>) {
        self.config.filter = filter;
    }

    /// Registers an image as the next page and overlays its OCR text.
    ///
    /// Only an unreadable or unsafe image path is an error; anything that
    /// goes wrong later leaves the page without a text layer and is logged.
    #[instrument(skip_all, fields(image = %path.as_ref().display()))]
    pub fn add_image(&mut self, path: impl AsRef<Path>) -> Result<usize, OcrPdfError> {
        let path = path.as_ref();
        check_safe("image path", &path.to_string_lossy())?;
        let (width, height) = image::image_dimensions(path).context(ImageReadSnafu {
            path: path.to_string_lossy().to_string(),
        })?;

        let points_per_pixel = POINTS_PER_INCH / f64::from(self.config.scan_dpi);
        let page_no = self.pages.len() + 1;
        self.pages.push(Page::new(
            page_no,
            path.to_path_buf(),
            f64::from(width) * points_per_pixel,
            f64::from(height) * points_per_pixel,
        ));

        self.process_page(page_no - 1);
        Ok(page_no)
    }

    #[instrument(skip(self), fields(page = index + 1))]
    fn process_page(&mut self, index: usize) {
        let page_no = self.pages[index].page_no;
        self.diag.begin_page(page_no);
        info!("processing {}", self.pages[index].source.display());

        let image = self.prepare_image(index);
        self.transcript.push(format!("--- page {page_no} ---"));

        match self.overlay_text(index, &image) {
            Ok(lines) => {
                self.pages[index].stats.text_layer = true;
                self.transcript.extend(lines);
            }
            Err(err) => self.diag.error(format!("{err}, text layer skipped")),
        }

        let page = &mut self.pages[index];
        for (reason, count) in self.diag.finish_page() {
            page.stats.discard(&reason, count);
        }
        info!(
            placed = page.stats.placed_runs,
            text_layer = page.stats.text_layer,
            "page done"
        );
    }

    /// Cleans the image for OCR and scales the background. Failures fall
    /// back to the unprocessed image.
    fn prepare_image(&mut self, index: usize) -> PathBuf {
        let source = self.pages[index].source.clone();
        let workdir = self.config.workdir.as_str();
        let suffix = self.config.suffix.as_str();

        let mut image = source.clone();
        if let Some(options) = &self.config.clean_options {
            let cleaned = derived_path(&source, workdir, suffix, "").and_then(|base| {
                CleanTask {
                    image: source.clone(),
                    options: options.clone(),
                    base,
                }
                .run((&self.programs, &mut self.diag))
            });
            match cleaned {
                Ok(cleaned) => image = cleaned,
                Err(err) => self.diag.warn(format!("{err}, using the original image")),
            }
        }

        let mut background = image.clone();
        if self.config.output_dpi != self.config.scan_dpi {
            let scaled = derived_path(&source, workdir, suffix, "-scaled.jpg").and_then(|out| {
                ScaleTask {
                    image: image.clone(),
                    scale: self.config.image_scale(),
                    quality: self.config.quality,
                    out,
                }
                .run((&self.programs, &mut self.diag))
            });
            match scaled {
                Ok(scaled) => background = scaled,
                Err(err) => self.diag.warn(format!("{err}, embedding the image unscaled")),
            }
        }
        self.pages[index].background = background;

        image
    }

    /// Runs the OCR stage and resolves the page's text operations. Returns
    /// the kept lines for the transcript.
    fn overlay_text(&mut self, index: usize, image: &Path) -> Result<Vec<String>, OcrPdfError> {
        let source = self.pages[index].source.clone();
        let engine = self.config.engine;

        let base = derived_path(&source, &self.config.workdir, &self.config.suffix, "")?;
        let markup = OcrTask {
            engine,
            image: image.to_path_buf(),
            base,
        }
        .run((&self.programs, &mut self.diag))?;

        let markup_path = markup.to_string_lossy().to_string();
        let bytes = fs::read(&markup).context(IoSnafu {
            path: markup_path.clone(),
        })?;
        let xml = normalize(&decode(&bytes), engine);
        let doc = Document::parse_with_options(&xml, parsing_options()).context(MarkupSnafu {
            path: markup_path,
        })?;

        let mut extraction = extract(&doc, engine, self.config.granularity, &mut self.diag);
        if self.config.debug {
            self.draw_debug_boxes(&source, image, &extraction);
        }

        let page = &self.pages[index];
        let mut mapper = CoordinateMapper::new(
            extraction.page_bbox,
            DVec2::new(page.width, page.height),
            self.config.scan_dpi,
            &mut self.diag,
        );
        mapper.map_all(&mut extraction.runs, &mut self.diag);

        let estimator = Estimator::new(
            self.measure.as_ref(),
            SizeBounds {
                min: self.config.min_font_size,
                max: self.config.max_font_size,
            },
        );
        let placements = estimator.estimate(&extraction, &mut self.diag);

        let filter: &dyn LineFilter = match &self.config.filter {
            Some(filter) => filter.as_ref(),
            None => &AdmitAll,
        };
        let composition = compose(
            &mut extraction,
            &placements,
            filter,
            self.config.debug,
            &mut self.diag,
        );

        let page = &mut self.pages[index];
        page.ops = composition.ops;
        page.stats.placed_runs = composition.placed;

        Ok(kept_lines(&extraction))
    }

    fn draw_debug_boxes(&mut self, source: &Path, image: &Path, extraction: &Extraction) {
        let label_font = self
            .config
            .resolve_font()
            .ok()
            .and_then(|path| fs::read(path).ok())
            .and_then(|bytes| FontVec::try_from_vec(bytes).ok());

        let drawn = derived_path(source, &self.config.workdir, &self.config.suffix, "-boxes.png")
            .and_then(|output| draw_boxes(image, extraction, label_font.as_ref(), &output));
        if let Err(err) = drawn {
            self.diag.warn(format!("{err}, box overlay skipped"));
        }
    }

    /// Writes all pages to `output` with pdfium.
    pub fn write(&mut self, output: impl AsRef<Path>) -> Result<(), OcrPdfError> {
        let font = self.config.resolve_font()?;
        PdfWriter::new()?.write(&mut self.pages, &font, output.as_ref())
    }

    /// Kept text of every page so far, each page behind a marker line.
    pub fn text(&self) -> String {
        self.transcript.join("\n")
    }

    /// Every error and warning so far, one per line.
    pub fn log(&self) -> String {
        self.diag.lines().join("\n")
    }

    /// Per page summary as pretty printed JSON.
    pub fn report(&self) -> Result<String, OcrPdfError> {
        let reports = self
            .pages
            .iter()
            .map(|page| PageReport {
                page: page.page_no,
                width: page.width,
                height: page.height,
                source: &page.source,
                background: &page.background,
                stats: &page.stats,
            })
            .collect::<Vec<_>>();
        serde_json::to_string_pretty(&reports).context(ReportSnafu)
    }
}

#[cfg(test)]
mod tests {
    use image::RgbImage;
    use tempfile::TempDir;

    use super::*;
    use crate::{
        layout::element::Rotation,
        overlay::{filter::DottedLineFilter, metrics::tests::HalfEm},
    };

    const HELLO: &str = "<html><body>\
<div class='ocr_page' title='image \"scan.png\"; bbox 0 0 1000 1400'>\
<div class='ocr_carea' title='bbox 100 200 300 250'><p class='ocr_par'>\
<span class='ocr_line' title='bbox 100 200 300 250'>\
<span class='ocrx_word' title='bbox 100 200 300 250; x_wconf 93'>Hello</span>\
</span></p></div></div></body></html>";

    fn missing_programs() -> Programs {
        Programs {
            tesseract: "ocrpdf-test-no-such-tool".to_string(),
            cuneiform: "ocrpdf-test-no-such-tool".to_string(),
            ocropus: "ocrpdf-test-no-such-tool".to_string(),
            convert: "ocrpdf-test-no-such-tool".to_string(),
        }
    }

    /// A 1000 x 1400 scan; at 300 dpi the page is 240 x 336 pt.
    fn scan(markup: Option<&str>) -> (TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let image = dir.path().join("scan.png");
        RgbImage::new(1000, 1400).save(&image).unwrap();
        if let Some(markup) = markup {
            fs::create_dir_all(dir.path().join(".ocrpdf")).unwrap();
            fs::write(dir.path().join(".ocrpdf").join("scan.hocr"), markup).unwrap();
        }
        (dir, image)
    }

    fn pipeline() -> OcrPdf {
        let config = OcrConfigBuilder::default()
            .scan_dpi(300)
            .output_dpi(300)
            .build()
            .unwrap();
        OcrPdf::with_measure(config, Box::new(HalfEm)).with_programs(missing_programs())
    }

    #[test]
    fn test_single_word_page() {
        let (_dir, image) = scan(Some(HELLO));
        let mut ocr = pipeline();
        assert_eq!(ocr.add_image(&image).unwrap(), 1);

        let page = &ocr.pages()[0];
        assert_eq!((page.width, page.height), (240.0, 336.0));
        assert!(page.stats.text_layer);
        assert_eq!(page.stats.placed_runs, 1);

        let op = &page.ops[0];
        assert_eq!(op.text, "Hello ");
        assert_eq!((op.x, op.y), (24.0, 276.0));
        assert_eq!(op.font_size, 19.2);
        assert_eq!(op.rotation, Rotation::Horizontal);
        assert!(!op.visible);

        assert_eq!(ocr.text(), "--- page 1 ---\nHello");
        assert!(ocr.log().is_empty(), "{}", ocr.log());
    }

    #[test]
    fn test_missing_ocr_output_keeps_background() {
        let (_dir, image) = scan(None);
        let mut ocr = pipeline();
        ocr.add_image(&image).unwrap();

        let page = &ocr.pages()[0];
        assert!(page.ops.is_empty());
        assert!(!page.stats.text_layer);
        assert_eq!(page.background, image);
        assert!(ocr.log().contains("text layer skipped"));
        assert_eq!(ocr.text(), "--- page 1 ---");
    }

    #[test]
    fn test_silent_engine_reports_missing_markup() {
        let (_dir, image) = scan(None);
        let programs = Programs {
            tesseract: "true".to_string(),
            ..missing_programs()
        };
        let mut ocr = pipeline().with_programs(programs);
        ocr.add_image(&image).unwrap();

        let page = &ocr.pages()[0];
        assert!(page.ops.is_empty());
        assert!(!page.stats.text_layer);
        assert_eq!(page.background, image);

        let log = ocr.log();
        assert!(log.contains("error: Expected output of `tesseract` not found"), "{log}");
        assert!(log.contains("scan.hocr, text layer skipped"), "{log}");
        assert!(!log.contains("exited with"), "{log}");
    }

    #[test]
    fn test_existing_markup_gives_same_geometry() {
        let (_dir, image) = scan(Some(HELLO));
        let mut ocr = pipeline();
        ocr.add_image(&image).unwrap();
        ocr.add_image(&image).unwrap();

        let pages = ocr.pages();
        assert_eq!(pages[0].ops, pages[1].ops);
        assert_eq!(pages[1].page_no, 2);
        assert_eq!(ocr.text(), "--- page 1 ---\nHello\n--- page 2 ---\nHello");
    }

    #[test]
    fn test_dotted_line_is_left_out_of_transcript() {
        let markup = "<html><body><div class='ocr_page' title='bbox 0 0 1000 1400'>\
<span class='ocr_line' title='bbox 100 100 900 150'>\
<span class='ocrx_word' title='bbox 100 100 900 150'>....i..i..</span></span>\
<span class='ocr_line' title='bbox 100 200 300 250'>\
<span class='ocrx_word' title='bbox 100 200 300 250'>Hello</span></span>\
</div></body></html>";
        let (_dir, image) = scan(Some(markup));
        let mut ocr = pipeline();
        ocr.set_filter(Some(Arc::new(DottedLineFilter)));
        ocr.add_image(&image).unwrap();

        let page = &ocr.pages()[0];
        assert_eq!(page.stats.placed_runs, 1);
        assert_eq!(page.stats.discarded.get("Likely dotted line"), Some(&1));
        assert_eq!(ocr.text(), "--- page 1 ---\nHello");
    }

    #[test]
    fn test_font_bounds_tally_discards() {
        let (_dir, image) = scan(Some(HELLO));
        let mut ocr = pipeline();
        ocr.set_max_font(Some("12")).unwrap();
        ocr.add_image(&image).unwrap();

        let page = &ocr.pages()[0];
        assert!(page.ops.is_empty());
        assert!(page.stats.text_layer);
        assert_eq!(page.stats.discarded.get("font above maximum"), Some(&1));

        let report = ocr.report().unwrap();
        assert!(report.contains("\"font above maximum\": 1"));
        assert!(report.contains("\"placed_runs\": 0"));
    }

    #[test]
    fn test_debug_mode_draws_boxes() {
        let (dir, image) = scan(Some(HELLO));
        let mut ocr = pipeline();
        ocr.set_debug(true);
        ocr.add_image(&image).unwrap();

        assert!(ocr.pages()[0].ops[0].visible);
        assert!(dir.path().join(".ocrpdf").join("scan-boxes.png").is_file());
    }

    #[test]
    fn test_setters_keep_prior_value_on_error() {
        let mut ocr = pipeline();

        assert!(ocr.set_dpi("lots").is_err());
        assert_eq!(ocr.config().scan_dpi, 300);
        ocr.set_dpi("600").unwrap();
        assert_eq!(ocr.config().scan_dpi, 600);

        ocr.set_max_font(Some("10")).unwrap();
        assert!(ocr.set_min_font(Some("20")).is_err());
        assert_eq!(ocr.config().min_font_size, None);

        assert!(ocr.set_engine("gocr").is_err());
        assert_eq!(ocr.config().engine, Engine::Tesseract);
        assert!(ocr.set_workdir("../out").is_err());
        assert!(ocr.set_clean(Some("-blur 2 && rm x")).is_err());
        assert_eq!(ocr.config().clean_options, None);

        ocr.set_suffix("'v2'").unwrap();
        assert_eq!(ocr.config().suffix, "v2");
    }

    #[test]
    fn test_unsafe_image_path_is_rejected() {
        let mut ocr = pipeline();
        assert!(matches!(
            ocr.add_image("scan;rm.png"),
            Err(OcrPdfError::UnsafeInput { .. })
        ));
        assert!(ocr.pages().is_empty());
    }
}
