use std::{
    fmt,
    path::{Path, PathBuf},
    str::FromStr,
    sync::Arc,
};

use derive_builder::Builder;
use serde::Serialize;

use crate::{consts::*, error::OcrPdfError, overlay::filter::LineFilter};

/// OCR engine producing the hOCR markup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Engine {
    #[default]
    Tesseract,
    Cuneiform,
    Ocropus,
}

/// Markup family an engine writes; each needs its own repairs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    /// Nested page/area/paragraph/line/word markup with stray entities,
    /// control characters and raw non-ASCII text.
    Nested,
    /// Flat `ocr_line` spans, unclosed `<meta>` tags and per-character
    /// sub-spans.
    Flat,
}

impl Engine {
    pub fn dialect(self) -> Dialect {
        match self {
            Engine::Cuneiform => Dialect::Flat,
            Engine::Tesseract | Engine::Ocropus => Dialect::Nested,
        }
    }

    /// Lower-case name, also used as the engine-of-origin marker on
    /// synthesized markup.
    pub fn name(self) -> &'static str {
        match self {
            Engine::Tesseract => "tesseract",
            Engine::Cuneiform => "cuneiform",
            Engine::Ocropus => "ocropus",
        }
    }

    /// Extensions the engine's markup may carry, in lookup order.
    pub fn markup_extensions(self) -> [&'static str; 2] {
        match self {
            Engine::Tesseract => [".hocr", ".html"],
            Engine::Cuneiform | Engine::Ocropus => [".html", ".hocr"],
        }
    }

    /// Whether the engine emits word level nodes at all.
    pub fn has_word_nodes(self) -> bool {
        !matches!(self.dialect(), Dialect::Flat)
    }
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Engine {
    type Err = OcrPdfError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tesseract" => Ok(Engine::Tesseract),
            "cuneiform" => Ok(Engine::Cuneiform),
            "ocropus" => Ok(Engine::Ocropus),
            other => Err(OcrPdfError::config(
                "engine",
                format!("unknown engine `{other}`, expected tesseract, cuneiform or ocropus"),
            )),
        }
    }
}

/// Unit of text sharing one font size and rotation decision, coarsest first.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Block,
    Paragraph,
    #[default]
    Line,
    Word,
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Granularity::Block => "block",
            Granularity::Paragraph => "paragraph",
            Granularity::Line => "line",
            Granularity::Word => "word",
        })
    }
}

impl FromStr for Granularity {
    type Err = OcrPdfError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "block" | "area" => Ok(Granularity::Block),
            "paragraph" | "par" => Ok(Granularity::Paragraph),
            "line" => Ok(Granularity::Line),
            "word" => Ok(Granularity::Word),
            other => Err(OcrPdfError::config(
                "granularity",
                format!("unknown mode `{other}`, expected block, paragraph, line or word"),
            )),
        }
    }
}

/// Settings of one conversion run. Immutable once built.
#[derive(Debug, Clone, Builder)]
#[builder(build_fn(validate = "Self::validate"))]
pub struct OcrConfig {
    #[builder(default)]
    pub engine: Engine,
    #[builder(default)]
    pub granularity: Granularity,
    /// Resolution the images were scanned at.
    #[builder(default = "DEFAULT_SCAN_DPI")]
    pub scan_dpi: u32,
    /// Resolution of the embedded background image.
    #[builder(default = "DEFAULT_OUTPUT_DPI")]
    pub output_dpi: u32,
    /// TrueType font used both for measuring and for the text layer.
    #[builder(default, setter(into, strip_option))]
    pub font: Option<PathBuf>,
    #[builder(default, setter(strip_option))]
    pub min_font_size: Option<f64>,
    #[builder(default, setter(strip_option))]
    pub max_font_size: Option<f64>,
    #[builder(default = "DEFAULT_JPEG_QUALITY")]
    pub quality: u8,
    #[builder(default = "DEFAULT_WORKDIR.to_string()", setter(into))]
    pub workdir: String,
    /// Options handed to the preprocessing tool; `None` disables cleaning.
    #[builder(default, setter(into, strip_option))]
    pub clean_options: Option<String>,
    /// Injected into derived file names before the extension.
    #[builder(default, setter(into))]
    pub suffix: String,
    /// Draw the text layer opaque so its alignment can be checked.
    #[builder(default)]
    pub debug: bool,
    #[builder(default, setter(strip_option))]
    pub filter: Option<Arc<dyn LineFilter>>,
}

impl OcrConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        for dpi in [self.scan_dpi, self.output_dpi].into_iter().flatten() {
            if !DPI_RANGE.contains(&dpi) {
                return Err(format!("resolution {dpi} outside {DPI_RANGE:?}"));
            }
        }

        if let Some(quality) = self.quality {
            if !(1..=100).contains(&quality) {
                return Err(format!("quality {quality} outside 1..=100"));
            }
        }

        let min = self.min_font_size.flatten();
        let max = self.max_font_size.flatten();
        for size in [min, max].into_iter().flatten() {
            if !size.is_finite() || size <= 0.0 {
                return Err(format!("font size {size} must be positive"));
            }
        }
        if let (Some(min), Some(max)) = (min, max) {
            if min > max {
                return Err(format!("minimum font size {min} above maximum {max}"));
            }
        }

        if let Some(workdir) = &self.workdir {
            check_workdir(workdir).map_err(|e| e.to_string())?;
        }
        if let Some(Some(options)) = &self.clean_options {
            check_safe("clean options", options).map_err(|e| e.to_string())?;
        }
        if let Some(suffix) = &self.suffix {
            check_safe("suffix", suffix).map_err(|e| e.to_string())?;
        }

        Ok(())
    }
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            engine: Engine::default(),
            granularity: Granularity::default(),
            scan_dpi: DEFAULT_SCAN_DPI,
            output_dpi: DEFAULT_OUTPUT_DPI,
            font: None,
            min_font_size: None,
            max_font_size: None,
            quality: DEFAULT_JPEG_QUALITY,
            workdir: DEFAULT_WORKDIR.to_string(),
            clean_options: None,
            suffix: String::new(),
            debug: false,
            filter: None,
        }
    }
}

impl OcrConfig {
    /// Scale between the scanned image and the embedded background image.
    pub fn image_scale(&self) -> f64 {
        f64::from(self.output_dpi) / f64::from(self.scan_dpi)
    }

    /// Resolves the configured font, or the first default location that exists.
    pub fn resolve_font(&self) -> Result<PathBuf, OcrPdfError> {
        if let Some(font) = &self.font {
            if font.is_file() {
                return Ok(font.clone());
            }
            return Err(OcrPdfError::config(
                "font",
                format!("font file `{}` not found", font.display()),
            ));
        }

        DEFAULT_FONT_PATHS
            .iter()
            .map(Path::new)
            .find(|path| path.is_file())
            .map(Path::to_path_buf)
            .ok_or_else(|| {
                OcrPdfError::config("font", "no font configured and no default font found")
            })
    }
}

pub fn parse_dpi(value: &str) -> Result<u32, OcrPdfError> {
    let dpi = value
        .trim()
        .parse::<u32>()
        .map_err(|_| OcrPdfError::config("dpi", format!("`{value}` is not a whole number")))?;
    if !DPI_RANGE.contains(&dpi) {
        return Err(OcrPdfError::config(
            "dpi",
            format!("{dpi} outside {DPI_RANGE:?}"),
        ));
    }
    Ok(dpi)
}

pub fn parse_quality(value: &str) -> Result<u8, OcrPdfError> {
    match value.trim().parse::<u8>() {
        Ok(quality) if (1..=100).contains(&quality) => Ok(quality),
        _ => Err(OcrPdfError::config(
            "quality",
            format!("`{value}` is not a number in 1..=100"),
        )),
    }
}

pub fn parse_font_size(value: &str) -> Result<f64, OcrPdfError> {
    match value.trim().parse::<f64>() {
        Ok(size) if size.is_finite() && size > 0.0 => Ok(size),
        _ => Err(OcrPdfError::config(
            "font size",
            format!("`{value}` is not a positive number"),
        )),
    }
}

/// Refuses values that would be dangerous if they ever reached a shell.
pub fn check_safe(what: &str, value: &str) -> Result<(), OcrPdfError> {
    if value.contains(UNSAFE_CHARS) {
        return Err(OcrPdfError::UnsafeInput {
            what: what.to_string(),
            value: value.to_string(),
        });
    }
    Ok(())
}

/// The working directory is a single directory name next to each image.
pub fn check_workdir(workdir: &str) -> Result<(), OcrPdfError> {
    check_safe("workdir", workdir)?;
    if workdir.is_empty() || workdir.contains(['/', '\\']) || workdir == ".." {
        return Err(OcrPdfError::config(
            "workdir",
            format!("`{workdir}` must be a plain directory name"),
        ));
    }
    Ok(())
}

/// Removes quote characters from a file name suffix.
pub fn sanitize_suffix(suffix: &str) -> String {
    suffix.chars().filter(|c| !matches!(c, '"' | '\'' | '`')).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = OcrConfigBuilder::default().build().unwrap();
        assert_eq!(config.engine, Engine::Tesseract);
        assert_eq!(config.granularity, Granularity::Line);
        assert_eq!(config.scan_dpi, DEFAULT_SCAN_DPI);
        assert_eq!(config.workdir, DEFAULT_WORKDIR);
        assert!(config.filter.is_none());
        assert!(!config.debug);
    }

    #[test]
    fn test_builder_rejects_bad_values() {
        assert!(OcrConfigBuilder::default().scan_dpi(0).build().is_err());
        assert!(OcrConfigBuilder::default().quality(0).build().is_err());
        assert!(
            OcrConfigBuilder::default()
                .min_font_size(12.0)
                .max_font_size(6.0)
                .build()
                .is_err()
        );
        assert!(OcrConfigBuilder::default().workdir("a/b").build().is_err());
        assert!(
            OcrConfigBuilder::default()
                .clean_options("-despeckle; rm -rf /")
                .build()
                .is_err()
        );
    }

    #[test]
    fn test_parse_settings() {
        assert_eq!(parse_dpi(" 300 ").unwrap(), 300);
        assert!(parse_dpi("300.5").is_err());
        assert!(parse_dpi("5").is_err());
        assert_eq!(parse_quality("75").unwrap(), 75);
        assert!(parse_quality("101").is_err());
        assert_eq!(parse_font_size("4.5").unwrap(), 4.5);
        assert!(parse_font_size("-1").is_err());
        assert!(parse_font_size("NaN").is_err());
    }

    #[test]
    fn test_parse_modes() {
        assert_eq!("Cuneiform".parse::<Engine>().unwrap(), Engine::Cuneiform);
        assert!("gocr".parse::<Engine>().is_err());
        assert_eq!("par".parse::<Granularity>().unwrap(), Granularity::Paragraph);
        assert!("page".parse::<Granularity>().is_err());
        assert!(Granularity::Block < Granularity::Word);
    }

    #[test]
    fn test_engine_dialects() {
        assert_eq!(Engine::Cuneiform.dialect(), Dialect::Flat);
        assert!(!Engine::Cuneiform.has_word_nodes());
        assert_eq!(Engine::Tesseract.markup_extensions()[0], ".hocr");
    }

    #[test]
    fn test_suffix_and_safety() {
        assert_eq!(sanitize_suffix("\"v2'"), "v2");
        assert!(check_safe("path", "scan-01.png").is_ok());
        assert!(check_safe("path", "scan$(id).png").is_err());
    }
}
