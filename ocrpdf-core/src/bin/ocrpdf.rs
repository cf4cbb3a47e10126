use std::error::Error;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use ocrpdf_core::config::{parse_dpi, parse_font_size, parse_quality};
use ocrpdf_core::consts::*;
use ocrpdf_core::{DottedLineFilter, Engine, Granularity, LineFilter, OcrConfigBuilder, OcrPdf};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum FilterKind {
    /// Keep every line
    None,
    /// Drop rows of leader dots
    Dotted,
}

#[derive(Parser)]
#[command(name = "ocrpdf")]
#[command(about = "Overlay OCR text on scanned images as a searchable PDF")]
struct Args {
    #[arg(required = true, help = "Scanned page images, one page each")]
    images: Vec<PathBuf>,

    #[arg(short, long, default_value = "out.pdf", help = "Output PDF path")]
    output: PathBuf,

    #[arg(long, value_enum, default_value_t = Engine::Tesseract)]
    engine: Engine,

    #[arg(long, value_enum, default_value_t = Granularity::Line, help = "Unit sharing one font size")]
    granularity: Granularity,

    #[arg(long, default_value_t = DEFAULT_SCAN_DPI, value_parser = dpi, help = "Scan resolution")]
    dpi: u32,

    #[arg(long, default_value_t = DEFAULT_OUTPUT_DPI, value_parser = dpi, help = "Background image resolution")]
    output_dpi: u32,

    #[arg(long, help = "TrueType font for the text layer")]
    font: Option<PathBuf>,

    #[arg(long, value_parser = font_size, help = "Drop text set smaller than this (pt)")]
    min_font: Option<f64>,

    #[arg(long, value_parser = font_size, help = "Drop text set larger than this (pt)")]
    max_font: Option<f64>,

    #[arg(long, default_value_t = DEFAULT_JPEG_QUALITY, value_parser = quality, help = "JPEG quality of the background")]
    quality: u8,

    #[arg(long, default_value = DEFAULT_WORKDIR, help = "Directory for intermediate files")]
    workdir: String,

    #[arg(long, help = "Options for image cleaning before OCR, e.g. \"-despeckle png\"")]
    clean: Option<String>,

    #[arg(long, default_value = "", help = "Suffix for intermediate file names")]
    suffix: String,

    #[arg(long, value_enum, default_value = "none")]
    filter: FilterKind,

    #[arg(long, help = "Draw the text layer visibly and write box overlays")]
    debug: bool,

    #[arg(long, help = "Write the recognized text here")]
    text: Option<PathBuf>,

    #[arg(long, help = "Write a JSON page report here")]
    report: Option<PathBuf>,
}

fn dpi(value: &str) -> Result<u32, String> {
    parse_dpi(value).map_err(|e| e.to_string())
}

fn font_size(value: &str) -> Result<f64, String> {
    parse_font_size(value).map_err(|e| e.to_string())
}

fn quality(value: &str) -> Result<u8, String> {
    parse_quality(value).map_err(|e| e.to_string())
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let mut builder = OcrConfigBuilder::default();
    builder
        .engine(args.engine)
        .granularity(args.granularity)
        .scan_dpi(args.dpi)
        .output_dpi(args.output_dpi)
        .quality(args.quality)
        .workdir(args.workdir)
        .suffix(ocrpdf_core::config::sanitize_suffix(&args.suffix))
        .debug(args.debug);
    if let Some(font) = args.font {
        builder.font(font);
    }
    if let Some(min) = args.min_font {
        builder.min_font_size(min);
    }
    if let Some(max) = args.max_font {
        builder.max_font_size(max);
    }
    if let Some(clean) = args.clean {
        builder.clean_options(clean);
    }
    if let FilterKind::Dotted = args.filter {
        let filter: Arc<dyn LineFilter> = Arc::new(DottedLineFilter);
        builder.filter(filter);
    }
    let config = builder.build()?;

    let mut ocr = OcrPdf::new(config)?;
    for image in &args.images {
        if let Err(err) = ocr.add_image(image) {
            error!("skipping {}: {err}", image.display());
        }
    }

    ocr.write(&args.output)?;

    if let Some(path) = &args.text {
        fs::write(path, ocr.text())?;
        info!("wrote text to {}", path.display());
    }
    if let Some(path) = &args.report {
        fs::write(path, ocr.report()?)?;
        info!("wrote report to {}", path.display());
    }

    let log = ocr.log();
    if !log.is_empty() {
        info!("{} diagnostics:\n{log}", log.lines().count());
    }
    Ok(())
}
