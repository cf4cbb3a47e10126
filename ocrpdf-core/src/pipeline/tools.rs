use std::{
    fs::{self, File},
    io::BufWriter,
    path::{Path, PathBuf},
    process::Command,
};

use image::{codecs::jpeg::JpegEncoder, imageops::FilterType, DynamicImage};
use snafu::ResultExt;
use tracing::*;

use crate::{
    config::Engine,
    diagnostics::Diagnostics,
    error::{ImageReadSnafu, ImageWriteSnafu, IoSnafu, OcrPdfError, SpawnSnafu},
};

/// One invocation of an external tool.
pub trait Task<'a> {
    type Output;
    type Extra: 'a;

    fn run(&self, extra: Self::Extra) -> Result<Self::Output, OcrPdfError>;
}

/// Executables used for each stage.
#[derive(Debug, Clone)]
pub struct Programs {
    pub tesseract: String,
    pub cuneiform: String,
    pub ocropus: String,
    /// ImageMagick style converter used for cleaning and rescaling.
    pub convert: String,
}

impl Default for Programs {
    fn default() -> Self {
        Self {
            tesseract: "tesseract".to_string(),
            cuneiform: "cuneiform".to_string(),
            ocropus: "ocropus-hocr".to_string(),
            convert: "convert".to_string(),
        }
    }
}

impl Programs {
    pub fn ocr(&self, engine: Engine) -> &str {
        match engine {
            Engine::Tesseract => &self.tesseract,
            Engine::Cuneiform => &self.cuneiform,
            Engine::Ocropus => &self.ocropus,
        }
    }
}

/// `<dir of source>/<workdir>/<stem><suffix><tail>`, creating the working
/// directory on demand.
pub fn derived_path(
    source: &Path,
    workdir: &str,
    suffix: &str,
    tail: &str,
) -> Result<PathBuf, OcrPdfError> {
    let dir = source
        .parent()
        .unwrap_or_else(|| Path::new(""))
        .join(workdir);
    fs::create_dir_all(&dir).context(IoSnafu {
        path: dir.to_string_lossy().to_string(),
    })?;

    let stem = source
        .file_stem()
        .map(|stem| stem.to_string_lossy().to_string())
        .unwrap_or_default();
    Ok(dir.join(format!("{stem}{suffix}{tail}")))
}

/// First of `base` + extension that exists.
pub fn find_existing(base: &Path, extensions: &[&str]) -> Option<PathBuf> {
    extensions
        .iter()
        .map(|ext| append(base, ext))
        .find(|path| path.is_file())
}

fn append(base: &Path, tail: &str) -> PathBuf {
    let mut path = base.as_os_str().to_owned();
    path.push(tail);
    PathBuf::from(path)
}

/// Programs to run and the log their failures go to.
pub type ToolContext<'a> = (&'a Programs, &'a mut Diagnostics);

/// Runs `program` to completion. A failing exit status is only logged;
/// callers decide by the artifacts that exist afterwards.
fn invoke(program: &str, args: &[String], diag: &mut Diagnostics) -> Result<(), OcrPdfError> {
    debug!("running {program} {}", args.join(" "));
    let output = Command::new(program)
        .args(args)
        .output()
        .context(SpawnSnafu { program })?;

    if !output.status.success() {
        diag.warn(format!(
            "{program} exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        ));
    }
    Ok(())
}

/// Produces the hOCR markup of one image, reusing existing output.
#[derive(Debug, Clone)]
pub struct OcrTask {
    pub engine: Engine,
    pub image: PathBuf,
    /// Output path without extension.
    pub base: PathBuf,
}

impl OcrTask {
    fn args(&self) -> Vec<String> {
        let image = self.image.to_string_lossy().to_string();
        let base = self.base.to_string_lossy().to_string();
        match self.engine {
            Engine::Tesseract => vec![image, base, "hocr".to_string()],
            Engine::Cuneiform => vec![
                "-f".to_string(),
                "hocr".to_string(),
                "-o".to_string(),
                format!("{base}.html"),
                image,
            ],
            Engine::Ocropus => vec![image, "-o".to_string(), format!("{base}.html")],
        }
    }
}

impl<'a> Task<'a> for OcrTask {
    type Output = PathBuf;
    type Extra = ToolContext<'a>;

    fn run(&self, (programs, diag): Self::Extra) -> Result<Self::Output, OcrPdfError> {
        let extensions = self.engine.markup_extensions();
        if let Some(existing) = find_existing(&self.base, &extensions) {
            info!("reusing markup {}", existing.display());
            return Ok(existing);
        }

        invoke(programs.ocr(self.engine), &self.args(), diag)?;

        find_existing(&self.base, &extensions).ok_or_else(|| OcrPdfError::MissingArtifact {
            stage: self.engine.name().to_string(),
            path: append(&self.base, extensions[0]).to_string_lossy().to_string(),
        })
    }
}

/// Splits a cleaning option string into arguments and output extension.
///
/// A trailing `png`, `jpg`, `jpeg`, `tif` or `tiff` token selects the
/// format of the cleaned image and is not passed on as an option.
pub fn clean_arguments(options: &str) -> (Vec<String>, String) {
    let mut args = options
        .split_whitespace()
        .map(str::to_string)
        .collect::<Vec<_>>();

    let ext = match args.last().map(|last| last.to_ascii_lowercase()) {
        Some(last) if matches!(last.as_str(), "png" | "jpg" | "jpeg" | "tif" | "tiff") => {
            args.pop();
            last
        }
        _ => "jpg".to_string(),
    };
    (args, ext)
}

/// Preprocesses an image with the converter before OCR.
#[derive(Debug, Clone)]
pub struct CleanTask {
    pub image: PathBuf,
    pub options: String,
    /// Output path without the `-cleaned.<ext>` tail.
    pub base: PathBuf,
}

impl<'a> Task<'a> for CleanTask {
    type Output = PathBuf;
    type Extra = ToolContext<'a>;

    fn run(&self, (programs, diag): Self::Extra) -> Result<Self::Output, OcrPdfError> {
        let (options, ext) = clean_arguments(&self.options);
        let out = append(&self.base, &format!("-cleaned.{ext}"));
        if out.is_file() {
            info!("reusing cleaned image {}", out.display());
            return Ok(out);
        }

        let mut args = vec![self.image.to_string_lossy().to_string()];
        args.extend(options);
        args.push(out.to_string_lossy().to_string());
        invoke(&programs.convert, &args, diag)?;

        if out.is_file() {
            Ok(out)
        } else {
            Err(OcrPdfError::MissingArtifact {
                stage: "clean".to_string(),
                path: out.to_string_lossy().to_string(),
            })
        }
    }
}

/// Rescales the background image to the output resolution.
#[derive(Debug, Clone)]
pub struct ScaleTask {
    pub image: PathBuf,
    /// Output size relative to the input.
    pub scale: f64,
    pub quality: u8,
    pub out: PathBuf,
}

impl ScaleTask {
    /// Same rescale done with the `image` crate.
    pub fn rescale_in_process(&self) -> Result<(), OcrPdfError> {
        let path = self.image.to_string_lossy().to_string();
        let image = image::open(&self.image).context(ImageReadSnafu { path })?;

        let width = ((f64::from(image.width()) * self.scale).round() as u32).max(1);
        let height = ((f64::from(image.height()) * self.scale).round() as u32).max(1);
        let scaled = DynamicImage::ImageRgb8(
            image
                .resize_exact(width, height, FilterType::Triangle)
                .to_rgb8(),
        );

        let out = self.out.to_string_lossy().to_string();
        let file = File::create(&self.out).context(IoSnafu { path: out.clone() })?;
        let mut writer = BufWriter::new(file);
        scaled
            .write_with_encoder(JpegEncoder::new_with_quality(&mut writer, self.quality))
            .context(ImageWriteSnafu { path: out })
    }
}

impl<'a> Task<'a> for ScaleTask {
    type Output = PathBuf;
    type Extra = ToolContext<'a>;

    fn run(&self, (programs, diag): Self::Extra) -> Result<Self::Output, OcrPdfError> {
        if self.out.is_file() {
            info!("reusing scaled image {}", self.out.display());
            return Ok(self.out.clone());
        }

        let args = vec![
            self.image.to_string_lossy().to_string(),
            "-resize".to_string(),
            format!("{}%", self.scale * 100.0),
            "-quality".to_string(),
            self.quality.to_string(),
            self.out.to_string_lossy().to_string(),
        ];
        if let Err(err) = invoke(&programs.convert, &args, diag) {
            diag.warn(format!("{err}, rescaling in process"));
        }

        if !self.out.is_file() {
            self.rescale_in_process()?;
        }
        Ok(self.out.clone())
    }
}

#[cfg(test)]
mod tests {
    use image::RgbImage;

    use super::*;

    fn missing_programs() -> Programs {
        Programs {
            tesseract: "ocrpdf-test-no-such-tool".to_string(),
            cuneiform: "ocrpdf-test-no-such-tool".to_string(),
            ocropus: "ocrpdf-test-no-such-tool".to_string(),
            convert: "ocrpdf-test-no-such-tool".to_string(),
        }
    }

    #[test]
    fn test_derived_path() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("scan-01.png");

        let path = derived_path(&source, ".work", "-v2", "-scaled.jpg").unwrap();
        assert_eq!(path, dir.path().join(".work").join("scan-01-v2-scaled.jpg"));
        assert!(dir.path().join(".work").is_dir());
    }

    #[test]
    fn test_clean_arguments() {
        let (args, ext) = clean_arguments("-despeckle -normalize png");
        assert_eq!(args, vec!["-despeckle", "-normalize"]);
        assert_eq!(ext, "png");

        let (args, ext) = clean_arguments("-threshold 50%");
        assert_eq!(args, vec!["-threshold", "50%"]);
        assert_eq!(ext, "jpg");
    }

    #[test]
    fn test_existing_markup_is_reused() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("scan");
        fs::write(dir.path().join("scan.html"), "<html/>").unwrap();

        let task = OcrTask {
            engine: Engine::Tesseract,
            image: dir.path().join("scan.png"),
            base,
        };
        let markup = task.run((&missing_programs(), &mut Diagnostics::new())).unwrap();
        assert_eq!(markup, dir.path().join("scan.html"));
    }

    #[test]
    fn test_missing_engine_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let task = OcrTask {
            engine: Engine::Cuneiform,
            image: dir.path().join("scan.png"),
            base: dir.path().join("scan"),
        };
        assert!(matches!(
            task.run((&missing_programs(), &mut Diagnostics::new())),
            Err(OcrPdfError::Spawn { .. })
        ));
        assert_eq!(task.args()[3], format!("{}.html", task.base.display()));
    }

    #[test]
    fn test_scale_falls_back_to_image_crate() {
        let dir = tempfile::tempdir().unwrap();
        let image = dir.path().join("scan.png");
        RgbImage::new(40, 20).save(&image).unwrap();

        let task = ScaleTask {
            image,
            scale: 0.5,
            quality: 50,
            out: dir.path().join("scan-scaled.jpg"),
        };
        let mut diag = Diagnostics::new();
        let out = task.run((&missing_programs(), &mut diag)).unwrap();
        assert_eq!(image::image_dimensions(&out).unwrap(), (20, 10));
        assert!(diag.lines()[0].ends_with("rescaling in process"), "{:?}", diag.lines());
    }

    #[test]
    fn test_failing_exit_status_is_logged() {
        let mut diag = Diagnostics::new();
        invoke("false", &[], &mut diag).unwrap();
        assert_eq!(diag.lines().len(), 1);
        assert!(diag.lines()[0].contains("false exited with"), "{:?}", diag.lines());
    }
}
