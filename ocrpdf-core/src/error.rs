use snafu::prelude::*;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum OcrPdfError {
    #[snafu(display("Invalid setting `{}`: {}", name, message))]
    Config { name: String, message: String },
    #[snafu(display("Unsafe characters in {} `{}`", what, value))]
    UnsafeInput { what: String, value: String },
    #[snafu(display("Io error on `{}`: {}", path, source))]
    Io {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Image Read `{}` error: {}", path, source))]
    ImageRead {
        source: image::ImageError,
        path: String,
    },
    #[snafu(display("Image Write `{}` error: {}", path, source))]
    ImageWrite {
        source: image::ImageError,
        path: String,
    },
    #[snafu(display("Read font `{}` error: {}", path, source))]
    FontRead {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Load Font error: {}", source))]
    Font { source: ab_glyph::InvalidFont },
    #[snafu(display("Pdfium `{}` error {}", stage, source))]
    Pdfium {
        source: pdfium_render::prelude::PdfiumError,
        stage: String,
    },
    #[snafu(display("Spawn `{}` error: {}", program, source))]
    Spawn {
        source: std::io::Error,
        program: String,
    },
    #[snafu(display("Expected output of `{}` not found: {}", stage, path))]
    MissingArtifact { stage: String, path: String },
    #[snafu(display("Parse markup `{}` error: {}", path, source))]
    Markup {
        source: roxmltree::Error,
        path: String,
    },
    #[snafu(display("Serialize report error: {}", source))]
    Report { source: serde_json::Error },
}

impl OcrPdfError {
    /// Shorthand for a rejected setting.
    pub fn config(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Config {
            name: name.into(),
            message: message.into(),
        }
    }
}
