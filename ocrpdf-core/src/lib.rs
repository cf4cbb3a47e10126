pub mod analysis;
pub mod config;
pub mod consts;
pub mod diagnostics;
pub mod error;
pub mod hocr;
pub mod layout;
pub mod overlay;
pub mod pipeline;
pub mod render;

// Re-export commonly used types
pub use config::{Engine, Granularity, OcrConfig, OcrConfigBuilder};
pub use error::OcrPdfError;
pub use overlay::filter::{Admission, DottedLineFilter, LineFilter};
pub use pipeline::{tools::Programs, OcrPdf};
