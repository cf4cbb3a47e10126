/// Environment variable holding the directory of the pdfium dynamic library.
///
/// When unset the system library search path is used instead.
pub const PDFIUM_LIB_PATH_ENV_NAME: &str = "PDFIUM_DYNAMIC_LIB_PATH";

/// Reference font size used to measure rendered width.
///
/// The target size of a placement is this value multiplied by the ratio
/// between the mapped box extent and the width rendered at this size.
pub const PROBE_FONT_SIZE: f64 = 10.0;

/// PDF user space units per inch.
pub const POINTS_PER_INCH: f64 = 72.0;

/// Resolution assumed for scanned images when none is configured.
pub const DEFAULT_SCAN_DPI: u32 = 300;

/// Resolution of the background image embedded in the output page.
pub const DEFAULT_OUTPUT_DPI: u32 = 150;

/// Accepted range for both resolutions.
pub const DPI_RANGE: std::ops::RangeInclusive<u32> = 10..=2400;

/// JPEG quality of the rescaled background image.
pub const DEFAULT_JPEG_QUALITY: u8 = 50;

/// Name of the directory created next to each source image for
/// intermediate artifacts.
pub const DEFAULT_WORKDIR: &str = ".ocrpdf";

/// Left edge used by the degraded mapping when the markup has no page box.
pub const FALLBACK_LEFT: f64 = 10.0;

/// Vertical step per run used by the degraded mapping.
pub const FALLBACK_LINE_STEP: f64 = 12.0;

/// A line is considered dotted when less than this share of its
/// characters survive removal of `i : . f`.
pub const DOTTED_LINE_RATIO: f64 = 0.2;

/// Locations probed for a TrueType font when none is configured.
pub const DEFAULT_FONT_PATHS: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/local/share/fonts/DejaVuSans.ttf",
    "/Library/Fonts/DejaVuSans.ttf",
    "fonts/DejaVuSans.ttf",
];

/// Characters refused in paths, option strings and suffixes handed to
/// external tools.
pub const UNSAFE_CHARS: &[char] = &[';', '|', '&', '$', '`', '<', '>', '\n', '\r'];
