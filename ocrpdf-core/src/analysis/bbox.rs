use glam::DVec2;
use serde::Serialize;

/// An axis-aligned bounding box represented by minimum and maximum points.
///
/// Boxes read from hOCR are in image coordinates (origin top-left, y grows
/// downward). After mapping they are in PDF user space (origin bottom-left,
/// y grows upward). In both cases `min` holds the smaller coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Bbox {
    /// The minimum point of the bounding box.
    pub min: DVec2,
    /// The maximum point of the bounding box.
    pub max: DVec2,
}

impl Bbox {
    /// Creates a new bounding box from minimum and maximum points.
    ///
    /// # Example
    /// ```
    /// use glam::DVec2;
    /// use ocrpdf_core::analysis::bbox::Bbox;
    /// let bbox = Bbox::new(DVec2::new(0.0, 0.0), DVec2::new(10.0, 5.0));
    /// assert_eq!(bbox.width(), 10.0);
    /// ```
    pub fn new(min: DVec2, max: DVec2) -> Self {
        Self { min, max }
    }

    /// Creates a bounding box from two arbitrary corners, ordering the
    /// coordinates so that `min <= max` on both axes.
    pub fn from_corners(a: DVec2, b: DVec2) -> Self {
        Self {
            min: a.min(b),
            max: a.max(b),
        }
    }

    /// Parses the `bbox` property of an hOCR `title` attribute.
    ///
    /// The title is a `;` separated list of properties, e.g.
    /// `bbox 10 20 110 40; x_wconf 93`. Only the first `bbox` property is
    /// used and it must carry exactly four numbers.
    ///
    /// # Example
    /// ```
    /// use ocrpdf_core::analysis::bbox::Bbox;
    /// let bbox = Bbox::parse_title("image \"a.png\"; bbox 0 0 1000 1400; ppageno 0").unwrap();
    /// assert_eq!(bbox.height(), 1400.0);
    /// assert!(Bbox::parse_title("x_wconf 93").is_none());
    /// ```
    pub fn parse_title(title: &str) -> Option<Self> {
        let property = title
            .split(';')
            .map(str::trim)
            .find(|prop| prop.starts_with("bbox "))?;

        let numbers = property
            .split_whitespace()
            .skip(1)
            .map(str::parse::<f64>)
            .collect::<Result<Vec<_>, _>>()
            .ok()?;

        match numbers.as_slice() {
            [x1, y1, x2, y2] => Some(Self::from_corners(
                DVec2::new(*x1, *y1),
                DVec2::new(*x2, *y2),
            )),
            _ => None,
        }
    }

    pub fn width(&self) -> f64 {
        self.max.x - self.min.x
    }

    pub fn height(&self) -> f64 {
        self.max.y - self.min.y
    }

    /// A box with no width or no height cannot carry text.
    pub fn is_degenerate(&self) -> bool {
        self.width() <= 0.0 || self.height() <= 0.0
    }

    /// Creates a union bounding box that encompasses both this bounding box and another.
    ///
    /// # Example
    /// ```
    /// use glam::DVec2;
    /// use ocrpdf_core::analysis::bbox::Bbox;
    ///
    /// let bbox1 = Bbox::new(DVec2::new(0.0, 0.0), DVec2::new(5.0, 5.0));
    /// let bbox2 = Bbox::new(DVec2::new(3.0, 3.0), DVec2::new(8.0, 8.0));
    /// let union = bbox1.union(&bbox2);
    ///
    /// assert_eq!(union.min, DVec2::new(0.0, 0.0));
    /// assert_eq!(union.max, DVec2::new(8.0, 8.0));
    /// ```
    pub fn union(&self, other: &Self) -> Self {
        Self {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    /// Clamps the bounding box coordinates to stay within the specified bounds.
    pub fn clamp(&self, min_bounds: DVec2, max_bounds: DVec2) -> Self {
        Self {
            min: self.min.max(min_bounds).min(max_bounds),
            max: self.max.min(max_bounds).max(min_bounds),
        }
    }
}
