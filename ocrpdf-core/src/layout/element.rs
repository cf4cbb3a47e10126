use std::cell::OnceCell;

use serde::Serialize;

use crate::{analysis::bbox::Bbox, config::Engine, overlay::filter::Admission};

/// Coordinate system a box is currently expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CoordSpace {
    /// hOCR pixels, origin top-left.
    Pixel,
    /// PDF points, origin bottom-left.
    Page,
}

/// Atomic placeable unit of OCR text: a word, or a whole line when the
/// engine emits no word nodes.
#[derive(Debug, Clone, Serialize)]
pub struct TextRun {
    pub text: String,
    pub bbox: Bbox,
    pub space: CoordSpace,
    /// Index of the owning [`LineGroup`].
    pub line: usize,
    pub engine: Engine,
}

impl TextRun {
    pub fn new(text: String, bbox: Bbox, line: usize, engine: Engine) -> Self {
        Self {
            text,
            bbox,
            space: CoordSpace::Pixel,
            line,
            engine,
        }
    }

    pub fn is_mapped(&self) -> bool {
        self.space == CoordSpace::Page
    }
}

/// Runs found under one line node. The filter decision is made once for
/// the whole line.
#[derive(Debug, Default)]
pub struct LineGroup {
    pub runs: Vec<usize>,
    pub text: String,
    verdict: OnceCell<Admission>,
    /// Words of this line that made it onto the page, in placement order.
    pub kept_words: Vec<String>,
}

impl LineGroup {
    pub fn push_run(&mut self, index: usize, text: &str) {
        if !self.text.is_empty() {
            self.text.push(' ');
        }
        self.text.push_str(text);
        self.runs.push(index);
    }

    /// Returns the cached verdict, computing it with `decide` on first use.
    pub fn verdict_with(&self, decide: impl FnOnce(&str) -> Admission) -> &Admission {
        self.verdict.get_or_init(|| decide(&self.text))
    }

    pub fn verdict(&self) -> Option<&Admission> {
        self.verdict.get()
    }
}

/// Text orientation decided from geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Rotation {
    Horizontal,
    Vertical,
}

impl Rotation {
    /// Counter-clockwise angle in degrees.
    pub fn degrees(self) -> f64 {
        match self {
            Rotation::Horizontal => 0.0,
            Rotation::Vertical => 90.0,
        }
    }
}

/// Runs sharing one font size and rotation, ready to be composited.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PendingPlacement {
    pub runs: Vec<usize>,
    pub font_size: f64,
    pub rotation: Rotation,
}

/// One text drawing operation with fully resolved geometry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextOp {
    pub text: String,
    pub x: f64,
    pub y: f64,
    pub font_size: f64,
    pub rotation: Rotation,
    /// Opaque debug rendering instead of an invisible layer.
    pub visible: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_group_text() {
        let mut line = LineGroup::default();
        line.push_run(0, "Hello");
        line.push_run(1, "world");
        assert_eq!(line.text, "Hello world");
        assert_eq!(line.runs, vec![0, 1]);
    }

    #[test]
    fn test_verdict_is_cached() {
        let line = LineGroup {
            text: "....".to_string(),
            ..Default::default()
        };
        assert!(line.verdict().is_none());

        let first = line
            .verdict_with(|_| Admission::Reject("noise".to_string()))
            .clone();
        let second = line.verdict_with(|_| Admission::Admit).clone();
        assert_eq!(first, second);
        assert_eq!(second, Admission::Reject("noise".to_string()));
    }
}
