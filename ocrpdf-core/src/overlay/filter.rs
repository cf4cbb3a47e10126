use std::fmt;

use serde::Serialize;

use crate::consts::DOTTED_LINE_RATIO;

/// Outcome of a line filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Admission {
    Admit,
    /// Human readable reason the line was rejected.
    Reject(String),
}

impl Admission {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Admission::Admit)
    }
}

/// Decides whether an assembled OCR line is real text.
pub trait LineFilter: Send + Sync {
    fn check(&self, line: &str) -> Admission;
}

impl<F> LineFilter for F
where
    F: Fn(&str) -> Admission + Send + Sync,
{
    fn check(&self, line: &str) -> Admission {
        self(line)
    }
}

impl fmt::Debug for dyn LineFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("LineFilter")
    }
}

/// Admits everything; used when no filter is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct AdmitAll;

impl LineFilter for AdmitAll {
    fn check(&self, _line: &str) -> Admission {
        Admission::Admit
    }
}

/// Rejects leader dots and similar rows that OCR reads as `i`, `:`, `.`
/// and `f` characters.
#[derive(Debug, Clone, Copy, Default)]
pub struct DottedLineFilter;

impl LineFilter for DottedLineFilter {
    fn check(&self, line: &str) -> Admission {
        let visible = line.chars().filter(|c| !c.is_whitespace());
        let total = visible.clone().count();
        let remaining = visible
            .filter(|c| !matches!(c, 'i' | ':' | '.' | 'f'))
            .count();

        if total > 0 && (remaining as f64) < DOTTED_LINE_RATIO * total as f64 {
            Admission::Reject("Likely dotted line".to_string())
        } else {
            Admission::Admit
        }
    }
}
