use std::{collections::BTreeMap, path::PathBuf};

use serde::Serialize;

use crate::layout::element::TextOp;

/// One output page, built from one scanned image.
#[derive(Debug, Clone)]
pub struct Page {
    /// 1-based, in registration order.
    pub page_no: usize,
    /// Size in PDF points.
    pub width: f64,
    pub height: f64,
    pub source: PathBuf,
    /// Image drawn behind the text layer; the source until a scaled copy exists.
    pub background: PathBuf,
    pub ops: Vec<TextOp>,
    pub stats: PageStats,
}

impl Page {
    pub fn new(page_no: usize, source: PathBuf, width: f64, height: f64) -> Self {
        Self {
            page_no,
            width,
            height,
            background: source.clone(),
            source,
            ops: Vec::new(),
            stats: PageStats::default(),
        }
    }

    /// Hands the pending text operations to the writer, leaving none behind.
    pub fn take_ops(&mut self) -> Vec<TextOp> {
        std::mem::take(&mut self.ops)
    }
}

/// Per page diagnostics, serialised into the run report.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PageStats {
    pub placed_runs: usize,
    /// Dropped runs or placements by reason.
    pub discarded: BTreeMap<String, usize>,
    pub text_layer: bool,
}

impl PageStats {
    pub fn discard(&mut self, reason: &str, count: usize) {
        *self.discarded.entry(reason.to_string()).or_default() += count;
    }
}
