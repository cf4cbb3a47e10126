use std::collections::BTreeMap;

use tracing::*;

/// Line oriented log of everything that went wrong or was dropped.
///
/// Every entry is also emitted through `tracing`. Discard tallies are
/// collected per page and handed over with [`Diagnostics::finish_page`];
/// the log itself grows for the whole run.
#[derive(Debug, Default)]
pub struct Diagnostics {
    page: usize,
    lines: Vec<String>,
    discarded: BTreeMap<String, usize>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attributes the following entries to `page_no`.
    pub fn begin_page(&mut self, page_no: usize) {
        self.page = page_no;
        self.discarded.clear();
    }

    /// Returns the discard tallies of the current page.
    pub fn finish_page(&mut self) -> BTreeMap<String, usize> {
        std::mem::take(&mut self.discarded)
    }

    pub fn error(&mut self, message: impl AsRef<str>) {
        let message = message.as_ref();
        error!(page = self.page, "{message}");
        self.push("error", message);
    }

    pub fn warn(&mut self, message: impl AsRef<str>) {
        let message = message.as_ref();
        warn!(page = self.page, "{message}");
        self.push("warning", message);
    }

    /// Counts `count` dropped items under `reason` without logging them.
    pub fn discard(&mut self, reason: &str, count: usize) {
        debug!(page = self.page, reason, count, "discarded");
        *self.discarded.entry(reason.to_string()).or_default() += count;
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn page_discards(&self) -> &BTreeMap<String, usize> {
        &self.discarded
    }

    fn push(&mut self, level: &str, message: &str) {
        self.lines
            .push(format!("page {}: {level}: {message}", self.page));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_lines_carry_page() {
        let mut diag = Diagnostics::new();
        diag.begin_page(2);
        diag.error("missing bbox");
        diag.warn("second page box");
        assert_eq!(
            diag.lines(),
            &[
                "page 2: error: missing bbox".to_string(),
                "page 2: warning: second page box".to_string()
            ]
        );
    }

    #[test]
    fn test_discards_are_per_page() {
        let mut diag = Diagnostics::new();
        diag.begin_page(1);
        diag.discard("font below minimum", 2);
        diag.discard("font below minimum", 1);
        let first = diag.finish_page();
        assert_eq!(first.get("font below minimum"), Some(&3));

        diag.begin_page(2);
        assert!(diag.page_discards().is_empty());
        diag.error("x");
        assert_eq!(diag.lines().len(), 1);
    }
}
