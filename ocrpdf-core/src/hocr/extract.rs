use roxmltree::{Document, Node};
use tracing::*;

use crate::{
    analysis::bbox::Bbox,
    config::{Engine, Granularity},
    diagnostics::Diagnostics,
    hocr::role::NodeRole,
    layout::element::{LineGroup, TextRun},
};

/// Attribute marking paragraphs synthesized for flat markup.
pub const ENGINE_ATTR: &str = "data-ocr-engine";

/// Runs and groupings found in one page of markup, still in pixel space.
#[derive(Debug, Default)]
pub struct Extraction {
    /// Pixel extent of the page, from the first `ocr_page` box.
    pub page_bbox: Option<Bbox>,
    pub runs: Vec<TextRun>,
    pub lines: Vec<LineGroup>,
    /// Run indices sharing one font decision, in document order.
    pub groups: Vec<Vec<usize>>,
}

/// Walks a normalized hOCR document depth-first.
pub fn extract(
    doc: &Document<'_>,
    engine: Engine,
    granularity: Granularity,
    diag: &mut Diagnostics,
) -> Extraction {
    let mut walker = Walker {
        granularity,
        diag,
        out: Extraction::default(),
        current: Vec::new(),
        page_areas: 0,
    };

    walker.visit(doc.root_element(), engine);
    walker.flush();

    if walker.page_areas == 0 {
        walker
            .diag
            .error("markup has no ocr_page element, using fallback placement");
    }

    debug!(
        runs = walker.out.runs.len(),
        lines = walker.out.lines.len(),
        groups = walker.out.groups.len(),
        "extracted markup"
    );
    walker.out
}

/// Text of a node: a text node is itself, an element with a single text
/// child is that text, anything else is the concatenation of its children.
pub fn node_text(node: Node<'_, '_>) -> String {
    if node.is_text() {
        return node.text().unwrap_or_default().to_string();
    }

    let mut children = node.children().filter(|n| n.is_text() || n.is_element());
    match (children.next(), children.next()) {
        (None, _) => String::new(),
        (Some(only), None) if only.is_text() => only.text().unwrap_or_default().to_string(),
        _ => node
            .children()
            .filter(|n| n.is_text() || n.is_element())
            .map(node_text)
            .collect(),
    }
}

struct Walker<'a> {
    granularity: Granularity,
    diag: &'a mut Diagnostics,
    out: Extraction,
    current: Vec<usize>,
    page_areas: usize,
}

impl Walker<'_> {
    /// `engine` is the engine whose conventions apply to this subtree.
    fn visit(&mut self, node: Node<'_, '_>, engine: Engine) {
        if !node.is_element() {
            return;
        }

        match NodeRole::from_class(node.attribute("class")) {
            None => self.visit_children(node, engine),
            Some(NodeRole::Unrecognized(class)) => {
                self.diag
                    .warn(format!("unexpected container class `{class}`, node skipped"));
            }
            Some(NodeRole::PageArea) => {
                self.page_area(node);
                self.flush();
                self.visit_children(node, engine);
                self.flush();
            }
            Some(NodeRole::TextArea) => self.bounded(Granularity::Block, node, engine),
            Some(NodeRole::Paragraph) => {
                let engine = node
                    .attribute(ENGINE_ATTR)
                    .and_then(|name| name.parse::<Engine>().ok())
                    .unwrap_or(engine);
                self.bounded(Granularity::Paragraph, node, engine);
            }
            Some(NodeRole::Line) => self.line(node, engine),
            Some(NodeRole::Word) => {
                let line = self.new_line();
                self.word(node, line, engine);
            }
        }
    }

    fn visit_children(&mut self, node: Node<'_, '_>, engine: Engine) {
        for child in node.children() {
            self.visit(child, engine);
        }
    }

    /// Visits a container that closes the current group at `level`.
    fn bounded(&mut self, level: Granularity, node: Node<'_, '_>, engine: Engine) {
        if self.granularity == level {
            self.flush();
        }
        self.visit_children(node, engine);
        if self.granularity == level {
            self.flush();
        }
    }

    fn page_area(&mut self, node: Node<'_, '_>) {
        self.page_areas += 1;
        let bbox = node.attribute("title").and_then(Bbox::parse_title);

        match (self.out.page_bbox, bbox) {
            (None, Some(bbox)) => {
                info!("page box {:?} - {:?}", bbox.min, bbox.max);
                self.out.page_bbox = Some(bbox);
            }
            (Some(_), Some(_)) => self
                .diag
                .error("multiple page bounding boxes, only the first is used"),
            (_, None) => self
                .diag
                .error("page area has no bounding box, using fallback placement"),
        }
    }

    fn line(&mut self, node: Node<'_, '_>, engine: Engine) {
        if self.granularity == Granularity::Line {
            self.flush();
        }

        let line = self.new_line();
        if !engine.has_word_nodes() || !has_words(node) {
            // the whole line is one run, and at word level its own group
            self.word(node, line, engine);
        } else {
            self.words_in(node, line, engine);
        }

        if self.granularity == Granularity::Line {
            self.flush();
        }
    }

    fn words_in(&mut self, node: Node<'_, '_>, line: usize, engine: Engine) {
        for child in node.children().filter(Node::is_element) {
            match NodeRole::from_class(child.attribute("class")) {
                Some(NodeRole::Word) => self.word(child, line, engine),
                Some(NodeRole::Unrecognized(class)) => {
                    self.diag
                        .warn(format!("unexpected class `{class}` inside a line, node skipped"));
                }
                _ => self.words_in(child, line, engine),
            }
        }
    }

    fn word(&mut self, node: Node<'_, '_>, line: usize, engine: Engine) {
        if self.granularity == Granularity::Word {
            self.flush();
        }
        self.push_run(node, line, engine);
        if self.granularity == Granularity::Word {
            self.flush();
        }
    }

    fn new_line(&mut self) -> usize {
        self.out.lines.push(LineGroup::default());
        self.out.lines.len() - 1
    }

    fn push_run(&mut self, node: Node<'_, '_>, line: usize, engine: Engine) {
        let text = node_text(node);
        let text = text.trim();
        if text.is_empty() {
            return;
        }

        let Some(bbox) = node.attribute("title").and_then(Bbox::parse_title) else {
            self.diag
                .error(format!("run `{text}` has no bounding box, dropped"));
            return;
        };

        let index = self.out.runs.len();
        self.out
            .runs
            .push(TextRun::new(text.to_string(), bbox, line, engine));
        self.out.lines[line].push_run(index, text);
        self.current.push(index);
    }

    fn flush(&mut self) {
        if !self.current.is_empty() {
            self.out.groups.push(std::mem::take(&mut self.current));
        }
    }
}

fn has_words(node: Node<'_, '_>) -> bool {
    node.descendants()
        .skip(1)
        .any(|n| NodeRole::from_class(n.attribute("class")) == Some(NodeRole::Word))
}
