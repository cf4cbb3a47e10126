//! Repairs OCR engine markup until it parses as XML.
//!
//! Text content is first masked: every literal that would break an XML
//! parser (raw non-ASCII, a stray `&`, a `<` or `>` that does not belong
//! to a tag) is swapped for a unique placeholder and remembered. Dialect
//! specific structure rewrites then run on the masked text, and finally the
//! placeholders are replaced, in order, with the escaped form of what they
//! stood for.

use std::sync::LazyLock;

use regex::{Captures, Regex};
use uuid::Uuid;

use crate::config::{Dialect, Engine};

/// Declarations, comments and processing instructions, anchored at a `<`.
static DECLARATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?s:<!--.*?-->|<!\[CDATA\[.*?\]\]>|<![A-Za-z][^<>]*>|<\?[^<>]*\?>)")
        .expect("declaration pattern")
});

/// A start, end or empty tag, anchored at a `<`. Group 1 is the name.
static TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?s:</?([A-Za-z][\w:.-]*)(?:\s[^<>]*)?/?>)").expect("tag pattern")
});

/// Elements OCR engines emit. A tag-shaped run with any other name is text.
const MARKUP_TAGS: &[&str] = &[
    "html", "head", "meta", "title", "style", "script", "body", "div", "p", "span", "br",
    "em", "strong",
];

/// Elements flat markup writes without a close tag.
const VOID_TAGS: &[&str] = &["meta", "br"];

static XML_ENTITY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^&(?:amp|lt|gt|quot|apos|#[0-9]{1,7}|#x[0-9A-Fa-f]{1,6});")
        .expect("entity pattern")
});

static NAMED_ENTITY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^&([A-Za-z]{2,8});").expect("named entity pattern"));

static VOID_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)<(meta|br)\b([^<>]*?)\s*/?>").expect("void tag pattern")
});

static VOID_CLOSE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)</(?:meta|br)\s*>").expect("void close pattern"));

static CHAR_SPAN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"<span\s+(?:class=['"]ocr_cinfo['"][^<>]*|title=['"]bbox[^'"]*['"]\s*)>([^<]*)</span>"#,
    )
    .expect("char span pattern")
});

static FLAT_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<span\s+class=['"]ocr_line['"][^<>]*>[^<]*</span>"#).expect("line pattern")
});

/// HTML entities seen in OCR output that XML does not predefine.
const HTML_ENTITIES: &[(&str, u32)] = &[
    ("nbsp", 160),
    ("copy", 169),
    ("laquo", 171),
    ("shy", 173),
    ("reg", 174),
    ("deg", 176),
    ("raquo", 187),
    ("ndash", 8211),
    ("mdash", 8212),
    ("lsquo", 8216),
    ("rsquo", 8217),
    ("ldquo", 8220),
    ("rdquo", 8221),
    ("hellip", 8230),
    ("euro", 8364),
];

/// Decodes raw markup bytes. Input that is not UTF-8 is taken as Latin-1.
pub fn decode(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => bytes.iter().map(|&b| char::from(b)).collect(),
    }
}

/// Produces well-formed XML from the markup of `engine`.
pub fn normalize(raw: &str, engine: Engine) -> String {
    let stripped = strip_control(raw);
    let mut masked = Masked::new(&stripped);

    if engine.dialect() == Dialect::Flat {
        masked.text = rebuild_flat(&masked.text, engine);
    }

    masked.restore()
}

/// Options shared by every parse of normalized markup.
pub fn parsing_options() -> roxmltree::ParsingOptions {
    roxmltree::ParsingOptions {
        allow_dtd: true,
        ..roxmltree::ParsingOptions::default()
    }
}

fn strip_control(text: &str) -> String {
    text.chars()
        .filter(|c| !c.is_control() || matches!(c, '\n' | '\r' | '\t'))
        .collect()
}

/// Markup whose offending literals are hidden behind placeholders.
struct Masked {
    text: String,
    prefix: String,
    substitutions: Vec<String>,
}

impl Masked {
    fn new(text: &str) -> Self {
        let mut masked = Self {
            text: String::with_capacity(text.len()),
            prefix: format!("ocrpdf{}", Uuid::new_v4().simple()),
            substitutions: Vec::new(),
        };

        let mut rest = text;
        while let Some(c) = rest.chars().next() {
            let taken = match c {
                '<' => match structural_len(rest) {
                    Some(len) => {
                        masked.text.push_str(&rest[..len]);
                        len
                    }
                    None => masked.substitute("&lt;".to_string(), 1),
                },
                '>' => masked.substitute("&gt;".to_string(), 1),
                '&' => {
                    if let Some(entity) = XML_ENTITY.find(rest) {
                        masked.text.push_str(entity.as_str());
                        entity.end()
                    } else if let Some((code, len)) = html_entity(rest) {
                        masked.substitute(format!("&#{code};"), len)
                    } else {
                        masked.substitute("&amp;".to_string(), 1)
                    }
                }
                c if !c.is_ascii() => masked.substitute(format!("&#{};", u32::from(c)), c.len_utf8()),
                c => {
                    masked.text.push(c);
                    c.len_utf8()
                }
            };
            rest = &rest[taken..];
        }

        masked
    }

    /// Emits a placeholder standing for `escaped`; returns `consumed`.
    fn substitute(&mut self, escaped: String, consumed: usize) -> usize {
        let index = self.substitutions.len();
        self.text.push_str(&format!("{}_{}_", self.prefix, index));
        self.substitutions.push(escaped);
        consumed
    }

    fn restore(self) -> String {
        if self.substitutions.is_empty() {
            return self.text;
        }

        let pattern = Regex::new(&format!("{}_([0-9]+)_", self.prefix))
            .expect("placeholder pattern");
        pattern
            .replace_all(&self.text, |caps: &Captures| {
                caps[1]
                    .parse::<usize>()
                    .ok()
                    .and_then(|index| self.substitutions.get(index))
                    .cloned()
                    .unwrap_or_default()
            })
            .into_owned()
    }
}

/// Length of the markup at the start of `text`, if it is markup at all.
/// A start tag counts only when its element is closed further on.
fn structural_len(text: &str) -> Option<usize> {
    if let Some(declaration) = DECLARATION.find(text) {
        return Some(declaration.end());
    }

    let caps = TAG.captures(text)?;
    let tag = caps.get(0)?.as_str();
    let name = caps.get(1)?.as_str();
    let lower = name.to_ascii_lowercase();
    if !MARKUP_TAGS.contains(&lower.as_str()) {
        return None;
    }

    let closed = tag.starts_with("</")
        || tag.ends_with("/>")
        || VOID_TAGS.contains(&lower.as_str())
        || text[tag.len()..].contains(&format!("</{name}"));
    closed.then_some(tag.len())
}

fn html_entity(text: &str) -> Option<(u32, usize)> {
    let caps = NAMED_ENTITY.captures(text)?;
    let name = caps.get(1)?.as_str();
    HTML_ENTITIES
        .iter()
        .find(|(entity, _)| *entity == name)
        .map(|(_, code)| (*code, caps.get(0).map_or(0, |m| m.end())))
}

/// Gives flat markup the page/area/paragraph/line shape of nested markup.
fn rebuild_flat(text: &str, engine: Engine) -> String {
    let text = VOID_CLOSE.replace_all(text, "");
    let text = VOID_TAG.replace_all(&text, "<$1$2/>");
    let text = CHAR_SPAN.replace_all(&text, "$1");

    let mut output = String::with_capacity(text.len() + 256);
    let mut last_end = 0;
    let mut area_open = false;

    for line in FLAT_LINE.find_iter(&text) {
        let gap = &text[last_end..line.start()];
        if area_open && gap.trim().is_empty() {
            output.push_str(gap);
        } else {
            if area_open {
                output.push_str("</div>");
            }
            output.push_str(gap);
            output.push_str(r#"<div class="ocr_carea">"#);
            area_open = true;
        }

        output.push_str(&format!(
            r#"<p class="ocr_par" data-ocr-engine="{}">"#,
            engine.name()
        ));
        output.push_str(line.as_str());
        output.push_str("</p>");
        last_end = line.end();
    }

    if area_open {
        output.push_str("</div>");
    }
    output.push_str(&text[last_end..]);
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parses(xml: &str) -> bool {
        roxmltree::Document::parse_with_options(xml, parsing_options()).is_ok()
    }

    #[test]
    fn test_well_formed_markup_is_unchanged() {
        let xml = r#"<html><body><div class='ocr_page' title="bbox 0 0 10 10">a &amp; b &#233;</div></body></html>"#;
        assert_eq!(normalize(xml, Engine::Tesseract), xml);
    }

    #[test]
    fn test_stray_literals_are_escaped() {
        let raw = "<p class='ocr_par'><span class='ocrx_word'>a & b < c > d</span></p>";
        let xml = normalize(raw, Engine::Tesseract);
        assert_eq!(
            xml,
            "<p class='ocr_par'><span class='ocrx_word'>a &amp; b &lt; c &gt; d</span></p>"
        );
        assert!(parses(&xml));
        assert!(!parses(raw));
    }

    #[test]
    fn test_tag_shaped_text_is_escaped() {
        let raw = "<p class='ocr_par'><span class='ocrx_word' title='bbox 0 0 9 9'>a <I> b</span>\
<span class='ocrx_word' title='bbox 10 0 19 9'>a <b c> d</span>\
<span class='ocrx_word' title='bbox 20 0 29 9'>x <span y</span></p>";
        let xml = normalize(raw, Engine::Tesseract);
        assert!(parses(&xml), "{xml}");

        let doc = roxmltree::Document::parse_with_options(&xml, parsing_options()).unwrap();
        let words = doc
            .descendants()
            .filter(|n| n.attribute("class") == Some("ocrx_word"))
            .map(|n| n.text().unwrap_or_default().to_string())
            .collect::<Vec<_>>();
        assert_eq!(words, vec!["a <I> b", "a <b c> d", "x <span y"]);
    }

    #[test]
    fn test_unclosed_start_tag_is_text() {
        let xml = normalize("<p>1 <em class='x'> 2</p>", Engine::Ocropus);
        assert_eq!(xml, "<p>1 &lt;em class='x'&gt; 2</p>");
        assert!(parses(&xml));
    }

    #[test]
    fn test_non_ascii_and_control_characters() {
        let raw = "<p>caf\u{e9}\u{7}\u{1}</p>";
        let xml = normalize(raw, Engine::Ocropus);
        assert_eq!(xml, "<p>caf&#233;</p>");

        let doc = roxmltree::Document::parse_with_options(&xml, parsing_options()).unwrap();
        assert_eq!(doc.root_element().text(), Some("caf\u{e9}"));
    }

    #[test]
    fn test_latin1_input() {
        let bytes = b"<p>na\xefve</p>";
        let text = decode(bytes);
        assert_eq!(normalize(&text, Engine::Tesseract), "<p>na&#239;ve</p>");
    }

    #[test]
    fn test_html_entities_become_numeric() {
        let xml = normalize("<p>a&nbsp;b &bogus; c</p>", Engine::Tesseract);
        assert_eq!(xml, "<p>a&#160;b &amp;bogus; c</p>");
        assert!(parses(&xml));
    }

    #[test]
    fn test_tags_spanning_lines_and_doctype() {
        let raw = "<!DOCTYPE html PUBLIC \"-//W3C//DTD XHTML 1.0 Transitional//EN\"\n \"http://www.w3.org/TR/xhtml1/DTD/xhtml1-transitional.dtd\">\n<html><meta name='ocr-system'\n content='tesseract'/><body>x</body></html>";
        let xml = normalize(raw, Engine::Tesseract);
        assert_eq!(xml, raw);
        assert!(parses(&xml));
    }

    #[test]
    fn test_placeholder_lookalike_text_survives() {
        let raw = "<p>ocrpdf_0_ \u{fc}</p>";
        let xml = normalize(raw, Engine::Tesseract);
        assert_eq!(xml, "<p>ocrpdf_0_ &#252;</p>");
    }

    #[test]
    fn test_flat_dialect_is_rebuilt() {
        let raw = concat!(
            "<html><head><meta http-equiv='Content-Type' content='text/html'>",
            "<meta name='ocr-system' content='cuneiform'></head><body>",
            "<div class='ocr_page' title='bbox 0 0 100 100'>",
            "<span class='ocr_line' title='bbox 1 1 50 10'>",
            "<span title='bbox 1 1 5 10'>H</span><span title='bbox 5 1 9 10'>i</span></span>\n",
            "<span class='ocr_line' title='bbox 1 20 50 30'>",
            "<span class='ocr_cinfo' title='x_bboxes 1 20 5 30'>Yo &</span></span>",
            "<br>",
            "<span class='ocr_line' title='bbox 1 40 50 50'>Z</span>",
            "</div></body></html>"
        );
        let xml = normalize(raw, Engine::Cuneiform);
        assert!(parses(&xml), "{xml}");

        let doc = roxmltree::Document::parse_with_options(&xml, parsing_options()).unwrap();
        let areas = doc
            .descendants()
            .filter(|n| n.attribute("class") == Some("ocr_carea"))
            .count();
        let pars = doc
            .descendants()
            .filter(|n| n.attribute("data-ocr-engine") == Some("cuneiform"))
            .count();
        let char_spans = doc
            .descendants()
            .filter(|n| n.has_tag_name("span") && n.attribute("class").is_none())
            .count();
        // the first two lines are adjacent, the third follows a <br/>
        assert_eq!(areas, 2);
        assert_eq!(pars, 3);
        assert_eq!(char_spans, 0);

        let texts = doc
            .descendants()
            .filter(|n| n.attribute("class") == Some("ocr_line"))
            .map(|n| n.text().unwrap_or_default().to_string())
            .collect::<Vec<_>>();
        assert_eq!(texts, vec!["Hi", "Yo &", "Z"]);
    }
}
