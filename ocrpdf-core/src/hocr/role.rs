/// Role of an hOCR element, resolved from its `class` attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeRole {
    PageArea,
    TextArea,
    Paragraph,
    Line,
    Word,
    /// An `ocr*` class outside the supported vocabulary.
    Unrecognized(String),
}

impl NodeRole {
    /// Resolves the role of an element from its `class` attribute.
    ///
    /// Returns `None` for elements that carry no OCR class at all; those are
    /// plain HTML and are walked through.
    pub fn from_class(class: Option<&str>) -> Option<Self> {
        let class = class?
            .split_whitespace()
            .find(|token| token.starts_with("ocr"))?;

        let role = match class {
            "ocr_page" => NodeRole::PageArea,
            "ocr_carea" => NodeRole::TextArea,
            "ocr_par" => NodeRole::Paragraph,
            "ocr_line" | "ocr_header" | "ocr_caption" | "ocr_textfloat" => NodeRole::Line,
            "ocrx_word" | "ocr_word" => NodeRole::Word,
            other => NodeRole::Unrecognized(other.to_string()),
        };
        Some(role)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_classes() {
        assert_eq!(NodeRole::from_class(Some("ocr_page")), Some(NodeRole::PageArea));
        assert_eq!(NodeRole::from_class(Some("ocr_carea")), Some(NodeRole::TextArea));
        assert_eq!(NodeRole::from_class(Some("ocr_par")), Some(NodeRole::Paragraph));
        assert_eq!(NodeRole::from_class(Some("ocr_header")), Some(NodeRole::Line));
        assert_eq!(NodeRole::from_class(Some("ocrx_word")), Some(NodeRole::Word));
    }

    #[test]
    fn test_plain_and_unknown_classes() {
        assert_eq!(NodeRole::from_class(None), None);
        assert_eq!(NodeRole::from_class(Some("title")), None);
        assert_eq!(
            NodeRole::from_class(Some("ocr_photo")),
            Some(NodeRole::Unrecognized("ocr_photo".to_string()))
        );
        assert_eq!(
            NodeRole::from_class(Some("big ocr_line")),
            Some(NodeRole::Line)
        );
    }
}
