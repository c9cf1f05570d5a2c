use std::sync::LazyLock;

use regex::Regex;

use crate::error::ExtractionError;
use crate::extraction::{ooxml, CancelToken, DocumentFormat, ExtractionMethod, Extractor};

static RE_SCRIPT_STYLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<(script|style|noscript)\b.*?</(script|style|noscript)>").unwrap()
});
static RE_BLOCK_END: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)<br\s*/?>|</(p|div|h[1-6]|li|tr|section|article|blockquote)>").unwrap()
});
static RE_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<[^>]*>").unwrap());
static RE_BLANK_LINES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n{3,}").unwrap());

/// Multi-format parser for everything the PDF fast path cannot handle.
/// OCR is not attempted; scanned documents come out empty and fall through.
pub struct HeavyParser;

impl HeavyParser {
    pub fn new() -> Self {
        Self
    }
}

impl Default for HeavyParser {
    fn default() -> Self {
        Self::new()
    }
}

impl Extractor for HeavyParser {
    fn method(&self) -> ExtractionMethod {
        ExtractionMethod::HeavyParser
    }

    fn supports(&self, format: DocumentFormat) -> bool {
        matches!(
            format,
            DocumentFormat::Pdf
                | DocumentFormat::Docx
                | DocumentFormat::Pptx
                | DocumentFormat::Xlsx
                | DocumentFormat::Html
                | DocumentFormat::Text
        )
    }

    fn extract(
        &self,
        bytes: &[u8],
        format: DocumentFormat,
        cancel: &CancelToken,
    ) -> Result<String, ExtractionError> {
        let _span = tracing::debug_span!("extraction.heavy_parser", ?format).entered();
        cancel.check()?;

        let text = match format {
            DocumentFormat::Pdf => pdf_extract::extract_text_from_mem(bytes)
                .map_err(|e| ExtractionError::PdfProcessing(e.to_string()))?,
            DocumentFormat::Docx => ooxml::docx_text(bytes, cancel)?,
            DocumentFormat::Pptx => ooxml::pptx_text(bytes, cancel)?,
            DocumentFormat::Xlsx => ooxml::xlsx_text(bytes, cancel)?,
            DocumentFormat::Html => html_text(&utf8(bytes)?),
            DocumentFormat::Text => utf8(bytes)?,
            other => return Err(ExtractionError::UnsupportedFormat(format!("{:?}", other))),
        };

        // The caller may have given up while the parser was busy.
        cancel.check()?;

        if text.trim().is_empty() {
            return Err(ExtractionError::LowQuality("no text found".to_string()));
        }
        Ok(text)
    }
}

fn utf8(bytes: &[u8]) -> Result<String, ExtractionError> {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    String::from_utf8(bytes.to_vec())
        .map_err(|e| ExtractionError::UnsupportedFormat(format!("not UTF-8: {}", e)))
}

/// Strips markup from an HTML page, keeping block boundaries as newlines.
pub fn html_text(html: &str) -> String {
    let without_code = RE_SCRIPT_STYLE.replace_all(html, "");
    let with_breaks = RE_BLOCK_END.replace_all(&without_code, "\n");
    let stripped = RE_TAG.replace_all(&with_breaks, "");
    let decoded = decode_entities(&stripped);

    let lines: Vec<&str> = decoded.lines().map(str::trim).collect();
    let joined = lines.join("\n");
    RE_BLANK_LINES
        .replace_all(joined.trim(), "\n\n")
        .into_owned()
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extraction::ooxml::test_support::package;
    use crate::extraction::test_support::text_pdf;

    fn extract(bytes: &[u8], format: DocumentFormat) -> Result<String, ExtractionError> {
        HeavyParser::new().extract(bytes, format, &CancelToken::new())
    }

    #[test]
    fn test_supported_formats() {
        let parser = HeavyParser::new();
        assert!(parser.supports(DocumentFormat::Pdf));
        assert!(parser.supports(DocumentFormat::Xlsx));
        assert!(parser.supports(DocumentFormat::Html));
        assert!(!parser.supports(DocumentFormat::Image));
        assert!(!parser.supports(DocumentFormat::Unknown));
    }

    #[test]
    fn test_text_with_bom() {
        let text = extract(b"\xEF\xBB\xBFcol_a,col_b\n1,2\n", DocumentFormat::Text).unwrap();
        assert_eq!(text, "col_a,col_b\n1,2\n");
    }

    #[test]
    fn test_invalid_utf8_text_fails() {
        let result = extract(&[0x66, 0x6f, 0xff, 0xfe], DocumentFormat::Text);
        assert!(matches!(result, Err(ExtractionError::UnsupportedFormat(_))));
    }

    #[test]
    fn test_empty_text_is_low_quality() {
        let result = extract(b"   \n ", DocumentFormat::Text);
        assert!(matches!(result, Err(ExtractionError::LowQuality(_))));
    }

    #[test]
    fn test_html_stripping() {
        let html = r#"<html><head><style>body { color: red; }</style>
            <script>alert("x")</script></head>
            <body><h1>Annual Report</h1><p>Revenue &amp; costs</p><p>Line<br>break</p></body></html>"#;
        let text = html_text(html);
        assert!(text.contains("Annual Report"));
        assert!(text.contains("Revenue & costs"));
        assert!(text.contains("Line\nbreak"));
        assert!(!text.contains("alert"));
        assert!(!text.contains("color: red"));
        assert!(!text.contains('<'));
    }

    #[test]
    fn test_docx_routed_to_ooxml() {
        let bytes = package(&[(
            "word/document.xml",
            r#"<w:document xmlns:w="w"><w:body><w:p><w:r><w:t>Clause one</w:t></w:r></w:p></w:body></w:document>"#,
        )]);
        let text = extract(&bytes, DocumentFormat::Docx).unwrap();
        assert_eq!(text.trim(), "Clause one");
    }

    #[test]
    fn test_pdf_layout_extraction() {
        let text = extract(&text_pdf("Heavy parser sample"), DocumentFormat::Pdf).unwrap();
        assert!(text.contains("parser"));
    }

    #[test]
    fn test_cancelled_parser_stops() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let result = HeavyParser::new().extract(b"hello", DocumentFormat::Text, &cancel);
        assert!(matches!(result, Err(ExtractionError::Cancelled)));
    }
}
