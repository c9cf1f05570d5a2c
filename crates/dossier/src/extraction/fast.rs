use crate::error::ExtractionError;
use crate::extraction::{CancelToken, DocumentFormat, ExtractionMethod, Extractor};

/// Pattern for Identity-H Unimplemented errors (common with CID fonts).
const IDENTITY_H_PATTERN: &str = "?Identity-H Unimplemented?";

/// Minimum number of characters required before applying alphanumeric ratio check.
/// Text shorter than this is considered valid regardless of character composition.
const MIN_TOTAL_CHARS: usize = 50;

/// Minimum percentage of alphanumeric characters required for text to be considered valid.
const MIN_ALPHANUMERIC_PERCENT: usize = 10;

/// Reads the text layer of machine-generated PDFs with lopdf. Cheap, but
/// gives up on anything with unusual fonts or a damaged structure.
pub struct FastPdfExtractor;

impl FastPdfExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl Default for FastPdfExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl Extractor for FastPdfExtractor {
    fn method(&self) -> ExtractionMethod {
        ExtractionMethod::FastPdf
    }

    fn supports(&self, format: DocumentFormat) -> bool {
        matches!(format, DocumentFormat::Pdf)
    }

    fn extract(
        &self,
        bytes: &[u8],
        _format: DocumentFormat,
        cancel: &CancelToken,
    ) -> Result<String, ExtractionError> {
        let _span = tracing::debug_span!("extraction.fast_pdf").entered();

        let doc = lopdf::Document::load_mem(bytes)
            .map_err(|e| ExtractionError::PdfProcessing(format!("Failed to load PDF: {}", e)))?;

        let mut text = String::new();
        for (page_num, _) in doc.get_pages() {
            cancel.check()?;
            if let Ok(page_text) = doc.extract_text(&[page_num]) {
                text.push_str(&page_text);
                text.push('\n');
            }
        }

        if is_low_quality(&text) {
            return Err(ExtractionError::LowQuality(format!(
                "{} chars of unusable text",
                text.trim().chars().count()
            )));
        }

        Ok(text)
    }
}

/// True when extracted text is empty, only font encoding error markers, or
/// mostly non-alphanumeric noise.
pub fn is_low_quality(text: &str) -> bool {
    let trimmed = text.trim();

    if trimmed.is_empty() {
        return true;
    }

    let cleaned = trimmed
        .replace(IDENTITY_H_PATTERN, "")
        .replace(['\n', ' '], "");

    if cleaned.is_empty() {
        return true;
    }

    // chars().count() so non-ASCII text is measured correctly
    let total_chars = trimmed.chars().count();
    let alphanumeric_chars = trimmed.chars().filter(|c| c.is_alphanumeric()).count();

    total_chars > MIN_TOTAL_CHARS && alphanumeric_chars * 100 < total_chars * MIN_ALPHANUMERIC_PERCENT
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extraction::test_support::text_pdf;

    #[test]
    fn test_supports_pdf_format() {
        let extractor = FastPdfExtractor::new();
        assert!(extractor.supports(DocumentFormat::Pdf));
        assert!(!extractor.supports(DocumentFormat::Image));
        assert!(!extractor.supports(DocumentFormat::Text));
        assert!(!extractor.supports(DocumentFormat::Docx));
    }

    #[test]
    fn test_extract_pdf_with_embedded_text() {
        let extractor = FastPdfExtractor::new();
        let text = extractor
            .extract(
                &text_pdf("Test PDF Content"),
                DocumentFormat::Pdf,
                &CancelToken::new(),
            )
            .unwrap();
        assert!(text.contains("Test PDF Content"));
    }

    #[test]
    fn test_corrupted_pdf_error() {
        let extractor = FastPdfExtractor::new();
        let result = extractor.extract(
            b"not a valid pdf content",
            DocumentFormat::Pdf,
            &CancelToken::new(),
        );
        match result {
            Err(ExtractionError::PdfProcessing(msg)) => assert!(msg.contains("Failed to load PDF")),
            _ => panic!("Expected PdfProcessing error"),
        }
    }

    #[test]
    fn test_cancelled_before_first_page() {
        let extractor = FastPdfExtractor::new();
        let cancel = CancelToken::new();
        cancel.cancel();
        let result = extractor.extract(&text_pdf("Hello"), DocumentFormat::Pdf, &cancel);
        assert!(matches!(result, Err(ExtractionError::Cancelled)));
    }

    #[test]
    fn test_low_quality_empty_text() {
        assert!(is_low_quality(""));
        assert!(is_low_quality("   "));
        assert!(is_low_quality("\n\n\t  \n"));
    }

    #[test]
    fn test_low_quality_identity_h_errors() {
        assert!(is_low_quality(
            "?Identity-H Unimplemented??Identity-H Unimplemented?"
        ));
        assert!(is_low_quality(
            "?Identity-H Unimplemented?\n?Identity-H Unimplemented?\n"
        ));
    }

    #[test]
    fn test_low_quality_garbled_text() {
        let garbled = "!@#$%^&*()_+-=[]{}|;':\",./<>?`~!@#$%^&*()_+-=[]{}|;':\",./<>?`~";
        assert!(is_low_quality(garbled));
    }

    #[test]
    fn test_valid_text_passes() {
        assert!(!is_low_quality("This is a normal document with readable text."));
        assert!(!is_low_quality("Invoice #12345\nDate: 2024-01-15\nAmount: $100.00"));
    }

    #[test]
    fn test_short_symbolic_text_passes() {
        // Below MIN_TOTAL_CHARS the ratio check does not apply.
        assert!(!is_low_quality("$$$ !!!"));
    }

    #[test]
    fn test_non_ascii_text_passes() {
        assert!(!is_low_quality("Relatório anual de desempenho financeiro 2024"));
        assert!(!is_low_quality("日本語のテキストドキュメント"));
    }
}
