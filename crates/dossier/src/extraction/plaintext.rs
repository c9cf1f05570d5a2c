use crate::error::ExtractionError;
use crate::extraction::{CancelToken, DocumentFormat, ExtractionMethod, Extractor};

/// Last tier of the cascade. Accepts every format and never fails.
pub struct PlaintextDecoder;

impl PlaintextDecoder {
    pub fn new() -> Self {
        Self
    }
}

impl Default for PlaintextDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Extractor for PlaintextDecoder {
    fn method(&self) -> ExtractionMethod {
        ExtractionMethod::Plaintext
    }

    fn supports(&self, _format: DocumentFormat) -> bool {
        true
    }

    fn extract(
        &self,
        bytes: &[u8],
        _format: DocumentFormat,
        _cancel: &CancelToken,
    ) -> Result<String, ExtractionError> {
        Ok(decode(bytes))
    }
}

/// Strict UTF-8 decode; anything else becomes an empty string.
pub fn decode(bytes: &[u8]) -> String {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    std::str::from_utf8(bytes)
        .map(str::to_string)
        .unwrap_or_default()
}
