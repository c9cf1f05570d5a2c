//! Helpers for keeping sensitive data out of logs, span fields and the
//! per-job processing log.

use std::path::Path;

use regex::Regex;
use std::sync::LazyLock;

static RE_KEY_PARAM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)([?&](?:key|api_key|apikey|token|access_token)=)[^&#]*").unwrap()
});

/// Returns only the filename component of a path (no directory).
pub fn redact_path(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("<unknown>")
        .to_string()
}

/// Masks credentials carried by a URL: userinfo and key-like query
/// parameters.
///
/// - `https://pixabay.com/api/?key=abc&q=x` → `https://pixabay.com/api/?key=****&q=x`
/// - `https://user:pw@host/path` → `https://****@host/path`
pub fn redact_url(url: &str) -> String {
    let mut out = url.to_string();

    if let Some(scheme_end) = out.find("://") {
        let after_scheme = &out[scheme_end + 3..];
        let authority_end = after_scheme.find('/').unwrap_or(after_scheme.len());
        if let Some(at_pos) = after_scheme[..authority_end].find('@') {
            let scheme = &out[..scheme_end + 3];
            let after_at = &after_scheme[at_pos + 1..];
            out = format!("{}****@{}", scheme, after_at);
        }
    }

    RE_KEY_PARAM.replace_all(&out, "${1}****").into_owned()
}

/// Truncates to at most `max` characters, respecting char boundaries.
pub fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
