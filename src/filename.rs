use std::sync::LazyLock;

use regex::Regex;
use unicode_normalization::UnicodeNormalization;

const MAX_COMPONENT_BYTES: usize = 200;

static WS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Sanitizes a single path component derived from catalog text (course,
/// lesson or episode title). Never returns an empty string.
pub fn sanitize_component(name: &str) -> String {
    let name: String = name.nfc().collect();
    let name = sanitize_filename::sanitize(name.trim());
    let name = WS_RE.replace_all(&name, " ");
    let name = name.trim_end_matches([' ', '-', '.', ';']).trim();

    let mut end = name.len().min(MAX_COMPONENT_BYTES);
    while end > 0 && !name.is_char_boundary(end) {
        end -= 1;
    }
    let clamped = name[..end].trim_end();

    if clamped.is_empty() {
        "untitled".to_string()
    } else {
        clamped.to_string()
    }
}
