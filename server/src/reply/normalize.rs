//! Text normalization applied before routing.

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Trim, lowercase and strip diacritics.
///
/// Runs of whitespace collapse to a single space so multi-word keywords
/// ("bom dia") match regardless of spacing.
pub fn normalize_text(text: &str) -> String {
    let folded: String = text
        .trim()
        .to_lowercase()
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .collect();

    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}
