//! Shared text normalization and comparison utilities
//!
//! Title comparisons across the parser, resolver and matcher all go through
//! [`normalize_for_compare`] so that `Spider-Man: No Way Home` and
//! `SPIDERMAN NO WAY HOME` compare equal.

use once_cell::sync::Lazy;
use regex::Regex;

/// Punctuation (ASCII and full-width) plus zero-width characters dropped before comparing
static SPECIAL_CHARS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"[、.。,，·:：;；!！'’"“”()（）\[\]【】「」\-—+|\\_/&#～~\x{200B}-\x{200D}\x{FEFF}]"#,
    )
    .unwrap()
});

/// Normalize a title for case- and punctuation-insensitive equality.
/// Removes punctuation and all whitespace, converts to uppercase.
///
/// # Example
/// ```ignore
/// assert_eq!(normalize_for_compare("Spider-Man: No Way Home"), "SPIDERMANNOWAYHOME");
/// ```
pub fn normalize_for_compare(text: &str) -> String {
    SPECIAL_CHARS_RE
        .replace_all(text, "")
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_uppercase()
}

/// True when both titles are equal after [`normalize_for_compare`]
pub fn titles_equal(a: &str, b: &str) -> bool {
    let a = normalize_for_compare(a);
    !a.is_empty() && a == normalize_for_compare(b)
}

fn is_cjk(c: char) -> bool {
    ('\u{4e00}'..='\u{9fff}').contains(&c)
}

/// True if the text contains at least one CJK ideograph
pub fn contains_cjk(text: &str) -> bool {
    text.chars().any(is_cjk)
}

/// True if every non-space, non-punctuation character is a CJK ideograph
pub fn is_all_cjk(text: &str) -> bool {
    let mut seen = false;
    for c in text.chars() {
        if c.is_whitespace() || c.is_ascii_punctuation() || c == '·' || c == '：' {
            continue;
        }
        if !is_cjk(c) {
            return false;
        }
        seen = true;
    }
    seen
}

/// Ratio of matching characters between two strings (0.0 to 1.0).
/// Based on the indel distance, so `ab` vs `abc` scores 0.8.
pub fn similarity_ratio(a: &str, b: &str) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    rapidfuzz::distance::indel::normalized_similarity(a.chars(), b.chars())
}

/// Collapse runs of whitespace to single spaces and trim
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
