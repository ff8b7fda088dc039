//! Text normalisation: whitespace collapse, boilerplate removal, truncation.

use std::sync::LazyLock;

use regex::Regex;

/// Banner phrases removed up to (not including) the next full stop.
const BOILERPLATE_PATTERNS: &[&str] = &[
    r"(?i)cookie\s+policy[^.]*",
    r"(?i)privacy\s+policy[^.]*",
    r"(?i)terms\s+of\s+service[^.]*",
    r"(?i)subscribe\s+to[^.]*",
    r"(?i)follow\s+us[^.]*",
    r"(?i)share\s+this[^.]*",
];

static BOILERPLATE: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    BOILERPLATE_PATTERNS.iter().filter_map(|p| Regex::new(p).ok()).collect()
});

static WHITESPACE: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"\s+").ok());

/// Collapse runs of whitespace to one space and trim.
pub fn collapse_whitespace(input: &str) -> String {
    match WHITESPACE.as_ref() {
        Some(re) => re.replace_all(input, " ").trim().to_string(),
        None => input.split_whitespace().collect::<Vec<_>>().join(" "),
    }
}

/// Whitespace-normalise, strip banner phrases and cut to `max_chars`
/// characters (an ellipsis marks a cut).
pub fn clean(input: &str, max_chars: usize) -> String {
    let mut text = collapse_whitespace(input);
    for re in BOILERPLATE.iter() {
        text = re.replace_all(&text, "").into_owned();
    }
    let text = collapse_whitespace(&text);
    truncate_chars(&text, max_chars)
}

/// Cut on a character boundary, appending `...` when anything was dropped.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => format!("{}...", text[..byte_idx].trim_end()),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_patterns_compile() {
        assert_eq!(BOILERPLATE.len(), BOILERPLATE_PATTERNS.len());
        assert!(WHITESPACE.is_some());
    }

    #[test]
    fn collapses_whitespace() {
        assert_eq!(collapse_whitespace("  a\n\n b\t c  "), "a b c");
    }

    #[test]
    fn strips_banners_up_to_full_stop() {
        let text = "Real content here. Read our Cookie Policy and accept all. More content. Follow us on social";
        let cleaned = clean(text, 1000);
        assert_eq!(cleaned, "Real content here. . More content.");
    }

    #[test]
    fn truncates_on_char_boundary() {
        let text = "héllo wörld";
        assert_eq!(truncate_chars(text, 5), "héllo...");
        assert_eq!(truncate_chars(text, 50), text);
    }

    #[test]
    fn clean_respects_max_length() {
        let long = "word ".repeat(2000);
        let cleaned = clean(&long, 100);
        assert!(cleaned.ends_with("..."));
        assert!(cleaned.chars().count() <= 103);
    }
}
