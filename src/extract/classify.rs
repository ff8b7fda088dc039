//! Source categorisation and content quality scoring.

use crate::types::SourceCategory;

const NEWS_MARKERS: &[&str] = &["cnn.com", "bbc.com", "reuters.com", "ap.org", "npr.org", "news"];
const ACADEMIC_MARKERS: &[&str] = &[".edu", "scholar.google", "arxiv.org", "researchgate", "jstor"];
const ACADEMIC_TITLE_WORDS: &[&str] = &["research", "study", "journal", "paper", "academic"];
const SOCIAL_MARKERS: &[&str] =
    &["twitter.com", "facebook.com", "linkedin.com", "reddit.com", "youtube.com"];
const ECOMMERCE_MARKERS: &[&str] = &["amazon.com", "ebay.com", "shop", "store", "buy"];
const NAVIGATION_WORDS: &[&str] = &["home", "about", "contact", "menu", "navigation"];

/// First matching family wins: news, academic, social, e-commerce.
pub fn categorize(url: &str, title: &str) -> SourceCategory {
    let url = url.to_lowercase();
    let title = title.to_lowercase();
    let in_url = |markers: &[&str]| markers.iter().any(|m| url.contains(m));

    if in_url(NEWS_MARKERS) {
        SourceCategory::News
    } else if in_url(ACADEMIC_MARKERS) || ACADEMIC_TITLE_WORDS.iter().any(|w| title.contains(w)) {
        SourceCategory::Academic
    } else if in_url(SOCIAL_MARKERS) {
        SourceCategory::Social
    } else if in_url(ECOMMERCE_MARKERS) {
        SourceCategory::Ecommerce
    } else {
        SourceCategory::General
    }
}

/// Heuristic quality in `[0, 1]`, starting from 0.5.
pub fn content_confidence(text: &str, title: &str) -> f64 {
    let mut score = 0.5;
    let lower = text.to_lowercase();

    let words = text.split_whitespace().count();
    if words > 100 {
        score += 0.2;
    } else if words > 50 {
        score += 0.1;
    }

    let title = title.trim().to_lowercase();
    if !title.is_empty() && lower.contains(&title) {
        score += 0.1;
    }

    if text.contains('.') && text.chars().count() > 200 {
        score += 0.1;
    }

    let nav_hits = NAVIGATION_WORDS.iter().filter(|w| lower.contains(*w)).count();
    if nav_hits > 3 {
        score -= 0.2;
    }

    f64::clamp(score, 0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categories_follow_precedence() {
        assert_eq!(categorize("https://www.bbc.com/x", ""), SourceCategory::News);
        assert_eq!(categorize("https://news.example.org/a", "A study"), SourceCategory::News);
        assert_eq!(categorize("https://cs.mit.edu/p", ""), SourceCategory::Academic);
        assert_eq!(categorize("https://blog.example/p", "Journal of Things"), SourceCategory::Academic);
        assert_eq!(categorize("https://www.reddit.com/r/x", ""), SourceCategory::Social);
        assert_eq!(categorize("https://myshop.example", ""), SourceCategory::Ecommerce);
        assert_eq!(categorize("https://example.com", "Hello"), SourceCategory::General);
    }

    #[test]
    fn short_text_scores_base() {
        assert!((content_confidence("tiny", "Other") - 0.5).abs() < 1e-9);
    }

    #[test]
    fn long_titled_text_scores_high() {
        let text = format!("Climate Policy. {}", "sentence words here. ".repeat(40));
        let score = content_confidence(&text, "Climate Policy");
        assert!((score - 0.9).abs() < 1e-9, "{score}");
    }

    #[test]
    fn navigation_text_is_penalised() {
        let score = content_confidence("home about contact menu", "");
        assert!((score - 0.3).abs() < 1e-9, "{score}");
    }
}
