//! Deterministic fallback answer built straight from extracted content.

use crate::extract::clean::truncate_chars;
use crate::types::ContentRecord;

/// Sources quoted in the bullet list.
const SUMMARY_SOURCES: usize = 5;
const LEAD_SENTENCES: usize = 2;
const LEAD_MAX_CHARS: usize = 300;

/// Confidence when no content was available at all.
pub const NO_CONTENT_CONFIDENCE: f64 = 0.1;

#[derive(Debug, Clone, PartialEq)]
pub struct Summary {
    pub answer: String,
    pub sources: Vec<String>,
    pub confidence: f64,
}

/// Titles and lead sentences of the top sources as a labelled bullet list.
/// Never empty: without content it explains that nothing was retrieved.
pub fn fallback_summary(query: &str, contents: &[ContentRecord]) -> Summary {
    if contents.is_empty() {
        return Summary {
            answer: format!(
                "No web content could be retrieved for \"{query}\". \
                 Try rephrasing the query or try again later."
            ),
            sources: Vec::new(),
            confidence: NO_CONTENT_CONFIDENCE,
        };
    }

    let mut answer = format!(
        "Summary of {} source{} for \"{query}\" (automatic summary, language-model analysis unavailable):\n",
        contents.len(),
        if contents.len() == 1 { "" } else { "s" },
    );
    for c in contents.iter().take(SUMMARY_SOURCES) {
        let title = if c.title.trim().is_empty() { c.url.as_str() } else { c.title.trim() };
        answer.push_str(&format!("\n• {title}: {}", lead(&c.text)));
    }

    let quoted = contents.len().min(SUMMARY_SOURCES) as f64;
    Summary {
        answer,
        sources: contents.iter().map(|c| c.url.clone()).collect(),
        confidence: 0.55 + 0.02 * quoted,
    }
}

/// First sentences of `text`, bounded in length.
fn lead(text: &str) -> String {
    let mut out = String::new();
    let mut taken = 0;
    for sentence in text.split_inclusive(['.', '!', '?']) {
        let sentence = sentence.trim();
        if sentence.is_empty() {
            continue;
        }
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(sentence);
        taken += 1;
        if taken == LEAD_SENTENCES {
            break;
        }
    }
    truncate_chars(&out, LEAD_MAX_CHARS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ExtractionMethod, SourceCategory};

    fn record(n: usize) -> ContentRecord {
        ContentRecord {
            url: format!("https://site{n}.example/page"),
            title: format!("Report {n}"),
            text: "First sentence here. Second one follows! Third is dropped.".into(),
            word_count: 9,
            source_category: SourceCategory::General,
            extraction_method: ExtractionMethod::TagStrip,
            confidence: 0.6,
            fetch_time_seconds: 0.2,
        }
    }

    #[test]
    fn six_sources_give_bullets_for_top_five() {
        let contents: Vec<ContentRecord> = (1..=6).map(record).collect();
        let s = fallback_summary("climate policy 2024", &contents);
        assert_eq!(s.answer.matches("\n• ").count(), 5);
        assert!(s.answer.contains("• Report 1: First sentence here. Second one follows!"));
        assert!(!s.answer.contains("Third"));
        assert_eq!(s.sources.len(), 6);
        assert!((s.confidence - 0.65).abs() < 1e-9);
    }

    #[test]
    fn single_source_confidence() {
        let s = fallback_summary("q", &[record(1)]);
        assert!((s.confidence - 0.57).abs() < 1e-9);
        assert!(s.answer.starts_with("Summary of 1 source for"));
    }

    #[test]
    fn no_content_is_still_an_answer() {
        let s = fallback_summary("q", &[]);
        assert!(!s.answer.is_empty());
        assert!(s.sources.is_empty());
        assert_eq!(s.confidence, NO_CONTENT_CONFIDENCE);
    }

    #[test]
    fn lead_is_bounded() {
        let text = "a".repeat(1000);
        assert_eq!(lead(&text).chars().count(), LEAD_MAX_CHARS + 3);
    }
}
