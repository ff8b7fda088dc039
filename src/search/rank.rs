//! Relevance scoring and de-duplication.

use std::collections::HashMap;

use crate::types::SearchResult;

/// Heuristic relevance in `[0, 1]`.
///
/// Base 0.5; +0.3 when the whole query occurs in the title, +0.2 when it
/// occurs in the snippet, +0.2 × the fraction of query terms found in either;
/// +0.1 for rank ≤ 3 or +0.05 for rank ≤ 5 when the provider reports rank.
pub fn relevance_score(title: &str, snippet: &str, query: &str, position: Option<u32>) -> f64 {
    let title = title.to_lowercase();
    let snippet = snippet.to_lowercase();
    let query = query.to_lowercase();
    let mut score = 0.5;

    if title.contains(&query) {
        score += 0.3;
    }
    if snippet.contains(&query) {
        score += 0.2;
    }

    let terms: Vec<&str> = query.split_whitespace().collect();
    if !terms.is_empty() {
        let haystack = format!("{title} {snippet}");
        let matched = terms.iter().filter(|t| haystack.contains(*t)).count();
        score += 0.2 * matched as f64 / terms.len() as f64;
    }

    match position {
        Some(p) if p <= 3 => score += 0.1,
        Some(p) if p <= 5 => score += 0.05,
        _ => {}
    }

    score.clamp(0.0, 1.0)
}

/// One result per URL, highest score first, at most `limit`.
///
/// A later duplicate replaces the kept one only with a strictly higher
/// score, so ties keep the first-seen result.
pub fn dedup_and_rank(results: Vec<SearchResult>, limit: usize) -> Vec<SearchResult> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut unique: Vec<SearchResult> = Vec::new();

    for result in results {
        match index.get(&result.url) {
            Some(&i) => {
                if result.relevance_score > unique[i].relevance_score {
                    unique[i] = result;
                }
            }
            None => {
                index.insert(result.url.clone(), unique.len());
                unique.push(result);
            }
        }
    }

    // Stable sort keeps first-seen order among equal scores.
    unique.sort_by(|a, b| b.relevance_score.total_cmp(&a.relevance_score));
    unique.truncate(limit);
    unique
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(url: &str, engine: &str, score: f64) -> SearchResult {
        SearchResult {
            title: format!("title {url}"),
            url: url.to_string(),
            snippet: String::new(),
            source_engine: engine.to_string(),
            relevance_score: score,
        }
    }

    #[test]
    fn full_match_with_top_rank_clamps_to_one() {
        let s = relevance_score("Climate Policy 2024", "climate policy 2024 explained", "climate policy 2024", Some(1));
        assert_eq!(s, 1.0);
    }

    #[test]
    fn no_match_is_base() {
        assert_eq!(relevance_score("cats", "dogs", "quantum", None), 0.5);
    }

    #[test]
    fn partial_term_coverage() {
        // One of two terms, no phrase match.
        let s = relevance_score("climate report", "", "climate policy", None);
        assert!((s - 0.6).abs() < 1e-9);
    }

    #[test]
    fn position_bonus_tiers() {
        let base = relevance_score("x", "y", "zzz", None);
        assert!((relevance_score("x", "y", "zzz", Some(3)) - base - 0.1).abs() < 1e-9);
        assert!((relevance_score("x", "y", "zzz", Some(5)) - base - 0.05).abs() < 1e-9);
        assert_eq!(relevance_score("x", "y", "zzz", Some(6)), base);
    }

    #[test]
    fn no_duplicate_urls_survive() {
        let input = vec![
            result("https://a", "brave", 0.6),
            result("https://b", "brave", 0.7),
            result("https://a", "serpapi", 0.9),
            result("https://b", "serpapi", 0.7),
            result("https://c", "serpapi", 0.5),
        ];
        let out = dedup_and_rank(input, 10);
        assert_eq!(out.len(), 3);
        let mut urls: Vec<&str> = out.iter().map(|r| r.url.as_str()).collect();
        urls.dedup();
        assert_eq!(urls.len(), 3);
        // Higher-scoring duplicate wins; tie keeps the first seen.
        assert_eq!(out[0].url, "https://a");
        assert_eq!(out[0].source_engine, "serpapi");
        assert_eq!(out[1].source_engine, "brave");
    }

    #[test]
    fn sorted_descending_and_truncated() {
        let input = vec![
            result("https://a", "x", 0.5),
            result("https://b", "x", 0.9),
            result("https://c", "x", 0.7),
        ];
        let out = dedup_and_rank(input, 2);
        let scores: Vec<f64> = out.iter().map(|r| r.relevance_score).collect();
        assert_eq!(scores, vec![0.9, 0.7]);
    }
}
