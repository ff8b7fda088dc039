//! Layered prompt builder for the analysis stage.
//!
//! Prompts are assembled from plain-text fragments under `config/prompts/`.
//! Layers are appended in order; missing files are skipped so layers can be
//! optional.
//!
//! ```text
//! 0. id.md         persona (who answers)
//! 1. analysis.txt  task template with {{query}} and {{sources}}
//! ```
//!
//! Variable substitution uses `{{key}}` syntax and is applied once at
//! [`build()`](PromptBuilder::build) time, after all layers are joined.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use crate::extract::clean::truncate_chars;
use crate::types::ContentRecord;

const SEPARATOR: &str = "\n\n";

/// Used when `analysis.txt` is missing.
pub const DEFAULT_ANALYSIS_TEMPLATE: &str = "USER QUERY: {{query}}

SEARCH RESULTS:
{{sources}}

INSTRUCTIONS:
Answer the user's query using only the search results above. Combine information \
from several sources where possible and say what the results do not cover. \
Aim for two to four short paragraphs in plain language.

RESPONSE:";

pub struct PromptBuilder {
    prompts_dir: PathBuf,
    parts: Vec<String>,
    vars: HashMap<String, String>,
}

impl PromptBuilder {
    pub fn new(prompts_dir: impl Into<PathBuf>) -> Self {
        Self { prompts_dir: prompts_dir.into(), parts: Vec::new(), vars: HashMap::new() }
    }

    /// Append `filename` from the prompts directory; skipped when missing.
    pub fn layer(self, filename: &str) -> Self {
        self.load(filename, None)
    }

    /// Like [`layer`](Self::layer) but appends `fallback` when the file is missing.
    pub fn layer_or(self, filename: &str, fallback: &str) -> Self {
        self.load(filename, Some(fallback))
    }

    fn load(mut self, filename: &str, fallback: Option<&str>) -> Self {
        let path = self.prompts_dir.join(filename);
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(_) => {
                tracing::debug!("prompt: layer '{}' not found, skipped", path.display());
                fallback.unwrap_or_default().to_string()
            }
        };
        let trimmed = text.trim();
        if !trimmed.is_empty() {
            self.parts.push(trimmed.to_string());
        }
        self
    }

    pub fn var(mut self, key: &str, value: impl Into<String>) -> Self {
        self.vars.insert(key.to_string(), value.into());
        self
    }

    pub fn build(self) -> String {
        let mut prompt = self.parts.join(SEPARATOR);
        for (k, v) in &self.vars {
            let placeholder = format!("{{{{{}}}}}", k);
            prompt = prompt.replace(&placeholder, v);
        }
        prompt
    }
}

/// Numbered source sections: top `max_sources`, each text cut to
/// `max_chars` characters.
pub fn render_sources(contents: &[ContentRecord], max_sources: usize, max_chars: usize) -> String {
    contents
        .iter()
        .take(max_sources)
        .enumerate()
        .map(|(i, c)| {
            format!(
                "Source {} ({}):\nTitle: {}\nURL: {}\nContent: {}\n",
                i + 1,
                c.source_category.as_str(),
                c.title,
                c.url,
                truncate_chars(&c.text, max_chars),
            )
        })
        .collect::<Vec<_>>()
        .join("\n---\n")
}

/// Persona + analysis template with query and rendered sources substituted.
pub fn analysis_prompt(prompts_dir: impl Into<PathBuf>, query: &str, sources: &str) -> String {
    PromptBuilder::new(prompts_dir)
        .layer("id.md")
        .layer_or("analysis.txt", DEFAULT_ANALYSIS_TEMPLATE)
        .var("query", query)
        .var("sources", sources)
        .build()
}
