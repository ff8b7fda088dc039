//! Tests for the shipped prompt files under config/prompts

use std::fs;

use sift::analysis::prompt::analysis_prompt;

#[test]
fn test_persona_prompt_file_exists() {
    let path = "config/prompts/id.md";
    assert!(fs::metadata(path).is_ok(), "id.md prompt file missing");
}

#[test]
fn test_analysis_prompt_file_exists() {
    let path = "config/prompts/analysis.txt";
    assert!(fs::metadata(path).is_ok(), "analysis.txt prompt file missing");
}

#[test]
fn test_analysis_prompt_template_vars() {
    let text = fs::read_to_string("config/prompts/analysis.txt").unwrap();
    assert!(text.contains("{{query}}"), "analysis.txt should contain {{query}} variable");
    assert!(text.contains("{{sources}}"), "analysis.txt should contain {{sources}} variable");
}

#[test]
fn test_shipped_prompt_substitutes_everything() {
    let prompt = analysis_prompt("config/prompts", "climate policy 2024", "Source 1 (news): ...");
    assert!(prompt.contains("climate policy 2024"));
    assert!(prompt.contains("Source 1 (news)"));
    assert!(!prompt.contains("{{"), "unsubstituted variable left in prompt");
}
