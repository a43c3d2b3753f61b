//! Validation logic for extracted claims
//!
//! Nothing here rejects a claim. Claims naming an unknown topic or subtopic are
//! kept and bucketed under their literal names, quotes that cannot be found in
//! the comment only produce warnings.

use crate::model::{ClaimsExtraction, Taxonomy};

/// Share of quote words that must appear, in order, in the comment
const WORD_SUBSEQUENCE_RATIO: f32 = 0.70;

/// Result of claim validation for one comment
#[derive(Debug, Default)]
pub struct ClaimValidationResult {
    /// Quality issues worth logging
    pub warnings: Vec<String>,
    /// Claims whose topic/subtopic pair is not in the taxonomy
    pub unmatched: usize,
}

impl ClaimValidationResult {
    pub fn add_warning(&mut self, warning: String) {
        self.warnings.push(warning);
    }
}

/// Check claims of one comment against the taxonomy and the comment text
pub fn validate_claims(
    extraction: &ClaimsExtraction,
    taxonomy: &Taxonomy,
    comment: &str,
) -> ClaimValidationResult {
    let mut result = ClaimValidationResult::default();

    for (i, claim) in extraction.claims.iter().enumerate() {
        if taxonomy.topic(&claim.topic_name).is_none() {
            result.unmatched += 1;
            result.add_warning(format!(
                "Claim {} names unknown topic '{}'",
                i + 1,
                claim.topic_name
            ));
        } else if !taxonomy.contains(&claim.topic_name, &claim.subtopic_name) {
            result.unmatched += 1;
            result.add_warning(format!(
                "Claim {} names unknown subtopic '{}' under '{}'",
                i + 1,
                claim.subtopic_name,
                claim.topic_name
            ));
        }

        if claim.quote.trim().is_empty() {
            result.add_warning(format!("Claim {} has empty quote", i + 1));
        } else if !quote_is_grounded(&claim.quote, comment) {
            result.add_warning(format!(
                "Claim {} quote not found in comment: '{}'",
                i + 1,
                claim.quote.chars().take(100).collect::<String>()
            ));
        }
    }

    result
}

/// Whether `quote` is taken from `comment`, allowing `[...]` elisions
fn quote_is_grounded(quote: &str, comment: &str) -> bool {
    let without_elisions = quote.replace("[...]", " ").replace("...", " ");

    let normalized_quote = normalize_whitespace(&without_elisions).to_lowercase();
    if normalized_quote.is_empty() {
        return false;
    }
    if normalize_whitespace(comment).to_lowercase().contains(&normalized_quote) {
        return true;
    }

    words_in_order_present(&without_elisions, comment, WORD_SUBSEQUENCE_RATIO)
}

/// Normalize whitespace for comparison (collapse multiple spaces, trim)
fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Lowercase and strip surrounding punctuation
fn normalize_word(w: &str) -> String {
    w.trim_matches(|c: char| c.is_ascii_punctuation())
        .to_lowercase()
}

/// Check if at least `min_ratio` of quote words appear in the text in order
fn words_in_order_present(quote: &str, text: &str, min_ratio: f32) -> bool {
    let quote_words: Vec<String> = quote
        .split_whitespace()
        .map(normalize_word)
        .filter(|w| !w.is_empty())
        .collect();
    if quote_words.is_empty() {
        return false;
    }

    let text_words: Vec<String> = text
        .split_whitespace()
        .map(normalize_word)
        .filter(|w| !w.is_empty())
        .collect();

    let mut text_idx = 0;
    let mut matched = 0;
    for qw in &quote_words {
        while text_idx < text_words.len() {
            text_idx += 1;
            if text_words[text_idx - 1] == *qw {
                matched += 1;
                break;
            }
        }
    }

    matched as f32 / quote_words.len() as f32 >= min_ratio
}
