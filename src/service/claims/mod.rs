//! Per-comment claim extraction
//!
//! Each comment is sent together with the full taxonomy. Calls are independent
//! and may run concurrently, but results are always merged in comment order.
//! The first failure aborts the pass; no partial extraction is returned.

use std::sync::Arc;
use std::time::Instant;

use futures::StreamExt;
use futures::stream;

use crate::model::{ClaimsExtraction, Stage, Taxonomy, TokenUsage};
use crate::service::claims::filters::drop_blank_claims;
use crate::service::claims::validation::validate_claims;
use crate::service::llm::{GenerationRequest, SharedGenerator, parse_json_content};
use crate::service::prompts::{SYSTEM_PROMPT, build_claims_prompt, taxonomy_json};
use crate::service::run_log::{RunLog, StageRecord};

pub mod error;
pub mod filters;
pub mod validation;

pub use error::ClaimExtractionError;

/// Successful extraction pass
#[derive(Debug, Clone)]
pub struct ClaimsOutcome {
    /// One entry per comment, in input order
    pub extractions: Vec<ClaimsExtraction>,
    pub usage: TokenUsage,
    pub cost: f64,
    /// Claims whose topic/subtopic is not in the taxonomy
    pub unmatched_claims: usize,
}

impl ClaimsOutcome {
    pub fn total_claims(&self) -> usize {
        self.extractions.iter().map(ClaimsExtraction::len).sum()
    }
}

/// Result of one comment's call
struct CommentExtraction {
    usage: TokenUsage,
    result: Result<(ClaimsExtraction, usize), ClaimExtractionError>,
}

/// Extracts and maps claims for every comment
pub struct ClaimExtractor {
    generator: SharedGenerator,
    run_log: Arc<RunLog>,
    max_concurrent_calls: usize,
}

impl ClaimExtractor {
    pub fn new(generator: SharedGenerator, run_log: Arc<RunLog>, max_concurrent_calls: usize) -> Self {
        Self {
            generator,
            run_log,
            max_concurrent_calls: max_concurrent_calls.max(1),
        }
    }

    pub async fn extract(
        &self,
        taxonomy: &Taxonomy,
        comments: &[String],
    ) -> Result<ClaimsOutcome, ClaimExtractionError> {
        let taxonomy_json = taxonomy_json(taxonomy)?;
        let start_time = Instant::now();

        let mut pending = std::pin::pin!(
            stream::iter(comments.iter().enumerate())
                .map(|(index, comment)| {
                    self.extract_comment(index, taxonomy, &taxonomy_json, comment)
                })
                .buffered(self.max_concurrent_calls)
        );

        let mut extractions = Vec::with_capacity(comments.len());
        let mut usage = TokenUsage::default();
        let mut unmatched_claims = 0;
        let mut calls = 0;

        while let Some(comment) = pending.next().await {
            calls += 1;
            usage.add(&comment.usage);

            match comment.result {
                Ok((extraction, unmatched)) => {
                    unmatched_claims += unmatched;
                    extractions.push(extraction);
                }
                Err(e) => {
                    let cost = self.generator.calculate_cost(&usage);
                    tracing::error!(
                        model = %self.generator.model(),
                        completed = extractions.len(),
                        comments = comments.len(),
                        error = %e,
                        "Claim extraction aborted"
                    );
                    self.record(StageRecord::new(Stage::Claims, calls, usage, cost, start_time).failed());
                    return Err(e);
                }
            }
        }

        let cost = self.generator.calculate_cost(&usage);
        let outcome = ClaimsOutcome {
            extractions,
            usage,
            cost,
            unmatched_claims,
        };

        tracing::info!(
            model = %self.generator.model(),
            comments = comments.len(),
            claims = outcome.total_claims(),
            unmatched_claims = unmatched_claims,
            elapsed_ms = start_time.elapsed().as_millis(),
            input_tokens = usage.input_tokens,
            output_tokens = usage.output_tokens,
            cost = cost,
            "Claim extraction complete"
        );

        self.record(StageRecord::new(Stage::Claims, calls, usage, cost, start_time));
        Ok(outcome)
    }

    async fn extract_comment(
        &self,
        index: usize,
        taxonomy: &Taxonomy,
        taxonomy_json: &str,
        comment: &str,
    ) -> CommentExtraction {
        let prompt = build_claims_prompt(taxonomy_json, comment);
        let prompt_length = prompt.len();
        let request = GenerationRequest::json(SYSTEM_PROMPT, prompt)
            .with_schema::<ClaimsExtraction>("claims");

        tracing::debug!(
            comment_index = index,
            model = %self.generator.model(),
            prompt_length = prompt_length,
            "Requesting claims"
        );

        let start_time = Instant::now();
        let generation = match self.generator.generate(request).await {
            Ok(generation) => generation,
            Err(source) => {
                tracing::error!(
                    comment_index = index,
                    elapsed_ms = start_time.elapsed().as_millis(),
                    error = %source,
                    "Claims call failed"
                );
                return CommentExtraction {
                    usage: TokenUsage::default(),
                    result: Err(ClaimExtractionError::Collaborator {
                        comment_index: index,
                        source,
                    }),
                };
            }
        };

        let usage = generation.usage;
        let parsed: ClaimsExtraction = match parse_json_content(&generation.content) {
            Ok(parsed) => parsed,
            Err(e) => {
                return CommentExtraction {
                    usage,
                    result: Err(ClaimExtractionError::UnparsableResponse {
                        comment_index: index,
                        message: e.to_string(),
                    }),
                };
            }
        };

        let (extraction, dropped) = drop_blank_claims(parsed);
        let validation = validate_claims(&extraction, taxonomy, comment);
        if !validation.warnings.is_empty() {
            tracing::warn!(
                comment_index = index,
                warnings = ?validation.warnings,
                "Extracted claims produced warnings"
            );
        }

        tracing::debug!(
            comment_index = index,
            claims = extraction.len(),
            dropped_blank = dropped,
            unmatched = validation.unmatched,
            elapsed_ms = start_time.elapsed().as_millis(),
            "Claims extracted"
        );
        if extraction.is_empty() {
            tracing::debug!(comment_index = index, "Comment yielded no claims");
        }

        CommentExtraction {
            usage,
            result: Ok((extraction, validation.unmatched)),
        }
    }

    fn record(&self, record: StageRecord) {
        if let Err(e) = self.run_log.append(record) {
            tracing::warn!(error = %e, "Claims stage record dropped");
        }
    }
}
