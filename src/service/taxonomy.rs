//! Taxonomy construction from the full comment set

use std::sync::Arc;
use std::time::Instant;

use crate::model::config::ApiKeyError;
use crate::model::{ProviderConfig, Stage, Taxonomy, TokenUsage};
use crate::service::llm::{GenerationRequest, LlmError, SharedGenerator, parse_json_content};
use crate::service::prompts::{SYSTEM_PROMPT, build_taxonomy_prompt};
use crate::service::run_log::{RunLog, StageRecord};

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum TaxonomyError {
    #[error("Missing API configuration: {0}")]
    MissingApiConfiguration(String),

    #[error("Text generation failed: {0}")]
    Collaborator(#[from] LlmError),

    #[error("Taxonomy response could not be parsed: {0}")]
    UnparsableResponse(String),
}

impl From<ApiKeyError> for TaxonomyError {
    fn from(err: ApiKeyError) -> Self {
        TaxonomyError::MissingApiConfiguration(err.to_string())
    }
}

/// Successful taxonomy stage
#[derive(Debug, Clone)]
pub struct TaxonomyOutcome {
    pub taxonomy: Taxonomy,
    pub usage: TokenUsage,
    pub cost: f64,
    pub num_themes: usize,
    pub num_topics: usize,
    pub subtopic_counts: Vec<usize>,
}

/// Builds the run's taxonomy with a single collaborator call
pub struct TaxonomyBuilder {
    generator: SharedGenerator,
    run_log: Arc<RunLog>,
}

impl TaxonomyBuilder {
    /// Resolve the provider's API key before any call is attempted
    pub fn preflight(provider: &ProviderConfig) -> Result<String, TaxonomyError> {
        Ok(provider.api_key()?)
    }

    pub fn new(generator: SharedGenerator, run_log: Arc<RunLog>) -> Self {
        Self { generator, run_log }
    }

    pub async fn build(&self, comments: &[String]) -> Result<TaxonomyOutcome, TaxonomyError> {
        let prompt = build_taxonomy_prompt(comments);
        let prompt_length = prompt.len();
        let request = GenerationRequest::json(SYSTEM_PROMPT, prompt).with_schema::<Taxonomy>("taxonomy");

        tracing::debug!(
            model = %self.generator.model(),
            comments = comments.len(),
            prompt_length = prompt_length,
            "Requesting taxonomy"
        );

        let start_time = Instant::now();
        let generation = match self.generator.generate(request).await {
            Ok(generation) => generation,
            Err(e) => {
                tracing::error!(
                    model = %self.generator.model(),
                    elapsed_ms = start_time.elapsed().as_millis(),
                    error = %e,
                    "Taxonomy call failed"
                );
                return Err(match e {
                    LlmError::Status { status: 401, body } => {
                        TaxonomyError::MissingApiConfiguration(body)
                    }
                    other => TaxonomyError::Collaborator(other),
                });
            }
        };

        let usage = generation.usage;
        let cost = self.generator.calculate_cost(&usage);
        let record = StageRecord::new(Stage::Taxonomy, 1, usage, cost, start_time);

        let taxonomy: Taxonomy = match parse_json_content(&generation.content) {
            Ok(taxonomy) => taxonomy,
            Err(e) => {
                tracing::error!(
                    model = %self.generator.model(),
                    error = %e,
                    content_length = generation.content.len(),
                    "Taxonomy response is not a valid taxonomy"
                );
                self.record(record.failed());
                return Err(TaxonomyError::UnparsableResponse(e.to_string()));
            }
        };

        let duplicates = taxonomy.duplicate_names();
        if !duplicates.is_empty() {
            tracing::warn!(duplicates = ?duplicates, "Taxonomy contains repeated names");
        }
        if taxonomy.num_themes() == 0 {
            tracing::warn!("Taxonomy has no topics; every claim will be unmatched");
        }

        tracing::info!(
            model = %self.generator.model(),
            elapsed_ms = start_time.elapsed().as_millis(),
            themes = taxonomy.num_themes(),
            topics = taxonomy.num_topics(),
            input_tokens = usage.input_tokens,
            output_tokens = usage.output_tokens,
            cost = cost,
            "Taxonomy created"
        );

        for topic in taxonomy.topics() {
            tracing::debug!(
                topic = %topic.name(),
                description = %topic.description(),
                "Taxonomy topic"
            );
            for subtopic in topic.subtopics() {
                tracing::debug!(
                    topic = %topic.name(),
                    subtopic = %subtopic.name(),
                    description = %subtopic.description(),
                    "Taxonomy subtopic"
                );
            }
        }

        self.record(record);

        Ok(TaxonomyOutcome {
            num_themes: taxonomy.num_themes(),
            num_topics: taxonomy.num_topics(),
            subtopic_counts: taxonomy.subtopic_counts(),
            taxonomy,
            usage,
            cost,
        })
    }

    fn record(&self, record: StageRecord) {
        if let Err(e) = self.run_log.append(record) {
            tracing::warn!(error = %e, "Taxonomy stage record dropped");
        }
    }
}
