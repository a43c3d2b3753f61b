//! Structured document assembly
//!
//! Identifiers are assigned locally in a skeleton; the text-generation service
//! only fills in text. Its answer is merged back by identifier and rejected if
//! the identifier layout changed. This stage never aborts the run: on failure
//! it returns a valid fallback document with `success = false`.

use std::sync::Arc;
use std::time::Instant;

use crate::model::{ReportTheme, Stage, StructuredDocument, TokenUsage};
use crate::service::llm::{
    GenerationRequest, LlmError, ResponseFormat, SharedGenerator, parse_json_content,
};
use crate::service::prompts::{FILL_SYSTEM_PROMPT, FillTheme, build_fill_prompt};
use crate::service::run_log::{RunLog, StageRecord};

pub mod merge;
pub mod skeleton;

use merge::{TopologyError, merge_filled};
use skeleton::build_skeleton;

const FILL_TEMPERATURE: f32 = 0.3;
const FILL_MAX_TOKENS: u32 = 4000;

/// Reasons the fill did not produce a merged document
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum StructuredOutputError {
    #[error("Failed to serialize skeleton: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Text generation failed: {0}")]
    Collaborator(#[from] LlmError),

    #[error("Structured response could not be parsed: {0}")]
    UnparsableResponse(String),

    #[error("Structured response changed identifiers: {0}")]
    TopologyChanged(#[from] TopologyError),
}

/// Result of the assembly stage
#[derive(Debug, Clone)]
pub struct StructuredOutcome {
    pub document: StructuredDocument,
    /// Usage and cost are present whenever the service answered
    pub usage: Option<TokenUsage>,
    pub cost: f64,
    pub success: bool,
    pub failure: Option<String>,
}

pub struct StructuredOutputAssembler {
    generator: SharedGenerator,
    run_log: Arc<RunLog>,
}

impl StructuredOutputAssembler {
    pub fn new(generator: SharedGenerator, run_log: Arc<RunLog>) -> Self {
        Self { generator, run_log }
    }

    pub async fn assemble(
        &self,
        title: &str,
        themes: &[ReportTheme],
        comments: &[String],
    ) -> StructuredOutcome {
        let start_time = Instant::now();
        let skeleton = build_skeleton(title, themes);

        let skeleton_json = match serde_json::to_string_pretty(&skeleton) {
            Ok(json) => json,
            Err(e) => {
                return self.degrade(
                    StructuredDocument::empty(title),
                    None,
                    StructuredOutputError::from(e),
                    start_time,
                );
            }
        };

        let fill_themes: Vec<FillTheme<'_>> = themes
            .iter()
            .map(|theme| FillTheme {
                name: &theme.theme_name,
                topics: theme
                    .topics
                    .iter()
                    .map(|t| (t.topic_name.as_str(), t.claims.as_slice()))
                    .collect(),
            })
            .collect();
        let prompt = build_fill_prompt(&skeleton_json, comments, &fill_themes);

        tracing::debug!(
            model = %self.generator.model(),
            topics = skeleton.topics().len(),
            prompt_length = prompt.len(),
            "Requesting structured document fill"
        );

        let request = GenerationRequest::json(FILL_SYSTEM_PROMPT, prompt)
            .with_format(ResponseFormat::Text)
            .with_temperature(FILL_TEMPERATURE)
            .with_max_tokens(FILL_MAX_TOKENS);

        let generation = match self.generator.generate(request).await {
            Ok(generation) => generation,
            Err(e) => {
                return self.degrade(
                    StructuredDocument::empty(title),
                    None,
                    StructuredOutputError::from(e),
                    start_time,
                );
            }
        };

        let usage = generation.usage;
        let filled: StructuredDocument = match parse_json_content(&generation.content) {
            Ok(filled) => filled,
            Err(e) => {
                return self.degrade(
                    StructuredDocument::empty(title),
                    Some(usage),
                    StructuredOutputError::UnparsableResponse(e.to_string()),
                    start_time,
                );
            }
        };

        let document = match merge_filled(&skeleton, &filled) {
            Ok(document) => document,
            Err(e) => {
                return self.degrade(
                    skeleton,
                    Some(usage),
                    StructuredOutputError::from(e),
                    start_time,
                );
            }
        };

        let cost = self.generator.calculate_cost(&usage);
        tracing::info!(
            model = %self.generator.model(),
            topics = document.topics().len(),
            elapsed_ms = start_time.elapsed().as_millis(),
            input_tokens = usage.input_tokens,
            output_tokens = usage.output_tokens,
            cost = cost,
            "Structured document generated"
        );
        self.record(StageRecord::new(Stage::StructuredJson, 1, usage, cost, start_time));

        StructuredOutcome {
            document,
            usage: Some(usage),
            cost,
            success: true,
            failure: None,
        }
    }

    fn degrade(
        &self,
        document: StructuredDocument,
        usage: Option<TokenUsage>,
        error: StructuredOutputError,
        start_time: Instant,
    ) -> StructuredOutcome {
        let cost = usage
            .as_ref()
            .map(|u| self.generator.calculate_cost(u))
            .unwrap_or(0.0);

        tracing::warn!(
            model = %self.generator.model(),
            error = %error,
            fallback_topics = document.topics().len(),
            "Structured document fill failed, using fallback"
        );

        let calls = usize::from(!matches!(error, StructuredOutputError::Serialization(_)));
        self.record(
            StageRecord::new(
                Stage::StructuredJson,
                calls,
                usage.unwrap_or_default(),
                cost,
                start_time,
            )
            .failed(),
        );

        StructuredOutcome {
            document,
            usage,
            cost,
            success: false,
            failure: Some(error.to_string()),
        }
    }

    fn record(&self, record: StageRecord) {
        if let Err(e) = self.run_log.append(record) {
            tracing::warn!(error = %e, "Structured output stage record dropped");
        }
    }
}
