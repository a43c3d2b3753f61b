//! Pipeline orchestration
//!
//! Runs taxonomy, claims, sorting, deduplication and structured assembly
//! strictly in sequence against one [`RunLog`]. Stage-fatal errors abort the
//! run without a report; the structured stage degrades instead of failing.
//! Only one run may be active per orchestrator.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Mutex;

use crate::model::{PipelineStats, Report, Stage};
use crate::service::claims::{ClaimExtractionError, ClaimExtractor};
use crate::service::comments::{CommentStats, validate_comments};
use crate::service::dedup::{DeduplicationError, Deduplicator};
use crate::service::llm::SharedGenerator;
use crate::service::output::ResultsWriter;
use crate::service::report::ReportAggregator;
use crate::service::run_log::{RunLog, RunMetadata, RunSummary};
use crate::service::sorter::sort_claims;
use crate::service::structured::StructuredOutputAssembler;
use crate::service::taxonomy::{TaxonomyBuilder, TaxonomyError};

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum PipelineError {
    #[error("No comments to process")]
    NoComments,

    #[error("Another pipeline run is already active")]
    RunInProgress,

    #[error("Taxonomy stage failed: {0}")]
    Taxonomy(#[from] TaxonomyError),

    #[error("Claim extraction failed: {0}")]
    ClaimExtraction(#[from] ClaimExtractionError),

    #[error("Deduplication failed: {0}")]
    Deduplication(#[from] DeduplicationError),
}

/// Inputs of a single run
#[derive(Debug, Clone, Default)]
pub struct PipelineRequest {
    pub comments: Vec<String>,
    pub run_name: Option<String>,
    pub exp_group: Option<String>,
    /// Pre-computed estimate, only used for reporting
    pub estimated_cost: f64,
}

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub max_concurrent_calls: usize,
    pub default_run_name: String,
    pub default_exp_group: String,
}

/// A finished run
#[derive(Debug, Clone)]
pub struct PipelineRun {
    pub report: Report,
    pub summary: RunSummary,
    pub comment_stats: CommentStats,
    /// Where the structured document was written, if it was
    pub output_path: Option<PathBuf>,
}

pub struct PipelineOrchestrator {
    generator: SharedGenerator,
    settings: PipelineSettings,
    writer: Option<ResultsWriter>,
    run_guard: Mutex<()>,
}

impl PipelineOrchestrator {
    pub fn new(
        generator: SharedGenerator,
        settings: PipelineSettings,
        writer: Option<ResultsWriter>,
    ) -> Self {
        Self {
            generator,
            settings,
            writer,
            run_guard: Mutex::new(()),
        }
    }

    pub fn provider_name(&self) -> &str {
        self.generator.provider_name()
    }

    pub fn model(&self) -> &str {
        self.generator.model()
    }

    pub async fn run(&self, request: PipelineRequest) -> Result<PipelineRun, PipelineError> {
        let validated = validate_comments(&request.comments).ok_or(PipelineError::NoComments)?;
        let _guard = self
            .run_guard
            .try_lock()
            .map_err(|_| PipelineError::RunInProgress)?;

        let run_name = request
            .run_name
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| self.settings.default_run_name.clone());
        let exp_group = request
            .exp_group
            .filter(|group| !group.trim().is_empty())
            .unwrap_or_else(|| self.settings.default_exp_group.clone());

        if validated.dropped() > 0 {
            tracing::warn!(
                original = validated.original_count,
                kept = validated.final_count(),
                "Dropped blank comments"
            );
        }
        let comment_stats = CommentStats::of(&validated.comments);
        tracing::info!(
            run = %run_name,
            count = comment_stats.count,
            total_chars = comment_stats.total_chars,
            avg_length = comment_stats.avg_length,
            min_length = comment_stats.min_length,
            max_length = comment_stats.max_length,
            "Comment statistics"
        );

        let run_log = RunLog::open(RunMetadata {
            run_name: run_name.clone(),
            exp_group: exp_group.clone(),
            provider: self.generator.provider_name().to_string(),
            model: self.generator.model().to_string(),
            estimated_cost: request.estimated_cost,
            comments: validated.final_count(),
        });
        let aggregator = ReportAggregator::new(
            self.generator.provider_name(),
            self.generator.model(),
            request.estimated_cost,
            &run_name,
            &exp_group,
        );

        let result = self
            .run_stages(&run_log, &validated.comments, aggregator)
            .await;
        let summary = run_log.close();

        let report = match result {
            Ok(report) => report,
            Err(e) => {
                tracing::error!(run = %run_name, error = %e, "Pipeline run failed");
                return Err(e);
            }
        };

        let output_path = match (&self.writer, &report.structured_document) {
            (Some(writer), Some(document)) => match writer.write(&run_name, document).await {
                Ok(path) => Some(path),
                Err(e) => {
                    tracing::warn!(run = %run_name, error = %e, "Structured output not saved");
                    None
                }
            },
            _ => None,
        };

        Ok(PipelineRun {
            report,
            summary,
            comment_stats,
            output_path,
        })
    }

    async fn run_stages(
        &self,
        run_log: &Arc<RunLog>,
        comments: &[String],
        mut aggregator: ReportAggregator,
    ) -> Result<Report, PipelineError> {
        let start_time = Instant::now();
        let concurrency = self.settings.max_concurrent_calls;

        tracing::info!(step = 1, "Creating taxonomy");
        let taxonomy = TaxonomyBuilder::new(self.generator.clone(), Arc::clone(run_log))
            .build(comments)
            .await?;
        aggregator.record_stage(Stage::Taxonomy, taxonomy.usage, taxonomy.cost);

        tracing::info!(step = 2, "Extracting claims");
        let claims = ClaimExtractor::new(self.generator.clone(), Arc::clone(run_log), concurrency)
            .extract(&taxonomy.taxonomy, comments)
            .await?;
        aggregator.record_stage(Stage::Claims, claims.usage, claims.cost);

        tracing::info!(step = 3, "Sorting claims");
        let sorted = sort_claims(&claims.extractions);

        tracing::info!(step = 4, "Deduplicating claims");
        let dedup = Deduplicator::new(self.generator.clone(), Arc::clone(run_log), concurrency)
            .deduplicate(&sorted)
            .await?;
        aggregator.record_stage(Stage::Deduplication, dedup.usage, dedup.cost);

        aggregator.set_themes(ReportAggregator::build_themes(&sorted, &dedup.groups));
        aggregator.set_duplicate_groups(&dedup.groups);

        tracing::info!(step = 5, "Generating structured document");
        let run_name = run_log.metadata().run_name.clone();
        let structured = StructuredOutputAssembler::new(self.generator.clone(), Arc::clone(run_log))
            .assemble(&run_name, aggregator.themes(), comments)
            .await;
        if let Some(usage) = structured.usage {
            aggregator.record_stage(Stage::StructuredJson, usage, structured.cost);
        }
        aggregator.set_structured_document(structured.document);

        let stats = PipelineStats {
            comments_processed: comments.len(),
            themes_identified: taxonomy.num_themes,
            topics_identified: taxonomy.num_topics,
            claims_extracted: claims.total_claims(),
            duplicate_groups: dedup.groups.len(),
            total_tokens_used: aggregator
                .cost_summary()
                .step_costs
                .iter()
                .map(|s| s.usage.total_tokens)
                .sum(),
            processing_time: start_time.elapsed().as_secs_f64(),
            unmatched_claims: claims.unmatched_claims,
        };

        tracing::info!(
            run = %run_name,
            claims = stats.claims_extracted,
            duplicate_groups = stats.duplicate_groups,
            skipped_subtopics = dedup.skipped_subtopics,
            malformed_references = dedup.malformed_references,
            unmatched_claims = stats.unmatched_claims,
            structured_success = structured.success,
            processing_time = stats.processing_time,
            "Pipeline complete"
        );

        Ok(aggregator.finalize(stats))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::llm::{GenerationRequest, LlmError};
    use crate::service::testing::ScriptedGenerator;

    const TAXONOMY: &str = r#"{"taxonomy": [{"topicName": "Pets", "topicShortDescription": "Animals", "subtopics": [{"subtopicName": "Cats", "subtopicShortDescription": "Felines"}]}]}"#;

    fn settings() -> PipelineSettings {
        PipelineSettings {
            max_concurrent_calls: 1,
            default_run_name: "custom_comments_openrouter".to_string(),
            default_exp_group: "provider_comparison".to_string(),
        }
    }

    fn request(comments: &[&str]) -> PipelineRequest {
        PipelineRequest {
            comments: comments.iter().map(|c| c.to_string()).collect(),
            ..Default::default()
        }
    }

    fn claim(text: &str, quote: &str) -> String {
        serde_json::json!({
            "claims": [{"claim": text, "quote": quote, "topicName": "Pets", "subtopicName": "Cats"}]
        })
        .to_string()
    }

    /// Route each call to a canned answer by what its prompt asks for
    fn responder(
        claims: impl Fn(&str) -> String + Send + Sync + 'static,
        nesting: &'static str,
    ) -> impl Fn(&GenerationRequest) -> Result<String, LlmError> + Send + Sync + 'static {
        move |request| {
            let prompt = &request.prompt;
            if prompt.contains("JSON structure to fill") {
                Ok("I cannot produce JSON today".to_string())
            } else if prompt.contains("Here are the claims:") {
                Ok(nesting.to_string())
            } else if let Some((_, comment)) = prompt.split_once("And then here is the comment:\n")
            {
                Ok(claims(comment))
            } else {
                Ok(TAXONOMY.to_string())
            }
        }
    }

    #[tokio::test]
    async fn test_scenario_a_three_identical_claims() {
        let generator = ScriptedGenerator::with_responder(responder(
            |comment| claim("Cats are great", comment),
            r#"{"nesting": {}}"#,
        ));
        let orchestrator = PipelineOrchestrator::new(generator.clone(), settings(), None);

        let run = orchestrator
            .run(request(&["I love cats", "Cats are the best", "Cats!"]))
            .await
            .unwrap();

        let report = &run.report;
        assert_eq!(report.run_name, "custom_comments_openrouter");
        assert_eq!(report.exp_group, "provider_comparison");
        assert_eq!(report.themes.len(), 1);
        assert_eq!(report.themes[0].theme_name, "Pets");
        assert_eq!(report.themes[0].topics[0].topic_name, "Cats");
        assert_eq!(report.themes[0].topics[0].claims, vec!["Cats are great".to_string(); 3]);
        assert_eq!(report.pipeline_stats.comments_processed, 3);
        assert_eq!(report.pipeline_stats.claims_extracted, 3);
        assert_eq!(report.pipeline_stats.themes_identified, 1);
        assert_eq!(report.pipeline_stats.topics_identified, 1);
        assert_eq!(report.pipeline_stats.unmatched_claims, 0);
        assert!(report.duplicate_groups.is_empty());

        // taxonomy + 3 comments + 1 bucket + fill
        assert_eq!(generator.calls(), 6);
        assert_eq!(run.summary.stages.len(), 4);
        assert!(run.output_path.is_none());
    }

    #[tokio::test]
    async fn test_scenario_b_duplicates_are_folded() {
        let generator = ScriptedGenerator::with_responder(responder(
            |comment| {
                let text = match comment {
                    "Cats are great, honestly" => "Cats are great",
                    "I really love cats" => "I love cats",
                    _ => "Dogs are fine",
                };
                claim(text, comment)
            },
            r#"{"nesting": {"claimId0": ["claimId1"], "claimId2": []}}"#,
        ));
        let orchestrator = PipelineOrchestrator::new(generator, settings(), None);

        let run = orchestrator
            .run(PipelineRequest {
                run_name: Some("scenario_b".to_string()),
                estimated_cost: 0.01,
                ..request(&["Cats are great, honestly", "I really love cats", "Dogs are fine too"])
            })
            .await
            .unwrap();

        let report = &run.report;
        assert_eq!(
            report.themes[0].topics[0].claims,
            vec!["Cats are great (2x)".to_string(), "Dogs are fine".to_string()]
        );
        assert_eq!(report.pipeline_stats.duplicate_groups, 1);
        assert_eq!(report.duplicate_groups.len(), 1);
        assert_eq!(report.duplicate_groups["Cats are great"], vec![1]);
        assert_eq!(report.pipeline_stats.claims_extracted, 3);
        assert!(report.summary_line().starts_with("scenario_b,provider_comparison,"));
    }

    #[tokio::test]
    async fn test_scenario_c_no_comments_makes_no_calls() {
        let generator = ScriptedGenerator::new(vec![]);
        let orchestrator = PipelineOrchestrator::new(generator.clone(), settings(), None);

        let empty = orchestrator.run(request(&[])).await;
        let blank = orchestrator.run(request(&["  ", "\n"])).await;

        assert!(matches!(empty, Err(PipelineError::NoComments)));
        assert!(matches!(blank, Err(PipelineError::NoComments)));
        assert_eq!(generator.calls(), 0);
    }

    #[tokio::test]
    async fn test_structured_failure_keeps_report() {
        let generator = ScriptedGenerator::with_responder(responder(
            |comment| claim("Cats are great", comment),
            r#"{"nesting": {}}"#,
        ));
        let orchestrator = PipelineOrchestrator::new(generator, settings(), None);

        let run = orchestrator.run(request(&["I love cats"])).await.unwrap();

        let document = run.report.structured_document.as_ref().unwrap();
        assert!(document.topics().is_empty());
        let structured = run
            .summary
            .stages
            .iter()
            .find(|s| s.stage == Stage::StructuredJson)
            .unwrap();
        assert!(!structured.success);
        assert!(run.report.cost_summary.cost_for(Stage::StructuredJson) > 0.0);
        assert_eq!(
            run.report.pipeline_stats.total_tokens_used,
            run.summary.total_tokens
        );
    }

    #[tokio::test]
    async fn test_unparsable_claims_abort_the_run() {
        let generator = ScriptedGenerator::new(vec![
            Ok(TAXONOMY.to_string()),
            Ok("not json at all".to_string()),
        ]);
        let orchestrator = PipelineOrchestrator::new(generator.clone(), settings(), None);

        let result = orchestrator.run(request(&["I love cats"])).await;

        assert!(matches!(
            result,
            Err(PipelineError::ClaimExtraction(
                ClaimExtractionError::UnparsableResponse { comment_index: 0, .. }
            ))
        ));
        assert_eq!(generator.calls(), 2);
    }

    #[tokio::test]
    async fn test_zero_concurrency_still_runs() {
        let generator = ScriptedGenerator::with_responder(responder(
            |comment| claim("Cats are great", comment),
            r#"{"nesting": {}}"#,
        ));
        let orchestrator = PipelineOrchestrator::new(
            generator.clone(),
            PipelineSettings {
                max_concurrent_calls: 0,
                ..settings()
            },
            None,
        );

        let run = orchestrator
            .run(request(&["I love cats", "Cats!"]))
            .await
            .unwrap();

        assert_eq!(run.report.pipeline_stats.claims_extracted, 2);
        // taxonomy + 2 comments + 1 bucket + fill
        assert_eq!(generator.calls(), 5);
    }

    #[tokio::test]
    async fn test_concurrent_run_is_rejected() {
        let generator = ScriptedGenerator::new(vec![]);
        let orchestrator = PipelineOrchestrator::new(generator.clone(), settings(), None);

        let _active = orchestrator.run_guard.try_lock().unwrap();
        let result = orchestrator.run(request(&["I love cats"])).await;

        assert!(matches!(result, Err(PipelineError::RunInProgress)));
        assert_eq!(generator.calls(), 0);
    }
}
