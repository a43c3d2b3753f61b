//! Report models: per-stage cost accounting, pipeline statistics and themes

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use crate::model::document::StructuredDocument;

/// Summary line timestamp format
const SUMMARY_TIMESTAMP_FORMAT: &str = "%m/%d/%Y %H:%M:%S";

/// Token counts reported by the text-generation service
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
}

impl TokenUsage {
    pub fn new(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
            total_tokens: input_tokens + output_tokens,
        }
    }

    pub fn add(&mut self, other: &TokenUsage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
        self.total_tokens += other.total_tokens;
    }
}

/// LLM-backed pipeline stages, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Taxonomy,
    Claims,
    Deduplication,
    StructuredJson,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Taxonomy => "taxonomy",
            Stage::Claims => "claims",
            Stage::Deduplication => "deduplication",
            Stage::StructuredJson => "structured_json",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cost and usage of a single stage
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct StepCost {
    pub stage: Stage,
    pub cost: f64,
    pub usage: TokenUsage,
}

/// Cost accounting for a whole run
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct CostSummary {
    pub provider_name: String,
    pub model_name: String,
    pub estimated_cost: f64,
    pub actual_cost: f64,
    pub token_based_cost: f64,
    pub step_costs: Vec<StepCost>,
}

impl CostSummary {
    pub fn new(provider_name: &str, model_name: &str, estimated_cost: f64) -> Self {
        Self {
            provider_name: provider_name.to_string(),
            model_name: model_name.to_string(),
            estimated_cost,
            actual_cost: 0.0,
            token_based_cost: 0.0,
            step_costs: Vec::new(),
        }
    }

    pub fn add_step_cost(&mut self, step: StepCost) {
        self.actual_cost += step.cost;
        self.step_costs.push(step);
    }

    /// Cost recorded for `stage`, zero when the stage recorded nothing
    pub fn cost_for(&self, stage: Stage) -> f64 {
        self.step_costs
            .iter()
            .filter(|s| s.stage == stage)
            .map(|s| s.cost)
            .sum()
    }

    /// Actual cost as a percentage of the estimate (0 when nothing was estimated)
    pub fn accuracy_percentage(&self) -> f64 {
        if self.estimated_cost == 0.0 {
            return 0.0;
        }
        self.actual_cost / self.estimated_cost * 100.0
    }
}

/// Run statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize, ToSchema)]
pub struct PipelineStats {
    pub comments_processed: usize,
    pub themes_identified: usize,
    pub topics_identified: usize,
    pub claims_extracted: usize,
    pub duplicate_groups: usize,
    pub total_tokens_used: u64,
    /// Wall-clock seconds
    pub processing_time: f64,
    /// Claims whose topic/subtopic names are not in the taxonomy
    pub unmatched_claims: usize,
}

/// A subtopic as displayed in the report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct ReportTopic {
    pub topic_name: String,
    pub total_claims: usize,
    pub claims: Vec<String>,
}

impl ReportTopic {
    pub fn new(topic_name: &str, claims: Vec<String>) -> Self {
        Self {
            topic_name: topic_name.to_string(),
            total_claims: claims.len(),
            claims,
        }
    }
}

/// A top-level topic as displayed in the report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct ReportTheme {
    pub theme_name: String,
    pub total_claims: usize,
    pub topics: Vec<ReportTopic>,
}

impl ReportTheme {
    pub fn new(theme_name: &str, topics: Vec<ReportTopic>) -> Self {
        Self {
            theme_name: theme_name.to_string(),
            total_claims: topics.iter().map(|t| t.total_claims).sum(),
            topics,
        }
    }
}

/// Final, immutable result of one run
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Report {
    pub run_name: String,
    pub exp_group: String,
    pub timestamp: DateTime<Utc>,
    pub themes: Vec<ReportTheme>,
    pub pipeline_stats: PipelineStats,
    pub cost_summary: CostSummary,
    /// Main-claim text -> subtopic-local indices of the claims it absorbed
    pub duplicate_groups: BTreeMap<String, Vec<usize>>,
    #[schema(value_type = Option<Object>)]
    pub structured_document: Option<StructuredDocument>,
}

impl Report {
    pub fn total_themes(&self) -> usize {
        self.themes.len()
    }

    pub fn total_topics(&self) -> usize {
        self.themes.iter().map(|t| t.topics.len()).sum()
    }

    pub fn total_claims(&self) -> usize {
        self.themes.iter().map(|t| t.total_claims).sum()
    }

    /// Comma-joined one-line summary of the run
    pub fn summary_line(&self) -> String {
        let costs = &self.cost_summary;
        let stats = &self.pipeline_stats;

        [
            self.run_name.clone(),
            self.exp_group.clone(),
            self.timestamp.format(SUMMARY_TIMESTAMP_FORMAT).to_string(),
            stats.comments_processed.to_string(),
            "N/A".to_string(),
            format!("{:.4}", costs.estimated_cost),
            format!("{:.4}", costs.token_based_cost),
            format!("{:.4}", costs.actual_cost),
            format!("{:.4}", costs.cost_for(Stage::Taxonomy)),
            format!("{:.4}", costs.cost_for(Stage::Claims)),
            format!("{:.4}", costs.cost_for(Stage::Deduplication)),
            stats.themes_identified.to_string(),
            stats.topics_identified.to_string(),
            stats.claims_extracted.to_string(),
        ]
        .join(",")
    }
}
