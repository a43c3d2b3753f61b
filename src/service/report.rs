//! Report aggregation
//!
//! The aggregator collects per-stage usage and cost while the run progresses
//! and is consumed by [`ReportAggregator::finalize`], so a report is built
//! exactly once.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::Utc;

use crate::model::{
    CostSummary, DuplicateGroups, PipelineStats, Report, ReportTheme, ReportTopic, SortedTaxonomy,
    Stage, StepCost, StructuredDocument, TokenUsage,
};

pub struct ReportAggregator {
    run_name: String,
    exp_group: String,
    cost_summary: CostSummary,
    themes: Vec<ReportTheme>,
    duplicate_groups: BTreeMap<String, Vec<usize>>,
    structured_document: Option<StructuredDocument>,
}

impl ReportAggregator {
    pub fn new(
        provider_name: &str,
        model: &str,
        estimated_cost: f64,
        run_name: &str,
        exp_group: &str,
    ) -> Self {
        Self {
            run_name: run_name.to_string(),
            exp_group: exp_group.to_string(),
            cost_summary: CostSummary::new(provider_name, model, estimated_cost),
            themes: Vec::new(),
            duplicate_groups: BTreeMap::new(),
            structured_document: None,
        }
    }

    pub fn record_stage(&mut self, stage: Stage, usage: TokenUsage, cost: f64) {
        self.cost_summary.add_step_cost(StepCost { stage, cost, usage });
    }

    /// Displayed themes for a sorted taxonomy
    ///
    /// Topics and subtopics are ranked by claim count. Within a subtopic,
    /// claims absorbed by a duplicate group are dropped and each group's main
    /// claim is annotated with the number of claims it stands for.
    pub fn build_themes(sorted: &SortedTaxonomy, groups: &DuplicateGroups) -> Vec<ReportTheme> {
        sorted
            .ranked_topics()
            .into_iter()
            .map(|topic| {
                let topics = topic
                    .ranked_subtopics()
                    .into_iter()
                    .map(|subtopic| {
                        let subtopic_groups = groups.for_subtopic(&topic.name, &subtopic.name);
                        let absorbed: HashSet<usize> = subtopic_groups
                            .iter()
                            .flat_map(|g| g.duplicate_indices.iter().copied())
                            .collect();
                        let represented: HashMap<usize, usize> = subtopic_groups
                            .iter()
                            .map(|g| (g.main_index, g.represented()))
                            .collect();

                        let claims = subtopic
                            .claims
                            .iter()
                            .enumerate()
                            .filter(|(i, _)| !absorbed.contains(i))
                            .map(|(i, claim)| match represented.get(&i) {
                                Some(n) => format!("{claim} ({n}x)"),
                                None => claim.clone(),
                            })
                            .collect();

                        ReportTopic::new(&subtopic.name, claims)
                    })
                    .collect();

                ReportTheme::new(&topic.name, topics)
            })
            .collect()
    }

    pub fn set_themes(&mut self, themes: Vec<ReportTheme>) {
        self.themes = themes;
    }

    pub fn themes(&self) -> &[ReportTheme] {
        &self.themes
    }

    pub fn set_duplicate_groups(&mut self, groups: &DuplicateGroups) {
        self.duplicate_groups = groups.flatten();
    }

    pub fn set_structured_document(&mut self, document: StructuredDocument) {
        self.structured_document = Some(document);
    }

    pub fn cost_summary(&self) -> &CostSummary {
        &self.cost_summary
    }

    pub fn finalize(mut self, pipeline_stats: PipelineStats) -> Report {
        self.cost_summary.token_based_cost = self.cost_summary.actual_cost;

        let report = Report {
            run_name: self.run_name,
            exp_group: self.exp_group,
            timestamp: Utc::now(),
            themes: self.themes,
            pipeline_stats,
            cost_summary: self.cost_summary,
            duplicate_groups: self.duplicate_groups,
            structured_document: self.structured_document,
        };

        tracing::info!(
            run = %report.run_name,
            themes = report.total_themes(),
            topics = report.total_topics(),
            claims = report.total_claims(),
            actual_cost = report.cost_summary.actual_cost,
            estimated_cost = report.cost_summary.estimated_cost,
            accuracy_percentage = report.cost_summary.accuracy_percentage(),
            "Report finalized"
        );

        report
    }
}
