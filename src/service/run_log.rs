//! Per-run stage log
//!
//! A [`RunLog`] is opened once per pipeline run and handed to every
//! LLM-backed stage. Stages append one record each; the orchestrator closes
//! the log when the run ends, after which appends are rejected.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use serde::Serialize;
use utoipa::ToSchema;

use crate::model::{Stage, TokenUsage};

#[derive(Debug, thiserror::Error)]
pub enum RunLogError {
    #[error("Run log for '{0}' is already closed")]
    Closed(String),
}

/// Identity of a run
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct RunMetadata {
    pub run_name: String,
    pub exp_group: String,
    pub provider: String,
    pub model: String,
    pub estimated_cost: f64,
    pub comments: usize,
}

/// Outcome of one stage
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct StageRecord {
    pub stage: Stage,
    pub calls: usize,
    pub usage: TokenUsage,
    pub cost: f64,
    pub elapsed_ms: u64,
    pub success: bool,
}

impl StageRecord {
    pub fn new(stage: Stage, calls: usize, usage: TokenUsage, cost: f64, started: Instant) -> Self {
        Self {
            stage,
            calls,
            usage,
            cost,
            elapsed_ms: started.elapsed().as_millis() as u64,
            success: true,
        }
    }

    pub fn failed(mut self) -> Self {
        self.success = false;
        self
    }
}

/// Everything recorded during a run
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct RunSummary {
    pub metadata: RunMetadata,
    pub stages: Vec<StageRecord>,
    pub total_cost: f64,
    pub total_tokens: u64,
    pub elapsed_ms: u64,
}

pub struct RunLog {
    metadata: RunMetadata,
    records: Mutex<Vec<StageRecord>>,
    closed: AtomicBool,
    opened_at: Instant,
}

impl RunLog {
    pub fn open(metadata: RunMetadata) -> Arc<Self> {
        tracing::info!(
            run = %metadata.run_name,
            exp_group = %metadata.exp_group,
            provider = %metadata.provider,
            model = %metadata.model,
            comments = metadata.comments,
            estimated_cost = metadata.estimated_cost,
            "Run opened"
        );
        Arc::new(Self {
            metadata,
            records: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
            opened_at: Instant::now(),
        })
    }

    pub fn metadata(&self) -> &RunMetadata {
        &self.metadata
    }

    pub fn append(&self, record: StageRecord) -> Result<(), RunLogError> {
        if self.is_closed() {
            return Err(RunLogError::Closed(self.metadata.run_name.clone()));
        }

        tracing::info!(
            run = %self.metadata.run_name,
            stage = %record.stage,
            calls = record.calls,
            input_tokens = record.usage.input_tokens,
            output_tokens = record.usage.output_tokens,
            cost = record.cost,
            elapsed_ms = record.elapsed_ms,
            success = record.success,
            "Stage recorded"
        );

        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(record);
        Ok(())
    }

    pub fn records(&self) -> Vec<StageRecord> {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Close the log; later calls return the same summary without re-logging
    pub fn close(&self) -> RunSummary {
        let stages = self.records();
        let summary = RunSummary {
            metadata: self.metadata.clone(),
            total_cost: stages.iter().map(|r| r.cost).sum(),
            total_tokens: stages.iter().map(|r| r.usage.total_tokens).sum(),
            elapsed_ms: self.opened_at.elapsed().as_millis() as u64,
            stages,
        };

        if !self.closed.swap(true, Ordering::AcqRel) {
            tracing::info!(
                run = %self.metadata.run_name,
                stages = summary.stages.len(),
                total_cost = summary.total_cost,
                total_tokens = summary.total_tokens,
                elapsed_ms = summary.elapsed_ms,
                "Run closed"
            );
        }

        summary
    }
}
