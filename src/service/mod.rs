pub mod claims;
pub mod comments;
pub mod dedup;
pub mod llm;
pub mod output;
pub mod pipeline;
pub mod prompts;
pub mod report;
pub mod run_log;
pub mod sorter;
pub mod structured;
pub mod taxonomy;

#[cfg(test)]
pub(crate) mod testing;

pub use llm::{LlmClient, SharedGenerator};
pub use output::ResultsWriter;
pub use pipeline::{PipelineError, PipelineOrchestrator, PipelineRequest, PipelineSettings};
pub use taxonomy::TaxonomyBuilder;
