pub mod claims;
pub mod config;
pub mod document;
pub mod report;
pub mod taxonomy;

pub use claims::{
    Claim, ClaimReference, ClaimsExtraction, DeduplicationResult, DuplicateGroup, DuplicateGroups,
    SortedTaxonomy, SubtopicKey,
};
pub use config::{Config, ProviderConfig};
pub use document::StructuredDocument;
pub use report::{
    CostSummary, PipelineStats, Report, ReportTheme, ReportTopic, Stage, StepCost, TokenUsage,
};
pub use taxonomy::Taxonomy;
