//! Frequency bucketing of extracted claims

use crate::model::{ClaimsExtraction, SortedTaxonomy};

/// Bucket every claim by its literal (topic, subtopic) names
///
/// Buckets are created on first use, so taxonomy nodes without claims do not
/// appear. Pure and deterministic: the same input always yields the same
/// buckets in the same order.
pub fn sort_claims(extractions: &[ClaimsExtraction]) -> SortedTaxonomy {
    let mut sorted = SortedTaxonomy::default();

    for extraction in extractions {
        for claim in &extraction.claims {
            sorted.push(&claim.topic_name, &claim.subtopic_name, &claim.claim);
        }
    }

    tracing::debug!(
        topics = sorted.topics.len(),
        subtopics = sorted.total_topics(),
        claims = sorted.total_claims(),
        "Claims sorted"
    );

    sorted
}
