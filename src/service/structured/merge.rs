//! Merge of a filled document back onto its skeleton

use std::collections::HashMap;

use crate::model::document::{ClaimNode, StructuredDocument, SubtopicNode, TopicNode};
use crate::service::structured::skeleton::topology;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TopologyError {
    #[error("Identifier '{0}' appears more than once")]
    DuplicateIdentifier(String),

    #[error("Identifier layout changed: {missing} missing, {unexpected} unexpected, {moved} moved")]
    Changed {
        missing: usize,
        unexpected: usize,
        moved: usize,
    },
}

/// Copy free-text fields from `filled` onto `skeleton`, matched by id
///
/// `filled` must carry exactly the skeleton's identifiers, each under the same
/// parent. Identifiers, claim numbers and similar-claim lists always come from
/// the skeleton.
pub fn merge_filled(
    skeleton: &StructuredDocument,
    filled: &StructuredDocument,
) -> Result<StructuredDocument, TopologyError> {
    check_topology(skeleton, filled)?;

    let topics: HashMap<&str, &TopicNode> =
        filled.topics().iter().map(|t| (t.id.as_str(), t)).collect();
    let subtopics: HashMap<&str, &SubtopicNode> = filled
        .topics()
        .iter()
        .flat_map(|t| &t.subtopics)
        .map(|s| (s.id.as_str(), s))
        .collect();
    let claims: HashMap<&str, &ClaimNode> = subtopics
        .values()
        .flat_map(|s| &s.claims)
        .map(|c| (c.id.as_str(), c))
        .collect();

    let mut merged = skeleton.clone();
    for topic in &mut merged.data.1.topics {
        if let Some(source) = topics.get(topic.id.as_str()) {
            topic.title = source.title.clone();
            topic.description = source.description.clone();
        }
        for subtopic in &mut topic.subtopics {
            if let Some(source) = subtopics.get(subtopic.id.as_str()) {
                subtopic.title = source.title.clone();
                subtopic.description = source.description.clone();
            }
            for claim in &mut subtopic.claims {
                let Some(source) = claims.get(claim.id.as_str()) else {
                    continue;
                };
                claim.title = source.title.clone();
                for quote in &mut claim.quotes {
                    let Some(filled_quote) = source.quotes.iter().find(|q| q.id == quote.id) else {
                        continue;
                    };
                    quote.text = filled_quote.text.clone();
                    quote.reference.interview = filled_quote.reference.interview.clone();
                    quote.reference.data.1 = filled_quote.reference.data.1;
                }
            }
        }
    }

    Ok(merged)
}

fn check_topology(
    skeleton: &StructuredDocument,
    filled: &StructuredDocument,
) -> Result<(), TopologyError> {
    let (expected, _) = topology(skeleton);
    let (actual, seen) = topology(filled);

    if seen != actual.len() {
        let mut counts: HashMap<String, usize> = HashMap::new();
        for topic in filled.topics() {
            *counts.entry(topic.id.clone()).or_default() += 1;
            for subtopic in &topic.subtopics {
                *counts.entry(subtopic.id.clone()).or_default() += 1;
                for claim in &subtopic.claims {
                    *counts.entry(claim.id.clone()).or_default() += 1;
                    for quote in &claim.quotes {
                        *counts.entry(quote.id.clone()).or_default() += 1;
                        *counts.entry(quote.reference.id.clone()).or_default() += 1;
                        *counts.entry(quote.reference.source_id.clone()).or_default() += 1;
                    }
                }
            }
        }
        let duplicate = counts
            .into_iter()
            .find(|(_, n)| *n > 1)
            .map(|(id, _)| id)
            .unwrap_or_default();
        return Err(TopologyError::DuplicateIdentifier(duplicate));
    }

    let missing = expected.keys().filter(|id| !actual.contains_key(*id)).count();
    let unexpected = actual.keys().filter(|id| !expected.contains_key(*id)).count();
    let moved = expected
        .iter()
        .filter(|(id, placement)| actual.get(*id).is_some_and(|p| p != *placement))
        .count();

    if missing + unexpected + moved > 0 {
        return Err(TopologyError::Changed {
            missing,
            unexpected,
            moved,
        });
    }

    Ok(())
}
