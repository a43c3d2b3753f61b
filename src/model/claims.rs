//! Claim models: extracted claims, frequency buckets and duplicate groupings

use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A single claim mapped onto a taxonomy leaf by name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Claim {
    pub claim: String,
    #[serde(default)]
    pub quote: String,
    pub topic_name: String,
    pub subtopic_name: String,
}

/// Claims extracted from one comment
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ClaimsExtraction {
    #[serde(default)]
    pub claims: Vec<Claim>,
}

impl ClaimsExtraction {
    pub fn len(&self) -> usize {
        self.claims.len()
    }

    pub fn is_empty(&self) -> bool {
        self.claims.is_empty()
    }
}

/// Claim texts mapped to one (topic, subtopic) pair, in encounter order
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubtopicClaims {
    pub name: String,
    pub claims: Vec<String>,
}

impl SubtopicClaims {
    pub fn count(&self) -> usize {
        self.claims.len()
    }
}

/// Subtopic buckets of one topic, in encounter order
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TopicClaims {
    pub name: String,
    pub subtopics: Vec<SubtopicClaims>,
}

impl TopicClaims {
    pub fn count(&self) -> usize {
        self.subtopics.iter().map(SubtopicClaims::count).sum()
    }

    #[cfg(test)]
    pub fn subtopic(&self, name: &str) -> Option<&SubtopicClaims> {
        self.subtopics.iter().find(|s| s.name == name)
    }

    /// Subtopics by claim count, descending; ties keep encounter order
    pub fn ranked_subtopics(&self) -> Vec<&SubtopicClaims> {
        let mut ranked: Vec<&SubtopicClaims> = self.subtopics.iter().collect();
        ranked.sort_by(|a, b| b.count().cmp(&a.count()));
        ranked
    }
}

/// Claims bucketed by topic and subtopic name
///
/// Only buckets holding at least one claim exist. Ordering is encounter order;
/// ranking by frequency is left to consumers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SortedTaxonomy {
    pub topics: Vec<TopicClaims>,
}

impl SortedTaxonomy {
    #[cfg(test)]
    pub fn topic(&self, name: &str) -> Option<&TopicClaims> {
        self.topics.iter().find(|t| t.name == name)
    }

    /// Append a claim to its bucket, creating topic and subtopic on first use
    pub fn push(&mut self, topic: &str, subtopic: &str, claim: &str) {
        let topic_idx = match self.topics.iter().position(|t| t.name == topic) {
            Some(idx) => idx,
            None => {
                self.topics.push(TopicClaims {
                    name: topic.to_string(),
                    subtopics: Vec::new(),
                });
                self.topics.len() - 1
            }
        };

        let subtopics = &mut self.topics[topic_idx].subtopics;
        match subtopics.iter_mut().find(|s| s.name == subtopic) {
            Some(bucket) => bucket.claims.push(claim.to_string()),
            None => subtopics.push(SubtopicClaims {
                name: subtopic.to_string(),
                claims: vec![claim.to_string()],
            }),
        }
    }

    /// Number of non-empty subtopic buckets
    pub fn total_topics(&self) -> usize {
        self.topics.iter().map(|t| t.subtopics.len()).sum()
    }

    pub fn total_claims(&self) -> usize {
        self.topics.iter().map(TopicClaims::count).sum()
    }

    /// Topics by claim count, descending; ties keep encounter order
    pub fn ranked_topics(&self) -> Vec<&TopicClaims> {
        let mut ranked: Vec<&TopicClaims> = self.topics.iter().collect();
        ranked.sort_by(|a, b| b.count().cmp(&a.count()));
        ranked
    }
}

/// Reference to a claim inside a deduplication request
///
/// Models usually answer with `"claimId3"` keys but bare integers show up too.
/// Anything else (`null`, negative or fractional numbers, objects) is kept as
/// `Other` and reported as malformed when the nesting is resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum ClaimReference {
    Index(u64),
    Key(String),
    Other(serde_json::Value),
}

impl std::fmt::Display for ClaimReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClaimReference::Index(i) => write!(f, "{i}"),
            ClaimReference::Key(k) => f.write_str(k),
            ClaimReference::Other(value) => write!(f, "{value}"),
        }
    }
}

/// Nesting returned by the deduplication call for one subtopic
///
/// Keys are top-level claims, values the near-duplicates nested under them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DeduplicationResult {
    #[serde(default, deserialize_with = "lenient_nesting")]
    #[schemars(with = "BTreeMap<String, Vec<ClaimReference>>")]
    pub nesting: BTreeMap<String, Vec<ClaimReference>>,
}

/// `null` means no duplicates and a bare value is a single reference
fn lenient_nesting<'de, D>(
    deserializer: D,
) -> Result<BTreeMap<String, Vec<ClaimReference>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw: Option<BTreeMap<String, serde_json::Value>> = Option::deserialize(deserializer)?;
    Ok(raw
        .unwrap_or_default()
        .into_iter()
        .map(|(key, value)| {
            let references = match value {
                serde_json::Value::Null => Vec::new(),
                serde_json::Value::Array(items) => items.into_iter().map(claim_reference).collect(),
                single => vec![claim_reference(single)],
            };
            (key, references)
        })
        .collect())
}

fn claim_reference(value: serde_json::Value) -> ClaimReference {
    match value {
        serde_json::Value::String(key) => ClaimReference::Key(key),
        serde_json::Value::Number(n) => match n.as_u64() {
            Some(index) => ClaimReference::Index(index),
            None => ClaimReference::Other(serde_json::Value::Number(n)),
        },
        other => ClaimReference::Other(other),
    }
}

impl DeduplicationResult {
    pub fn has_duplicates(&self) -> bool {
        self.nesting.values().any(|dupes| !dupes.is_empty())
    }
}

/// A surviving claim and the subtopic-local indices it absorbed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DuplicateGroup {
    pub main_index: usize,
    pub main_claim: String,
    pub duplicate_indices: Vec<usize>,
}

impl DuplicateGroup {
    /// Number of claims the group stands for, including the main claim
    pub fn represented(&self) -> usize {
        self.duplicate_indices.len() + 1
    }
}

/// Identifies one subtopic bucket
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct SubtopicKey {
    pub topic: String,
    pub subtopic: String,
}

impl SubtopicKey {
    pub fn new(topic: impl Into<String>, subtopic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            subtopic: subtopic.into(),
        }
    }
}

/// Duplicate groups for every deduplicated subtopic
///
/// Indices are only meaningful inside their own subtopic, so groups are kept
/// per subtopic rather than in one text-keyed map.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DuplicateGroups {
    by_subtopic: BTreeMap<SubtopicKey, Vec<DuplicateGroup>>,
}

impl DuplicateGroups {
    pub fn insert(&mut self, key: SubtopicKey, groups: Vec<DuplicateGroup>) {
        if groups.is_empty() {
            return;
        }
        self.by_subtopic.insert(key, groups);
    }

    pub fn for_subtopic(&self, topic: &str, subtopic: &str) -> &[DuplicateGroup] {
        self.by_subtopic
            .iter()
            .find(|(key, _)| key.topic == topic && key.subtopic == subtopic)
            .map(|(_, groups)| groups.as_slice())
            .unwrap_or(&[])
    }

    /// Total number of groups across all subtopics
    pub fn len(&self) -> usize {
        self.by_subtopic.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_subtopic.is_empty()
    }

    /// Flat main-claim text -> absorbed indices map
    ///
    /// When two subtopics share a main-claim text the later subtopic wins; the
    /// collision is logged.
    pub fn flatten(&self) -> BTreeMap<String, Vec<usize>> {
        let mut flat: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        for (key, groups) in &self.by_subtopic {
            for group in groups {
                if let Some(previous) =
                    flat.insert(group.main_claim.clone(), group.duplicate_indices.clone())
                {
                    tracing::warn!(
                        topic = %key.topic,
                        subtopic = %key.subtopic,
                        claim = %group.main_claim,
                        overwritten = ?previous,
                        "Duplicate group text collides across subtopics"
                    );
                }
            }
        }
        flat
    }
}
