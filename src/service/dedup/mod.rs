//! Near-duplicate claim grouping, one call per subtopic bucket

use std::sync::Arc;
use std::time::Instant;

use futures::StreamExt;
use futures::stream;

use crate::model::{
    DeduplicationResult, DuplicateGroup, DuplicateGroups, SortedTaxonomy, Stage, SubtopicKey,
    TokenUsage,
};
use crate::service::dedup::nesting::resolve_nesting;
use crate::service::llm::{GenerationRequest, SharedGenerator, parse_json_content};
use crate::service::prompts::{SYSTEM_PROMPT, build_dedup_prompt};
use crate::service::run_log::{RunLog, StageRecord};

pub mod error;
pub mod nesting;

pub use error::DeduplicationError;

/// Successful deduplication pass
#[derive(Debug, Clone)]
pub struct DeduplicationOutcome {
    pub groups: DuplicateGroups,
    pub usage: TokenUsage,
    pub cost: f64,
    /// Buckets with a single claim, never sent
    pub skipped_subtopics: usize,
    /// References skipped while resolving nestings
    pub malformed_references: usize,
}

struct BucketDeduplication {
    usage: TokenUsage,
    result: Result<(SubtopicKey, Vec<DuplicateGroup>, usize), DeduplicationError>,
}

pub struct Deduplicator {
    generator: SharedGenerator,
    run_log: Arc<RunLog>,
    max_concurrent_calls: usize,
}

impl Deduplicator {
    pub fn new(generator: SharedGenerator, run_log: Arc<RunLog>, max_concurrent_calls: usize) -> Self {
        Self {
            generator,
            run_log,
            max_concurrent_calls: max_concurrent_calls.max(1),
        }
    }

    pub async fn deduplicate(
        &self,
        sorted: &SortedTaxonomy,
    ) -> Result<DeduplicationOutcome, DeduplicationError> {
        let start_time = Instant::now();

        let buckets: Vec<(&str, &str, &[String])> = sorted
            .topics
            .iter()
            .flat_map(|topic| {
                topic
                    .subtopics
                    .iter()
                    .map(move |sub| (topic.name.as_str(), sub.name.as_str(), sub.claims.as_slice()))
            })
            .collect();
        let skipped_subtopics = buckets.iter().filter(|(_, _, claims)| claims.len() <= 1).count();

        let mut pending = std::pin::pin!(
            stream::iter(buckets.into_iter().filter(|(_, _, claims)| claims.len() > 1))
                .map(|(topic, subtopic, claims)| self.deduplicate_bucket(topic, subtopic, claims))
                .buffered(self.max_concurrent_calls)
        );

        let mut groups = DuplicateGroups::default();
        let mut usage = TokenUsage::default();
        let mut malformed_references = 0;
        let mut calls = 0;

        while let Some(bucket) = pending.next().await {
            calls += 1;
            usage.add(&bucket.usage);

            match bucket.result {
                Ok((key, bucket_groups, malformed)) => {
                    malformed_references += malformed;
                    groups.insert(key, bucket_groups);
                }
                Err(e) => {
                    let cost = self.generator.calculate_cost(&usage);
                    tracing::error!(
                        model = %self.generator.model(),
                        error = %e,
                        "Deduplication aborted"
                    );
                    self.record(
                        StageRecord::new(Stage::Deduplication, calls, usage, cost, start_time)
                            .failed(),
                    );
                    return Err(e);
                }
            }
        }

        let cost = self.generator.calculate_cost(&usage);
        if groups.is_empty() {
            tracing::debug!(calls = calls, "No duplicate groups found");
        }

        tracing::info!(
            model = %self.generator.model(),
            calls = calls,
            skipped_subtopics = skipped_subtopics,
            duplicate_groups = groups.len(),
            malformed_references = malformed_references,
            elapsed_ms = start_time.elapsed().as_millis(),
            input_tokens = usage.input_tokens,
            output_tokens = usage.output_tokens,
            cost = cost,
            "Deduplication complete"
        );

        self.record(StageRecord::new(Stage::Deduplication, calls, usage, cost, start_time));

        Ok(DeduplicationOutcome {
            groups,
            usage,
            cost,
            skipped_subtopics,
            malformed_references,
        })
    }

    async fn deduplicate_bucket(
        &self,
        topic: &str,
        subtopic: &str,
        claims: &[String],
    ) -> BucketDeduplication {
        let prompt = build_dedup_prompt(claims);
        let request = GenerationRequest::json(SYSTEM_PROMPT, prompt)
            .with_schema::<DeduplicationResult>("deduplication");

        tracing::debug!(
            topic = %topic,
            subtopic = %subtopic,
            claims = claims.len(),
            "Requesting deduplication"
        );

        let generation = match self.generator.generate(request).await {
            Ok(generation) => generation,
            Err(source) => {
                return BucketDeduplication {
                    usage: TokenUsage::default(),
                    result: Err(DeduplicationError::Collaborator {
                        topic: topic.to_string(),
                        subtopic: subtopic.to_string(),
                        source,
                    }),
                };
            }
        };

        let usage = generation.usage;
        let nesting: DeduplicationResult = match parse_json_content(&generation.content) {
            Ok(nesting) => nesting,
            Err(e) => {
                return BucketDeduplication {
                    usage,
                    result: Err(DeduplicationError::UnparsableResponse {
                        topic: topic.to_string(),
                        subtopic: subtopic.to_string(),
                        message: e.to_string(),
                    }),
                };
            }
        };

        if !nesting.has_duplicates() {
            tracing::debug!(topic = %topic, subtopic = %subtopic, "No duplicates found");
        }

        let resolution = resolve_nesting(claims, &nesting);

        tracing::debug!(
            topic = %topic,
            subtopic = %subtopic,
            groups = resolution.groups.len(),
            skipped_references = resolution.errors.len(),
            "Nesting resolved"
        );

        BucketDeduplication {
            usage,
            result: Ok((
                SubtopicKey::new(topic, subtopic),
                resolution.groups,
                resolution.errors.len(),
            )),
        }
    }

    fn record(&self, record: StageRecord) {
        if let Err(e) = self.run_log.append(record) {
            tracing::warn!(error = %e, "Deduplication stage record dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::testing::{ScriptedGenerator, test_run_log};

    fn sorted(buckets: &[(&str, &str, Vec<&str>)]) -> SortedTaxonomy {
        let mut sorted = SortedTaxonomy::default();
        for (topic, subtopic, claims) in buckets {
            for claim in claims {
                sorted.push(topic, subtopic, claim);
            }
        }
        sorted
    }

    #[tokio::test]
    async fn test_single_claim_buckets_are_skipped() {
        let generator = ScriptedGenerator::new(vec![]);
        let run_log = test_run_log();
        let deduplicator = Deduplicator::new(generator.clone(), Arc::clone(&run_log), 1);

        let outcome = deduplicator
            .deduplicate(&sorted(&[
                ("Pets", "Cats", vec!["Cats are great"]),
                ("Pets", "Dogs", vec!["Dogs are fine"]),
            ]))
            .await
            .unwrap();

        assert_eq!(generator.calls(), 0);
        assert_eq!(outcome.skipped_subtopics, 2);
        assert!(outcome.groups.is_empty());
        assert_eq!(outcome.cost, 0.0);
        assert_eq!(run_log.records()[0].calls, 0);
    }

    #[tokio::test]
    async fn test_groups_by_subtopic() {
        let generator = ScriptedGenerator::new(vec![Ok(
            r#"{"nesting": {"claimId0": ["claimId1"], "claimId2": []}}"#.to_string(),
        )]);
        let deduplicator = Deduplicator::new(generator.clone(), test_run_log(), 1);

        let outcome = deduplicator
            .deduplicate(&sorted(&[
                ("Pets", "Cats", vec!["Cats are great", "I love cats", "Dogs are fine"]),
                ("Wildlife", "Lizards", vec!["Lizards are scary"]),
            ]))
            .await
            .unwrap();

        assert_eq!(generator.calls(), 1);
        assert!(generator.requests()[0].prompt.ends_with(
            "\nclaimId0: Cats are great\nclaimId1: I love cats\nclaimId2: Dogs are fine"
        ));
        assert_eq!(outcome.skipped_subtopics, 1);
        assert_eq!(
            outcome.groups.for_subtopic("Pets", "Cats")[0].duplicate_indices,
            vec![1]
        );
        let flat = outcome.groups.flatten();
        assert_eq!(flat.len(), 1);
        assert_eq!(flat["Cats are great"], vec![1]);
    }

    #[tokio::test]
    async fn test_malformed_references_are_not_fatal() {
        let generator = ScriptedGenerator::new(vec![Ok(
            r#"{"nesting": {"claimId0": ["claimId5", "nope"]}}"#.to_string(),
        )]);
        let deduplicator = Deduplicator::new(generator, test_run_log(), 1);

        let outcome = deduplicator
            .deduplicate(&sorted(&[("Pets", "Cats", vec!["a", "b"])]))
            .await
            .unwrap();

        assert_eq!(outcome.malformed_references, 2);
        assert!(outcome.groups.is_empty());
    }

    #[tokio::test]
    async fn test_odd_reference_values_are_skipped_not_fatal() {
        let generator = ScriptedGenerator::new(vec![
            Ok(r#"{"nesting": {"claimId0": ["claimId1", null, -1, 1.0]}}"#.to_string()),
            Ok(r#"{"nesting": {"claimId0": "claimId1"}}"#.to_string()),
        ]);
        let deduplicator = Deduplicator::new(generator.clone(), test_run_log(), 1);

        let outcome = deduplicator
            .deduplicate(&sorted(&[
                ("Pets", "Cats", vec!["Cats are great", "I love cats"]),
                ("Pets", "Dogs", vec!["Dogs are fine", "Dogs are okay"]),
            ]))
            .await
            .unwrap();

        assert_eq!(generator.calls(), 2);
        assert_eq!(outcome.malformed_references, 3);
        assert_eq!(
            outcome.groups.for_subtopic("Pets", "Cats")[0].duplicate_indices,
            vec![1]
        );
        assert_eq!(
            outcome.groups.for_subtopic("Pets", "Dogs")[0].duplicate_indices,
            vec![1]
        );
    }

    #[tokio::test]
    async fn test_unparsable_response_is_fatal() {
        let generator = ScriptedGenerator::new(vec![Ok("no idea".to_string())]);
        let run_log = test_run_log();
        let deduplicator = Deduplicator::new(generator, Arc::clone(&run_log), 1);

        let result = deduplicator
            .deduplicate(&sorted(&[("Pets", "Cats", vec!["a", "b"])]))
            .await;

        assert!(matches!(
            result,
            Err(DeduplicationError::UnparsableResponse { ref topic, .. }) if topic == "Pets"
        ));
        assert!(!run_log.records()[0].success);
    }
}
