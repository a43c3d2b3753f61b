//! Taxonomy model: topics and their subtopics
//!
//! The taxonomy is produced once per run by the taxonomy builder and is never
//! mutated afterwards. Downstream stages refer to its nodes by name only.

use std::collections::HashSet;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A leaf of the taxonomy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Subtopic {
    subtopic_name: String,
    #[serde(default)]
    subtopic_short_description: String,
}

impl Subtopic {
    #[cfg(test)]
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            subtopic_name: name.into(),
            subtopic_short_description: description.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.subtopic_name
    }

    pub fn description(&self) -> &str {
        &self.subtopic_short_description
    }
}

/// A top-level theme with its ordered subtopics
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Topic {
    topic_name: String,
    #[serde(default)]
    topic_short_description: String,
    #[serde(default)]
    subtopics: Vec<Subtopic>,
}

impl Topic {
    #[cfg(test)]
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        subtopics: Vec<Subtopic>,
    ) -> Self {
        Self {
            topic_name: name.into(),
            topic_short_description: description.into(),
            subtopics,
        }
    }

    pub fn name(&self) -> &str {
        &self.topic_name
    }

    pub fn description(&self) -> &str {
        &self.topic_short_description
    }

    pub fn subtopics(&self) -> &[Subtopic] {
        &self.subtopics
    }

    pub fn subtopic(&self, name: &str) -> Option<&Subtopic> {
        self.subtopics.iter().find(|s| s.name() == name)
    }
}

/// Ordered sequence of topics
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Taxonomy {
    taxonomy: Vec<Topic>,
}

impl Taxonomy {
    #[cfg(test)]
    pub fn new(topics: Vec<Topic>) -> Self {
        Self { taxonomy: topics }
    }

    pub fn topics(&self) -> &[Topic] {
        &self.taxonomy
    }

    pub fn topic(&self, name: &str) -> Option<&Topic> {
        self.taxonomy.iter().find(|t| t.name() == name)
    }

    /// Whether `topic`/`subtopic` names an existing leaf
    pub fn contains(&self, topic: &str, subtopic: &str) -> bool {
        self.topic(topic)
            .map(|t| t.subtopic(subtopic).is_some())
            .unwrap_or(false)
    }

    /// Number of themes (top-level topics)
    pub fn num_themes(&self) -> usize {
        self.taxonomy.len()
    }

    /// Number of topics (subtopics across all themes)
    pub fn num_topics(&self) -> usize {
        self.taxonomy.iter().map(|t| t.subtopics.len()).sum()
    }

    /// Subtopic count per theme, in taxonomy order
    pub fn subtopic_counts(&self) -> Vec<usize> {
        self.taxonomy.iter().map(|t| t.subtopics.len()).collect()
    }

    /// Names that break the uniqueness rules (duplicate topics, or duplicate
    /// subtopics within one topic)
    pub fn duplicate_names(&self) -> Vec<String> {
        let mut duplicates = Vec::new();
        let mut topics = HashSet::new();

        for topic in &self.taxonomy {
            if !topics.insert(topic.name()) {
                duplicates.push(topic.name().to_string());
            }
            let mut subtopics = HashSet::new();
            for subtopic in &topic.subtopics {
                if !subtopics.insert(subtopic.name()) {
                    duplicates.push(format!("{}/{}", topic.name(), subtopic.name()));
                }
            }
        }

        duplicates
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pets() -> Taxonomy {
        Taxonomy::new(vec![
            Topic::new(
                "Pets",
                "Opinions about pets",
                vec![
                    Subtopic::new("Cats", "Cats as pets"),
                    Subtopic::new("Dogs", "Dogs as pets"),
                ],
            ),
            Topic::new("Wildlife", "Wild animals", vec![Subtopic::new("Lizards", "")]),
        ])
    }

    #[test]
    fn test_counts() {
        let taxonomy = pets();
        assert_eq!(taxonomy.num_themes(), 2);
        assert_eq!(taxonomy.num_topics(), 3);
        assert_eq!(taxonomy.subtopic_counts(), vec![2, 1]);
    }

    #[test]
    fn test_contains_checks_parent_topic() {
        let taxonomy = pets();
        assert!(taxonomy.contains("Pets", "Cats"));
        assert!(!taxonomy.contains("Wildlife", "Cats"));
        assert!(!taxonomy.contains("Birds", "Cats"));
    }

    #[test]
    fn test_parses_wire_format() {
        let json = r#"{
            "taxonomy": [
                {
                    "topicName": "Pets",
                    "topicShortDescription": "Opinions about pets",
                    "subtopics": [
                        {"subtopicName": "Cats", "subtopicShortDescription": "Cats as pets"}
                    ]
                }
            ]
        }"#;

        let taxonomy: Taxonomy = serde_json::from_str(json).unwrap();
        assert_eq!(taxonomy.topics()[0].name(), "Pets");
        assert_eq!(taxonomy.topics()[0].subtopics()[0].description(), "Cats as pets");
    }

    #[test]
    fn test_missing_taxonomy_key_is_rejected() {
        let result: Result<Taxonomy, _> = serde_json::from_str(r#"{"topics": []}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_duplicate_names() {
        let taxonomy = Taxonomy::new(vec![
            Topic::new("Pets", "", vec![Subtopic::new("Cats", ""), Subtopic::new("Cats", "")]),
            Topic::new("Pets", "", vec![]),
        ]);

        assert_eq!(taxonomy.duplicate_names(), vec!["Pets/Cats", "Pets"]);
    }
}
