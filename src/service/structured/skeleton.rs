//! Skeleton documents with pre-assigned identifiers

use std::collections::{BTreeMap, BTreeSet};

use serde_json::Map;
use uuid::Uuid;

use crate::model::ReportTheme;
use crate::model::document::{
    ClaimNode, DOCUMENT_DESCRIPTION, DocumentBody, QuoteNode, ReferenceNode, StructuredDocument,
    SubtopicNode, TEXT_REFERENCE_KIND, TextSpan, TopicNode,
};

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// Document tree for `themes` with fresh ids and empty text fields
///
/// Themes become topics, report topics become subtopics and every displayed
/// claim gets one quote with one reference.
pub fn build_skeleton(title: &str, themes: &[ReportTheme]) -> StructuredDocument {
    let topics = themes
        .iter()
        .map(|theme| TopicNode {
            id: new_id(),
            title: String::new(),
            description: String::new(),
            subtopics: theme
                .topics
                .iter()
                .map(|topic| SubtopicNode {
                    id: new_id(),
                    title: String::new(),
                    description: String::new(),
                    claims: (0..topic.claims.len()).map(skeleton_claim).collect(),
                })
                .collect(),
        })
        .collect();

    StructuredDocument::new(DocumentBody {
        title: title.to_string(),
        description: DOCUMENT_DESCRIPTION.to_string(),
        add_ons: Map::new(),
        topics,
    })
}

fn skeleton_claim(position: usize) -> ClaimNode {
    ClaimNode {
        id: new_id(),
        title: String::new(),
        quotes: vec![QuoteNode {
            id: new_id(),
            text: String::new(),
            reference: ReferenceNode {
                id: new_id(),
                source_id: new_id(),
                interview: String::new(),
                data: (TEXT_REFERENCE_KIND.to_string(), TextSpan::default()),
            },
        }],
        number: position + 1,
        similar_claims: Vec::new(),
    }
}

/// Kind of node an identifier belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum NodeKind {
    Topic,
    Subtopic,
    Claim,
    Quote,
    Reference,
    Source,
}

/// Identifier placement: what the node is and which node holds it
pub type Placement = (NodeKind, Option<String>);

/// Identifier → placement map, plus the number of identifiers seen
///
/// The count exceeds the map size when an identifier occurs twice.
pub fn topology(doc: &StructuredDocument) -> (BTreeMap<String, Placement>, usize) {
    let mut map = BTreeMap::new();
    let mut seen = 0;
    let mut place = |id: &str, kind: NodeKind, parent: Option<&str>| {
        seen += 1;
        map.insert(id.to_string(), (kind, parent.map(str::to_string)));
    };

    for topic in doc.topics() {
        place(&topic.id, NodeKind::Topic, None);
        for subtopic in &topic.subtopics {
            place(&subtopic.id, NodeKind::Subtopic, Some(&topic.id));
            for claim in &subtopic.claims {
                place(&claim.id, NodeKind::Claim, Some(&subtopic.id));
                for quote in &claim.quotes {
                    place(&quote.id, NodeKind::Quote, Some(&claim.id));
                    let reference = &quote.reference;
                    place(&reference.id, NodeKind::Reference, Some(&quote.id));
                    place(&reference.source_id, NodeKind::Source, Some(&reference.id));
                }
            }
        }
    }

    (map, seen)
}

/// Every identifier in the document
pub fn identifiers(doc: &StructuredDocument) -> BTreeSet<String> {
    topology(doc).0.into_keys().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ReportTopic;

    fn themes() -> Vec<ReportTheme> {
        vec![
            ReportTheme::new(
                "Pets",
                vec![
                    ReportTopic::new("Cats", vec!["Cats are great (2x)".into(), "Cats nap".into()]),
                    ReportTopic::new("Dogs", vec!["Dogs are fine".into()]),
                ],
            ),
            ReportTheme::new("Wildlife", vec![]),
        ]
    }

    #[test]
    fn test_skeleton_shape() {
        let doc = build_skeleton("run", &themes());

        assert_eq!(doc.version(), "v0.2");
        assert_eq!(doc.body().title, "run");
        assert_eq!(doc.topics().len(), 2);
        let cats = &doc.topics()[0].subtopics[0];
        assert_eq!(cats.claims.len(), 2);
        assert_eq!(cats.claims[0].number, 1);
        assert_eq!(cats.claims[1].number, 2);
        assert!(cats.claims[1].title.is_empty());
        assert!(cats.claims[1].similar_claims.is_empty());
        assert_eq!(cats.claims[0].quotes[0].reference.data.0, "text");
        assert!(doc.topics()[1].subtopics.is_empty());
    }

    #[test]
    fn test_identifiers_are_unique_uuids() {
        let doc = build_skeleton("run", &themes());
        let (map, seen) = topology(&doc);

        // 2 topics, 2 subtopics, 3 claims with quote/reference/source each
        assert_eq!(seen, 2 + 2 + 3 * 4);
        assert_eq!(map.len(), seen);
        assert!(map.keys().all(|id| Uuid::parse_str(id).is_ok()));
    }

    #[test]
    fn test_skeleton_serializes_with_wire_names() {
        let doc = build_skeleton("run", &themes());
        let value = serde_json::to_value(&doc).unwrap();
        let claim = &value["data"][1]["topics"][0]["subtopics"][0]["claims"][0];

        assert!(claim["similarClaims"].is_array());
        assert!(claim["quotes"][0]["reference"]["sourceId"].is_string());
        assert_eq!(claim["quotes"][0]["reference"]["data"][1]["startIdx"], 0);
        assert_eq!(value["data"][1]["addOns"], serde_json::json!({}));
    }
}
