//! Structured output document
//!
//! Wire shape: `{"data": ["v0.2", {title, description, addOns, topics}]}`.
//! Every node carries an `id` that is assigned before the document is handed
//! to the text-generation service and must survive the round trip unchanged.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Version tag carried as the first element of `data`
pub const DOCUMENT_VERSION: &str = "v0.2";

/// Description used for every generated document
pub const DOCUMENT_DESCRIPTION: &str = "T3C Pipeline Analysis Results";

/// Reference data kind for comment-backed quotes
pub const TEXT_REFERENCE_KIND: &str = "text";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredDocument {
    pub data: (String, DocumentBody),
}

impl StructuredDocument {
    pub fn new(body: DocumentBody) -> Self {
        Self {
            data: (DOCUMENT_VERSION.to_string(), body),
        }
    }

    /// Valid document with no topics
    pub fn empty(title: &str) -> Self {
        Self::new(DocumentBody {
            title: title.to_string(),
            description: DOCUMENT_DESCRIPTION.to_string(),
            add_ons: Map::new(),
            topics: Vec::new(),
        })
    }

    pub fn version(&self) -> &str {
        &self.data.0
    }

    pub fn body(&self) -> &DocumentBody {
        &self.data.1
    }

    pub fn topics(&self) -> &[TopicNode] {
        &self.data.1.topics
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentBody {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub add_ons: Map<String, Value>,
    #[serde(default)]
    pub topics: Vec<TopicNode>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicNode {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub subtopics: Vec<SubtopicNode>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubtopicNode {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub claims: Vec<ClaimNode>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimNode {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub quotes: Vec<QuoteNode>,
    /// 1-based position within the parent subtopic
    #[serde(default)]
    pub number: usize,
    #[serde(default)]
    pub similar_claims: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuoteNode {
    pub id: String,
    #[serde(default)]
    pub text: String,
    pub reference: ReferenceNode,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceNode {
    pub id: String,
    pub source_id: String,
    #[serde(default)]
    pub interview: String,
    pub data: (String, TextSpan),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextSpan {
    #[serde(default)]
    pub start_idx: usize,
    #[serde(default)]
    pub end_idx: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_wire_shape() {
        let doc = StructuredDocument::empty("run");
        let value = serde_json::to_value(&doc).unwrap();

        assert_eq!(
            value,
            serde_json::json!({
                "data": ["v0.2", {
                    "title": "run",
                    "description": "T3C Pipeline Analysis Results",
                    "addOns": {},
                    "topics": []
                }]
            })
        );
    }

    #[test]
    fn test_parses_filled_claim() {
        let json = r#"{
            "data": ["v0.2", {
                "title": "t",
                "description": "d",
                "addOns": {},
                "topics": [{
                    "id": "t1", "title": "Pets", "description": "",
                    "subtopics": [{
                        "id": "s1", "title": "Cats", "description": "",
                        "claims": [{
                            "id": "c1", "title": "Cats are great", "number": 1, "similarClaims": [],
                            "quotes": [{
                                "id": "q1", "text": "I like cats",
                                "reference": {
                                    "id": "r1", "sourceId": "src1", "interview": "Anonymous #1",
                                    "data": ["text", {"startIdx": 0, "endIdx": 11}]
                                }
                            }]
                        }]
                    }]
                }]
            }]
        }"#;

        let doc: StructuredDocument = serde_json::from_str(json).unwrap();
        assert_eq!(doc.version(), "v0.2");
        let claim = &doc.topics()[0].subtopics[0].claims[0];
        assert_eq!(claim.quotes[0].reference.data.1.end_idx, 11);
        assert_eq!(claim.quotes[0].reference.source_id, "src1");
    }

    #[test]
    fn test_rejects_missing_data() {
        let result: Result<StructuredDocument, _> = serde_json::from_str(r#"{"topics": []}"#);
        assert!(result.is_err());
    }
}
