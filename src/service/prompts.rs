//! Prompts for the pipeline stages

use crate::model::Taxonomy;

/// Shared instruction for the taxonomy, claims and deduplication calls
pub const SYSTEM_PROMPT: &str = r#"You are a professional research assistant with long experience running public consultations, surveys and citizen assemblies. You have sharp instincts for pulling interesting insights out of what participants say.
You know deliberation tools such as Pol.is well and understand why clear, concise claims that other people can vote on are valuable."#;

/// Instruction for the structured document fill call
pub const FILL_SYSTEM_PROMPT: &str = "You are a helpful assistant that generates valid JSON responses.";

const TAXONOMY_PROMPT: &str = r#"
Below is a list of comments.
Propose a way to organize the information they contain into topics and subtopics of interest.
Keep topic and subtopic names very short and use the short description to explain what each one covers.

Return a JSON object of the form {
  "taxonomy": [
    {
      "topicName": string,
      "topicShortDescription": string,
      "subtopics": [
        {
          "subtopicName": string,
          "subtopicShortDescription": string
        },
        ...
      ]
    },
    ...
  ]
}
Here is the list of comments:
"#;

const CLAIMS_PROMPT: &str = r#"
Below is a comment written by a participant, together with topics and subtopics that were already extracted from the whole consultation.
Extract a list of concise claims the participant would likely support.
Only keep claims that map onto one of the given topic/subtopic pairs.
A claim should be fairly general without being a platitude: something another person could disagree with. Every claim must be atomic.
For each claim also give a supporting quote from the comment.
Keep the quote as short as possible while still backing the claim. It does not have to be an argument; a personal story or anecdote is fine.
You may write "[...]" inside the quote to skip the less interesting parts.
Return a JSON object of the form {
  "claims": [
    {
      "claim": string, // a very concise claim
      "quote": string, // the exact quote
      "topicName": string, // one of the given topics
      "subtopicName": string // one of that topic's subtopics
    },
    // ...
  ]
}

Here are the topics and subtopics:
"#;

const DEDUP_PROMPT: &str = r#"
Below is a list of claims, each with an id.
Remove near-duplicates by nesting similar claims under a single top-level claim.
For example, with 5 claims where claims 3 and 5 say the same thing as claim 2, nest claims 3 and 5 under claim 2.
Represent the nesting as a JSON object whose keys are the ids of the top-level claims and whose values are lists of the ids nested under them.

Return a JSON object of the form {
  "nesting": {
    "claimId1": [],
    "claimId2": ["claimId3", "claimId5"],
    "claimId4": []
  }
}

Here are the claims:
"#;

/// Synthetic id of the claim at `index` in a subtopic list
pub fn claim_key(index: usize) -> String {
    format!("claimId{index}")
}

/// Taxonomy prompt: instruction followed by one comment per line
pub fn build_taxonomy_prompt(comments: &[String]) -> String {
    let mut prompt = TAXONOMY_PROMPT.to_string();
    for comment in comments {
        prompt.push('\n');
        prompt.push_str(comment);
    }
    prompt
}

/// Claims prompt for a single comment
///
/// The taxonomy is serialized the same way for every comment so that the
/// prompt only varies by the comment text.
pub fn build_claims_prompt(taxonomy_json: &str, comment: &str) -> String {
    format!("{CLAIMS_PROMPT}\n{taxonomy_json}\nAnd then here is the comment:\n{comment}")
}

/// Stable pretty-printed taxonomy for the claims prompt
pub fn taxonomy_json(taxonomy: &Taxonomy) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(taxonomy)
}

/// Deduplication prompt addressing each claim as `claimId<i>`
pub fn build_dedup_prompt(claims: &[String]) -> String {
    let mut prompt = DEDUP_PROMPT.to_string();
    for (i, claim) in claims.iter().enumerate() {
        prompt.push('\n');
        prompt.push_str(&claim_key(i));
        prompt.push_str(": ");
        prompt.push_str(claim);
    }
    prompt
}

/// Theme listing used as reference data for the fill call
pub struct FillTheme<'a> {
    pub name: &'a str,
    pub topics: Vec<(&'a str, &'a [String])>,
}

/// Fill prompt: skeleton plus the comments and claims it was built from
pub fn build_fill_prompt(skeleton_json: &str, comments: &[String], themes: &[FillTheme<'_>]) -> String {
    let numbered_comments = comments
        .iter()
        .enumerate()
        .map(|(i, c)| format!("{}. {}", i + 1, c))
        .collect::<Vec<_>>()
        .join("\n");

    let mut theme_listing = String::new();
    for theme in themes {
        theme_listing.push_str(&format!("THEME: {}\n", theme.name));
        for (topic, claims) in &theme.topics {
            theme_listing.push_str(&format!("  TOPIC: {topic}\n  CLAIMS:\n"));
            for claim in claims.iter() {
                theme_listing.push_str(&format!("    - {claim}\n"));
            }
        }
    }

    format!(
        r#"
Fill in the JSON structure below. Every "id" and "sourceId" is already assigned and must be returned byte-for-byte unchanged.

JSON structure to fill:
{skeleton_json}

## Task
1. Keep every "id" and "sourceId" exactly as given
2. Fill in titles, descriptions and quote text from the data below
3. Themes map to topics, topics map to subtopics
4. Use the original comments as quote text
5. Set startIdx and endIdx of each quote within its comment
6. Use "Anonymous #N" as the interview name
7. Do not add, remove or reorder any element

## Data

Comments:
{numbered_comments}

Themes and topics:
{theme_listing}
## Output
- Return ONLY the filled JSON structure
- Keep claim numbers as given

Generate ONLY valid JSON, no other text."#
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::taxonomy::{Subtopic, Topic};

    #[test]
    fn test_dedup_prompt_lists_claim_ids() {
        let prompt = build_dedup_prompt(&["Cats are great".to_string(), "I love cats".to_string()]);
        assert!(prompt.ends_with("\nclaimId0: Cats are great\nclaimId1: I love cats"));
    }

    #[test]
    fn test_taxonomy_prompt_appends_comments() {
        let prompt = build_taxonomy_prompt(&["a".to_string(), "b".to_string()]);
        assert!(prompt.ends_with("Here is the list of comments:\n\na\nb"));
    }

    #[test]
    fn test_claims_prompt_is_stable_across_comments() {
        let taxonomy = Taxonomy::new(vec![Topic::new(
            "Pets",
            "",
            vec![Subtopic::new("Cats", "")],
        )]);
        let json = taxonomy_json(&taxonomy).unwrap();

        let first = build_claims_prompt(&json, "I love cats");
        let second = build_claims_prompt(&json, "Cats rule");
        let prefix = first.trim_end_matches("I love cats");
        assert!(second.starts_with(prefix));
        assert!(first.contains("\"topicName\": \"Pets\""));
        assert!(first.contains("And then here is the comment:\nI love cats"));
    }

    #[test]
    fn test_fill_prompt_numbers_comments() {
        let claims = vec!["Cats are great (2x)".to_string()];
        let themes = vec![FillTheme {
            name: "Pets",
            topics: vec![("Cats", claims.as_slice())],
        }];
        let prompt = build_fill_prompt("{}", &["I love cats".to_string()], &themes);

        assert!(prompt.contains("1. I love cats"));
        assert!(prompt.contains("THEME: Pets\n  TOPIC: Cats\n  CLAIMS:\n    - Cats are great (2x)"));
    }
}
