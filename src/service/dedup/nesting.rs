//! Translation of a returned nesting into subtopic-scoped duplicate groups

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::LazyLock;

use regex::Regex;

use crate::model::{ClaimReference, DeduplicationResult, DuplicateGroup};
use crate::service::dedup::error::NestingError;

/// Accepts `claimId3`, `claim_id 3`, `ClaimID-3`
static CLAIM_KEY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*claim[_\s-]?id[\s:_-]*(\d+)\s*$").expect("valid claim key pattern")
});

/// Index named by a claim reference, if it is well formed
pub fn parse_claim_key(reference: &ClaimReference) -> Option<usize> {
    match reference {
        ClaimReference::Index(i) => usize::try_from(*i).ok(),
        ClaimReference::Key(key) => {
            if let Ok(i) = key.trim().parse::<usize>() {
                return Some(i);
            }
            CLAIM_KEY
                .captures(key)
                .and_then(|caps| caps.get(1))
                .and_then(|m| m.as_str().parse().ok())
        }
        ClaimReference::Other(_) => None,
    }
}

/// Duplicate groups and the references that had to be skipped
#[derive(Debug, Default)]
pub struct NestingResolution {
    pub groups: Vec<DuplicateGroup>,
    pub errors: Vec<NestingError>,
}

/// Resolve `result` against the subtopic's claim list
///
/// Keys are processed in index order. Malformed or out-of-range references are
/// skipped and reported. Groups stay disjoint: a claim absorbed by an earlier
/// group is not absorbed again, and a key that was itself absorbed hands its
/// duplicates to the group that absorbed it. Groups left without duplicates
/// are dropped.
pub fn resolve_nesting(claims: &[String], result: &DeduplicationResult) -> NestingResolution {
    let mut resolution = NestingResolution::default();

    let mut keyed: BTreeMap<usize, (&str, &[ClaimReference])> = BTreeMap::new();
    for (key, references) in &result.nesting {
        if references.is_empty() {
            continue;
        }
        match parse_claim_key(&ClaimReference::Key(key.clone())) {
            Some(index) if index < claims.len() => {
                keyed.insert(index, (key.as_str(), references.as_slice()));
            }
            Some(_) => resolution.errors.push(malformed(key, key, "index out of range")),
            None => resolution.errors.push(malformed(key, key, "not a claim id")),
        }
    }

    let mut groups: Vec<DuplicateGroup> = Vec::new();
    // absorbed index -> position of the owning group
    let mut owner: HashMap<usize, usize> = HashMap::new();
    let mut mains: HashSet<usize> = HashSet::new();

    for (main_index, (key, references)) in keyed {
        let position = match owner.get(&main_index) {
            Some(&position) => position,
            None => {
                mains.insert(main_index);
                groups.push(DuplicateGroup {
                    main_index,
                    main_claim: claims[main_index].clone(),
                    duplicate_indices: Vec::new(),
                });
                groups.len() - 1
            }
        };

        for reference in references {
            let Some(index) = parse_claim_key(reference) else {
                resolution
                    .errors
                    .push(malformed(key, &reference.to_string(), "not a claim id"));
                continue;
            };
            if index >= claims.len() {
                resolution
                    .errors
                    .push(malformed(key, &reference.to_string(), "index out of range"));
                continue;
            }
            if index == groups[position].main_index || mains.contains(&index) {
                continue;
            }
            if owner.contains_key(&index) {
                continue;
            }

            owner.insert(index, position);
            groups[position].duplicate_indices.push(index);
        }
    }

    for error in &resolution.errors {
        tracing::warn!(error = %error, "Skipping duplicate reference");
    }

    resolution.groups = groups
        .into_iter()
        .filter(|g| !g.duplicate_indices.is_empty())
        .collect();
    resolution
}

fn malformed(key: &str, reference: &str, reason: &'static str) -> NestingError {
    NestingError::MalformedIndexReference {
        key: key.to_string(),
        reference: reference.to_string(),
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims(texts: &[&str]) -> Vec<String> {
        texts.iter().map(|t| t.to_string()).collect()
    }

    fn nesting(json: &str) -> DeduplicationResult {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_parse_claim_key_variants() {
        let key = |s: &str| parse_claim_key(&ClaimReference::Key(s.to_string()));
        assert_eq!(key("claimId3"), Some(3));
        assert_eq!(key("claim_id 12"), Some(12));
        assert_eq!(key("ClaimID-0"), Some(0));
        assert_eq!(key(" 7 "), Some(7));
        assert_eq!(key("claim3"), None);
        assert_eq!(key("claimIdX"), None);
        assert_eq!(parse_claim_key(&ClaimReference::Index(4)), Some(4));
    }

    #[test]
    fn test_cats_grouping() {
        let list = claims(&["Cats are great", "I love cats", "Dogs are fine"]);
        let result = nesting(r#"{"nesting": {"claimId0": ["claimId1"], "claimId2": []}}"#);

        let resolution = resolve_nesting(&list, &result);

        assert!(resolution.errors.is_empty());
        assert_eq!(
            resolution.groups,
            vec![DuplicateGroup {
                main_index: 0,
                main_claim: "Cats are great".to_string(),
                duplicate_indices: vec![1],
            }]
        );
    }

    #[test]
    fn test_out_of_range_and_malformed_are_skipped() {
        let list = claims(&["a", "b", "c"]);
        let result = nesting(
            r#"{"nesting": {
                "claimId0": ["claimId1", "claimId9", "banana"],
                "claimId7": ["claimId2"],
                "whatever": ["claimId2"]
            }}"#,
        );

        let resolution = resolve_nesting(&list, &result);

        assert_eq!(resolution.groups.len(), 1);
        assert_eq!(resolution.groups[0].duplicate_indices, vec![1]);
        assert_eq!(resolution.errors.len(), 4);
    }

    #[test]
    fn test_non_claim_values_are_reported() {
        let list = claims(&["a", "b", "c"]);
        let result = nesting(
            r#"{"nesting": {"claimId0": ["claimId1", null, -1, 1.0, "-1"], "claimId2": "claimId1"}}"#,
        );

        let resolution = resolve_nesting(&list, &result);

        assert_eq!(resolution.groups.len(), 1);
        assert_eq!(resolution.groups[0].main_index, 0);
        assert_eq!(resolution.groups[0].duplicate_indices, vec![1]);
        assert_eq!(resolution.errors.len(), 4);
        assert_eq!(
            parse_claim_key(&ClaimReference::Other(serde_json::Value::Null)),
            None
        );
    }

    #[test]
    fn test_indices_exclude_main_and_stay_in_range() {
        let list = claims(&["a", "b", "c", "d", "e"]);
        let result = nesting(
            r#"{"nesting": {
                "claimId1": ["claimId1", "claimId2", "claimId2", 4],
                "claimId3": ["claimId2", "claimId1", "claimId0"]
            }}"#,
        );

        let resolution = resolve_nesting(&list, &result);

        for group in &resolution.groups {
            assert!(group.duplicate_indices.iter().all(|&i| i < list.len()));
            assert!(!group.duplicate_indices.contains(&group.main_index));
        }
        assert_eq!(resolution.groups[0].main_index, 1);
        assert_eq!(resolution.groups[0].duplicate_indices, vec![2, 4]);
        assert_eq!(resolution.groups[1].main_index, 3);
        assert_eq!(resolution.groups[1].duplicate_indices, vec![0]);
    }

    #[test]
    fn test_absorbed_key_hands_duplicates_to_owner() {
        let list = claims(&["a", "b", "c"]);
        let result = nesting(r#"{"nesting": {"claimId0": ["claimId1"], "claimId1": ["claimId2"]}}"#);

        let resolution = resolve_nesting(&list, &result);

        assert_eq!(resolution.groups.len(), 1);
        assert_eq!(resolution.groups[0].main_index, 0);
        assert_eq!(resolution.groups[0].duplicate_indices, vec![1, 2]);
    }

    #[test]
    fn test_numeric_key_order() {
        let list: Vec<String> = (0..12).map(|i| format!("claim {i}")).collect();
        let result = nesting(r#"{"nesting": {"claimId10": ["claimId11"], "claimId2": ["claimId10"]}}"#);

        let resolution = resolve_nesting(&list, &result);

        assert_eq!(resolution.groups.len(), 1);
        assert_eq!(resolution.groups[0].main_index, 2);
        assert_eq!(resolution.groups[0].duplicate_indices, vec![10, 11]);
    }
}
