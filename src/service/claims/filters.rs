//! Claim filtering logic

use crate::model::{Claim, ClaimsExtraction};

/// Trim claim fields and drop claims without any claim text
///
/// Returns the cleaned extraction and the number of dropped claims.
pub fn drop_blank_claims(extraction: ClaimsExtraction) -> (ClaimsExtraction, usize) {
    let before = extraction.claims.len();

    let claims: Vec<Claim> = extraction
        .claims
        .into_iter()
        .filter_map(|claim| {
            let text = claim.claim.trim();
            if text.is_empty() {
                return None;
            }
            Some(Claim {
                claim: text.to_string(),
                quote: claim.quote.trim().to_string(),
                topic_name: claim.topic_name.trim().to_string(),
                subtopic_name: claim.subtopic_name.trim().to_string(),
            })
        })
        .collect();

    let dropped = before - claims.len();
    (ClaimsExtraction { claims }, dropped)
}
