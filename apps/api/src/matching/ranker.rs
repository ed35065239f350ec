//! Ranker — deterministic ordering of one group's match results.

use std::cmp::Reverse;

use crate::matching::models::MatchResult;

/// Returns a new sequence ordered by `ats_score` descending.
///
/// `sort_by_key` is stable, so equally-scored candidates keep the order the
/// scoring service returned them in. The input slice is never touched.
pub fn rank(results: &[MatchResult]) -> Vec<MatchResult> {
    let mut ranked = results.to_vec();
    ranked.sort_by_key(|r| Reverse(r.ats_score));
    ranked
}
