//! Aggregator — summary statistics over result groups.
//!
//! Everything here is recomputed from the groups on every call; nothing is cached.

use serde::Serialize;

use crate::matching::models::{MatchResult, ResultGroup, ResumeBatch};

/// Coarse bucket used by the dashboards to colour a score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreBand {
    Strong,
    Moderate,
    Weak,
}

impl ScoreBand {
    pub fn of(score: u32) -> Self {
        if score > 70 {
            ScoreBand::Strong
        } else if score > 40 {
            ScoreBand::Moderate
        } else {
            ScoreBand::Weak
        }
    }
}

/// Headline numbers for the stat cards.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub job_roles: usize,
    pub total_candidates: usize,
    pub top_score: u32,
    pub top_band: ScoreBand,
    pub average_score: u32,
    pub average_band: ScoreBand,
    pub best_match: Option<MatchResult>,
}

/// Maximum `ats_score` across every result of every group; 0 when there are none.
pub fn top_score(groups: &[ResultGroup]) -> u32 {
    groups
        .iter()
        .flat_map(|g| g.rankings())
        .map(|r| r.ats_score)
        .max()
        .unwrap_or(0)
}

/// Size of the resume collection supplied to the run, not the number of
/// scored rows (the service may drop unreadable resumes).
pub fn total_candidates(resumes: &ResumeBatch) -> usize {
    resumes.len()
}

/// The single highest-scoring result. Ties go to the earliest group, then
/// the earliest rank within it.
pub fn best_match(groups: &[ResultGroup]) -> Option<&MatchResult> {
    let mut best: Option<&MatchResult> = None;
    for result in groups.iter().flat_map(|g| g.rankings()) {
        if best.map_or(true, |current| result.ats_score > current.ats_score) {
            best = Some(result);
        }
    }
    best
}

/// Mean of each group's top score, rounded to the nearest integer; 0 with no groups.
pub fn average_score(groups: &[ResultGroup]) -> u32 {
    if groups.is_empty() {
        return 0;
    }
    let sum: u64 = groups.iter().map(|g| u64::from(g.top_score())).sum();
    (sum as f64 / groups.len() as f64).round() as u32
}

pub fn summarize(groups: &[ResultGroup], resume_count: usize) -> RunSummary {
    let top = top_score(groups);
    let average = average_score(groups);
    RunSummary {
        job_roles: groups.len(),
        total_candidates: resume_count,
        top_score: top,
        top_band: ScoreBand::of(top),
        average_score: average,
        average_band: ScoreBand::of(average),
        best_match: best_match(groups).cloned(),
    }
}
