//! Wire shapes returned by the scoring service and their normalisation into
//! the canonical `MatchResult`. Nothing downstream of this module ever sees
//! the raw shapes.

use serde::Deserialize;

use crate::matching::models::{AnalysisDetail, MatchResult};
use crate::scoring_client::ScoringError;

/// Skills arrive either as a JSON array or as one comma-joined string.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum SkillsField {
    List(Vec<String>),
    Joined(String),
}

impl SkillsField {
    /// Trims and drops blanks. Joined text is kept verbatim as a single entry,
    /// since the service sometimes sends a free-text summary there. The
    /// service's literal "None" means no skills.
    pub fn into_skills(self) -> Vec<String> {
        let items = match self {
            SkillsField::List(items) => items,
            SkillsField::Joined(text) => vec![text],
        };
        items
            .into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty() && s != "None")
            .collect()
    }
}

fn skills(field: Option<SkillsField>) -> Vec<String> {
    field.map(SkillsField::into_skills).unwrap_or_default()
}

/// Rounds to the nearest integer and clamps to 0..=100.
fn score(value: Option<f64>, field: &'static str) -> Result<u32, ScoringError> {
    let value = value.ok_or(ScoringError::MissingField(field))?;
    Ok(value.round().clamp(0.0, 100.0) as u32)
}

// ────────────────────────────────────────────────────────────────────────────
// Rank response
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct RankRow {
    pub candidate_name: Option<String>,
    pub ats_score: Option<f64>,
    pub skill_match: Option<f64>,
    pub keyword_density: Option<f64>,
    pub matched_skills: Option<SkillsField>,
    pub missing_skills: Option<SkillsField>,
}

impl RankRow {
    /// `position` is the 0-based index in the response, used for unnamed rows.
    pub fn into_match_result(self, position: usize) -> Result<MatchResult, ScoringError> {
        let candidate_name = self
            .candidate_name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| format!("Candidate {}", position + 1));

        Ok(MatchResult {
            candidate_name,
            ats_score: score(self.ats_score, "ats_score")?,
            skill_match: score(self.skill_match, "skill_match")?,
            keyword_density: score(self.keyword_density, "keyword_density")?,
            matched_skills: skills(self.matched_skills),
            missing_skills: skills(self.missing_skills),
            analysis: None,
        })
    }
}

pub fn normalize_rank_rows(rows: Vec<RankRow>) -> Result<Vec<MatchResult>, ScoringError> {
    rows.into_iter()
        .enumerate()
        .map(|(i, row)| row.into_match_result(i))
        .collect()
}

// ────────────────────────────────────────────────────────────────────────────
// Analyze response
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct MatchDetails {
    #[serde(rename = "Skill Match")]
    pub skill_match: Option<f64>,
    #[serde(rename = "Keyword Density")]
    pub keyword_density: Option<f64>,
    #[serde(rename = "Experience Match")]
    pub experience_match: Option<f64>,
    #[serde(rename = "Resume Experience")]
    pub resume_experience: Option<String>,
    #[serde(rename = "Required Experience")]
    pub required_experience: Option<String>,
    #[serde(rename = "Matched Skills")]
    pub matched_skills: Option<SkillsField>,
    #[serde(rename = "Missing Skills")]
    pub missing_skills: Option<SkillsField>,
}

#[derive(Debug, Deserialize)]
pub struct AnalyzeResponse {
    pub ats_score: Option<f64>,
    pub match_details: Option<MatchDetails>,
    #[serde(default)]
    pub suggestions: Vec<String>,
}

impl AnalyzeResponse {
    pub fn into_match_result(self, candidate_name: &str) -> Result<MatchResult, ScoringError> {
        let ats_score = score(self.ats_score, "ats_score")?;
        let details = self
            .match_details
            .ok_or(ScoringError::MissingField("match_details"))?;

        Ok(MatchResult {
            candidate_name: candidate_name.to_string(),
            ats_score,
            skill_match: score(details.skill_match, "match_details.Skill Match")?,
            keyword_density: score(details.keyword_density, "match_details.Keyword Density")?,
            matched_skills: skills(details.matched_skills),
            missing_skills: skills(details.missing_skills),
            analysis: Some(AnalysisDetail {
                experience_match: details
                    .experience_match
                    .map(|v| v.round().clamp(0.0, 100.0) as u32),
                resume_experience: details.resume_experience,
                required_experience: details.required_experience,
                suggestions: self.suggestions,
            }),
        })
    }
}
