use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::matching::orchestrator::RunError;
use crate::matching::ranker::rank;

/// Opaque handle to an uploaded document inside a session.
pub type DocumentRef = Uuid;

// ────────────────────────────────────────────────────────────────────────────
// Inputs
// ────────────────────────────────────────────────────────────────────────────

/// An uploaded file held in memory. The raw bytes never leave the process
/// except as a multipart part on a scoring request.
#[derive(Debug, Clone, Serialize)]
pub struct Document {
    pub id: DocumentRef,
    pub file_name: String,
    pub content_type: String,
    pub size: usize,
    #[serde(skip)]
    pub bytes: Bytes,
}

impl Document {
    pub fn new(file_name: impl Into<String>, content_type: impl Into<String>, bytes: Bytes) -> Self {
        Self {
            id: Uuid::new_v4(),
            file_name: file_name.into(),
            content_type: content_type.into(),
            size: bytes.len(),
            bytes,
        }
    }

    /// Wraps free job-description text as a plain-text upload.
    pub fn from_text(file_name: impl Into<String>, text: &str) -> Self {
        Self::new(
            file_name,
            "text/plain",
            Bytes::copy_from_slice(text.as_bytes()),
        )
    }
}

/// Which user role drives the batch: recruiters rank many resumes per role,
/// applicants analyze one resume against each role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Flow {
    Recruiter,
    Applicant,
}

/// One job-description slot. A slot with neither a document nor non-blank text is empty.
#[derive(Debug, Clone, Serialize)]
pub struct JobDescriptionInput {
    pub id: Uuid,
    pub document: Option<Document>,
    pub raw_text: Option<String>,
}

/// Resolved payload of a non-empty slot.
#[derive(Debug, Clone)]
pub enum JdPayload {
    Document(Document),
    Text(String),
}

impl JobDescriptionInput {
    pub fn empty() -> Self {
        Self {
            id: Uuid::new_v4(),
            document: None,
            raw_text: None,
        }
    }

    /// Document wins over text; blank text counts as absent.
    pub fn payload(&self) -> Option<JdPayload> {
        if let Some(doc) = &self.document {
            return Some(JdPayload::Document(doc.clone()));
        }
        self.raw_text
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(|t| JdPayload::Text(t.to_string()))
    }

    pub fn is_empty(&self) -> bool {
        self.payload().is_none()
    }

    /// Name shown on the result group: the document's file name, or a
    /// positional label for text slots. `position` is 0-based among all slots.
    pub fn display_name(&self, position: usize) -> String {
        match &self.document {
            Some(doc) => doc.file_name.clone(),
            None => format!("Job Description {}", position + 1),
        }
    }
}

/// Ordered resume documents for one run.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct ResumeBatch(Vec<Document>);

impl ResumeBatch {
    pub fn new(documents: Vec<Document>) -> Self {
        Self(documents)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn documents(&self) -> &[Document] {
        &self.0
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Results
// ────────────────────────────────────────────────────────────────────────────

/// Extra detail returned by the single-resume analysis flow.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisDetail {
    pub experience_match: Option<u32>,
    pub resume_experience: Option<String>,
    pub required_experience: Option<String>,
    pub suggestions: Vec<String>,
}

/// One scored (job description, resume) pair in canonical shape.
/// Scores are integers in 0..=100.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchResult {
    pub candidate_name: String,
    pub ats_score: u32,
    pub skill_match: u32,
    pub keyword_density: u32,
    pub matched_skills: Vec<String>,
    pub missing_skills: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis: Option<AnalysisDetail>,
}

impl MatchResult {
    pub fn matched_skills_display(&self) -> String {
        self.matched_skills.join(", ")
    }

    pub fn missing_skills_display(&self) -> String {
        self.missing_skills.join(", ")
    }
}

/// All results for one job-description slot, always in rank order.
#[derive(Debug, Clone, Serialize)]
pub struct ResultGroup {
    pub slot_id: Uuid,
    pub display_name: String,
    rankings: Vec<MatchResult>,
}

impl ResultGroup {
    pub fn new(slot_id: Uuid, display_name: impl Into<String>, results: &[MatchResult]) -> Self {
        Self {
            slot_id,
            display_name: display_name.into(),
            rankings: rank(results),
        }
    }

    pub fn rankings(&self) -> &[MatchResult] {
        &self.rankings
    }

    /// The group's headline score: its best-ranked result, or 0 when empty.
    pub fn top_score(&self) -> u32 {
        self.rankings.first().map(|r| r.ats_score).unwrap_or(0)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Batch run
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    #[default]
    Idle,
    Running,
    Succeeded,
    Failed,
}

/// State of one end-to-end batch execution. Only the orchestrator mutates it;
/// everyone else sees clones.
#[derive(Debug, Clone, Serialize)]
pub struct BatchRun {
    pub id: Uuid,
    pub status: RunStatus,
    pub progress: f64,
    pub total_slots: usize,
    pub resume_count: usize,
    groups: Vec<ResultGroup>,
    pub error: Option<RunError>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Default for BatchRun {
    fn default() -> Self {
        Self::idle()
    }
}

impl BatchRun {
    pub fn idle() -> Self {
        Self {
            id: Uuid::new_v4(),
            status: RunStatus::Idle,
            progress: 0.0,
            total_slots: 0,
            resume_count: 0,
            groups: Vec::new(),
            error: None,
            started_at: None,
            finished_at: None,
        }
    }

    pub fn running(id: Uuid, total_slots: usize, resume_count: usize, started_at: DateTime<Utc>) -> Self {
        Self {
            id,
            status: RunStatus::Running,
            total_slots,
            resume_count,
            started_at: Some(started_at),
            ..Self::idle()
        }
    }

    /// Groups collected so far. Always empty for a failed run.
    pub fn groups(&self) -> &[ResultGroup] {
        &self.groups
    }

    pub fn is_running(&self) -> bool {
        self.status == RunStatus::Running
    }

    pub(crate) fn push_group(&mut self, group: ResultGroup) {
        self.groups.push(group);
        if self.total_slots > 0 {
            self.progress = self.groups.len() as f64 / self.total_slots as f64;
        }
    }

    pub(crate) fn succeed(&mut self) {
        self.status = RunStatus::Succeeded;
        self.finished_at = Some(Utc::now());
    }

    pub(crate) fn fail(&mut self, error: RunError) {
        self.status = RunStatus::Failed;
        self.groups.clear();
        self.error = Some(error);
        self.finished_at = Some(Utc::now());
    }
}
