//! Session State — what one user is currently looking at.
//!
//! A session holds the input selections, the latest `BatchRun` snapshot and
//! the transient success/error text. Only the orchestrator's listener writes
//! the run; handlers edit inputs and read snapshots.

pub mod handlers;
pub mod store;

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::time::Instant;
use uuid::Uuid;

use crate::errors::AppError;
use crate::matching::aggregator::{summarize, RunSummary};
use crate::matching::models::{BatchRun, Document, Flow, JobDescriptionInput, ResumeBatch};
use crate::matching::orchestrator::{RunEvent, RunPlan};

pub use store::SessionStore;

const EVENT_BUFFER: usize = 64;

pub struct Session {
    pub id: Uuid,
    pub flow: Flow,
    pub created_at: DateTime<Utc>,
    slots: Vec<JobDescriptionInput>,
    resumes: ResumeBatch,
    run: BatchRun,
    error: Option<String>,
    success: Option<String>,
    events: broadcast::Sender<RunEvent>,
    last_touched: Instant,
}

/// Read-only view handed to presentation. The summary is recomputed on every read.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub id: Uuid,
    pub flow: Flow,
    pub created_at: DateTime<Utc>,
    pub slots: Vec<JobDescriptionInput>,
    pub resumes: ResumeBatch,
    pub run: BatchRun,
    pub summary: RunSummary,
    pub error: Option<String>,
    pub success: Option<String>,
}

impl Session {
    /// New sessions start with one empty slot.
    pub fn new(flow: Flow) -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            id: Uuid::new_v4(),
            flow,
            created_at: Utc::now(),
            slots: vec![JobDescriptionInput::empty()],
            resumes: ResumeBatch::default(),
            run: BatchRun::idle(),
            error: None,
            success: None,
            events,
            last_touched: Instant::now(),
        }
    }

    /// Marks the session as in use. Idle eviction measures from here.
    pub fn touch(&mut self) {
        self.last_touched = Instant::now();
    }

    pub fn idle_for(&self) -> Duration {
        self.last_touched.elapsed()
    }

    pub fn slots(&self) -> &[JobDescriptionInput] {
        &self.slots
    }

    pub fn resumes(&self) -> &ResumeBatch {
        &self.resumes
    }

    pub fn run(&self) -> &BatchRun {
        &self.run
    }

    pub fn add_slot(&mut self) -> Uuid {
        let slot = JobDescriptionInput::empty();
        let id = slot.id;
        self.slots.push(slot);
        id
    }

    /// At least one slot must always remain.
    pub fn remove_slot(&mut self, slot_id: Uuid) -> Result<(), AppError> {
        let position = self.slot_position(slot_id)?;
        if self.slots.len() <= 1 {
            return Err(AppError::Validation(
                "At least one job description slot must remain".to_string(),
            ));
        }
        self.slots.remove(position);
        Ok(())
    }

    pub fn set_slot_document(&mut self, slot_id: Uuid, document: Document) -> Result<(), AppError> {
        let position = self.slot_position(slot_id)?;
        self.slots[position].document = Some(document);
        Ok(())
    }

    pub fn set_slot_text(&mut self, slot_id: Uuid, text: String) -> Result<(), AppError> {
        let position = self.slot_position(slot_id)?;
        self.slots[position].raw_text = Some(text);
        Ok(())
    }

    pub fn set_resumes(&mut self, documents: Vec<Document>) -> Result<(), AppError> {
        if self.flow == Flow::Applicant && documents.len() > 1 {
            return Err(AppError::Validation(
                "Resume analysis takes exactly one resume".to_string(),
            ));
        }
        self.resumes = ResumeBatch::new(documents);
        Ok(())
    }

    /// Replaces the previous run wholesale and clears both messages.
    pub fn begin_run(&mut self, plan: &RunPlan) {
        self.run = plan.initial_run();
        self.error = None;
        self.success = None;
    }

    /// Stores the orchestrator's latest snapshot and fans the event out to
    /// subscribers. Events from a run other than the current one are dropped.
    pub fn apply(&mut self, run: &BatchRun, event: RunEvent) {
        if run.id != self.run.id {
            return;
        }
        self.run = run.clone();
        self.touch();

        match &event {
            RunEvent::Succeeded => self.success = Some(success_message(self.flow).to_string()),
            RunEvent::Failed { message, .. } => self.error = Some(message.clone()),
            _ => {}
        }

        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RunEvent> {
        self.events.subscribe()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            id: self.id,
            flow: self.flow,
            created_at: self.created_at,
            slots: self.slots.clone(),
            resumes: self.resumes.clone(),
            run: self.run.clone(),
            summary: summarize(self.run.groups(), self.run.resume_count),
            error: self.error.clone(),
            success: self.success.clone(),
        }
    }

    fn slot_position(&self, slot_id: Uuid) -> Result<usize, AppError> {
        self.slots
            .iter()
            .position(|s| s.id == slot_id)
            .ok_or_else(|| AppError::NotFound(format!("Slot {slot_id} not found")))
    }
}

fn success_message(flow: Flow) -> &'static str {
    match flow {
        Flow::Recruiter => "Ranking completed successfully!",
        Flow::Applicant => "Analysis completed successfully!",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matching::models::{MatchResult, ResultGroup, RunStatus};
    use crate::matching::orchestrator::RunError;

    fn running_run(session: &mut Session) -> BatchRun {
        let run = BatchRun::running(Uuid::new_v4(), 1, 1, Utc::now());
        session.run = run.clone();
        run
    }

    #[test]
    fn test_new_session_has_one_empty_slot() {
        let session = Session::new(Flow::Recruiter);
        assert_eq!(session.slots().len(), 1);
        assert!(session.slots()[0].is_empty());
        assert_eq!(session.run().status, RunStatus::Idle);
    }

    #[test]
    fn test_last_slot_cannot_be_removed() {
        let mut session = Session::new(Flow::Recruiter);
        let first = session.slots()[0].id;
        let second = session.add_slot();

        session.remove_slot(first).unwrap();
        assert!(matches!(session.remove_slot(second), Err(AppError::Validation(_))));
        assert_eq!(session.slots().len(), 1);
    }

    #[test]
    fn test_unknown_slot_is_not_found() {
        let mut session = Session::new(Flow::Applicant);
        assert!(matches!(
            session.set_slot_text(Uuid::new_v4(), "x".to_string()),
            Err(AppError::NotFound(_))
        ));
    }

    #[test]
    fn test_applicant_rejects_multiple_resumes() {
        let mut session = Session::new(Flow::Applicant);
        let docs = vec![Document::from_text("a", "a"), Document::from_text("b", "b")];
        assert!(matches!(session.set_resumes(docs), Err(AppError::Validation(_))));
    }

    #[test]
    fn test_apply_sets_success_message_and_broadcasts() {
        let mut session = Session::new(Flow::Recruiter);
        let mut rx = session.subscribe();
        let mut run = running_run(&mut session);
        run.succeed();

        session.apply(&run, RunEvent::Succeeded);

        assert_eq!(session.snapshot().success.as_deref(), Some("Ranking completed successfully!"));
        assert!(matches!(rx.try_recv(), Ok(RunEvent::Succeeded)));
    }

    #[test]
    fn test_apply_failure_sets_error_and_clears_groups() {
        let mut session = Session::new(Flow::Applicant);
        let mut run = running_run(&mut session);
        let result = MatchResult {
            candidate_name: "me".to_string(),
            ats_score: 70,
            skill_match: 70,
            keyword_density: 70,
            matched_skills: vec![],
            missing_skills: vec![],
            analysis: None,
        };
        run.push_group(ResultGroup::new(Uuid::new_v4(), "JD", &[result]));
        session.apply(&run, RunEvent::Progress { completed: 1, total: 1, fraction: 1.0 });
        assert_eq!(session.snapshot().summary.top_score, 70);

        let error = RunError::Transport("connection refused".to_string());
        run.fail(error.clone());
        session.apply(&run, RunEvent::failed(&error));

        let snapshot = session.snapshot();
        assert_eq!(snapshot.error.as_deref(), Some("connection refused"));
        assert!(snapshot.run.groups().is_empty());
        assert_eq!(snapshot.summary.top_score, 0);
    }

    #[test]
    fn test_events_from_stale_run_are_ignored() {
        let mut session = Session::new(Flow::Recruiter);
        running_run(&mut session);
        let mut stale = BatchRun::running(Uuid::new_v4(), 1, 1, Utc::now());
        stale.succeed();

        session.apply(&stale, RunEvent::Succeeded);
        assert_eq!(session.run().status, RunStatus::Running);
        assert!(session.snapshot().success.is_none());
    }
}
