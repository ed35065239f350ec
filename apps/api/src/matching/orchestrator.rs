//! Orchestrator — drives one batch run across job-description slots.
//!
//! Flow: plan (validate, build the ordered task list, no I/O) → execute
//! (one scoring request per task, strictly in slot order) → rank → append
//! group → notify listener.
//!
//! Only one request is ever in flight per run. Progress after task `i` of `n`
//! is exactly `(i + 1) / n`.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::matching::models::{
    BatchRun, Document, Flow, JdPayload, JobDescriptionInput, ResultGroup, ResumeBatch,
};
use crate::matching::aggregator::total_candidates;
use crate::scoring_client::{ScoringError, ScoringRequest, ScoringService};

// ────────────────────────────────────────────────────────────────────────────
// Errors, events, policy
// ────────────────────────────────────────────────────────────────────────────

/// Inputs rejected before any request is issued.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{0}")]
pub struct ValidationError(pub String);

/// Why a started run failed. Recorded on the `BatchRun`, never returned.
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum RunError {
    #[error("{0}")]
    Transport(String),

    #[error("{0}")]
    MalformedResponse(String),
}

impl RunError {
    pub fn kind(&self) -> &'static str {
        match self {
            RunError::Transport(_) => "transport",
            RunError::MalformedResponse(_) => "malformed_response",
        }
    }
}

impl From<ScoringError> for RunError {
    fn from(err: ScoringError) -> Self {
        match err {
            ScoringError::Http(_) | ScoringError::Api { .. } => RunError::Transport(err.to_string()),
            ScoringError::Parse(_) | ScoringError::MissingField(_) => {
                RunError::MalformedResponse(err.to_string())
            }
        }
    }
}

/// Incremental notifications emitted while a run executes.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunEvent {
    Started {
        run_id: Uuid,
        total_slots: usize,
    },
    Progress {
        completed: usize,
        total: usize,
        fraction: f64,
    },
    GroupCompleted {
        index: usize,
        group: ResultGroup,
    },
    Succeeded,
    Failed {
        kind: &'static str,
        message: String,
    },
}

impl RunEvent {
    pub fn failed(error: &RunError) -> Self {
        RunEvent::Failed {
            kind: error.kind(),
            message: error.to_string(),
        }
    }

    /// SSE event name.
    pub fn name(&self) -> &'static str {
        match self {
            RunEvent::Started { .. } => "started",
            RunEvent::Progress { .. } => "progress",
            RunEvent::GroupCompleted { .. } => "group_completed",
            RunEvent::Succeeded => "succeeded",
            RunEvent::Failed { .. } => "failed",
        }
    }
}

/// Receives every event together with the run snapshot it produced.
#[async_trait]
pub trait RunListener: Send + Sync {
    async fn on_event(&self, run: &BatchRun, event: RunEvent);

    /// Checked before each slot. Once true, the run stops without issuing
    /// further requests or events.
    async fn is_abandoned(&self) -> bool {
        false
    }
}

/// What to do when a slot's request fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Abort the whole run on the first failure and expose no groups.
    #[default]
    StopOnFirstError,
}

// ────────────────────────────────────────────────────────────────────────────
// Plan
// ────────────────────────────────────────────────────────────────────────────

/// One scoring request to issue, in slot order.
#[derive(Debug, Clone)]
pub struct ScoringTask {
    pub slot_id: Uuid,
    pub display_name: String,
    pub request: ScoringRequest,
}

/// A validated run, ready to execute. Inputs are frozen here.
#[derive(Debug, Clone)]
pub struct RunPlan {
    pub run_id: Uuid,
    pub flow: Flow,
    pub tasks: Vec<ScoringTask>,
    pub resume_count: usize,
    pub created_at: DateTime<Utc>,
}

impl RunPlan {
    /// The `running` snapshot every consumer starts from.
    pub fn initial_run(&self) -> BatchRun {
        BatchRun::running(self.run_id, self.tasks.len(), self.resume_count, self.created_at)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Orchestrator
// ────────────────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct Orchestrator {
    scorer: Arc<dyn ScoringService>,
    policy: FailurePolicy,
}

impl Orchestrator {
    pub fn new(scorer: Arc<dyn ScoringService>) -> Self {
        Self {
            scorer,
            policy: FailurePolicy::default(),
        }
    }

    /// Validates inputs and builds the ordered task list. Issues no requests.
    pub fn plan(
        &self,
        flow: Flow,
        slots: &[JobDescriptionInput],
        resumes: &ResumeBatch,
    ) -> Result<RunPlan, ValidationError> {
        let filled: Vec<(usize, &JobDescriptionInput, JdPayload)> = slots
            .iter()
            .enumerate()
            .filter_map(|(position, slot)| slot.payload().map(|p| (position, slot, p)))
            .collect();

        if filled.is_empty() {
            return Err(ValidationError(
                "Please provide at least one job description".to_string(),
            ));
        }
        if resumes.is_empty() {
            return Err(ValidationError(
                "Please upload at least one resume".to_string(),
            ));
        }
        if flow == Flow::Applicant && resumes.len() != 1 {
            return Err(ValidationError(format!(
                "Resume analysis takes exactly one resume, got {}",
                resumes.len()
            )));
        }

        let tasks = filled
            .into_iter()
            .map(|(position, slot, payload)| ScoringTask {
                slot_id: slot.id,
                display_name: slot.display_name(position),
                request: build_request(flow, position, payload, resumes),
            })
            .collect();

        Ok(RunPlan {
            run_id: Uuid::new_v4(),
            flow,
            tasks,
            resume_count: total_candidates(resumes),
            created_at: Utc::now(),
        })
    }

    /// Runs every task in order and returns the final run. Request failures
    /// never escape as `Err`; they are recorded on the returned run.
    pub async fn execute(&self, plan: RunPlan, listener: &dyn RunListener) -> BatchRun {
        let mut run = plan.initial_run();
        let total = plan.tasks.len();

        info!(
            "Batch run {} started: {} slots, {} resumes ({:?} flow)",
            run.id, total, plan.resume_count, plan.flow
        );
        listener
            .on_event(&run, RunEvent::Started { run_id: run.id, total_slots: total })
            .await;

        for (index, task) in plan.tasks.into_iter().enumerate() {
            if listener.is_abandoned().await {
                info!("Run {} abandoned before slot {}/{}", run.id, index + 1, total);
                return run;
            }
            debug!("Run {}: scoring slot {}/{} ({})", run.id, index + 1, total, task.display_name);

            let results = match self.scorer.score(&task.request).await {
                Ok(results) => results,
                Err(err) => {
                    let error = RunError::from(err);
                    match self.policy {
                        FailurePolicy::StopOnFirstError => {
                            warn!(
                                "Run {} aborted at slot {}/{} ({}): {}",
                                run.id, index + 1, total, task.display_name, error
                            );
                            run.fail(error.clone());
                            listener.on_event(&run, RunEvent::failed(&error)).await;
                            return run;
                        }
                    }
                }
            };

            let group = ResultGroup::new(task.slot_id, task.display_name, &results);
            info!(
                "Run {}: group '{}' completed with {} results",
                run.id,
                group.display_name,
                group.rankings().len()
            );
            run.push_group(group.clone());

            listener
                .on_event(&run, RunEvent::GroupCompleted { index, group })
                .await;
            listener
                .on_event(
                    &run,
                    RunEvent::Progress {
                        completed: index + 1,
                        total,
                        fraction: run.progress,
                    },
                )
                .await;
        }

        run.succeed();
        info!("Batch run {} succeeded with {} groups", run.id, run.groups().len());
        listener.on_event(&run, RunEvent::Succeeded).await;
        run
    }

    /// `plan` + `execute`. Validation failures return `Err` before any request.
    #[cfg(test)]
    pub async fn start(
        &self,
        flow: Flow,
        slots: &[JobDescriptionInput],
        resumes: &ResumeBatch,
        listener: &dyn RunListener,
    ) -> Result<BatchRun, ValidationError> {
        let plan = self.plan(flow, slots, resumes)?;
        Ok(self.execute(plan, listener).await)
    }
}

fn build_request(
    flow: Flow,
    position: usize,
    payload: JdPayload,
    resumes: &ResumeBatch,
) -> ScoringRequest {
    match flow {
        Flow::Recruiter => {
            let job_description = match payload {
                JdPayload::Document(doc) => doc,
                JdPayload::Text(text) => {
                    Document::from_text(format!("job_description_{}.txt", position + 1), &text)
                }
            };
            ScoringRequest::Rank {
                job_description,
                resumes: resumes.documents().to_vec(),
            }
        }
        Flow::Applicant => ScoringRequest::Analyze {
            // plan() guarantees exactly one resume
            resume: resumes.documents()[0].clone(),
            job_description: payload,
        },
    }
}
