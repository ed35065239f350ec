use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info};
use uuid::Uuid;

use crate::errors::AppError;
use crate::matching::models::{BatchRun, Flow};
use crate::matching::orchestrator::{Orchestrator, RunEvent, RunListener};
use crate::session::{Session, SessionSnapshot};

/// In-memory sessions keyed by id. Nothing is persisted.
#[derive(Clone, Default)]
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<Uuid, Session>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn create(&self, flow: Flow) -> SessionSnapshot {
        let session = Session::new(flow);
        let snapshot = session.snapshot();
        self.sessions.write().await.insert(session.id, session);
        info!("Session {} created ({:?} flow)", snapshot.id, flow);
        snapshot
    }

    pub async fn remove(&self, id: Uuid) -> Result<(), AppError> {
        self.sessions
            .write()
            .await
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| not_found(id))
    }

    /// Runs `f` against a shared borrow of the session. Counts as activity,
    /// so this takes the write lock to refresh the idle clock.
    pub async fn read<T>(
        &self,
        id: Uuid,
        f: impl FnOnce(&Session) -> Result<T, AppError>,
    ) -> Result<T, AppError> {
        let mut sessions = self.sessions.write().await;
        let session = sessions.get_mut(&id).ok_or_else(|| not_found(id))?;
        session.touch();
        f(session)
    }

    /// Runs `f` against an exclusive borrow of the session.
    pub async fn update<T>(
        &self,
        id: Uuid,
        f: impl FnOnce(&mut Session) -> Result<T, AppError>,
    ) -> Result<T, AppError> {
        let mut sessions = self.sessions.write().await;
        let session = sessions.get_mut(&id).ok_or_else(|| not_found(id))?;
        session.touch();
        f(session)
    }

    /// Drops every session idle for at least `ttl` with no run in progress.
    /// Returns how many were removed.
    pub async fn evict_idle(&self, ttl: Duration) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, session| session.run().is_running() || session.idle_for() < ttl);
        let evicted = before - sessions.len();
        if evicted > 0 {
            info!("Evicted {} idle sessions ({} remain)", evicted, sessions.len());
        }
        evicted
    }

    /// Sweeps idle sessions every `every` until the runtime shuts down.
    pub async fn run_eviction(self, ttl: Duration, every: Duration) {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            self.evict_idle(ttl).await;
        }
    }

    pub async fn snapshot(&self, id: Uuid) -> Result<SessionSnapshot, AppError> {
        self.read(id, |s| Ok(s.snapshot())).await
    }

    pub async fn subscribe(&self, id: Uuid) -> Result<broadcast::Receiver<RunEvent>, AppError> {
        self.read(id, |s| Ok(s.subscribe())).await
    }

    /// Validates and freezes the session's inputs, swaps in a fresh running
    /// `BatchRun`, then drives the orchestrator on a background task.
    /// Validation errors are returned before anything is spawned.
    pub async fn start_run(
        &self,
        id: Uuid,
        orchestrator: &Orchestrator,
    ) -> Result<SessionSnapshot, AppError> {
        let (plan, snapshot) = self
            .update(id, |session| {
                if session.run().is_running() {
                    return Err(AppError::Conflict(
                        "A batch run is already in progress for this session".to_string(),
                    ));
                }
                let plan = orchestrator.plan(session.flow, session.slots(), session.resumes())?;
                session.begin_run(&plan);
                Ok((plan, session.snapshot()))
            })
            .await?;

        let listener = SessionListener {
            store: self.clone(),
            session_id: id,
        };
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move {
            orchestrator.execute(plan, &listener).await;
        });

        Ok(snapshot)
    }
}

/// Writes every orchestrator event back into the owning session.
struct SessionListener {
    store: SessionStore,
    session_id: Uuid,
}

#[async_trait]
impl RunListener for SessionListener {
    async fn on_event(&self, run: &BatchRun, event: RunEvent) {
        let mut sessions = self.store.sessions.write().await;
        if let Some(session) = sessions.get_mut(&self.session_id) {
            session.apply(run, event);
        }
    }

    /// A deleted or evicted session has nobody left to read the results.
    async fn is_abandoned(&self) -> bool {
        let gone = !self.store.sessions.read().await.contains_key(&self.session_id);
        if gone {
            debug!("Session {} is gone, stopping its run", self.session_id);
        }
        gone
    }
}

fn not_found(id: Uuid) -> AppError {
    AppError::NotFound(format!("Session {id} not found"))
}
