use crate::config::Config;
use crate::matching::orchestrator::Orchestrator;
use crate::session::SessionStore;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    /// Drives batch runs. Holds the scoring backend as `Arc<dyn ScoringService>`.
    pub orchestrator: Orchestrator,
    /// In-memory sessions; dropped on restart.
    pub sessions: SessionStore,
}
