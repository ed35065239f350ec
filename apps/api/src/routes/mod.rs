pub mod health;

use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, post, put},
    Router,
};

use crate::session::handlers;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    let body_limit = state.config.max_upload_bytes();

    Router::new()
        .route("/health", get(health::health_handler))
        // Sessions
        .route("/api/v1/sessions", post(handlers::handle_create_session))
        .route(
            "/api/v1/sessions/:id",
            get(handlers::handle_get_session).delete(handlers::handle_delete_session),
        )
        // Inputs
        .route("/api/v1/sessions/:id/slots", post(handlers::handle_add_slot))
        .route(
            "/api/v1/sessions/:id/slots/:slot_id",
            delete(handlers::handle_remove_slot),
        )
        .route(
            "/api/v1/sessions/:id/slots/:slot_id/document",
            put(handlers::handle_set_slot_document),
        )
        .route(
            "/api/v1/sessions/:id/slots/:slot_id/text",
            put(handlers::handle_set_slot_text),
        )
        .route(
            "/api/v1/sessions/:id/resumes",
            put(handlers::handle_set_resumes),
        )
        // Runs
        .route("/api/v1/sessions/:id/run", post(handlers::handle_start_run))
        .route("/api/v1/sessions/:id/events", get(handlers::handle_events))
        .route(
            "/api/v1/sessions/:id/groups/:index/export",
            get(handlers::handle_export),
        )
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}
