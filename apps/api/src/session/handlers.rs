//! Axum route handlers for the Session API.

use std::convert::Infallible;

use axum::{
    extract::{Multipart, Path, State},
    http::{header, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse,
    },
    Json,
};
use serde::Deserialize;
use tokio_stream::{wrappers::BroadcastStream, Stream, StreamExt};
use uuid::Uuid;

use crate::errors::AppError;
use crate::matching::exporter::{export_file_name, to_delimited_text};
use crate::matching::models::{Document, Flow, RunStatus};
use crate::session::SessionSnapshot;
use crate::state::AppState;

// ────────────────────────────────────────────────────────────────────────────
// Request types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    pub flow: Flow,
}

#[derive(Debug, Deserialize)]
pub struct SlotTextRequest {
    pub text: String,
}

// ────────────────────────────────────────────────────────────────────────────
// Session lifecycle
// ────────────────────────────────────────────────────────────────────────────

/// POST /api/v1/sessions
pub async fn handle_create_session(
    State(state): State<AppState>,
    Json(req): Json<CreateSessionRequest>,
) -> (StatusCode, Json<SessionSnapshot>) {
    let snapshot = state.sessions.create(req.flow).await;
    (StatusCode::CREATED, Json(snapshot))
}

/// GET /api/v1/sessions/:id
pub async fn handle_get_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionSnapshot>, AppError> {
    Ok(Json(state.sessions.snapshot(id).await?))
}

/// DELETE /api/v1/sessions/:id
pub async fn handle_delete_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state.sessions.remove(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ────────────────────────────────────────────────────────────────────────────
// Inputs
// ────────────────────────────────────────────────────────────────────────────

/// POST /api/v1/sessions/:id/slots
pub async fn handle_add_slot(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<(StatusCode, Json<SessionSnapshot>), AppError> {
    let snapshot = state
        .sessions
        .update(id, |s| {
            s.add_slot();
            Ok(s.snapshot())
        })
        .await?;
    Ok((StatusCode::CREATED, Json(snapshot)))
}

/// DELETE /api/v1/sessions/:id/slots/:slot_id
pub async fn handle_remove_slot(
    State(state): State<AppState>,
    Path((id, slot_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<SessionSnapshot>, AppError> {
    let snapshot = state
        .sessions
        .update(id, |s| {
            s.remove_slot(slot_id)?;
            Ok(s.snapshot())
        })
        .await?;
    Ok(Json(snapshot))
}

/// PUT /api/v1/sessions/:id/slots/:slot_id/document
///
/// Multipart body with a single `file` part.
pub async fn handle_set_slot_document(
    State(state): State<AppState>,
    Path((id, slot_id)): Path<(Uuid, Uuid)>,
    multipart: Multipart,
) -> Result<Json<SessionSnapshot>, AppError> {
    let document = read_documents(multipart, "file")
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| AppError::Validation("Expected a 'file' part".to_string()))?;

    let snapshot = state
        .sessions
        .update(id, |s| {
            s.set_slot_document(slot_id, document)?;
            Ok(s.snapshot())
        })
        .await?;
    Ok(Json(snapshot))
}

/// PUT /api/v1/sessions/:id/slots/:slot_id/text
pub async fn handle_set_slot_text(
    State(state): State<AppState>,
    Path((id, slot_id)): Path<(Uuid, Uuid)>,
    Json(req): Json<SlotTextRequest>,
) -> Result<Json<SessionSnapshot>, AppError> {
    let snapshot = state
        .sessions
        .update(id, |s| {
            s.set_slot_text(slot_id, req.text)?;
            Ok(s.snapshot())
        })
        .await?;
    Ok(Json(snapshot))
}

/// PUT /api/v1/sessions/:id/resumes
///
/// Multipart body with one `resumes` part per file. Replaces the whole batch.
pub async fn handle_set_resumes(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    multipart: Multipart,
) -> Result<Json<SessionSnapshot>, AppError> {
    let documents = read_documents(multipart, "resumes").await?;
    if documents.is_empty() {
        return Err(AppError::Validation(
            "Please upload at least one resume".to_string(),
        ));
    }

    let snapshot = state
        .sessions
        .update(id, |s| {
            s.set_resumes(documents)?;
            Ok(s.snapshot())
        })
        .await?;
    Ok(Json(snapshot))
}

// ────────────────────────────────────────────────────────────────────────────
// Runs
// ────────────────────────────────────────────────────────────────────────────

/// POST /api/v1/sessions/:id/run
///
/// Validates synchronously, then runs in the background. Poll the session or
/// subscribe to `/events` for progress.
pub async fn handle_start_run(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<(StatusCode, Json<SessionSnapshot>), AppError> {
    let snapshot = state.sessions.start_run(id, &state.orchestrator).await?;
    Ok((StatusCode::ACCEPTED, Json(snapshot)))
}

/// GET /api/v1/sessions/:id/events
///
/// Server-Sent Events stream of run events. Lagged subscribers skip what they missed.
pub async fn handle_events(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let rx = state.sessions.subscribe(id).await?;

    let stream = BroadcastStream::new(rx).filter_map(|message| {
        let event = message.ok()?;
        Event::default()
            .event(event.name())
            .json_data(&event)
            .ok()
            .map(Ok::<_, Infallible>)
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

/// GET /api/v1/sessions/:id/groups/:index/export
///
/// CSV download for one group of a succeeded run.
pub async fn handle_export(
    State(state): State<AppState>,
    Path((id, index)): Path<(Uuid, usize)>,
) -> Result<impl IntoResponse, AppError> {
    let (file_name, body) = state
        .sessions
        .read(id, |s| {
            let run = s.run();
            if run.status != RunStatus::Succeeded {
                return Err(AppError::NotFound(
                    "No completed results to export".to_string(),
                ));
            }
            let group = run
                .groups()
                .get(index)
                .ok_or_else(|| AppError::NotFound(format!("Result group {index} not found")))?;
            Ok((export_file_name(&group.display_name), to_delimited_text(group)))
        })
        .await?;

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{file_name}\""),
            ),
        ],
        body,
    ))
}

// ────────────────────────────────────────────────────────────────────────────
// Upload helpers
// ────────────────────────────────────────────────────────────────────────────

/// Collects every part named `field_name` as a document, in upload order.
async fn read_documents(mut multipart: Multipart, field_name: &str) -> Result<Vec<Document>, AppError> {
    let mut documents = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Invalid multipart body: {e}")))?
    {
        if field.name() != Some(field_name) {
            continue;
        }

        let file_name = field
            .file_name()
            .map(str::to_string)
            .unwrap_or_else(|| format!("{field_name}_{}", documents.len() + 1));
        let content_type = field
            .content_type()
            .map(str::to_string)
            .unwrap_or_else(|| guess_content_type(&file_name).to_string());
        let bytes = field
            .bytes()
            .await
            .map_err(|e| AppError::Validation(format!("Failed to read '{file_name}': {e}")))?;

        if bytes.is_empty() {
            return Err(AppError::Validation(format!("'{file_name}' is empty")));
        }
        documents.push(Document::new(file_name, content_type, bytes));
    }

    Ok(documents)
}

/// The scoring service dispatches text extraction on content type; browsers
/// occasionally omit it.
fn guess_content_type(file_name: &str) -> &'static str {
    let extension = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "pdf" => "application/pdf",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "txt" => "text/plain",
        _ => "application/octet-stream",
    }
}
