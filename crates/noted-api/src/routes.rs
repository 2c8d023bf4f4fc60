use std::sync::Arc;

use axum::extract::{Path, Request, State};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, patch};
use axum::{Extension, Json, Router};
use chrono::{DateTime, Utc};
use noted_core::Note;
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::auth::{extract_bearer_token, AuthenticatedUser, TokenAuthenticator};
use crate::config::AppConfig;
use crate::error::AppError;
use crate::store::{CreateNoteRequest, NoteStore, UpdateNoteRequest};

const API_VERSION: &str = "1.0.0";

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    authenticator: TokenAuthenticator,
    notes: Arc<NoteStore>,
}

impl AppState {
    pub fn from_config(config: Arc<AppConfig>) -> Self {
        Self {
            authenticator: TokenAuthenticator::new(config.tokens.clone()),
            notes: Arc::new(NoteStore::new()),
            config,
        }
    }
}

pub fn app_router(state: AppState) -> Router {
    let note_routes = Router::new()
        .route("/api/notes", get(list_notes).post(create_note))
        .route(
            "/api/notes/{id}",
            get(get_note).put(update_note).delete(delete_note),
        )
        .route("/api/notes/{id}/archive", patch(archive_note))
        .route("/api/notes/{id}/unarchive", patch(unarchive_note))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .route("/api/health", get(health))
        .merge(note_routes)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_headers(Any)
                .allow_methods(Any),
        )
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    timestamp: DateTime<Utc>,
    version: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        timestamp: Utc::now(),
        version: API_VERSION,
    })
}

async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = extract_bearer_token(request.headers())?;
    let user = state.authenticator.authenticate(token)?;
    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}

#[derive(Debug, Serialize)]
struct NotesResponse {
    success: bool,
    notes: Vec<Note>,
    count: usize,
}

#[derive(Debug, Serialize)]
struct NoteResponse {
    success: bool,
    note: Note,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<&'static str>,
}

impl NoteResponse {
    const fn new(note: Note) -> Self {
        Self {
            success: true,
            note,
            message: None,
        }
    }

    const fn with_message(note: Note, message: &'static str) -> Self {
        Self {
            success: true,
            note,
            message: Some(message),
        }
    }
}

async fn list_notes(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
) -> Json<NotesResponse> {
    let notes = state.notes.list(&user.user_id).await;
    Json(NotesResponse {
        success: true,
        count: notes.len(),
        notes,
    })
}

async fn get_note(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(id): Path<String>,
) -> Result<Json<NoteResponse>, AppError> {
    let note = state
        .notes
        .get(&user.user_id, &id)
        .await
        .ok_or(AppError::NotFound)?;
    Ok(Json(NoteResponse::new(note)))
}

async fn create_note(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Json(request): Json<CreateNoteRequest>,
) -> Result<Json<NoteResponse>, AppError> {
    if request.is_empty() {
        return Err(AppError::bad_request(
            "Note must have either a title or content",
        ));
    }

    let note = state.notes.create(&user.user_id, request).await;
    tracing::info!(note_id = %note.id, user = %user.user_id, "Note created");
    Ok(Json(NoteResponse::with_message(
        note,
        "Note created successfully",
    )))
}

async fn update_note(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(id): Path<String>,
    Json(request): Json<UpdateNoteRequest>,
) -> Result<Json<NoteResponse>, AppError> {
    let note = state
        .notes
        .update(&user.user_id, &id, request)
        .await
        .ok_or(AppError::NotFound)?;
    tracing::info!(note_id = %note.id, user = %user.user_id, "Note updated");
    Ok(Json(NoteResponse::with_message(
        note,
        "Note updated successfully",
    )))
}

async fn delete_note(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(id): Path<String>,
) -> Result<Json<NoteResponse>, AppError> {
    let note = state
        .notes
        .delete(&user.user_id, &id)
        .await
        .ok_or(AppError::NotFound)?;
    tracing::info!(note_id = %note.id, user = %user.user_id, "Note deleted");
    Ok(Json(NoteResponse::with_message(
        note,
        "Note deleted successfully",
    )))
}

async fn archive_note(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(id): Path<String>,
) -> Result<Json<NoteResponse>, AppError> {
    set_archived(&state, &user, &id, true).await
}

async fn unarchive_note(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(id): Path<String>,
) -> Result<Json<NoteResponse>, AppError> {
    set_archived(&state, &user, &id, false).await
}

async fn set_archived(
    state: &AppState,
    user: &AuthenticatedUser,
    id: &str,
    archived: bool,
) -> Result<Json<NoteResponse>, AppError> {
    let note = state
        .notes
        .set_archived(&user.user_id, id, archived)
        .await
        .ok_or(AppError::NotFound)?;
    tracing::info!(note_id = %note.id, user = %user.user_id, archived, "Note archive state changed");
    let message = if archived {
        "Note archived successfully"
    } else {
        "Note unarchived successfully"
    };
    Ok(Json(NoteResponse::with_message(note, message)))
}
