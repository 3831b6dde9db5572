use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, PathRejection},
    },
    http::StatusCode,
    routing::{get, post},
};
use core_types::{
    CreateNoteRequest, NoteDraft, NoteError, NoteId, NoteRecord, NoteTranslation,
    UpdateNoteRequest,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::error;

use crate::state::AppState;

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

type ApiError = (StatusCode, Json<ErrorBody>);
type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

#[derive(Debug, Serialize)]
struct CountResponse {
    count: u64,
}

#[derive(Debug, Deserialize)]
struct SearchParams {
    q: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GenerateRequest {
    input_text: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct TranslateRequest {
    target_language: Option<String>,
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/notes", get(list_notes).post(create_note))
        .route("/api/notes/count", get(count_notes))
        .route("/api/notes/search", get(search_notes))
        .route("/api/notes/generate", post(generate_note))
        .route(
            "/api/notes/{id}",
            get(get_note).put(update_note).delete(delete_note),
        )
        .route("/api/notes/{id}/translate", post(translate_note))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn map_note_error(err: NoteError) -> ApiError {
    let status = match &err {
        NoteError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        NoteError::NotFound(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if err.is_server_fault() {
        error!("request failed: {err}");
    }
    error_response(status, err.to_string())
}

fn error_response(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorBody {
            error: message.into(),
        }),
    )
}

fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> ApiResult<T> {
    body.map(|Json(value)| value)
        .map_err(|rejection| error_response(StatusCode::BAD_REQUEST, rejection.body_text()))
}

fn note_id(path: Result<Path<NoteId>, PathRejection>) -> ApiResult<NoteId> {
    path.map(|Path(id)| id)
        .map_err(|rejection| error_response(StatusCode::BAD_REQUEST, rejection.body_text()))
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".into(),
        version: env!("CARGO_PKG_VERSION").into(),
    })
}

async fn list_notes(State(state): State<Arc<AppState>>) -> ApiResult<Json<Vec<NoteRecord>>> {
    let notes = state.notes.list_all().await.map_err(map_note_error)?;
    Ok(Json(notes))
}

async fn count_notes(State(state): State<Arc<AppState>>) -> ApiResult<Json<CountResponse>> {
    let count = state.notes.count().await.map_err(map_note_error)?;
    Ok(Json(CountResponse { count }))
}

async fn create_note(
    State(state): State<Arc<AppState>>,
    body: Result<Json<CreateNoteRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<NoteRecord>)> {
    let request = json_body(body)?;
    let note = state
        .notes
        .create_from_fields(request)
        .await
        .map_err(map_note_error)?;
    Ok((StatusCode::CREATED, Json(note)))
}

async fn get_note(
    State(state): State<Arc<AppState>>,
    path: Result<Path<NoteId>, PathRejection>,
) -> ApiResult<Json<NoteRecord>> {
    let id = note_id(path)?;
    let note = state.notes.get(id).await.map_err(map_note_error)?;
    Ok(Json(note))
}

async fn update_note(
    State(state): State<Arc<AppState>>,
    path: Result<Path<NoteId>, PathRejection>,
    body: Result<Json<UpdateNoteRequest>, JsonRejection>,
) -> ApiResult<Json<NoteRecord>> {
    let id = note_id(path)?;
    let request = json_body(body)?;
    let note = state
        .notes
        .update_partial(id, request)
        .await
        .map_err(map_note_error)?;
    Ok(Json(note))
}

async fn delete_note(
    State(state): State<Arc<AppState>>,
    path: Result<Path<NoteId>, PathRejection>,
) -> ApiResult<StatusCode> {
    let id = note_id(path)?;
    state.notes.remove(id).await.map_err(map_note_error)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn search_notes(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SearchParams>,
) -> ApiResult<Json<Vec<NoteRecord>>> {
    let query = params.q.unwrap_or_default();
    let notes = state.notes.search(&query).await.map_err(map_note_error)?;
    Ok(Json(notes))
}

async fn generate_note(
    State(state): State<Arc<AppState>>,
    body: Result<Json<GenerateRequest>, JsonRejection>,
) -> ApiResult<Json<NoteDraft>> {
    let input_text = json_body(body)?
        .input_text
        .ok_or_else(|| error_response(StatusCode::BAD_REQUEST, "input_text is required"))?;
    let draft = state
        .notes
        .create_from_generation(&input_text)
        .await
        .map_err(map_note_error)?;
    Ok(Json(draft))
}

async fn translate_note(
    State(state): State<Arc<AppState>>,
    path: Result<Path<NoteId>, PathRejection>,
    body: Result<Json<TranslateRequest>, JsonRejection>,
) -> ApiResult<Json<NoteTranslation>> {
    let id = note_id(path)?;
    // A missing body is treated like an empty one so that an unknown id
    // still reports 404 before the language check.
    let request = body.map(|Json(value)| value).unwrap_or_default();
    let target_language = request.target_language.unwrap_or_default();
    let translation = state
        .notes
        .translate(id, &target_language)
        .await
        .map_err(map_note_error)?;
    Ok(Json(translation))
}
