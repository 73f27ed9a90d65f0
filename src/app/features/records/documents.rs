use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, patch},
    Json, Router,
};
use serde::Deserialize;
use validator::Validate;

use crate::app::{
    db::documents::{Document, DocumentChanges},
    error::AppError,
    features::validate_request,
    session::ApiSession,
    tenant::{with_session_context, NewDocumentInput},
    AppState,
};

#[derive(Debug, Deserialize, Validate)]
pub struct CreateDocumentRequest {
    #[validate(length(min = 1, max = 255))]
    pub title: String,
    #[validate(length(min = 1, max = 1024))]
    pub storage_key: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateDocumentRequest {
    #[validate(length(min = 1, max = 255))]
    pub title: Option<String>,
    #[validate(length(min = 1, max = 1024))]
    pub storage_key: Option<String>,
}

/// GET /api/documents: Documents of the session organization only.
pub async fn list_documents(
    session: ApiSession,
    State(state): State<AppState>,
) -> Result<Json<Vec<Document>>, AppError> {
    let documents =
        with_session_context(&state.db, session.claims, |repo| Box::pin(repo.list_documents())).await?;
    Ok(Json(documents))
}

/// POST /api/documents
pub async fn create_document(
    session: ApiSession,
    State(state): State<AppState>,
    Json(request): Json<CreateDocumentRequest>,
) -> Result<(StatusCode, Json<Document>), AppError> {
    validate_request(&request)?;
    let input = NewDocumentInput {
        title: request.title,
        storage_key: request.storage_key,
    };
    let document =
        with_session_context(&state.db, session.claims, |repo| Box::pin(repo.create_document(input))).await?;
    Ok((StatusCode::CREATED, Json(document)))
}

/// PATCH /api/documents/:id
pub async fn update_document(
    session: ApiSession,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<UpdateDocumentRequest>,
) -> Result<Json<Document>, AppError> {
    validate_request(&request)?;
    let changes = DocumentChanges {
        title: request.title,
        storage_key: request.storage_key,
    };
    let document = with_session_context(&state.db, session.claims, |repo| {
        Box::pin(async move { repo.update_document(&id, &changes).await })
    })
    .await?;
    Ok(Json(document))
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/documents", get(list_documents).post(create_document))
        .route("/api/documents/:id", patch(update_document))
}
