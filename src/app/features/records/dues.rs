use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, patch},
    Json, Router,
};
use serde::Deserialize;
use validator::Validate;

use crate::app::{
    db::dues_transactions::DuesTransaction,
    domain::{DuesStatus, UserId},
    error::AppError,
    features::validate_request,
    session::ApiSession,
    tenant::{with_session_context, NewDuesInput},
    AppState,
};

#[derive(Debug, Deserialize, Validate)]
pub struct RecordDuesRequest {
    pub member_user_id: UserId,
    #[validate(range(min = 0))]
    pub amount_cents: i64,
}

#[derive(Debug, Deserialize)]
pub struct UpdateDuesRequest {
    pub status: DuesStatus,
}

/// GET /api/dues: Officers and admins only; members get an empty list.
pub async fn list_dues(
    session: ApiSession,
    State(state): State<AppState>,
) -> Result<Json<Vec<DuesTransaction>>, AppError> {
    let dues = with_session_context(&state.db, session.claims, |repo| Box::pin(repo.list_dues())).await?;
    Ok(Json(dues))
}

/// POST /api/dues
pub async fn record_dues(
    session: ApiSession,
    State(state): State<AppState>,
    Json(request): Json<RecordDuesRequest>,
) -> Result<(StatusCode, Json<DuesTransaction>), AppError> {
    validate_request(&request)?;
    let input = NewDuesInput {
        member_user_id: request.member_user_id,
        amount_cents: request.amount_cents,
    };
    let transaction =
        with_session_context(&state.db, session.claims, |repo| Box::pin(repo.record_dues(input))).await?;
    Ok((StatusCode::CREATED, Json(transaction)))
}

/// PATCH /api/dues/:id
pub async fn update_dues_status(
    session: ApiSession,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<UpdateDuesRequest>,
) -> Result<Json<DuesTransaction>, AppError> {
    let transaction = with_session_context(&state.db, session.claims, |repo| {
        Box::pin(async move { repo.set_dues_status(&id, request.status).await })
    })
    .await?;
    Ok(Json(transaction))
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/dues", get(list_dues).post(record_dues))
        .route("/api/dues/:id", patch(update_dues_status))
}
