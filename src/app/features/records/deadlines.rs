use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, patch},
    Json, Router,
};
use serde::Deserialize;
use validator::Validate;

use crate::app::{
    db::deadlines::{Deadline, DeadlineChanges},
    domain::Priority,
    error::AppError,
    features::validate_request,
    session::ApiSession,
    tenant::{with_session_context, NewDeadlineInput},
    AppState,
};

#[derive(Debug, Deserialize, Validate)]
pub struct CreateDeadlineRequest {
    #[validate(length(min = 1, max = 255))]
    pub title: String,
    /// Unix seconds.
    #[validate(range(min = 0))]
    pub due_at: i64,
    pub priority: Option<Priority>,
}

/// Partial update; omitted fields stay unchanged.
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateDeadlineRequest {
    #[validate(length(min = 1, max = 255))]
    pub title: Option<String>,
    #[validate(range(min = 0))]
    pub due_at: Option<i64>,
    pub priority: Option<Priority>,
}

/// GET /api/deadlines: Soonest first.
pub async fn list_deadlines(
    session: ApiSession,
    State(state): State<AppState>,
) -> Result<Json<Vec<Deadline>>, AppError> {
    let deadlines =
        with_session_context(&state.db, session.claims, |repo| Box::pin(repo.list_deadlines())).await?;
    Ok(Json(deadlines))
}

/// POST /api/deadlines: Recorded against the session organization.
pub async fn create_deadline(
    session: ApiSession,
    State(state): State<AppState>,
    Json(request): Json<CreateDeadlineRequest>,
) -> Result<(StatusCode, Json<Deadline>), AppError> {
    validate_request(&request)?;
    let input = NewDeadlineInput {
        title: request.title,
        due_at: request.due_at,
        priority: request.priority.unwrap_or(Priority::Medium),
    };
    let deadline =
        with_session_context(&state.db, session.claims, |repo| Box::pin(repo.create_deadline(input))).await?;
    Ok((StatusCode::CREATED, Json(deadline)))
}

/// PATCH /api/deadlines/:id
pub async fn update_deadline(
    session: ApiSession,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<UpdateDeadlineRequest>,
) -> Result<Json<Deadline>, AppError> {
    validate_request(&request)?;
    let changes = DeadlineChanges {
        title: request.title,
        due_at: request.due_at,
        priority: request.priority,
    };
    let deadline = with_session_context(&state.db, session.claims, |repo| {
        Box::pin(async move { repo.update_deadline(&id, &changes).await })
    })
    .await?;
    Ok(Json(deadline))
}

/// DELETE /api/deadlines/:id
pub async fn delete_deadline(
    session: ApiSession,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    with_session_context(&state.db, session.claims, |repo| {
        Box::pin(async move { repo.delete_deadline(&id).await })
    })
    .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/deadlines", get(list_deadlines).post(create_deadline))
        .route("/api/deadlines/:id", patch(update_deadline).delete(delete_deadline))
}
