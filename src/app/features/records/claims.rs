use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use validator::Validate;

use crate::app::{
    db::claims::{Claim, ClaimChanges},
    domain::{ClaimStatus, OrganizationId, Priority},
    error::AppError,
    features::validate_request,
    session::ApiSession,
    tenant::{with_session_context, NewClaimInput},
    AppState,
};

#[derive(Debug, Deserialize, Validate)]
pub struct CreateClaimRequest {
    /// Defaults to the session organization.
    pub organization_id: Option<OrganizationId>,
    #[validate(length(min = 1, max = 255))]
    pub title: String,
    #[serde(default)]
    #[validate(length(max = 5000))]
    pub description: String,
    pub priority: Option<Priority>,
}

/// Partial update; omitted fields stay unchanged.
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateClaimRequest {
    #[validate(length(min = 1, max = 255))]
    pub title: Option<String>,
    #[validate(length(max = 5000))]
    pub description: Option<String>,
    pub status: Option<ClaimStatus>,
    pub priority: Option<Priority>,
}

/// GET /api/claims: Claims of the session organization, plus its
/// descendants' claims for officers and admins.
pub async fn list_claims(
    session: ApiSession,
    State(state): State<AppState>,
) -> Result<Json<Vec<Claim>>, AppError> {
    let claims = with_session_context(&state.db, session.claims, |repo| Box::pin(repo.list_claims())).await?;
    Ok(Json(claims))
}

/// POST /api/claims
pub async fn create_claim(
    session: ApiSession,
    State(state): State<AppState>,
    Json(request): Json<CreateClaimRequest>,
) -> Result<(StatusCode, Json<Claim>), AppError> {
    validate_request(&request)?;
    let input = NewClaimInput {
        organization_id: request.organization_id,
        title: request.title,
        description: request.description,
        priority: request.priority.unwrap_or(Priority::Medium),
    };
    let claim = with_session_context(&state.db, session.claims, |repo| Box::pin(repo.create_claim(input))).await?;
    Ok((StatusCode::CREATED, Json(claim)))
}

/// GET /api/claims/:id
pub async fn get_claim(
    session: ApiSession,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Claim>, AppError> {
    let claim = with_session_context(&state.db, session.claims, |repo| {
        Box::pin(async move { repo.find_claim(&id).await })
    })
    .await?;
    Ok(Json(claim))
}

/// PATCH /api/claims/:id
pub async fn update_claim(
    session: ApiSession,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<UpdateClaimRequest>,
) -> Result<Json<Claim>, AppError> {
    validate_request(&request)?;
    let changes = ClaimChanges {
        title: request.title,
        description: request.description,
        status: request.status,
        priority: request.priority,
    };
    let claim = with_session_context(&state.db, session.claims, |repo| {
        Box::pin(async move { repo.update_claim(&id, &changes).await })
    })
    .await?;
    Ok(Json(claim))
}

/// DELETE /api/claims/:id: Admins only.
pub async fn delete_claim(
    session: ApiSession,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    with_session_context(&state.db, session.claims, |repo| {
        Box::pin(async move { repo.delete_claim(&id).await })
    })
    .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/claims", get(list_claims).post(create_claim))
        .route(
            "/api/claims/:id",
            get(get_claim).patch(update_claim).delete(delete_claim),
        )
}
