use axum::{
    extract::{Path, State},
    routing::post,
    Json, Router,
};
use serde::Deserialize;

use crate::app::{
    db::Organization,
    domain::OrganizationId,
    error::AppError,
    features::organization_id_param,
    session::ApiSession,
    tenant::with_session_context,
    AppState,
};

#[derive(Debug, Deserialize)]
pub struct ReparentRequest {
    pub parent_id: OrganizationId,
}

/// POST /api/organizations/:id/parent: Move an organization, with its whole
/// subtree, under a new parent. 409 when the move would create a cycle.
pub async fn reparent_organization(
    session: ApiSession,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<ReparentRequest>,
) -> Result<Json<Organization>, AppError> {
    let id = organization_id_param(&id)?;
    let org = with_session_context(&state.db, session.claims, |repo| {
        Box::pin(async move { repo.reparent_organization(&id, &request.parent_id).await })
    })
    .await?;
    Ok(Json(org))
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/api/organizations/:id/parent", post(reparent_organization))
}
