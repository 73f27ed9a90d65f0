use axum::{
    extract::{Path, State},
    Json,
};
use serde::Deserialize;
use validator::Validate;

use crate::app::{
    db::Organization,
    error::AppError,
    features::{organization_id_param, validate_request},
    hierarchy::UpdateOrganization,
    session::ApiSession,
    tenant::with_session_context,
    AppState,
};

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateOrganizationRequest {
    #[validate(length(min = 1, max = 255))]
    pub name: String,
}

/// PATCH /api/organizations/:id: Rename an organization. Admins only; slug,
/// type and parent cannot change here.
pub async fn update_organization(
    session: ApiSession,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<UpdateOrganizationRequest>,
) -> Result<Json<Organization>, AppError> {
    let id = organization_id_param(&id)?;
    validate_request(&request)?;
    let input = UpdateOrganization { name: request.name };
    let org = with_session_context(&state.db, session.claims, |repo| {
        Box::pin(async move { repo.update_organization(&id, input).await })
    })
    .await?;
    Ok(Json(org))
}
