use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use serde::Deserialize;
use validator::Validate;

use crate::app::{
    db::Organization,
    domain::{OrganizationId, OrganizationType, Slug},
    error::AppError,
    features::validate_request,
    hierarchy::CreateOrganization,
    session::ApiSession,
    tenant::with_session_context,
    AppState,
};

/// Request body for creating an organization under an existing parent.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateOrganizationRequest {
    #[validate(length(min = 1, max = 64))]
    pub slug: String,
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    pub organization_type: OrganizationType,
    pub parent_id: OrganizationId,
}

/// POST /api/organizations: Create a child organization. Admins only.
pub async fn create_organization(
    session: ApiSession,
    State(state): State<AppState>,
    Json(request): Json<CreateOrganizationRequest>,
) -> Result<(StatusCode, Json<Organization>), AppError> {
    validate_request(&request)?;
    let slug = Slug::new(request.slug).map_err(|e| {
        AppError::Validation(
            e.message
                .map(|m| m.to_string())
                .unwrap_or_else(|| "Invalid slug".to_string()),
        )
    })?;

    let input = CreateOrganization {
        slug,
        name: request.name,
        organization_type: request.organization_type,
        parent_id: request.parent_id,
    };
    let org = with_session_context(&state.db, session.claims, |repo| {
        Box::pin(repo.create_organization(input))
    })
    .await?;

    tracing::info!(organization_id = %org.id, slug = %org.slug, "organization created");
    Ok((StatusCode::CREATED, Json(org)))
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/api/organizations", post(create_organization))
}
