use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use serde::Deserialize;

use crate::app::{
    db::sharing_grants::SharingGrant,
    domain::{GranteeScope, OrganizationId, ResourceClass, SharingLevel},
    error::AppError,
    session::ApiSession,
    tenant::{with_session_context, NewGrantInput},
    AppState,
};

/// Grant issued by the session organization.
#[derive(Debug, Deserialize)]
pub struct CreateGrantRequest {
    pub grantee_scope: GranteeScope,
    pub grantee_org_id: Option<OrganizationId>,
    pub resource_class: ResourceClass,
    pub level: SharingLevel,
    /// Unix seconds; omitted means no expiry.
    pub expires_at: Option<i64>,
}

/// POST /api/sharing-grants
pub async fn create_grant(
    session: ApiSession,
    State(state): State<AppState>,
    Json(request): Json<CreateGrantRequest>,
) -> Result<(StatusCode, Json<SharingGrant>), AppError> {
    let input = NewGrantInput {
        grantee_scope: request.grantee_scope,
        grantee_org_id: request.grantee_org_id,
        resource_class: request.resource_class,
        level: request.level,
        expires_at: request.expires_at,
    };
    let grant = with_session_context(&state.db, session.claims, |repo| Box::pin(repo.create_grant(input))).await?;
    Ok((StatusCode::CREATED, Json(grant)))
}

/// POST /api/sharing-grants/:id/revoke
pub async fn revoke_grant(
    session: ApiSession,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SharingGrant>, AppError> {
    let grant = with_session_context(&state.db, session.claims, |repo| {
        Box::pin(async move { repo.revoke_grant(&id).await })
    })
    .await?;
    Ok(Json(grant))
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/sharing-grants", post(create_grant))
        .route("/api/sharing-grants/:id/revoke", post(revoke_grant))
}
