use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::app::{
    domain::{ResourceClass, SharingLevel},
    error::AppError,
    features::organization_id_param,
    session::ApiSession,
    tenant::{with_session_context, SharedAccess},
    AppState,
};

use super::parse_param;

#[derive(Debug, Deserialize)]
pub struct SharingCheckQuery {
    pub owner: String,
    pub resource: String,
    pub level: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SharingCheckResponse {
    pub allowed: bool,
}

#[derive(Debug, Deserialize)]
pub struct LevelQuery {
    pub level: Option<String>,
}

fn level_param(raw: Option<&str>) -> Result<SharingLevel, AppError> {
    raw.map(|level| parse_param(level, "level"))
        .transpose()
        .map(|level| level.unwrap_or(SharingLevel::Read))
}

/// GET /api/access/sharing?owner=&resource=&level=: Whether a sharing grant
/// from `owner` covers the session organization.
pub async fn check_sharing(
    session: ApiSession,
    State(state): State<AppState>,
    Query(query): Query<SharingCheckQuery>,
) -> Result<Json<SharingCheckResponse>, AppError> {
    let owner_id = organization_id_param(&query.owner)?;
    let resource_class: ResourceClass = parse_param(&query.resource, "resource")?;
    let level = level_param(query.level.as_deref())?;

    let allowed = with_session_context(&state.db, session.claims, |repo| {
        Box::pin(async move { repo.check_sharing(&owner_id, resource_class, level).await })
    })
    .await?;
    Ok(Json(SharingCheckResponse { allowed }))
}

/// GET /api/shared-resources/:owner_id/:resource_class/:resource_id?level=
///
/// Resolves how the session may reach another organization's resource.
/// Grant-backed access is recorded in the access log.
pub async fn access_shared_resource(
    session: ApiSession,
    State(state): State<AppState>,
    Path((owner_id, resource_class, resource_id)): Path<(String, String, String)>,
    Query(query): Query<LevelQuery>,
) -> Result<Json<SharedAccess>, AppError> {
    let owner_id = organization_id_param(&owner_id)?;
    let resource_class: ResourceClass = parse_param(&resource_class, "resource class")?;
    let level = level_param(query.level.as_deref())?;

    let access = with_session_context(&state.db, session.claims, |repo| {
        Box::pin(async move {
            repo.access_shared_resource(&owner_id, resource_class, &resource_id, level)
                .await
        })
    })
    .await?;
    Ok(Json(access))
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/access/sharing", get(check_sharing))
        .route(
            "/api/shared-resources/:owner_id/:resource_class/:resource_id",
            get(access_shared_resource),
        )
}
