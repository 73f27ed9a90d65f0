use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;

use crate::app::{
    db::Organization,
    error::AppError,
    features::organization_id_param,
    hierarchy::OrganizationTree,
    session::ApiSession,
    tenant::with_session_context,
    AppState,
};

use super::update::update_organization;

/// `?include_inactive=true` adds archived organizations inside the session's
/// own branch.
#[derive(Debug, Default, Deserialize)]
pub struct HierarchyQuery {
    #[serde(default)]
    pub include_inactive: bool,
}

/// GET /api/organizations/tree: Tree under the session tenant, cut to what the session sees.
pub async fn tenant_tree(
    session: ApiSession,
    State(state): State<AppState>,
) -> Result<Json<OrganizationTree>, AppError> {
    let tree = with_session_context(&state.db, session.claims, |repo| Box::pin(repo.tree(None))).await?;
    Ok(Json(tree))
}

/// GET /api/organizations/slug/:slug
pub async fn get_by_slug(
    session: ApiSession,
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Json<Organization>, AppError> {
    let org = with_session_context(&state.db, session.claims, |repo| {
        Box::pin(async move { repo.organization_by_slug(&slug).await })
    })
    .await?;
    Ok(Json(org))
}

/// GET /api/organizations/:id
pub async fn get_organization(
    session: ApiSession,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Organization>, AppError> {
    let id = organization_id_param(&id)?;
    let org = with_session_context(&state.db, session.claims, |repo| {
        Box::pin(async move { repo.organization(&id).await })
    })
    .await?;
    Ok(Json(org))
}

/// GET /api/organizations/:id/ancestors: Root first.
pub async fn get_ancestors(
    session: ApiSession,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<HierarchyQuery>,
) -> Result<Json<Vec<Organization>>, AppError> {
    let id = organization_id_param(&id)?;
    let orgs = with_session_context(&state.db, session.claims, |repo| {
        Box::pin(async move { repo.ancestors(&id, query.include_inactive).await })
    })
    .await?;
    Ok(Json(orgs))
}

/// GET /api/organizations/:id/descendants
pub async fn get_descendants(
    session: ApiSession,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<HierarchyQuery>,
) -> Result<Json<Vec<Organization>>, AppError> {
    let id = organization_id_param(&id)?;
    let orgs = with_session_context(&state.db, session.claims, |repo| {
        Box::pin(async move { repo.descendants(&id, query.include_inactive).await })
    })
    .await?;
    Ok(Json(orgs))
}

/// GET /api/organizations/:id/children
pub async fn get_children(
    session: ApiSession,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<HierarchyQuery>,
) -> Result<Json<Vec<Organization>>, AppError> {
    let id = organization_id_param(&id)?;
    let orgs = with_session_context(&state.db, session.claims, |repo| {
        Box::pin(async move { repo.children(&id, query.include_inactive).await })
    })
    .await?;
    Ok(Json(orgs))
}

/// GET /api/organizations/:id/path: Root first, ending with the organization itself.
pub async fn get_path(
    session: ApiSession,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<HierarchyQuery>,
) -> Result<Json<Vec<Organization>>, AppError> {
    let id = organization_id_param(&id)?;
    let orgs = with_session_context(&state.db, session.claims, |repo| {
        Box::pin(async move { repo.path(&id, query.include_inactive).await })
    })
    .await?;
    Ok(Json(orgs))
}

/// GET /api/organizations/:id/tree
pub async fn get_subtree(
    session: ApiSession,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<OrganizationTree>, AppError> {
    let id = organization_id_param(&id)?;
    let tree = with_session_context(&state.db, session.claims, |repo| {
        Box::pin(async move { repo.tree(Some(&id)).await })
    })
    .await?;
    Ok(Json(tree))
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/organizations/tree", get(tenant_tree))
        .route("/api/organizations/slug/:slug", get(get_by_slug))
        .route(
            "/api/organizations/:id",
            get(get_organization).patch(update_organization),
        )
        .route("/api/organizations/:id/ancestors", get(get_ancestors))
        .route("/api/organizations/:id/descendants", get(get_descendants))
        .route("/api/organizations/:id/children", get(get_children))
        .route("/api/organizations/:id/path", get(get_path))
        .route("/api/organizations/:id/tree", get(get_subtree))
}
