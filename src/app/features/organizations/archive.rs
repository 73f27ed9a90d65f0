use axum::{
    extract::{Path, State},
    routing::post,
    Json, Router,
};

use crate::app::{
    db::Organization,
    error::AppError,
    features::organization_id_param,
    session::ApiSession,
    tenant::with_session_context,
    AppState,
};

/// POST /api/organizations/:id/archive: Archive a leaf organization.
pub async fn archive_organization(
    session: ApiSession,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Organization>, AppError> {
    let id = organization_id_param(&id)?;
    let org = with_session_context(&state.db, session.claims, |repo| {
        Box::pin(async move { repo.archive_organization(&id).await })
    })
    .await?;
    Ok(Json(org))
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/api/organizations/:id/archive", post(archive_organization))
}
