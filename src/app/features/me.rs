use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use axum_extra::extract::cookie::CookieJar;
use serde::Serialize;

use crate::app::{
    access::AccessError,
    db,
    domain::OrganizationId,
    error::AppError,
    session::{clear_session_cookie, ApiSession},
    tenant::with_session_context,
    AppState,
};

#[derive(Debug, Serialize)]
pub struct AccessibleOrganizationsResponse {
    pub organizations: Vec<OrganizationId>,
}

/// GET /api/me/organizations: Organizations the session user may query
/// against: memberships, their hierarchy, and owners sharing with them.
pub async fn accessible_organizations(
    session: ApiSession,
    State(state): State<AppState>,
) -> Result<Json<AccessibleOrganizationsResponse>, AppError> {
    let organizations = with_session_context(&state.db, session.claims, |repo| {
        Box::pin(async move {
            let set = repo.accessible_organizations().await?;
            Ok::<_, AccessError>(set.iter().cloned().collect::<Vec<_>>())
        })
    })
    .await?;
    Ok(Json(AccessibleOrganizationsResponse { organizations }))
}

/// POST /api/session/logout: Delete the session and clear the cookie.
pub async fn logout(
    session: ApiSession,
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<(StatusCode, CookieJar), AppError> {
    db::sessions::delete(state.db.inner(), &session.session_id).await?;
    Ok((StatusCode::NO_CONTENT, jar.add(clear_session_cookie())))
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/me/organizations", get(accessible_organizations))
        .route("/api/session/logout", post(logout))
}
