use axum::{extract::State, routing::get, Json, Router};

use crate::app::{
    db::claims::ClaimRollup,
    error::AppError,
    session::ApiSession,
    tenant::with_session_context,
    AppState,
};

/// GET /api/analytics/claims/rollup: Claim counts per organization and
/// status across the session organization's subtree.
pub async fn claims_rollup(
    session: ApiSession,
    State(state): State<AppState>,
) -> Result<Json<Vec<ClaimRollup>>, AppError> {
    let rollup = with_session_context(&state.db, session.claims, |repo| Box::pin(repo.claims_rollup())).await?;
    Ok(Json(rollup))
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/api/analytics/claims/rollup", get(claims_rollup))
}
