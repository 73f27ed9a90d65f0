//! Tenant-scoped business records. Row policies decide what each session sees.

pub mod claims;
pub mod deadlines;
pub mod documents;
pub mod dues;

use axum::Router;

use crate::app::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .merge(claims::routes())
        .merge(deadlines::routes())
        .merge(dues::routes())
        .merge(documents::routes())
}
