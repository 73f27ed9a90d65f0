//! Organization hierarchy API.

pub mod archive;
pub mod create;
pub mod reparent;
pub mod update;
pub mod views;

use axum::Router;

use crate::app::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .merge(views::routes())
        .merge(create::routes())
        .merge(reparent::routes())
        .merge(archive::routes())
}
