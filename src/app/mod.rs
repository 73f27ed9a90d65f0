use axum::Router;

use crate::app::config::Config;
use crate::app::db::TenantPool;

/// Shared state available to all handlers via Axum's state extractor.
///
/// Handlers only ever see the tenant pool; the maintenance pool stays with
/// `main` and the seed tool.
#[derive(Clone)]
pub struct AppState {
    pub db: TenantPool,
    pub config: Config,
}

/// JSON API routes. Merged with the trace layer in `create_router`.
pub fn routes() -> Router<AppState> {
    Router::new()
        .merge(features::organizations::routes())
        .merge(features::records::routes())
        .merge(features::analytics::routes())
        .merge(features::sharing::routes())
        .merge(features::me::routes())
}

pub mod access;
pub mod config;
pub mod db;
pub mod domain;
pub mod error;
pub mod features;
pub mod hierarchy;
pub mod rls;
pub mod session;
pub mod tenant;
