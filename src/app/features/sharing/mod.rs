//! Cross-organization sharing: grants, checks and grant-backed access.

pub mod access;
pub mod grants;

use std::str::FromStr;

use axum::Router;

use crate::app::{error::AppError, AppState};

pub fn routes() -> Router<AppState> {
    Router::new().merge(grants::routes()).merge(access::routes())
}

/// Parse a snake_case enum from a path or query value.
fn parse_param<T: FromStr>(raw: &str, name: &str) -> Result<T, AppError> {
    raw.parse()
        .map_err(|_| AppError::Validation(format!("Invalid {name}")))
}
