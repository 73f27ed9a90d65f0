use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use sqlx::Error as SqlxError;

use crate::app::access::AccessError;

/// Application error type for unified error handling across the app.
#[derive(Debug)]
pub enum AppError {
    /// Validation errors (400 Bad Request) - invalid input data
    Validation(String),

    /// No usable session (401 Unauthorized)
    Unauthorized,

    /// Session present but no organization/tenant claim (400 Bad Request)
    MissingTenantContext,

    /// Target missing or not visible (404 Not Found). The two are never distinguished.
    NotFound,

    /// Visible but not permitted (403 Forbidden)
    Forbidden,

    /// Request conflicts with the current tree (409 Conflict)
    Conflict(String),

    /// Database errors (500 Internal Server Error)
    Database(SqlxError),

    /// Generic internal errors (500 Internal Server Error)
    Internal,
}

impl From<SqlxError> for AppError {
    fn from(err: SqlxError) -> Self {
        AppError::Database(err)
    }
}

impl From<AccessError> for AppError {
    fn from(err: AccessError) -> Self {
        match err {
            AccessError::AuthRequired => AppError::Unauthorized,
            AccessError::MissingTenantContext => AppError::MissingTenantContext,
            AccessError::NotFound => AppError::NotFound,
            AccessError::AccessDenied => AppError::Forbidden,
            AccessError::CycleDetected => {
                AppError::Conflict("Reparenting would create a cycle".to_string())
            }
            AccessError::InvalidOperation(msg) => AppError::Conflict(msg),
            AccessError::InvalidHierarchy(msg) | AccessError::Validation(msg) => AppError::Validation(msg),
            AccessError::CorruptHierarchy(detail) => {
                tracing::error!(%detail, "corrupt hierarchy");
                AppError::Internal
            }
            AccessError::Database(err) => AppError::Database(err),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized".to_string()),
            AppError::MissingTenantContext => (
                StatusCode::BAD_REQUEST,
                "Organization and tenant required".to_string(),
            ),
            AppError::NotFound => (StatusCode::NOT_FOUND, "Not found".to_string()),
            AppError::Forbidden => (StatusCode::FORBIDDEN, "Forbidden".to_string()),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            AppError::Database(err) => {
                tracing::error!(%err, "database error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            AppError::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            ),
        };

        let body = Json(json!({
            "error": message
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_of(err: AccessError) -> StatusCode {
        AppError::from(err).into_response().status()
    }

    #[test]
    fn access_errors_map_to_statuses() {
        assert_eq!(status_of(AccessError::AuthRequired), StatusCode::UNAUTHORIZED);
        assert_eq!(status_of(AccessError::MissingTenantContext), StatusCode::BAD_REQUEST);
        assert_eq!(status_of(AccessError::NotFound), StatusCode::NOT_FOUND);
        assert_eq!(status_of(AccessError::AccessDenied), StatusCode::FORBIDDEN);
        assert_eq!(status_of(AccessError::CycleDetected), StatusCode::CONFLICT);
        assert_eq!(
            status_of(AccessError::InvalidOperation("root".to_string())),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(AccessError::InvalidHierarchy("type".to_string())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(AccessError::CorruptHierarchy("loop".to_string())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
