/// Errors raised by the hierarchy, session-context and access layers.
///
/// `NotFound` covers both "does not exist" and "exists but is not visible to
/// this session"; callers must not be able to tell the two apart.
#[derive(Debug, thiserror::Error)]
pub enum AccessError {
    #[error("authentication required")]
    AuthRequired,

    #[error("no organization or tenant claim for this request")]
    MissingTenantContext,

    #[error("not found")]
    NotFound,

    #[error("access denied")]
    AccessDenied,

    #[error("reparenting would create a cycle")]
    CycleDetected,

    #[error("corrupt hierarchy: {0}")]
    CorruptHierarchy(String),

    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    #[error("invalid hierarchy: {0}")]
    InvalidHierarchy(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl From<validator::ValidationError> for AccessError {
    fn from(err: validator::ValidationError) -> Self {
        let message = err
            .message
            .map(|m| m.to_string())
            .unwrap_or_else(|| err.code.to_string());
        AccessError::Validation(message)
    }
}

/// Parse an organization id coming out of storage. A malformed stored id is
/// a structural problem, not a caller mistake.
pub(crate) fn stored_org_id(raw: &str) -> Result<crate::app::domain::OrganizationId, AccessError> {
    crate::app::domain::OrganizationId::from_string(raw)
        .map_err(|_| AccessError::CorruptHierarchy(format!("malformed organization id {raw:?}")))
}
