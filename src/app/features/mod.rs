pub mod analytics;
pub mod me;
pub mod organizations;
pub mod records;
pub mod sharing;

use validator::Validate;

use crate::app::domain::OrganizationId;
use crate::app::error::AppError;

/// Organization id from a path segment. A malformed id names nothing the
/// caller can see, so it is a 404 like any other invisible organization.
pub(crate) fn organization_id_param(raw: &str) -> Result<OrganizationId, AppError> {
    OrganizationId::from_string(raw).map_err(|_| AppError::NotFound)
}

/// Run validator rules on a request body.
pub(crate) fn validate_request(request: &impl Validate) -> Result<(), AppError> {
    request
        .validate()
        .map_err(|_| AppError::Validation("Invalid input".to_string()))
}
