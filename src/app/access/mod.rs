//! Access validators for reads that deliberately cross organization
//! boundaries, and the error type shared by the hierarchy and session layers.

pub mod error;
pub mod sharing;
pub mod validators;

pub use error::AccessError;
pub use sharing::{max_grantable_level, validate_sharing_level};
pub use validators::{get_accessible_organizations, validate_hierarchy_access};
