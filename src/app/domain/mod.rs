pub mod organization_id;
pub mod organization_role;
pub mod organization_status;
pub mod organization_type;
pub mod record_fields;
pub mod sharing;
pub mod slug;
pub mod tenant_id;
pub mod user_id;

pub use organization_id::OrganizationId;
pub use organization_role::OrganizationRole;
pub use organization_status::{MembershipStatus, OrganizationStatus};
pub use organization_type::OrganizationType;
pub use record_fields::{ClaimStatus, DuesStatus, Priority};
pub use sharing::{GranteeScope, ResourceClass, SharingLevel};
pub use slug::Slug;
pub use tenant_id::TenantId;
pub use user_id::UserId;
