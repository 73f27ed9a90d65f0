//! Database access layer.
//!
//! Modules follow `db::<table>::<fn>(executor, ...)`. The tenant-scoped table
//! modules (`claims`, `dues_transactions`, `deadlines`, `documents`) embed their
//! row policy in every statement and are only meaningful on a connection with
//! a bound session context.

pub mod access_log;
pub mod claims;
pub mod deadlines;
pub mod documents;
pub mod dues_transactions;
pub mod organization_members;
pub mod organizations;
pub mod pool;
pub mod sessions;
pub mod sharing_grants;
pub mod users;

pub use organizations::{NewOrganization, Organization};
pub use pool::{MaintenancePool, TenantPool};
pub use users::{NewUser, User};
