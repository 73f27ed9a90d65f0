use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

/// Lifecycle of an organization. Organizations are archived, never deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum OrganizationStatus {
    Active,
    Archived,
}

/// Status of a membership row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MembershipStatus {
    Active,
    Inactive,
    OnLeave,
}
