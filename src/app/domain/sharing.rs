use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

/// Access level carried by a sharing grant. Declaration order is rank order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SharingLevel {
    Read,
    Contribute,
    Manage,
}

/// Classes of resources that can be shared across organizations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ResourceClass {
    ClauseLibrary,
    Precedents,
    Analytics,
}

/// Who a sharing grant is addressed to, relative to the owning organization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum GranteeScope {
    /// A single named organization.
    Organization,
    /// Every organization below the owner.
    Descendants,
    /// Every organization under the owner's nearest federation (or congress).
    Federation,
    /// Every organization under the owner's root.
    Congress,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels_are_ordered() {
        assert!(SharingLevel::Read < SharingLevel::Contribute);
        assert!(SharingLevel::Contribute < SharingLevel::Manage);
    }

    #[test]
    fn resource_class_uses_snake_case() {
        assert_eq!(ResourceClass::ClauseLibrary.to_string(), "clause_library");
        assert_eq!("precedents".parse::<ResourceClass>().unwrap(), ResourceClass::Precedents);
    }
}
