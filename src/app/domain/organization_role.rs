use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

/// Role a user holds inside one organization. Declaration order is rank order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum OrganizationRole {
    Member,
    Steward,
    Officer,
    Admin,
}

impl OrganizationRole {
    /// Numeric rank stored in the session context and compared by row policies.
    pub fn rank(self) -> i64 {
        match self {
            OrganizationRole::Member => 1,
            OrganizationRole::Steward => 2,
            OrganizationRole::Officer => 3,
            OrganizationRole::Admin => 4,
        }
    }

    /// Officers and admins act on behalf of the whole subtree below their organization.
    pub fn reaches_descendants(self) -> bool {
        self >= OrganizationRole::Officer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_matches_rank() {
        let roles = [
            OrganizationRole::Member,
            OrganizationRole::Steward,
            OrganizationRole::Officer,
            OrganizationRole::Admin,
        ];
        for pair in roles.windows(2) {
            assert!(pair[0] < pair[1]);
            assert!(pair[0].rank() < pair[1].rank());
        }
    }

    #[test]
    fn parses_lowercase() {
        assert_eq!("steward".parse::<OrganizationRole>().unwrap(), OrganizationRole::Steward);
        assert!("owner".parse::<OrganizationRole>().is_err());
    }

    #[test]
    fn only_officers_and_admins_reach_descendants() {
        assert!(!OrganizationRole::Member.reaches_descendants());
        assert!(!OrganizationRole::Steward.reaches_descendants());
        assert!(OrganizationRole::Officer.reaches_descendants());
        assert!(OrganizationRole::Admin.reaches_descendants());
    }
}
