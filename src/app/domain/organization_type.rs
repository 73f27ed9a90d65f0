use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

/// Tier of an organization in the labour hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum OrganizationType {
    Congress,
    Federation,
    Union,
    Local,
    Chapter,
    SectorCouncil,
}

impl OrganizationType {
    /// Organization types that may sit directly below this one.
    pub fn allowed_children(self) -> &'static [OrganizationType] {
        use OrganizationType::*;
        match self {
            Congress => &[Federation, Union, SectorCouncil],
            Federation => &[Union, SectorCouncil],
            Union => &[Local, SectorCouncil],
            Local => &[Chapter],
            Chapter | SectorCouncil => &[],
        }
    }

    pub fn can_parent(self, child: OrganizationType) -> bool {
        self.allowed_children().contains(&child)
    }

    /// Federations and congresses anchor "same federation" sharing scopes.
    pub fn is_federation_anchor(self) -> bool {
        matches!(self, OrganizationType::Federation | OrganizationType::Congress)
    }
}
