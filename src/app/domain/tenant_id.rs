use super::OrganizationId;

/// Tenant ID. A tenant is the isolation boundary of a session: it names the
/// organization whose subtree bounds everything the session may reach. For
/// most deployments this is the root of the hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct TenantId(OrganizationId);

impl TenantId {
    pub fn from_string(s: &str) -> Result<Self, ulid::DecodeError> {
        Ok(Self(OrganizationId::from_string(s)?))
    }

    pub fn as_str(&self) -> String {
        self.0.as_str()
    }

    /// The organization that roots this tenant.
    pub fn organization_id(&self) -> &OrganizationId {
        &self.0
    }
}

impl From<OrganizationId> for TenantId {
    fn from(id: OrganizationId) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for TenantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
