//! Sharing grants: who may create them, and which requestors they cover.

use std::collections::HashMap;

use sqlx::SqliteConnection;

use crate::app::access::{error::stored_org_id, AccessError};
use crate::app::db::{organizations, sharing_grants, sharing_grants::SharingGrant, Organization};
use crate::app::domain::{GranteeScope, OrganizationId, OrganizationRole, ResourceClass, SharingLevel};
use crate::app::hierarchy;

/// Highest level a member with `role` may grant on behalf of their organization.
pub fn max_grantable_level(role: OrganizationRole) -> Option<SharingLevel> {
    match role {
        OrganizationRole::Member | OrganizationRole::Steward => None,
        OrganizationRole::Officer => Some(SharingLevel::Read),
        OrganizationRole::Admin => Some(SharingLevel::Manage),
    }
}

/// The owner's nearest federation-or-congress ancestor-or-self, or its root
/// when the chain has neither.
pub async fn federation_anchor(
    conn: &mut SqliteConnection,
    owner: &Organization,
) -> Result<Organization, AccessError> {
    let mut chain = hierarchy::ancestors_of(conn, owner).await?;
    chain.push(owner.clone());
    let anchor = chain
        .iter()
        .rposition(|org| org.organization_type.is_federation_anchor())
        .unwrap_or(0);
    Ok(chain.swap_remove(anchor))
}

/// Whether `grant`, owned by `owner`, reaches `requestor`. `anchor` is the
/// owner's federation anchor.
pub fn grant_covers(
    grant: &SharingGrant,
    owner: &Organization,
    anchor: &Organization,
    requestor: &Organization,
) -> bool {
    if !requestor.is_active() {
        return false;
    }
    match grant.grantee_scope {
        GranteeScope::Organization => grant.grantee_org_id.as_deref() == Some(requestor.id.as_str()),
        GranteeScope::Descendants => owner.is_ancestor_of(requestor),
        GranteeScope::Federation => anchor.id == requestor.id || anchor.is_ancestor_of(requestor),
        GranteeScope::Congress => owner.root_slug() == requestor.root_slug(),
    }
}

/// The highest active grant from `owner_id` covering `requestor_id` for
/// `resource_class` at or above `level`.
pub async fn find_covering_grant(
    conn: &mut SqliteConnection,
    requestor_id: &OrganizationId,
    owner_id: &OrganizationId,
    resource_class: ResourceClass,
    level: SharingLevel,
) -> Result<Option<SharingGrant>, AccessError> {
    let Some(requestor) = organizations::find_by_id(&mut *conn, requestor_id).await? else {
        return Ok(None);
    };
    let Some(owner) = organizations::find_by_id(&mut *conn, owner_id).await? else {
        return Ok(None);
    };
    if !owner.is_active() {
        return Ok(None);
    }

    let mut grants: Vec<SharingGrant> =
        sharing_grants::list_active_for_owner(&mut *conn, owner_id, resource_class)
            .await?
            .into_iter()
            .filter(|grant| grant.level >= level)
            .collect();
    if grants.is_empty() {
        return Ok(None);
    }
    grants.sort_by(|a, b| b.level.cmp(&a.level));

    let anchor = federation_anchor(conn, &owner).await?;
    Ok(grants
        .into_iter()
        .find(|grant| grant_covers(grant, &owner, &anchor, &requestor)))
}

/// True when an active grant from `owner_id` covers `requestor_id` for
/// `resource_class` at or above `level`. Hierarchy position alone never
/// satisfies this check.
pub async fn validate_sharing_level(
    conn: &mut SqliteConnection,
    requestor_id: &OrganizationId,
    owner_id: &OrganizationId,
    resource_class: ResourceClass,
    level: SharingLevel,
) -> Result<bool, AccessError> {
    Ok(find_covering_grant(conn, requestor_id, owner_id, resource_class, level)
        .await?
        .is_some())
}

/// Owners of active grants (any class) that cover at least one of `requestors`.
pub async fn granting_owners(
    conn: &mut SqliteConnection,
    requestors: &[Organization],
) -> Result<Vec<OrganizationId>, AccessError> {
    let grants = sharing_grants::list_active(&mut *conn).await?;
    let mut owners: HashMap<String, Option<(Organization, Organization)>> = HashMap::new();
    let mut covered = Vec::new();

    for grant in grants {
        if !owners.contains_key(&grant.owner_org_id) {
            let owner_id = stored_org_id(&grant.owner_org_id)?;
            let resolved = match organizations::find_by_id(&mut *conn, &owner_id).await? {
                Some(owner) if owner.is_active() => {
                    let anchor = federation_anchor(conn, &owner).await?;
                    Some((owner, anchor))
                }
                _ => None,
            };
            owners.insert(grant.owner_org_id.clone(), resolved);
        }
        let Some(Some((owner, anchor))) = owners.get(&grant.owner_org_id) else {
            continue;
        };
        if requestors
            .iter()
            .any(|requestor| grant_covers(&grant, owner, anchor, requestor))
        {
            covered.push(stored_org_id(&owner.id)?);
        }
    }
    Ok(covered)
}
