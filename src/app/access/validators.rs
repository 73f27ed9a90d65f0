use std::collections::BTreeSet;

use sqlx::SqliteConnection;

use crate::app::access::{error::stored_org_id, sharing, AccessError};
use crate::app::db::{organization_members, organizations, Organization};
use crate::app::domain::{OrganizationId, UserId};
use crate::app::hierarchy;

/// True when `target_id` is `requestor_id`, one of its ancestors or one of its
/// descendants. Unknown ids are never related.
pub async fn validate_hierarchy_access(
    conn: &mut SqliteConnection,
    requestor_id: &OrganizationId,
    target_id: &OrganizationId,
) -> Result<bool, AccessError> {
    if requestor_id == target_id {
        return Ok(organizations::find_by_id(&mut *conn, requestor_id).await?.is_some());
    }
    let Some(requestor) = organizations::find_by_id(&mut *conn, requestor_id).await? else {
        return Ok(false);
    };
    let Some(target) = organizations::find_by_id(&mut *conn, target_id).await? else {
        return Ok(false);
    };
    Ok(requestor.is_ancestor_of(&target) || target.is_ancestor_of(&requestor))
}

/// Every organization `user_id` may query against: the organizations they
/// are an active member of, the ancestors of those, the descendants of those
/// where the member is an officer or admin, and the owners of active sharing
/// grants covering any of their organizations.
pub async fn get_accessible_organizations(
    conn: &mut SqliteConnection,
    user_id: &UserId,
) -> Result<BTreeSet<OrganizationId>, AccessError> {
    let memberships = organization_members::list_active_for_user(&mut *conn, user_id).await?;
    let mut accessible = BTreeSet::new();
    let mut member_orgs: Vec<Organization> = Vec::with_capacity(memberships.len());

    for membership in memberships {
        let organization_id = stored_org_id(&membership.organization_id)?;
        let Some(org) = organizations::find_by_id(&mut *conn, &organization_id).await? else {
            continue;
        };
        if !org.is_active() {
            continue;
        }

        for ancestor in hierarchy::ancestors_of(conn, &org).await? {
            accessible.insert(stored_org_id(&ancestor.id)?);
        }
        if membership.role.reaches_descendants() {
            for descendant in organizations::find_descendants(&mut *conn, &org.path_key).await? {
                accessible.insert(stored_org_id(&descendant.id)?);
            }
        }
        accessible.insert(organization_id);
        member_orgs.push(org);
    }

    accessible.extend(sharing::granting_owners(conn, &member_orgs).await?);
    tracing::debug!(user_id = %user_id, count = accessible.len(), "accessible organizations resolved");
    Ok(accessible)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::db::{pool::test_pool, sharing_grants, users, NewUser};
    use crate::app::domain::{GranteeScope, OrganizationRole, ResourceClass, SharingLevel};
    use crate::app::hierarchy::tests::scenario;

    fn id(org: &Organization) -> OrganizationId {
        OrganizationId::from_string(&org.id).unwrap()
    }

    async fn user(conn: &mut SqliteConnection, email: &str) -> UserId {
        let user_id = UserId::new();
        users::insert(
            &mut *conn,
            &NewUser {
                id: user_id.clone(),
                email: email.to_string(),
                display_name: email.to_string(),
            },
        )
        .await
        .unwrap();
        user_id
    }

    #[tokio::test]
    async fn hierarchy_access_is_symmetric_along_a_branch() {
        let pool = test_pool().await;
        let mut conn = pool.pool().acquire().await.unwrap();
        let conn: &mut SqliteConnection = &mut conn;
        let [clc, cupe, local, opseu] = scenario(conn).await;

        assert!(validate_hierarchy_access(conn, &id(&local), &id(&local)).await.unwrap());
        assert!(validate_hierarchy_access(conn, &id(&local), &id(&clc)).await.unwrap());
        assert!(validate_hierarchy_access(conn, &id(&clc), &id(&local)).await.unwrap());
        assert!(validate_hierarchy_access(conn, &id(&cupe), &id(&local)).await.unwrap());
        assert!(!validate_hierarchy_access(conn, &id(&local), &id(&opseu)).await.unwrap());
        assert!(!validate_hierarchy_access(conn, &id(&local), &OrganizationId::new()).await.unwrap());
        let missing = OrganizationId::new();
        assert!(!validate_hierarchy_access(conn, &missing, &missing).await.unwrap());
    }

    #[tokio::test]
    async fn reach_depends_on_role() {
        let pool = test_pool().await;
        let mut conn = pool.pool().acquire().await.unwrap();
        let conn: &mut SqliteConnection = &mut conn;
        let [clc, cupe, local, opseu] = scenario(conn).await;

        let steward = user(conn, "steward@cupe.example").await;
        organization_members::add_member(&mut *conn, &id(&cupe), &steward, OrganizationRole::Steward)
            .await
            .unwrap();
        let officer = user(conn, "officer@cupe.example").await;
        organization_members::add_member(&mut *conn, &id(&cupe), &officer, OrganizationRole::Officer)
            .await
            .unwrap();

        let steward_reach = get_accessible_organizations(conn, &steward).await.unwrap();
        assert_eq!(steward_reach, BTreeSet::from([id(&clc), id(&cupe)]));

        let officer_reach = get_accessible_organizations(conn, &officer).await.unwrap();
        assert_eq!(officer_reach, BTreeSet::from([id(&clc), id(&cupe), id(&local)]));
        assert!(!officer_reach.contains(&id(&opseu)));
    }

    #[tokio::test]
    async fn covering_grants_add_their_owner() {
        let pool = test_pool().await;
        let mut conn = pool.pool().acquire().await.unwrap();
        let conn: &mut SqliteConnection = &mut conn;
        let [_, cupe, local, opseu] = scenario(conn).await;

        let member = user(conn, "member@opseu.example").await;
        organization_members::add_member(&mut *conn, &id(&opseu), &member, OrganizationRole::Member)
            .await
            .unwrap();
        let granter = user(conn, "admin@local.example").await;

        sharing_grants::insert(
            &mut *conn,
            &sharing_grants::NewSharingGrant {
                id: "grant-opseu".to_string(),
                owner_org_id: id(&local),
                grantee_scope: GranteeScope::Organization,
                grantee_org_id: Some(id(&opseu)),
                resource_class: ResourceClass::ClauseLibrary,
                level: SharingLevel::Read,
                granted_by: granter,
                expires_at: None,
            },
        )
        .await
        .unwrap();

        let reach = get_accessible_organizations(conn, &member).await.unwrap();
        assert!(reach.contains(&id(&local)));
        assert!(!reach.contains(&id(&cupe)));
    }
}
