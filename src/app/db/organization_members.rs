use sqlx::{FromRow, SqliteExecutor};
use time::OffsetDateTime;
use ulid::Ulid;

use crate::app::domain::{MembershipStatus, OrganizationId, OrganizationRole, UserId};

/// Database row for organization_members table.
#[derive(Debug, Clone, FromRow)]
pub struct OrganizationMember {
    pub id: String,
    pub organization_id: String,
    pub user_id: String,
    pub role: String,
    pub status: String,
    pub created_at: i64,
    pub updated_at: i64,
    pub deleted_at: Option<i64>,
}

/// An active membership with its parsed role.
#[derive(Debug, Clone)]
pub struct ActiveMembership {
    pub organization_id: String,
    pub role: OrganizationRole,
}

/// Add a user to an organization. Fails on the live-membership unique index
/// if the pair already has a membership that is not soft-deleted.
pub async fn add_member<'e, E>(
    executor: E,
    organization_id: &OrganizationId,
    user_id: &UserId,
    role: OrganizationRole,
) -> Result<String, sqlx::Error>
where
    E: SqliteExecutor<'e>,
{
    let id = Ulid::new().to_string();
    let now = OffsetDateTime::now_utc().unix_timestamp();
    sqlx::query(
        "INSERT INTO organization_members (id, organization_id, user_id, role, status, created_at, updated_at) \
         VALUES (?, ?, ?, ?, 'active', ?, ?)",
    )
    .bind(&id)
    .bind(organization_id.as_str())
    .bind(user_id.as_str())
    .bind(role.to_string())
    .bind(now)
    .bind(now)
    .execute(executor)
    .await?;
    Ok(id)
}

/// Role of the user in the organization, when the membership is live and active.
pub async fn find_active_role<'e, E>(
    executor: E,
    organization_id: &OrganizationId,
    user_id: &UserId,
) -> Result<Option<OrganizationRole>, sqlx::Error>
where
    E: SqliteExecutor<'e>,
{
    let role: Option<String> = sqlx::query_scalar(
        "SELECT role FROM organization_members \
         WHERE organization_id = ? AND user_id = ? AND status = 'active' AND deleted_at IS NULL",
    )
    .bind(organization_id.as_str())
    .bind(user_id.as_str())
    .fetch_optional(executor)
    .await?;

    role.map(|r| {
        r.parse().map_err(|e| sqlx::Error::ColumnDecode {
            index: "role".to_string(),
            source: Box::new(e),
        })
    })
    .transpose()
}

/// Every live, active membership of a user.
pub async fn list_active_for_user<'e, E>(
    executor: E,
    user_id: &UserId,
) -> Result<Vec<ActiveMembership>, sqlx::Error>
where
    E: SqliteExecutor<'e>,
{
    let rows: Vec<(String, String)> = sqlx::query_as(
        "SELECT organization_id, role FROM organization_members \
         WHERE user_id = ? AND status = 'active' AND deleted_at IS NULL \
         ORDER BY created_at",
    )
    .bind(user_id.as_str())
    .fetch_all(executor)
    .await?;

    rows.into_iter()
        .map(|(organization_id, role)| {
            let role = role.parse().map_err(|e| sqlx::Error::ColumnDecode {
                index: "role".to_string(),
                source: Box::new(e),
            })?;
            Ok(ActiveMembership { organization_id, role })
        })
        .collect()
}

/// Change membership status (active, inactive, on leave).
pub async fn set_status<'e, E>(
    executor: E,
    membership_id: &str,
    status: MembershipStatus,
) -> Result<u64, sqlx::Error>
where
    E: SqliteExecutor<'e>,
{
    let now = OffsetDateTime::now_utc().unix_timestamp();
    let result = sqlx::query(
        "UPDATE organization_members SET status = ?, updated_at = ? WHERE id = ? AND deleted_at IS NULL",
    )
    .bind(status.to_string())
    .bind(now)
    .bind(membership_id)
    .execute(executor)
    .await?;
    Ok(result.rows_affected())
}

/// Soft-delete a membership. Returns 0 when it was already deleted.
pub async fn soft_delete<'e, E>(executor: E, membership_id: &str) -> Result<u64, sqlx::Error>
where
    E: SqliteExecutor<'e>,
{
    let now = OffsetDateTime::now_utc().unix_timestamp();
    let result = sqlx::query(
        "UPDATE organization_members SET deleted_at = ?, updated_at = ? WHERE id = ? AND deleted_at IS NULL",
    )
    .bind(now)
    .bind(now)
    .bind(membership_id)
    .execute(executor)
    .await?;
    Ok(result.rows_affected())
}

/// Find a membership row by ID, including soft-deleted ones.
pub async fn find_by_id<'e, E>(
    executor: E,
    membership_id: &str,
) -> Result<Option<OrganizationMember>, sqlx::Error>
where
    E: SqliteExecutor<'e>,
{
    sqlx::query_as::<_, OrganizationMember>(
        "SELECT id, organization_id, user_id, role, status, created_at, updated_at, deleted_at \
         FROM organization_members WHERE id = ?",
    )
    .bind(membership_id)
    .fetch_optional(executor)
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::db::{organizations, pool::test_pool, users};
    use crate::app::domain::OrganizationType;

    async fn setup() -> (crate::app::db::MaintenancePool, OrganizationId, UserId) {
        let pool = test_pool().await;
        let org_id = OrganizationId::new();
        organizations::insert(
            pool.pool(),
            &organizations::NewOrganization {
                id: org_id.clone(),
                slug: "cupe-79".to_string(),
                name: "CUPE Local 79".to_string(),
                organization_type: OrganizationType::Local,
                parent_id: None,
                hierarchy_path: Vec::new(),
            },
        )
        .await
        .unwrap();
        let user_id = UserId::new();
        users::insert(
            pool.pool(),
            &users::NewUser {
                id: user_id.clone(),
                email: "member@example.com".to_string(),
                display_name: "Member".to_string(),
            },
        )
        .await
        .unwrap();
        (pool, org_id, user_id)
    }

    #[tokio::test]
    async fn live_membership_is_unique_per_pair() {
        let (pool, org_id, user_id) = setup().await;
        add_member(pool.pool(), &org_id, &user_id, OrganizationRole::Member)
            .await
            .unwrap();
        let duplicate = add_member(pool.pool(), &org_id, &user_id, OrganizationRole::Steward).await;
        assert!(duplicate.is_err());
    }

    #[tokio::test]
    async fn soft_delete_applies_once_and_frees_the_pair() {
        let (pool, org_id, user_id) = setup().await;
        let id = add_member(pool.pool(), &org_id, &user_id, OrganizationRole::Member)
            .await
            .unwrap();

        assert_eq!(soft_delete(pool.pool(), &id).await.unwrap(), 1);
        assert_eq!(soft_delete(pool.pool(), &id).await.unwrap(), 0);
        assert!(find_by_id(pool.pool(), &id).await.unwrap().unwrap().deleted_at.is_some());
        assert!(find_active_role(pool.pool(), &org_id, &user_id).await.unwrap().is_none());

        add_member(pool.pool(), &org_id, &user_id, OrganizationRole::Officer)
            .await
            .unwrap();
        assert_eq!(
            find_active_role(pool.pool(), &org_id, &user_id).await.unwrap(),
            Some(OrganizationRole::Officer)
        );
    }

    #[tokio::test]
    async fn inactive_membership_has_no_role() {
        let (pool, org_id, user_id) = setup().await;
        let id = add_member(pool.pool(), &org_id, &user_id, OrganizationRole::Admin)
            .await
            .unwrap();
        set_status(pool.pool(), &id, MembershipStatus::OnLeave).await.unwrap();
        assert!(find_active_role(pool.pool(), &org_id, &user_id).await.unwrap().is_none());
        assert!(list_active_for_user(pool.pool(), &user_id).await.unwrap().is_empty());
    }
}
