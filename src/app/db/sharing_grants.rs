use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row, SqliteExecutor};
use time::OffsetDateTime;

use crate::app::domain::{GranteeScope, OrganizationId, ResourceClass, SharingLevel, UserId};

const COLUMNS: &str = "id, owner_org_id, grantee_scope, grantee_org_id, resource_class, level, granted_by, expires_at, revoked_at, created_at";

/// Database row for sharing_grants table.
#[derive(Debug, Clone, Serialize)]
pub struct SharingGrant {
    pub id: String,
    pub owner_org_id: String,
    pub grantee_scope: GranteeScope,
    /// Set only for `GranteeScope::Organization`.
    pub grantee_org_id: Option<String>,
    pub resource_class: ResourceClass,
    pub level: SharingLevel,
    pub granted_by: String,
    pub expires_at: Option<i64>,
    pub revoked_at: Option<i64>,
    pub created_at: i64,
}

impl SharingGrant {
    pub fn is_active_at(&self, now: i64) -> bool {
        self.revoked_at.is_none() && self.expires_at.map_or(true, |at| at > now)
    }
}

fn parse_column<T>(row: &SqliteRow, column: &str) -> Result<T, sqlx::Error>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: String = row.try_get(column)?;
    raw.parse().map_err(|e| sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: Box::new(e),
    })
}

impl<'r> FromRow<'r, SqliteRow> for SharingGrant {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            owner_org_id: row.try_get("owner_org_id")?,
            grantee_scope: parse_column(row, "grantee_scope")?,
            grantee_org_id: row.try_get("grantee_org_id")?,
            resource_class: parse_column(row, "resource_class")?,
            level: parse_column(row, "level")?,
            granted_by: row.try_get("granted_by")?,
            expires_at: row.try_get("expires_at")?,
            revoked_at: row.try_get("revoked_at")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

/// Data structure for inserting a new grant.
pub struct NewSharingGrant {
    pub id: String,
    pub owner_org_id: OrganizationId,
    pub grantee_scope: GranteeScope,
    pub grantee_org_id: Option<OrganizationId>,
    pub resource_class: ResourceClass,
    pub level: SharingLevel,
    pub granted_by: UserId,
    pub expires_at: Option<i64>,
}

/// Insert a new grant.
pub async fn insert<'e, E>(executor: E, grant: &NewSharingGrant) -> Result<(), sqlx::Error>
where
    E: SqliteExecutor<'e>,
{
    let now = OffsetDateTime::now_utc().unix_timestamp();
    sqlx::query(
        "INSERT INTO sharing_grants (id, owner_org_id, grantee_scope, grantee_org_id, resource_class, level, granted_by, expires_at, created_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&grant.id)
    .bind(grant.owner_org_id.as_str())
    .bind(grant.grantee_scope.to_string())
    .bind(grant.grantee_org_id.as_ref().map(|id| id.as_str()))
    .bind(grant.resource_class.to_string())
    .bind(grant.level.to_string())
    .bind(grant.granted_by.as_str())
    .bind(grant.expires_at)
    .bind(now)
    .execute(executor)
    .await?;
    Ok(())
}

/// Find a grant by ID, whatever its state.
pub async fn find_by_id<'e, E>(executor: E, grant_id: &str) -> Result<Option<SharingGrant>, sqlx::Error>
where
    E: SqliteExecutor<'e>,
{
    sqlx::query_as::<_, SharingGrant>(&format!("SELECT {COLUMNS} FROM sharing_grants WHERE id = ?"))
        .bind(grant_id)
        .fetch_optional(executor)
        .await
}

/// Unrevoked, unexpired grants from `owner` for one resource class.
pub async fn list_active_for_owner<'e, E>(
    executor: E,
    owner_org_id: &OrganizationId,
    resource_class: ResourceClass,
) -> Result<Vec<SharingGrant>, sqlx::Error>
where
    E: SqliteExecutor<'e>,
{
    let now = OffsetDateTime::now_utc().unix_timestamp();
    sqlx::query_as::<_, SharingGrant>(&format!(
        "SELECT {COLUMNS} FROM sharing_grants \
         WHERE owner_org_id = ? AND resource_class = ? AND revoked_at IS NULL \
         AND (expires_at IS NULL OR expires_at > ?) \
         ORDER BY created_at"
    ))
    .bind(owner_org_id.as_str())
    .bind(resource_class.to_string())
    .bind(now)
    .fetch_all(executor)
    .await
}

/// Every unrevoked, unexpired grant.
pub async fn list_active<'e, E>(executor: E) -> Result<Vec<SharingGrant>, sqlx::Error>
where
    E: SqliteExecutor<'e>,
{
    let now = OffsetDateTime::now_utc().unix_timestamp();
    sqlx::query_as::<_, SharingGrant>(&format!(
        "SELECT {COLUMNS} FROM sharing_grants \
         WHERE revoked_at IS NULL AND (expires_at IS NULL OR expires_at > ?) \
         ORDER BY created_at"
    ))
    .bind(now)
    .fetch_all(executor)
    .await
}

/// Revoke a grant. Returns 0 when it was already revoked or does not exist.
pub async fn revoke<'e, E>(executor: E, grant_id: &str) -> Result<u64, sqlx::Error>
where
    E: SqliteExecutor<'e>,
{
    let now = OffsetDateTime::now_utc().unix_timestamp();
    let result = sqlx::query("UPDATE sharing_grants SET revoked_at = ? WHERE id = ? AND revoked_at IS NULL")
        .bind(now)
        .bind(grant_id)
        .execute(executor)
        .await?;
    Ok(result.rows_affected())
}
