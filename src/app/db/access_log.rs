use serde::Serialize;
use sqlx::{FromRow, SqliteExecutor};
use time::OffsetDateTime;
use ulid::Ulid;

use crate::app::domain::{OrganizationId, ResourceClass, SharingLevel, UserId};

/// Database row for cross_org_access_log table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct AccessLogEntry {
    pub id: String,
    pub user_id: String,
    pub requestor_org_id: String,
    pub owner_org_id: String,
    pub resource_class: String,
    pub resource_id: String,
    pub level: String,
    pub via_grant_id: Option<String>,
    pub created_at: i64,
}

/// A cross-organization access about to be recorded.
pub struct NewAccessLogEntry<'a> {
    pub user_id: &'a UserId,
    pub requestor_org_id: &'a OrganizationId,
    pub owner_org_id: &'a OrganizationId,
    pub resource_class: ResourceClass,
    pub resource_id: &'a str,
    pub level: SharingLevel,
    pub via_grant_id: Option<&'a str>,
}

pub async fn record<'e, E>(executor: E, entry: &NewAccessLogEntry<'_>) -> Result<(), sqlx::Error>
where
    E: SqliteExecutor<'e>,
{
    let now = OffsetDateTime::now_utc().unix_timestamp();
    sqlx::query(
        "INSERT INTO cross_org_access_log (id, user_id, requestor_org_id, owner_org_id, resource_class, resource_id, level, via_grant_id, created_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(Ulid::new().to_string())
    .bind(entry.user_id.as_str())
    .bind(entry.requestor_org_id.as_str())
    .bind(entry.owner_org_id.as_str())
    .bind(entry.resource_class.to_string())
    .bind(entry.resource_id)
    .bind(entry.level.to_string())
    .bind(entry.via_grant_id)
    .bind(now)
    .execute(executor)
    .await?;
    Ok(())
}

/// Most recent entries for resources owned by `owner_org_id`.
pub async fn list_for_owner<'e, E>(
    executor: E,
    owner_org_id: &OrganizationId,
) -> Result<Vec<AccessLogEntry>, sqlx::Error>
where
    E: SqliteExecutor<'e>,
{
    sqlx::query_as::<_, AccessLogEntry>(
        "SELECT id, user_id, requestor_org_id, owner_org_id, resource_class, resource_id, level, via_grant_id, created_at \
         FROM cross_org_access_log WHERE owner_org_id = ? ORDER BY created_at DESC, id DESC",
    )
    .bind(owner_org_id.as_str())
    .fetch_all(executor)
    .await
}
