//! Claims. Every statement carries the `rls::CLAIMS` predicate.

use serde::Serialize;
use sqlx::{FromRow, SqliteExecutor};
use time::OffsetDateTime;

use crate::app::domain::{ClaimStatus, OrganizationId, Priority, UserId};
use crate::app::rls::CLAIMS;

const COLUMNS: &str =
    "id, organization_id, title, description, status, priority, created_by, created_at, updated_at";

/// Database row for claims table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Claim {
    pub id: String,
    pub organization_id: String,
    pub title: String,
    pub description: String,
    pub status: String,
    pub priority: String,
    pub created_by: String,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Data structure for inserting a new claim.
pub struct NewClaim {
    pub id: String,
    pub organization_id: OrganizationId,
    pub title: String,
    pub description: String,
    pub priority: Priority,
    pub created_by: UserId,
}

/// Fields a claim update may change. `None` leaves the column as is.
#[derive(Debug, Default)]
pub struct ClaimChanges {
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<ClaimStatus>,
    pub priority: Option<Priority>,
}

/// Claim count per organization and status.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ClaimRollup {
    pub organization_id: String,
    pub status: String,
    pub count: i64,
}

/// Claims visible to the bound session, newest first.
pub async fn list_visible<'e, E>(executor: E) -> Result<Vec<Claim>, sqlx::Error>
where
    E: SqliteExecutor<'e>,
{
    sqlx::query_as::<_, Claim>(&format!(
        "SELECT {COLUMNS} FROM claims WHERE {} ORDER BY created_at DESC, id DESC",
        CLAIMS.read_predicate()
    ))
    .fetch_all(executor)
    .await
}

/// Find a claim by ID if it is visible to the bound session.
pub async fn find_visible<'e, E>(executor: E, claim_id: &str) -> Result<Option<Claim>, sqlx::Error>
where
    E: SqliteExecutor<'e>,
{
    sqlx::query_as::<_, Claim>(&format!(
        "SELECT {COLUMNS} FROM claims WHERE id = ? AND {}",
        CLAIMS.read_predicate()
    ))
    .bind(claim_id)
    .fetch_optional(executor)
    .await
}

/// Insert a claim. Returns 0 when the target organization is not writable by
/// the bound session.
pub async fn insert<'e, E>(executor: E, claim: &NewClaim) -> Result<u64, sqlx::Error>
where
    E: SqliteExecutor<'e>,
{
    let now = OffsetDateTime::now_utc().unix_timestamp();
    let result = sqlx::query(&format!(
        "INSERT INTO claims (id, organization_id, title, description, status, priority, created_by, created_at, updated_at) \
         SELECT ?, ?, ?, ?, 'submitted', ?, ?, ?, ? WHERE {}",
        CLAIMS.insert_predicate()
    ))
    .bind(&claim.id)
    .bind(claim.organization_id.as_str())
    .bind(&claim.title)
    .bind(&claim.description)
    .bind(claim.priority.to_string())
    .bind(claim.created_by.as_str())
    .bind(now)
    .bind(now)
    .bind(claim.organization_id.as_str())
    .execute(executor)
    .await?;
    Ok(result.rows_affected())
}

/// Apply changes to a claim the bound session may update.
pub async fn update<'e, E>(executor: E, claim_id: &str, changes: &ClaimChanges) -> Result<u64, sqlx::Error>
where
    E: SqliteExecutor<'e>,
{
    let now = OffsetDateTime::now_utc().unix_timestamp();
    let result = sqlx::query(&format!(
        "UPDATE claims SET \
         title = COALESCE(?, title), \
         description = COALESCE(?, description), \
         status = COALESCE(?, status), \
         priority = COALESCE(?, priority), \
         updated_at = ? \
         WHERE id = ? AND {}",
        CLAIMS.update_predicate()
    ))
    .bind(changes.title.as_deref())
    .bind(changes.description.as_deref())
    .bind(changes.status.map(|s| s.to_string()))
    .bind(changes.priority.map(|p| p.to_string()))
    .bind(now)
    .bind(claim_id)
    .execute(executor)
    .await?;
    Ok(result.rows_affected())
}

/// Delete a claim the bound session may delete.
pub async fn delete<'e, E>(executor: E, claim_id: &str) -> Result<u64, sqlx::Error>
where
    E: SqliteExecutor<'e>,
{
    let result = sqlx::query(&format!(
        "DELETE FROM claims WHERE id = ? AND {}",
        CLAIMS.delete_predicate()
    ))
    .bind(claim_id)
    .execute(executor)
    .await?;
    Ok(result.rows_affected())
}

/// Claim counts across the bound session's subtree.
pub async fn rollup<'e, E>(executor: E) -> Result<Vec<ClaimRollup>, sqlx::Error>
where
    E: SqliteExecutor<'e>,
{
    let Some(predicate) = CLAIMS.aggregate_predicate() else {
        return Ok(Vec::new());
    };
    sqlx::query_as::<_, ClaimRollup>(&format!(
        "SELECT organization_id, status, count(*) AS count FROM claims WHERE {predicate} \
         GROUP BY organization_id, status ORDER BY organization_id, status"
    ))
    .fetch_all(executor)
    .await
}
