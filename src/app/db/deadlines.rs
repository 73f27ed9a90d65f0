//! Deadlines. Every statement carries the `rls::DEADLINES` predicate.

use serde::Serialize;
use sqlx::{FromRow, SqliteExecutor};
use time::OffsetDateTime;

use crate::app::domain::{OrganizationId, Priority, UserId};
use crate::app::rls::DEADLINES;

/// Database row for deadlines table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Deadline {
    pub id: String,
    pub organization_id: String,
    pub title: String,
    pub due_at: i64,
    pub priority: String,
    pub created_by: String,
    pub created_at: i64,
}

pub struct NewDeadline {
    pub id: String,
    pub organization_id: OrganizationId,
    pub title: String,
    pub due_at: i64,
    pub priority: Priority,
    pub created_by: UserId,
}

/// Partial update; `None` leaves a column as it is.
#[derive(Debug, Clone, Default)]
pub struct DeadlineChanges {
    pub title: Option<String>,
    pub due_at: Option<i64>,
    pub priority: Option<Priority>,
}

/// Deadlines visible to the bound session, soonest first.
pub async fn list_visible<'e, E>(executor: E) -> Result<Vec<Deadline>, sqlx::Error>
where
    E: SqliteExecutor<'e>,
{
    sqlx::query_as::<_, Deadline>(&format!(
        "SELECT id, organization_id, title, due_at, priority, created_by, created_at \
         FROM deadlines WHERE {} ORDER BY due_at, id",
        DEADLINES.read_predicate()
    ))
    .fetch_all(executor)
    .await
}

pub async fn find_visible<'e, E>(executor: E, deadline_id: &str) -> Result<Option<Deadline>, sqlx::Error>
where
    E: SqliteExecutor<'e>,
{
    sqlx::query_as::<_, Deadline>(&format!(
        "SELECT id, organization_id, title, due_at, priority, created_by, created_at \
         FROM deadlines WHERE id = ? AND {}",
        DEADLINES.read_predicate()
    ))
    .bind(deadline_id)
    .fetch_optional(executor)
    .await
}

pub async fn insert<'e, E>(executor: E, deadline: &NewDeadline) -> Result<u64, sqlx::Error>
where
    E: SqliteExecutor<'e>,
{
    let now = OffsetDateTime::now_utc().unix_timestamp();
    let result = sqlx::query(&format!(
        "INSERT INTO deadlines (id, organization_id, title, due_at, priority, created_by, created_at) \
         SELECT ?, ?, ?, ?, ?, ?, ? WHERE {}",
        DEADLINES.insert_predicate()
    ))
    .bind(&deadline.id)
    .bind(deadline.organization_id.as_str())
    .bind(&deadline.title)
    .bind(deadline.due_at)
    .bind(deadline.priority.to_string())
    .bind(deadline.created_by.as_str())
    .bind(now)
    .bind(deadline.organization_id.as_str())
    .execute(executor)
    .await?;
    Ok(result.rows_affected())
}

pub async fn update<'e, E>(executor: E, deadline_id: &str, changes: &DeadlineChanges) -> Result<u64, sqlx::Error>
where
    E: SqliteExecutor<'e>,
{
    let result = sqlx::query(&format!(
        "UPDATE deadlines SET \
         title = COALESCE(?, title), \
         due_at = COALESCE(?, due_at), \
         priority = COALESCE(?, priority) \
         WHERE id = ? AND {}",
        DEADLINES.update_predicate()
    ))
    .bind(changes.title.as_deref())
    .bind(changes.due_at)
    .bind(changes.priority.map(|p| p.to_string()))
    .bind(deadline_id)
    .execute(executor)
    .await?;
    Ok(result.rows_affected())
}

pub async fn delete<'e, E>(executor: E, deadline_id: &str) -> Result<u64, sqlx::Error>
where
    E: SqliteExecutor<'e>,
{
    let result = sqlx::query(&format!(
        "DELETE FROM deadlines WHERE id = ? AND {}",
        DEADLINES.delete_predicate()
    ))
    .bind(deadline_id)
    .execute(executor)
    .await?;
    Ok(result.rows_affected())
}
