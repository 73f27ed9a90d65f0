//! Dues transactions. Every statement carries the `rls::DUES_TRANSACTIONS` predicate.

use serde::Serialize;
use sqlx::{FromRow, SqliteExecutor};
use time::OffsetDateTime;

use crate::app::domain::{DuesStatus, OrganizationId, UserId};
use crate::app::rls::DUES_TRANSACTIONS;

const COLUMNS: &str = "id, organization_id, member_user_id, amount_cents, status, created_by, created_at";

/// Database row for dues_transactions table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct DuesTransaction {
    pub id: String,
    pub organization_id: String,
    pub member_user_id: String,
    pub amount_cents: i64,
    pub status: String,
    pub created_by: String,
    pub created_at: i64,
}

/// Data structure for inserting a new dues transaction.
pub struct NewDuesTransaction {
    pub id: String,
    pub organization_id: OrganizationId,
    pub member_user_id: UserId,
    pub amount_cents: i64,
    pub created_by: UserId,
}

/// Transactions visible to the bound session, newest first.
pub async fn list_visible<'e, E>(executor: E) -> Result<Vec<DuesTransaction>, sqlx::Error>
where
    E: SqliteExecutor<'e>,
{
    sqlx::query_as::<_, DuesTransaction>(&format!(
        "SELECT {COLUMNS} FROM dues_transactions WHERE {} ORDER BY created_at DESC, id DESC",
        DUES_TRANSACTIONS.read_predicate()
    ))
    .fetch_all(executor)
    .await
}

/// Insert a pending transaction. Returns 0 when the target organization is
/// not writable by the bound session.
pub async fn insert<'e, E>(executor: E, transaction: &NewDuesTransaction) -> Result<u64, sqlx::Error>
where
    E: SqliteExecutor<'e>,
{
    let now = OffsetDateTime::now_utc().unix_timestamp();
    let result = sqlx::query(&format!(
        "INSERT INTO dues_transactions (id, organization_id, member_user_id, amount_cents, status, created_by, created_at) \
         SELECT ?, ?, ?, ?, 'pending', ?, ? WHERE {}",
        DUES_TRANSACTIONS.insert_predicate()
    ))
    .bind(&transaction.id)
    .bind(transaction.organization_id.as_str())
    .bind(transaction.member_user_id.as_str())
    .bind(transaction.amount_cents)
    .bind(transaction.created_by.as_str())
    .bind(now)
    .bind(transaction.organization_id.as_str())
    .execute(executor)
    .await?;
    Ok(result.rows_affected())
}

/// Move a transaction to a new status.
pub async fn set_status<'e, E>(
    executor: E,
    transaction_id: &str,
    status: DuesStatus,
) -> Result<u64, sqlx::Error>
where
    E: SqliteExecutor<'e>,
{
    let result = sqlx::query(&format!(
        "UPDATE dues_transactions SET status = ? WHERE id = ? AND {}",
        DUES_TRANSACTIONS.update_predicate()
    ))
    .bind(status.to_string())
    .bind(transaction_id)
    .execute(executor)
    .await?;
    Ok(result.rows_affected())
}
