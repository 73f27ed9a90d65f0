//! Documents. Every statement carries the `rls::DOCUMENTS` predicate; documents
//! are never visible outside their own organization.

use serde::Serialize;
use sqlx::{FromRow, SqliteExecutor};
use time::OffsetDateTime;

use crate::app::domain::{OrganizationId, UserId};
use crate::app::rls::DOCUMENTS;

/// Database row for documents table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Document {
    pub id: String,
    pub organization_id: String,
    pub title: String,
    pub storage_key: String,
    pub created_by: String,
    pub created_at: i64,
}

pub struct NewDocument {
    pub id: String,
    pub organization_id: OrganizationId,
    pub title: String,
    pub storage_key: String,
    pub created_by: UserId,
}

/// Partial update; `None` leaves a column as it is.
#[derive(Debug, Clone, Default)]
pub struct DocumentChanges {
    pub title: Option<String>,
    pub storage_key: Option<String>,
}

pub async fn list_visible<'e, E>(executor: E) -> Result<Vec<Document>, sqlx::Error>
where
    E: SqliteExecutor<'e>,
{
    sqlx::query_as::<_, Document>(&format!(
        "SELECT id, organization_id, title, storage_key, created_by, created_at \
         FROM documents WHERE {} ORDER BY created_at DESC, id DESC",
        DOCUMENTS.read_predicate()
    ))
    .fetch_all(executor)
    .await
}

pub async fn insert<'e, E>(executor: E, document: &NewDocument) -> Result<u64, sqlx::Error>
where
    E: SqliteExecutor<'e>,
{
    let now = OffsetDateTime::now_utc().unix_timestamp();
    let result = sqlx::query(&format!(
        "INSERT INTO documents (id, organization_id, title, storage_key, created_by, created_at) \
         SELECT ?, ?, ?, ?, ?, ? WHERE {}",
        DOCUMENTS.insert_predicate()
    ))
    .bind(&document.id)
    .bind(document.organization_id.as_str())
    .bind(&document.title)
    .bind(&document.storage_key)
    .bind(document.created_by.as_str())
    .bind(now)
    .bind(document.organization_id.as_str())
    .execute(executor)
    .await?;
    Ok(result.rows_affected())
}

pub async fn find_visible<'e, E>(executor: E, document_id: &str) -> Result<Option<Document>, sqlx::Error>
where
    E: SqliteExecutor<'e>,
{
    sqlx::query_as::<_, Document>(&format!(
        "SELECT id, organization_id, title, storage_key, created_by, created_at \
         FROM documents WHERE id = ? AND {}",
        DOCUMENTS.read_predicate()
    ))
    .bind(document_id)
    .fetch_optional(executor)
    .await
}

pub async fn update<'e, E>(executor: E, document_id: &str, changes: &DocumentChanges) -> Result<u64, sqlx::Error>
where
    E: SqliteExecutor<'e>,
{
    let result = sqlx::query(&format!(
        "UPDATE documents SET title = COALESCE(?, title), storage_key = COALESCE(?, storage_key) \
         WHERE id = ? AND {}",
        DOCUMENTS.update_predicate()
    ))
    .bind(changes.title.as_deref())
    .bind(changes.storage_key.as_deref())
    .bind(document_id)
    .execute(executor)
    .await?;
    Ok(result.rows_affected())
}
